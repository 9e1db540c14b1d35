//! Command line arguments and config source paths.

use std::path::{Path, PathBuf};

use clap::Parser;

/// Where configuration is read from.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConfigPath {
    File(PathBuf),
    /// Every `.yaml`/`.yml` file directly inside the directory, in name order.
    Dir(PathBuf),
}

impl ConfigPath {
    /// Files first, then directories, each group in command line order.
    pub fn collect(files: &[PathBuf], dirs: &[PathBuf]) -> Vec<Self> {
        let files = files.iter().cloned().map(Self::File);
        let dirs = dirs.iter().cloned().map(Self::Dir);
        files.chain(dirs).collect()
    }
}

pub fn is_yaml_file(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|ext| ext.to_str()),
        Some("yaml" | "yml")
    )
}

/// Resume Event Hubs capture data into Delta tables.
#[derive(Parser, Debug)]
#[command(version)]
pub struct CliArgs {
    /// Path to configuration file (can be specified multiple times)
    #[arg(short, long)]
    pub config: Vec<PathBuf>,

    /// Path to configuration directory (can be specified multiple times)
    #[arg(short = 'C', long = "config-dir")]
    pub config_dirs: Vec<PathBuf>,

    /// Only run the named job (can be specified multiple times)
    #[arg(short, long = "job")]
    pub jobs: Vec<String>,
}

impl CliArgs {
    pub fn config_paths(&self) -> Vec<ConfigPath> {
        ConfigPath::collect(&self.config, &self.config_dirs)
    }
}
