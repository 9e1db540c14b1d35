//! Loading and merging config from several YAML files.

use std::path::Path;

use indexmap::IndexMap;

use super::{ConfigPath, MetricsConfig, interpolate, is_yaml_file};
use crate::error::ConfigError;

/// A config made of keyed components that can be split across files.
pub trait Mergeable: Sized + Default {
    type Key: Eq + std::hash::Hash + Clone + std::fmt::Display;
    type Component;

    fn components_mut(&mut self) -> &mut IndexMap<Self::Key, Self::Component>;

    fn metrics_mut(&mut self) -> &mut MetricsConfig;

    fn parse_yaml(contents: &str) -> Result<Self, ConfigError>;

    /// Move every component of `other` into `self`.
    ///
    /// A key defined in both is an error and leaves `self` unchanged.
    fn merge(&mut self, mut other: Self) -> Result<(), ConfigError> {
        let ours = self.components_mut();
        let duplicates: Vec<String> = other
            .components_mut()
            .keys()
            .filter(|key| ours.contains_key(*key))
            .map(ToString::to_string)
            .collect();
        if !duplicates.is_empty() {
            return Err(ConfigError::DuplicateComponents { keys: duplicates });
        }

        ours.extend(other.components_mut().drain(..));
        self.metrics_mut()
            .merge_from(std::mem::take(other.metrics_mut()));
        Ok(())
    }
}

/// Load and merge every config source, reporting all failures together.
pub fn load_from_paths<C: Mergeable>(paths: &[ConfigPath]) -> Result<C, ConfigError> {
    let mut config = C::default();
    let mut errors = Vec::new();

    for path in paths {
        let (location, loaded) = match path {
            ConfigPath::File(file) => (file, load_file::<C>(file)),
            ConfigPath::Dir(dir) => (dir, load_dir::<C>(dir)),
        };
        if let Err(e) = loaded.and_then(|partial| config.merge(partial)) {
            errors.push(format!("{}: {e}", location.display()));
        }
    }

    if errors.is_empty() {
        Ok(config)
    } else {
        Err(ConfigError::MultipleErrors { errors })
    }
}

fn load_file<C: Mergeable>(path: &Path) -> Result<C, ConfigError> {
    if !is_yaml_file(path) {
        return Err(ConfigError::UnsupportedFormat {
            path: path.to_path_buf(),
        });
    }

    let contents =
        std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFile { source })?;

    let result = interpolate(&contents);
    if !result.is_ok() {
        return Err(ConfigError::EnvInterpolation {
            message: result.errors.join("\n"),
        });
    }

    C::parse_yaml(&result.text)
}

fn load_dir<C: Mergeable>(dir: &Path) -> Result<C, ConfigError> {
    let entries = std::fs::read_dir(dir).map_err(|source| ConfigError::ReadDir {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut files: Vec<_> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && is_yaml_file(path))
        .collect();
    files.sort();

    let mut config = C::default();
    let mut errors = Vec::new();
    for file in files {
        if let Err(e) = load_file::<C>(&file).and_then(|partial| config.merge(partial)) {
            errors.push(format!("{}: {e}", file.display()));
        }
    }

    if errors.is_empty() {
        Ok(config)
    } else {
        Err(ConfigError::MultipleErrors { errors })
    }
}
