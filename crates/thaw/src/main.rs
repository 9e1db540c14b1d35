//! thaw CLI: resume Event Hubs capture archives into Delta Lake tables.

use std::process::ExitCode;

use clap::Parser;
use tracing::info;

use thaw::{Config, run_jobs};
use thaw_core::{CliArgs, init_global, init_tracing};

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    let args = CliArgs::parse();

    let paths = args.config_paths();
    if paths.is_empty() {
        eprintln!("Error: no config files or directories specified");
        return ExitCode::FAILURE;
    }

    info!("Loading config from {} source(s)", paths.len());

    let config = match Config::from_paths(&paths) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config: {e}");
            return ExitCode::FAILURE;
        }
    };

    let metrics = match init_global(&config.metrics) {
        Ok(m) => m,
        Err(e) => {
            eprintln!("Failed to initialize metrics: {e}");
            return ExitCode::FAILURE;
        }
    };

    for (key, job) in &config.jobs {
        info!(
            "  Job: {} ({} -> {})",
            key, job.source.url, job.target.table_uri
        );
    }

    let result = run_jobs(&config, &args.jobs).await;
    metrics.finish().await;

    match result {
        Ok(summaries) => {
            for (key, summary) in summaries {
                info!(
                    target = %key,
                    truncated = summary.truncated,
                    records_read = summary.records_read,
                    records_appended = summary.records_appended,
                    "Job finished"
                );
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Run failed: {e}");
            ExitCode::FAILURE
        }
    }
}
