//! thaw-core: Shared plumbing for the thaw ingestion crates.
//!
//! - `storage/` - Multi-cloud object storage abstraction (S3, GCS, Azure, local)
//! - `config/` - YAML loading, environment variable interpolation, CLI arguments
//! - `metrics/` - Metric event trait, storage request events, Prometheus exporter
//! - `partition` - Hive-style `key=value` path parsing
//! - `tracing` - Subscriber initialisation for the binary
//! - `error` - Storage and configuration error types

pub mod config;
pub mod error;
pub mod metrics;
pub mod partition;
pub mod storage;
pub mod tracing;

pub use config::{
    CliArgs, ConfigPath, Mergeable, MetricsConfig, PushGatewayConfig, Resource, interpolate,
    load_from_paths,
};
pub use error::{ConfigError, MetricsError, StorageError};
pub use partition::PartitionExtractor;
pub use crate::metrics::exporter::{MetricsController, init_global};
pub use storage::{BackendConfig, StorageProvider};
pub use crate::tracing::init_tracing;
