//! Error types shared by the thaw crates.
//!
//! Storage and configuration failures are defined here so that both the
//! library and the binary can surface them unchanged.

use snafu::prelude::*;

// ============ Storage Errors ============

/// Errors that can occur during storage operations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum StorageError {
    /// Invalid storage URL format.
    #[snafu(display("Invalid storage URL: {url}"))]
    InvalidUrl { url: String },

    /// Object store operation failed.
    #[snafu(display("Storage operation failed: {source}"))]
    ObjectStore { source: object_store::Error },

    /// IO error during storage operations.
    #[snafu(display("IO error: {source}"))]
    Io { source: std::io::Error },

    /// S3 configuration error.
    #[snafu(display("S3 configuration error: {source}"))]
    S3Config { source: object_store::Error },

    /// GCS configuration error.
    #[snafu(display("GCS configuration error: {source}"))]
    GcsConfig { source: object_store::Error },

    /// Azure configuration error.
    #[snafu(display("Azure configuration error: {source}"))]
    AzureConfig { source: object_store::Error },
}

impl StorageError {
    /// Check if this error represents a "not found" condition.
    pub fn is_not_found(&self) -> bool {
        match self {
            StorageError::ObjectStore { source } => {
                matches!(source, object_store::Error::NotFound { .. })
            }
            _ => false,
        }
    }
}

// ============ Config Errors ============

/// Errors that can occur during configuration parsing and validation.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ConfigError {
    /// Capture source URL is empty for a job.
    #[snafu(display("Job '{job}' has empty source url"))]
    EmptySourceUrlForJob { job: String },

    /// Target table URI is empty for a job.
    #[snafu(display("Job '{job}' has empty table_uri"))]
    EmptyTableUriForJob { job: String },

    /// A capture field shadows a column derived from the partition layout.
    #[snafu(display("Job '{job}' declares capture field '{field}' which is reserved for partitioning"))]
    ReservedField { job: String, field: String },

    /// A job selected on the command line does not exist.
    #[snafu(display("Unknown job(s): {}", jobs.join(", ")))]
    UnknownJobs { jobs: Vec<String> },

    /// Environment variable interpolation failed.
    #[snafu(display("Environment variable interpolation failed:\n{message}"))]
    EnvInterpolation { message: String },

    /// Failed to parse YAML configuration.
    #[snafu(display("Failed to parse YAML: {source}"))]
    YamlParse { source: serde_yaml::Error },

    /// Failed to read configuration file.
    #[snafu(display("Failed to read configuration file: {source}"))]
    ReadFile { source: std::io::Error },

    /// Two components claim the same exclusive resource.
    #[snafu(display("Resource conflict: {message}"))]
    ResourceConflict { message: String },

    /// Duplicate component keys found across config files.
    #[snafu(display("Duplicate component keys: {}", keys.join(", ")))]
    DuplicateComponents { keys: Vec<String> },

    /// Unsupported config file format.
    #[snafu(display("Unsupported config format for {}: only .yaml/.yml supported", path.display()))]
    UnsupportedFormat { path: std::path::PathBuf },

    /// Failed to read configuration directory.
    #[snafu(display("Failed to read directory {}", path.display()))]
    ReadDir {
        path: std::path::PathBuf,
        source: std::io::Error,
    },

    /// Multiple configuration errors occurred.
    #[snafu(display("Multiple config errors:\n{}", errors.join("\n")))]
    MultipleErrors { errors: Vec<String> },
}

// ============ Metrics Errors ============

/// Errors that can occur installing the metrics recorder.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum MetricsError {
    /// Failed to build the Prometheus recorder or exporter.
    #[snafu(display("Failed to initialize Prometheus recorder: {source}"))]
    PrometheusInit {
        source: metrics_exporter_prometheus::BuildError,
    },

    /// The metrics listen address does not parse.
    #[snafu(display("Invalid metrics address '{address}': {source}"))]
    InvalidMetricsAddress {
        address: String,
        source: std::net::AddrParseError,
    },

    /// Both a listen address and a push gateway were configured.
    #[snafu(display("Metrics config sets both address and push_gateway; choose one"))]
    ConflictingExporters,

    /// A global recorder is already installed.
    #[snafu(display("Metrics recorder already initialized"))]
    AlreadyInitialized,
}
