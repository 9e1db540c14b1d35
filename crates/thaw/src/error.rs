//! Error types for thaw.

use deltalake::arrow::datatypes::DataType;
use deltalake::arrow::error::ArrowError;
use deltalake::parquet::errors::ParquetError;
use snafu::prelude::*;
use thaw_core::{ConfigError, StorageError};

/// Errors selecting a resume strategy from partition layouts.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum PartitionError {
    #[snafu(display(
        "Incompatible partitioning for table '{table}': target is {target:?}, capture source is {capture:?}"
    ))]
    IncompatiblePartitioning {
        table: String,
        target: Vec<String>,
        capture: Vec<String>,
    },

    #[snafu(display("Table '{table}' uses unsupported partitioning {columns:?}"))]
    UnsupportedScheme { table: String, columns: Vec<String> },
}

/// Errors resolving a watermark from stored partition values.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum WatermarkError {
    #[snafu(display("Partition column '{column}' missing from table data"))]
    MissingPartitionColumn { column: String },

    #[snafu(display("Partition '{spec}' does not denote a valid instant"))]
    InvalidInstant { spec: String },

    #[snafu(display("Arrow error: {source}"))]
    WatermarkArrow { source: ArrowError },
}

/// Errors reshaping capture records to a target schema.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ReconcileError {
    #[snafu(display(
        "Table '{table}' has incorrect type for direct column '{column}': expected {expected}, got {actual}"
    ))]
    TypeMismatch {
        table: String,
        column: String,
        expected: DataType,
        actual: DataType,
    },

    #[snafu(display("Payload column '{column}' missing from capture records of table '{table}'"))]
    MissingPayloadColumn { table: String, column: String },

    #[snafu(display("Malformed payload at row {row}: {message}"))]
    MalformedPayload { row: usize, message: String },

    #[snafu(display("Failed to decode payload: {message}"))]
    PayloadDecode { message: String },

    #[snafu(display("Arrow error: {source}"))]
    ReconcileArrow { source: ArrowError },
}

/// Errors from target table operations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum TableError {
    #[snafu(display("Delta operation failed: {source}"))]
    Delta { source: deltalake::DeltaTableError },

    #[snafu(display("Schema conversion failed: {source}"))]
    SchemaConversion { source: ArrowError },

    #[snafu(display("Invalid table URL: {url}"))]
    TableUrl { url: String },

    #[snafu(display("Storage error: {source}"))]
    TableStorage { source: StorageError },

    #[snafu(display("Parquet error: {source}"))]
    Parquet { source: ParquetError },

    #[snafu(display("Arrow error: {source}"))]
    TableArrow { source: ArrowError },

    #[snafu(display("Column '{column}' is not part of table '{table}'"))]
    UnexpectedColumn { table: String, column: String },

    #[snafu(display("Non-nullable column '{column}' of table '{table}' is missing from the batch"))]
    MissingColumn { table: String, column: String },

    #[snafu(display("Partition column '{column}' has unsupported type {data_type}"))]
    UnsupportedPartitionType { column: String, data_type: DataType },
}

/// Errors reading the capture archive.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum SourceError {
    #[snafu(display("Storage error: {source}"))]
    SourceStorage { source: StorageError },

    #[snafu(display("Failed to decompress {path}: {source}"))]
    Decompression {
        path: String,
        source: std::io::Error,
    },

    #[snafu(display("JSON decode error in {path}: {message}"))]
    JsonDecode { path: String, message: String },

    #[snafu(display("Failed to build decoder: {message}"))]
    DecoderBuild { message: String },

    #[snafu(display("Invalid partition value {column}='{value}' in {path}"))]
    PartitionValue {
        path: String,
        column: String,
        value: String,
    },

    #[snafu(display("Arrow error: {source}"))]
    SourceArrow { source: ArrowError },
}

/// Errors from a resume cycle.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ResumeError {
    #[snafu(display("{source}"))]
    Partitioning { source: PartitionError },

    #[snafu(display("Watermark resolution failed for table '{table}': {source}"))]
    Watermark {
        table: String,
        source: WatermarkError,
    },

    #[snafu(display("Target table '{table}' failed: {source}"))]
    Target { table: String, source: TableError },

    #[snafu(display("Capture source failed for table '{table}': {source}"))]
    Capture { table: String, source: SourceError },
}

/// Errors from building or running a job.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum PipelineError {
    #[snafu(display("Job '{job}': {source}"))]
    Resume { job: String, source: ResumeError },

    #[snafu(display("Job '{job}': {source}"))]
    Reconcile { job: String, source: ReconcileError },

    #[snafu(display("Job '{job}' failed to append: {source}"))]
    Append { job: String, source: TableError },

    #[snafu(display("Job '{job}' failed to open target table: {source}"))]
    OpenTarget { job: String, source: TableError },

    #[snafu(display("Job '{job}' failed to open capture source: {source}"))]
    OpenSource { job: String, source: SourceError },

    #[snafu(display("Configuration error: {source}"))]
    Config { source: ConfigError },
}
