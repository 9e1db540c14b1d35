//! Capture archive sources.
//!
//! A [`CaptureSource`] returns every captured record at or after a partition
//! boundary, with the partition columns derived from the archive layout
//! appended to each record.

mod capture;
mod compression;
mod reader;

pub use capture::ObjectStoreCapture;
pub use compression::CompressionFormat;
pub use reader::NdjsonReader;

pub(crate) use reader::{coerce_object_fields, decode_rows};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deltalake::arrow::datatypes::SchemaRef;
use deltalake::arrow::record_batch::RecordBatch;

use crate::error::SourceError;

/// A partitioned, append-only archive of captured records.
#[async_trait]
pub trait CaptureSource: Send + Sync {
    /// Partition columns of the archive layout, outermost first.
    fn partition_columns(&self) -> Vec<String>;

    /// Schema of the batches returned by [`CaptureSource::read`].
    fn schema(&self) -> SchemaRef;

    /// All records whose partition instant is at or after `from`, or every
    /// record when `from` is `None`.
    async fn read(&self, from: Option<DateTime<Utc>>) -> Result<RecordBatch, SourceError>;
}
