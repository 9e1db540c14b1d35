//! Capture archives stored as Hive-partitioned NDJSON files.
//!
//! Files live below a root such as `y=2024/m=01/d=02/part-0.json.gz` or
//! `pdate=2024-01-02/part-0.json.gz`. The partition instant of a file is
//! derived from its path alone, so filtering by boundary never opens files
//! that precede it.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use deltalake::arrow::array::{ArrayRef, Int32Array, RecordBatch, TimestampMicrosecondArray};
use deltalake::arrow::compute::concat_batches;
use deltalake::arrow::datatypes::{DataType, Field, Schema, SchemaRef, TimeUnit};
use futures::TryStreamExt;
use object_store::ObjectMeta;
use object_store::path::Path;
use snafu::prelude::*;
use thaw_core::{PartitionExtractor, StorageProvider, emit};
use tracing::{debug, info, warn};

use super::CaptureSource;
use super::compression::CompressionFormat;
use super::reader::NdjsonReader;
use crate::error::{SourceArrowSnafu, SourceError, SourceStorageSnafu};
use crate::metrics::events::RecordsRead;
use crate::partition::{PDATE, PartitionScheme};

/// One data file and the partition it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
struct CaptureFile {
    location: String,
    instant: DateTime<Utc>,
    /// `y`, `m`, `d` and optionally `h`; empty for `pdate` layouts.
    components: Vec<i32>,
}

/// Capture archive below an object store prefix.
#[derive(Debug)]
pub struct ObjectStoreCapture {
    name: String,
    storage: StorageProvider,
    scheme: PartitionScheme,
    extractor: PartitionExtractor,
    compression: CompressionFormat,
    reader: NdjsonReader,
    schema: SchemaRef,
}

impl ObjectStoreCapture {
    /// `fields` is the schema of a captured record, without partition columns.
    pub fn new(
        name: impl Into<String>,
        storage: StorageProvider,
        scheme: PartitionScheme,
        fields: SchemaRef,
        batch_size: usize,
        compression: CompressionFormat,
    ) -> Self {
        Self {
            name: name.into(),
            storage,
            scheme,
            extractor: PartitionExtractor::new(scheme.columns().iter().copied()),
            compression,
            reader: NdjsonReader::new(fields.clone(), batch_size, compression),
            schema: capture_schema(&fields, scheme),
        }
    }

    pub fn scheme(&self) -> PartitionScheme {
        self.scheme
    }

    /// Data files at or after `from`, in (instant, location) order.
    async fn list_files(&self, from: Option<DateTime<Utc>>) -> Result<Vec<CaptureFile>, SourceError> {
        let listed: Vec<ObjectMeta> = self
            .storage
            .list(true)
            .try_collect()
            .await
            .context(SourceStorageSnafu)?;

        let mut files = Vec::new();
        for meta in listed {
            let location = meta.location.to_string();
            if !self.compression.matches(&location) {
                continue;
            }
            let Some(file) = self.locate(location)? else {
                continue;
            };
            if from.is_none_or(|from| file.instant >= from) {
                files.push(file);
            }
        }
        files.sort_by(|a, b| (a.instant, &a.location).cmp(&(b.instant, &b.location)));
        Ok(files)
    }

    /// Partition of a data file, or `None` when its path lacks a component.
    fn locate(&self, location: String) -> Result<Option<CaptureFile>, SourceError> {
        let values = self.extractor.extract(&location);
        let invalid = |column: &str, value: &str| SourceError::PartitionValue {
            path: location.clone(),
            column: column.to_string(),
            value: value.to_string(),
        };

        if let Some(missing) = self
            .scheme
            .columns()
            .iter()
            .find(|column| !values.contains_key(**column))
        {
            warn!(
                target = %self.name,
                path = %location,
                column = %missing,
                "Skipping capture file outside the partition layout"
            );
            return Ok(None);
        }

        let (instant, components) = match self.scheme {
            PartitionScheme::Pdate => {
                let raw = &values[PDATE];
                let instant = parse_pdate(raw).ok_or_else(|| invalid(PDATE, raw))?;
                (instant, Vec::new())
            }
            PartitionScheme::Ymd | PartitionScheme::Ymdh => {
                let mut components = Vec::with_capacity(4);
                for column in self.scheme.columns() {
                    let raw = &values[*column];
                    components.push(raw.parse::<i32>().map_err(|_| invalid(column, raw))?);
                }
                let instant = hierarchical_instant(&components).ok_or_else(|| {
                    let spec: Vec<String> = self
                        .scheme
                        .columns()
                        .iter()
                        .zip(&components)
                        .map(|(c, v)| format!("{c}={v}"))
                        .collect();
                    invalid(&self.scheme.columns().join("/"), &spec.join("/"))
                })?;
                (instant, components)
            }
        };

        Ok(Some(CaptureFile {
            location,
            instant,
            components,
        }))
    }

    fn with_partition_columns(
        &self,
        batch: RecordBatch,
        file: &CaptureFile,
    ) -> Result<RecordBatch, SourceError> {
        let rows = batch.num_rows();
        let mut columns: Vec<ArrayRef> = batch.columns().to_vec();
        for value in &file.components {
            columns.push(Arc::new(Int32Array::from(vec![*value; rows])));
        }
        columns.push(Arc::new(
            TimestampMicrosecondArray::from(vec![file.instant.timestamp_micros(); rows])
                .with_timezone("UTC"),
        ));
        RecordBatch::try_new(self.schema.clone(), columns).context(SourceArrowSnafu)
    }
}

#[async_trait]
impl CaptureSource for ObjectStoreCapture {
    fn partition_columns(&self) -> Vec<String> {
        self.scheme.column_names()
    }

    fn schema(&self) -> SchemaRef {
        self.schema.clone()
    }

    async fn read(&self, from: Option<DateTime<Utc>>) -> Result<RecordBatch, SourceError> {
        let start = Instant::now();
        let files = self.list_files(from).await?;

        let mut batches = Vec::new();
        for file in &files {
            let data = self
                .storage
                .get(&Path::from(file.location.as_str()))
                .await
                .context(SourceStorageSnafu)?;
            for batch in self.reader.read(&data, &file.location)? {
                batches.push(self.with_partition_columns(batch, file)?);
            }
            debug!(target = %self.name, path = %file.location, instant = %file.instant, "Read capture file");
        }

        let batch = concat_batches(&self.schema, &batches).context(SourceArrowSnafu)?;
        info!(
            target = %self.name,
            files = files.len(),
            records = batch.num_rows(),
            from = ?from,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Read capture archive"
        );
        emit!(RecordsRead {
            count: batch.num_rows() as u64,
            files: files.len() as u64,
            target: self.name.clone(),
        });
        Ok(batch)
    }
}

/// Capture record fields followed by the partition columns.
///
/// Hierarchical components are `Int32`. `pdate` is always present and holds
/// the partition instant of the file a record came from.
fn capture_schema(fields: &Schema, scheme: PartitionScheme) -> SchemaRef {
    let mut all: Vec<Field> = fields.fields().iter().map(|f| f.as_ref().clone()).collect();
    if scheme.is_hierarchical() {
        for column in scheme.columns() {
            all.push(Field::new(*column, DataType::Int32, false));
        }
    }
    all.push(Field::new(
        PDATE,
        DataType::Timestamp(TimeUnit::Microsecond, Some("UTC".into())),
        false,
    ));
    Arc::new(Schema::new(all))
}

fn hierarchical_instant(components: &[i32]) -> Option<DateTime<Utc>> {
    let [year, month, day, rest @ ..] = components else {
        return None;
    };
    let hour = rest.first().copied().unwrap_or(0);
    Utc.with_ymd_and_hms(
        *year,
        u32::try_from(*month).ok()?,
        u32::try_from(*day).ok()?,
        u32::try_from(hour).ok()?,
        0,
        0,
    )
    .single()
}

/// Parse a `pdate` directory value as a UTC instant.
///
/// Accepts RFC 3339, `YYYY-MM-DD HH:MM:SS[.f]` (space or `T` separated, no
/// offset, read as UTC) and a bare `YYYY-MM-DD`.
fn parse_pdate(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(ts) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(ts.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|ts| ts.and_utc())
}
