//! Delta Lake target table.
//!
//! Partition values are read from the log (one row per data file), so
//! resolving the watermark never scans Parquet data. Truncation removes
//! whole files, which is exact because every file belongs to one partition.

mod actions;
mod commit;
mod table;
mod write;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use deltalake::DeltaTable;
use deltalake::arrow::array::{Array, AsArray};
use deltalake::arrow::compute::cast;
use deltalake::arrow::datatypes::{DataType, Field, Int64Type, Schema, SchemaRef};
use deltalake::arrow::record_batch::{RecordBatch, RecordBatchOptions};
use deltalake::protocol::{DeltaOperation, SaveMode};
use object_store::PutPayload;
use object_store::path::Path;
use snafu::prelude::*;
use thaw_core::StorageProvider;
use tracing::{debug, info};
use uuid::Uuid;

use super::{TargetTable, align_to_schema};
use crate::error::{
    DeltaSnafu, SchemaConversionSnafu, TableArrowSnafu, TableError, TableStorageSnafu,
};
use crate::partition::PartitionSpec;

use actions::{add_action, delta_partition_values, remove_action};
use commit::commit;
use table::{create_table, ensure_handlers_registered, open_table};
use write::{encode_parquet, group_by_partition};

/// A Delta Lake table used as the ingestion target.
pub struct DeltaTarget {
    name: String,
    storage: StorageProvider,
    table: DeltaTable,
    schema: SchemaRef,
    partition_columns: Vec<String>,
}

impl std::fmt::Debug for DeltaTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeltaTarget")
            .field("name", &self.name)
            .field("storage", &self.storage)
            .field("partition_columns", &self.partition_columns)
            .finish()
    }
}

impl DeltaTarget {
    /// Open an existing table.
    pub async fn open(
        name: impl Into<String>,
        table_uri: &str,
        storage_options: HashMap<String, String>,
    ) -> Result<Self, TableError> {
        ensure_handlers_registered();
        let name = name.into();
        let storage = StorageProvider::for_url_with_options(table_uri, storage_options)
            .await
            .context(TableStorageSnafu)?;
        let table = open_table(&storage, &name).await?;
        Self::from_table(name, storage, table)
    }

    /// Create a new, empty table.
    pub async fn create(
        name: impl Into<String>,
        table_uri: &str,
        storage_options: HashMap<String, String>,
        schema: &Schema,
        partition_columns: &[String],
    ) -> Result<Self, TableError> {
        ensure_handlers_registered();
        let name = name.into();
        let storage = StorageProvider::for_url_with_options(table_uri, storage_options)
            .await
            .context(TableStorageSnafu)?;
        let table = create_table(&storage, schema, partition_columns, &name).await?;
        Self::from_table(name, storage, table)
    }

    fn from_table(
        name: String,
        storage: StorageProvider,
        table: DeltaTable,
    ) -> Result<Self, TableError> {
        use deltalake::kernel::engine::arrow_conversion::TryIntoArrow;

        let snapshot = table.snapshot().context(DeltaSnafu)?;
        let schema: Schema = snapshot
            .schema()
            .as_ref()
            .try_into_arrow()
            .context(SchemaConversionSnafu)?;
        let partition_columns = snapshot.metadata().partition_columns().to_vec();

        Ok(Self {
            name,
            storage,
            table,
            schema: Arc::new(schema),
            partition_columns,
        })
    }

    pub fn version(&self) -> i64 {
        self.table.version().unwrap_or(-1)
    }

    /// Paths of the active data files, relative to the table root.
    pub fn data_files(&self) -> Result<Vec<String>, TableError> {
        let Some((files, _)) = self.active_files()? else {
            return Ok(Vec::new());
        };
        let paths = column_as(&files, "path", &DataType::Utf8)?;
        Ok(paths
            .as_string::<i32>()
            .iter()
            .flatten()
            .map(str::to_string)
            .collect())
    }

    /// Active data files with their partition values.
    ///
    /// Returns the add-actions table together with a projection holding one
    /// column per partition column, or `None` when the table has no files.
    fn active_files(&self) -> Result<Option<(RecordBatch, RecordBatch)>, TableError> {
        let snapshot = self.table.snapshot().context(DeltaSnafu)?;
        let files = snapshot.add_actions_table(true).context(DeltaSnafu)?;
        if files.num_rows() == 0 {
            return Ok(None);
        }

        let mut fields = Vec::with_capacity(self.partition_columns.len());
        let mut columns = Vec::with_capacity(self.partition_columns.len());
        for column in &self.partition_columns {
            let values = files
                .column_by_name(&format!("partition.{column}"))
                .ok_or_else(|| TableError::MissingColumn {
                    table: self.name.clone(),
                    column: column.clone(),
                })?;
            fields.push(Field::new(column, values.data_type().clone(), true));
            columns.push(values.clone());
        }
        let projection = RecordBatch::try_new_with_options(
            Arc::new(Schema::new(fields)),
            columns,
            &RecordBatchOptions::new().with_row_count(Some(files.num_rows())),
        )
        .context(TableArrowSnafu)?;
        Ok(Some((files, projection)))
    }
}

#[async_trait]
impl TargetTable for DeltaTarget {
    fn table_name(&self) -> &str {
        &self.name
    }

    fn schema(&self) -> SchemaRef {
        self.schema.clone()
    }

    fn partition_columns(&self) -> Vec<String> {
        self.partition_columns.clone()
    }

    async fn read_partitions(&self) -> Result<Vec<RecordBatch>, TableError> {
        Ok(self
            .active_files()?
            .map(|(_, partitions)| vec![partitions])
            .unwrap_or_default())
    }

    async fn truncate(&mut self, spec: &PartitionSpec) -> Result<usize, TableError> {
        let Some((files, partitions)) = self.active_files()? else {
            return Ok(0);
        };
        let mask = spec.mask(&partitions).context(TableArrowSnafu)?;

        let paths = column_as(&files, "path", &DataType::Utf8)?;
        let paths = paths.as_string::<i32>();
        let sizes = column_as(&files, "size_bytes", &DataType::Int64)?;
        let sizes = sizes.as_primitive::<Int64Type>();

        let columns: Vec<String> = spec.entries().iter().map(|(c, _)| c.clone()).collect();
        let values: Vec<_> = spec.entries().iter().map(|(_, v)| Some(*v)).collect();
        let partition_values = delta_partition_values(&columns, &values);

        let removals: Vec<_> = (0..files.num_rows())
            .filter(|&row| mask.value(row) && !paths.is_null(row))
            .map(|row| {
                let size = (!sizes.is_null(row)).then(|| sizes.value(row));
                remove_action(paths.value(row), size, partition_values.clone())
            })
            .collect();
        if removals.is_empty() {
            debug!(target = %self.name, partition = %spec, "No files to truncate");
            return Ok(0);
        }

        let removed = removals.len();
        let version = commit(
            &mut self.table,
            removals,
            DeltaOperation::Delete {
                predicate: Some(spec.to_string()),
            },
            &self.name,
        )
        .await?;
        info!(
            target = %self.name,
            partition = %spec,
            files = removed,
            "Truncated partition at version {version}"
        );
        Ok(removed)
    }

    async fn append(&mut self, batch: RecordBatch) -> Result<usize, TableError> {
        let aligned = align_to_schema(&self.name, &batch, &self.schema)?;
        let rows = aligned.num_rows();
        if rows == 0 {
            return Ok(0);
        }

        let mut adds = Vec::new();
        for group in group_by_partition(&aligned, &self.partition_columns)? {
            let bytes = encode_parquet(&group.rows)?;
            let size = bytes.len();
            let file_name = format!("part-{}.snappy.parquet", Uuid::new_v4());
            self.storage
                .put_payload(&Path::from(file_name.as_str()), PutPayload::from(Bytes::from(bytes)))
                .await
                .context(TableStorageSnafu)?;

            debug!(target = %self.name, file = %file_name, rows = group.rows.num_rows(), size, "Wrote data file");
            adds.push(add_action(
                &file_name,
                size,
                delta_partition_values(&self.partition_columns, &group.values),
            ));
        }

        let partition_by = (!self.partition_columns.is_empty()).then(|| self.partition_columns.clone());
        let files = adds.len();
        let version = commit(
            &mut self.table,
            adds,
            DeltaOperation::Write {
                mode: SaveMode::Append,
                partition_by,
                predicate: None,
            },
            &self.name,
        )
        .await?;
        info!(target = %self.name, rows, files, "Appended at version {version}");
        Ok(rows)
    }
}

fn column_as(
    files: &RecordBatch,
    name: &str,
    data_type: &DataType,
) -> Result<Arc<dyn Array>, TableError> {
    let column = files.column_by_name(name).ok_or_else(|| TableError::MissingColumn {
        table: "_delta_log".to_string(),
        column: name.to_string(),
    })?;
    cast(column, data_type).context(TableArrowSnafu)
}
