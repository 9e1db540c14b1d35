//! Target tables.
//!
//! [`TargetTable`] is the seam between the resume protocol and the storage
//! engine holding the destination table. [`DeltaTarget`] is the production
//! implementation; [`MemoryTable`] keeps everything in Arrow batches.

mod delta;
mod memory;

pub use delta::DeltaTarget;
pub use memory::MemoryTable;

use async_trait::async_trait;
use deltalake::arrow::array::{ArrayRef, new_null_array};
use deltalake::arrow::compute::cast;
use deltalake::arrow::datatypes::SchemaRef;
use deltalake::arrow::record_batch::RecordBatch;
use snafu::prelude::*;

use crate::error::{MissingColumnSnafu, TableArrowSnafu, TableError, UnexpectedColumnSnafu};
use crate::partition::PartitionSpec;

/// A partitioned destination table.
///
/// Implementations are not safe for concurrent writers; one job per table.
#[async_trait]
pub trait TargetTable: Send + Sync {
    /// Identifier used in logs, metrics and errors.
    fn table_name(&self) -> &str;

    /// Declared schema, partition columns included.
    fn schema(&self) -> SchemaRef;

    /// Partition columns, outermost first.
    fn partition_columns(&self) -> Vec<String>;

    /// Stored partition values, projected to the partition columns.
    ///
    /// Metadata-backed tables may return one row per data file instead of one
    /// per record; every row of a file shares its partition values.
    async fn read_partitions(&self) -> Result<Vec<RecordBatch>, TableError>;

    /// Remove every row of the given partition. Returns the number of rows
    /// or files removed.
    async fn truncate(&mut self, spec: &PartitionSpec) -> Result<usize, TableError>;

    /// Append a batch, matching columns to the table schema by name.
    /// Returns the number of rows written.
    async fn append(&mut self, batch: RecordBatch) -> Result<usize, TableError>;
}

/// Reorder and cast `batch` to `schema`.
///
/// Columns are matched by name. A nullable column absent from the batch is
/// filled with nulls; a batch column unknown to the schema is rejected.
pub fn align_to_schema(
    table: &str,
    batch: &RecordBatch,
    schema: &SchemaRef,
) -> Result<RecordBatch, TableError> {
    let incoming = batch.schema();
    if let Some(extra) = incoming
        .fields()
        .iter()
        .find(|f| schema.field_with_name(f.name()).is_err())
    {
        return UnexpectedColumnSnafu {
            table,
            column: extra.name(),
        }
        .fail();
    }

    let columns = schema
        .fields()
        .iter()
        .map(|field| match batch.column_by_name(field.name()) {
            Some(array) if array.data_type() == field.data_type() => Ok(array.clone()),
            Some(array) => cast(array, field.data_type()).context(TableArrowSnafu),
            None if field.is_nullable() => Ok(new_null_array(field.data_type(), batch.num_rows())),
            None => MissingColumnSnafu {
                table,
                column: field.name(),
            }
            .fail(),
        })
        .collect::<Result<Vec<ArrayRef>, TableError>>()?;

    RecordBatch::try_new(schema.clone(), columns).context(TableArrowSnafu)
}
