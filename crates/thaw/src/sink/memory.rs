//! In-memory target table.

use async_trait::async_trait;
use deltalake::arrow::compute::{concat_batches, filter_record_batch, not};
use deltalake::arrow::datatypes::SchemaRef;
use deltalake::arrow::record_batch::RecordBatch;
use snafu::prelude::*;
use tracing::debug;

use super::{TargetTable, align_to_schema};
use crate::error::{TableArrowSnafu, TableError, UnexpectedColumnSnafu};
use crate::partition::PartitionSpec;

/// A target table held as Arrow batches.
#[derive(Debug, Clone)]
pub struct MemoryTable {
    name: String,
    schema: SchemaRef,
    partition_columns: Vec<String>,
    batches: Vec<RecordBatch>,
}

impl MemoryTable {
    /// Create an empty table. Every partition column must be in `schema`.
    pub fn new(
        name: impl Into<String>,
        schema: SchemaRef,
        partition_columns: Vec<String>,
    ) -> Result<Self, TableError> {
        let name = name.into();
        if let Some(missing) = partition_columns
            .iter()
            .find(|c| schema.index_of(c).is_err())
        {
            return UnexpectedColumnSnafu {
                table: name,
                column: missing,
            }
            .fail();
        }

        Ok(Self {
            name,
            schema,
            partition_columns,
            batches: Vec::new(),
        })
    }

    pub fn num_rows(&self) -> usize {
        self.batches.iter().map(RecordBatch::num_rows).sum()
    }

    /// All rows as one batch, in insertion order.
    pub fn to_batch(&self) -> Result<RecordBatch, TableError> {
        concat_batches(&self.schema, &self.batches).context(TableArrowSnafu)
    }
}

#[async_trait]
impl TargetTable for MemoryTable {
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
        let indices = self
            .partition_columns
            .iter()
            .map(|c| self.schema.index_of(c))
            .collect::<Result<Vec<_>, _>>()
            .context(TableArrowSnafu)?;

        self.batches
            .iter()
            .map(|batch| batch.project(&indices).context(TableArrowSnafu))
            .collect()
    }

    async fn truncate(&mut self, spec: &PartitionSpec) -> Result<usize, TableError> {
        let mut removed = 0;
        let mut kept = Vec::with_capacity(self.batches.len());
        for batch in &self.batches {
            let mask = spec.mask(batch).context(TableArrowSnafu)?;
            removed += mask.true_count();
            let remaining = filter_record_batch(batch, &not(&mask).context(TableArrowSnafu)?)
                .context(TableArrowSnafu)?;
            if remaining.num_rows() > 0 {
                kept.push(remaining);
            }
        }
        self.batches = kept;

        debug!(target = %self.name, partition = %spec, removed, "Truncated partition");
        Ok(removed)
    }

    async fn append(&mut self, batch: RecordBatch) -> Result<usize, TableError> {
        let aligned = align_to_schema(&self.name, &batch, &self.schema)?;
        let rows = aligned.num_rows();
        if rows > 0 {
            self.batches.push(aligned);
        }
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partition::PartitionValue;
    use deltalake::arrow::array::{Int32Array, StringArray};
    use deltalake::arrow::datatypes::{DataType, Field, Schema};
    use std::sync::Arc;

    fn table() -> MemoryTable {
        let schema = Arc::new(Schema::new(vec![
            Field::new("name", DataType::Utf8, true),
            Field::new("y", DataType::Int32, false),
            Field::new("m", DataType::Int32, false),
        ]));
        MemoryTable::new("memory", schema, vec!["y".into(), "m".into()]).unwrap()
    }

    fn rows(names: &[&str], y: &[i32], m: &[i32]) -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![
            Field::new("y", DataType::Int32, false),
            Field::new("m", DataType::Int32, false),
            Field::new("name", DataType::Utf8, true),
        ]));
        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Int32Array::from(y.to_vec())),
                Arc::new(Int32Array::from(m.to_vec())),
                Arc::new(StringArray::from(names.to_vec())),
            ],
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_append_and_read_partitions() {
        let mut table = table();
        let written = table
            .append(rows(&["a", "b"], &[2024, 2024], &[1, 2]))
            .await
            .unwrap();
        assert_eq!(written, 2);

        let partitions = table.read_partitions().await.unwrap();
        assert_eq!(partitions.len(), 1);
        let names: Vec<_> = partitions[0]
            .schema()
            .fields()
            .iter()
            .map(|f| f.name().clone())
            .collect();
        assert_eq!(names, vec!["y", "m"]);
    }

    #[tokio::test]
    async fn test_truncate_only_matching_partition() {
        let mut table = table();
        table
            .append(rows(&["a", "b", "c"], &[2023, 2024, 2024], &[2, 1, 2]))
            .await
            .unwrap();
        table
            .append(rows(&["d"], &[2024], &[2]))
            .await
            .unwrap();

        let spec = PartitionSpec::new()
            .with("y", PartitionValue::Int(2024))
            .with("m", PartitionValue::Int(2));
        assert_eq!(table.truncate(&spec).await.unwrap(), 2);
        assert_eq!(table.num_rows(), 2);

        assert_eq!(table.truncate(&spec).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_empty_append_is_noop() {
        let mut table = table();
        let written = table.append(rows(&[], &[], &[])).await.unwrap();
        assert_eq!(written, 0);
        assert!(table.read_partitions().await.unwrap().is_empty());
    }

    #[test]
    fn test_partition_column_must_exist() {
        let schema = Arc::new(Schema::new(vec![Field::new("y", DataType::Int32, false)]));
        assert!(MemoryTable::new("memory", schema, vec!["pdate".into()]).is_err());
    }
}
