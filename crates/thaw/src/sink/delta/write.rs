//! Splitting batches into partition groups and encoding Parquet.

use deltalake::arrow::array::UInt32Array;
use deltalake::arrow::compute::take_record_batch;
use deltalake::arrow::record_batch::RecordBatch;
use deltalake::parquet::arrow::ArrowWriter;
use deltalake::parquet::basic::Compression;
use deltalake::parquet::file::properties::WriterProperties;
use indexmap::IndexMap;
use snafu::prelude::*;

use crate::error::{ParquetSnafu, TableArrowSnafu, TableError, UnsupportedPartitionTypeSnafu};
use crate::partition::{PartitionKind, PartitionValue};

/// Rows sharing one combination of partition values.
#[derive(Debug)]
pub struct PartitionGroup {
    pub values: Vec<Option<PartitionValue>>,
    /// Data columns only; partition columns live in the log.
    pub rows: RecordBatch,
}

/// Split `batch` by the values of `partition_columns`, in first-seen order.
pub fn group_by_partition(
    batch: &RecordBatch,
    partition_columns: &[String],
) -> Result<Vec<PartitionGroup>, TableError> {
    let schema = batch.schema();
    let mut per_column = Vec::with_capacity(partition_columns.len());
    for column in partition_columns {
        let index = schema.index_of(column).context(TableArrowSnafu)?;
        let data_type = schema.field(index).data_type();
        let kind = PartitionKind::of(data_type).context(UnsupportedPartitionTypeSnafu {
            column,
            data_type: data_type.clone(),
        })?;
        per_column.push(kind.values(batch.column(index)).context(TableArrowSnafu)?);
    }

    let data_indices: Vec<usize> = (0..schema.fields().len())
        .filter(|i| !partition_columns.contains(schema.field(*i).name()))
        .collect();
    let data = batch.project(&data_indices).context(TableArrowSnafu)?;

    let mut groups: IndexMap<Vec<Option<PartitionValue>>, Vec<u32>> = IndexMap::new();
    for row in 0..batch.num_rows() {
        let key = per_column.iter().map(|values| values[row]).collect();
        let row = u32::try_from(row).map_err(|_| TableError::TableArrow {
            source: deltalake::arrow::error::ArrowError::ComputeError(
                "batch too large to partition".to_string(),
            ),
        })?;
        groups.entry(key).or_default().push(row);
    }

    groups
        .into_iter()
        .map(|(values, rows)| {
            let rows = take_record_batch(&data, &UInt32Array::from(rows)).context(TableArrowSnafu)?;
            Ok(PartitionGroup { values, rows })
        })
        .collect()
}

/// Encode a batch as a Snappy-compressed Parquet file.
pub fn encode_parquet(batch: &RecordBatch) -> Result<Vec<u8>, TableError> {
    let properties = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();

    let mut buffer = Vec::new();
    let mut writer =
        ArrowWriter::try_new(&mut buffer, batch.schema(), Some(properties)).context(ParquetSnafu)?;
    writer.write(batch).context(ParquetSnafu)?;
    writer.close().context(ParquetSnafu)?;
    Ok(buffer)
}
