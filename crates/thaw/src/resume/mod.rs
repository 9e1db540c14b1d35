//! Truncate-and-reread resume cycle.
//!
//! The highest partition of the target may hold a partial write from an
//! interrupted run, or miss capture files that arrived later. That partition
//! is removed and the capture archive is re-read from its lower boundary, so
//! repeating a cycle against an unchanged archive converges to the same
//! target content. Older partitions are never touched.

use std::time::Instant;

use deltalake::arrow::record_batch::RecordBatch;
use snafu::prelude::*;
use thaw_core::emit;
use tracing::info;

use crate::error::{CaptureSnafu, PartitioningSnafu, ResumeError, TargetSnafu, WatermarkSnafu};
use crate::metrics::events::{PartitionTruncated, ResumeDuration, WatermarkResolved};
use crate::partition::ResumeMode;
use crate::sink::TargetTable;
use crate::source::CaptureSource;
use crate::watermark::{Watermark, WatermarkResolver};

/// Result of one resume cycle.
#[derive(Debug)]
pub struct ResumeOutcome {
    pub watermark: Watermark,
    /// Rows or files removed from the target.
    pub truncated: usize,
    /// Capture records at or after the watermark.
    pub batch: RecordBatch,
}

/// Truncate the highest target partition and read the capture archive from it.
///
/// An empty target truncates nothing and reads the whole archive. Errors from
/// either side are returned as is; nothing is retried. Callers must ensure no
/// other writer touches the target during the cycle.
pub async fn resume(
    target: &mut dyn TargetTable,
    source: &dyn CaptureSource,
) -> Result<ResumeOutcome, ResumeError> {
    let start = Instant::now();
    let table = target.table_name().to_string();

    let mode = ResumeMode::select(
        &table,
        &target.partition_columns(),
        &source.partition_columns(),
    )
    .context(PartitioningSnafu)?;

    let partitions = target
        .read_partitions()
        .await
        .context(TargetSnafu { table: &table })?;
    let watermark =
        WatermarkResolver::resolve(mode, &partitions).context(WatermarkSnafu { table: &table })?;
    emit!(WatermarkResolved {
        kind: watermark.kind(),
        target: table.clone(),
    });

    let truncated = match &watermark {
        Watermark::Empty => {
            info!(target = %table, "Target is empty, loading the whole capture archive");
            0
        }
        Watermark::Resume(point) => {
            info!(
                target = %table,
                partition = %point.truncate,
                boundary = %point.boundary,
                "Resuming from highest stored partition"
            );
            let removed = target
                .truncate(&point.truncate)
                .await
                .context(TargetSnafu { table: &table })?;
            emit!(PartitionTruncated {
                removed: removed as u64,
                target: table.clone(),
            });
            removed
        }
    };

    let batch = source
        .read(watermark.boundary())
        .await
        .context(CaptureSnafu { table: &table })?;

    emit!(ResumeDuration {
        duration: start.elapsed(),
        target: table,
    });
    Ok(ResumeOutcome {
        watermark,
        truncated,
        batch,
    })
}
