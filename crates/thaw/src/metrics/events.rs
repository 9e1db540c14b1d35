use metrics::{counter, histogram};
use std::time::Duration;
use thaw_core::metrics::events::InternalEvent;
use tracing::trace;

/// A watermark was resolved from target partition values.
pub struct WatermarkResolved {
    /// `empty` or `resume`.
    pub kind: &'static str,
    pub target: String,
}

impl InternalEvent for WatermarkResolved {
    fn emit(self) {
        trace!(kind = self.kind, target = %self.target, "Watermark resolved");
        counter!(
            "thaw_watermarks_resolved_total",
            "kind" => self.kind,
            "target" => self.target
        )
        .increment(1);
    }
}

/// The resume partition was truncated.
pub struct PartitionTruncated {
    /// Files or rows removed, depending on the table.
    pub removed: u64,
    pub target: String,
}

impl InternalEvent for PartitionTruncated {
    fn emit(self) {
        trace!(removed = self.removed, target = %self.target, "Partition truncated");
        counter!("thaw_partitions_truncated_total", "target" => self.target.clone()).increment(1);
        counter!("thaw_truncated_units_total", "target" => self.target).increment(self.removed);
    }
}

pub struct RecordsRead {
    pub count: u64,
    pub files: u64,
    pub target: String,
}

impl InternalEvent for RecordsRead {
    fn emit(self) {
        trace!(count = self.count, files = self.files, target = %self.target, "Records read");
        counter!("thaw_records_read_total", "target" => self.target.clone()).increment(self.count);
        counter!("thaw_files_read_total", "target" => self.target).increment(self.files);
    }
}

pub struct RecordsAppended {
    pub count: u64,
    pub target: String,
}

impl InternalEvent for RecordsAppended {
    fn emit(self) {
        trace!(count = self.count, target = %self.target, "Records appended");
        counter!("thaw_records_appended_total", "target" => self.target).increment(self.count);
    }
}

/// Wall time of one resume cycle, from watermark resolution to the capture read.
pub struct ResumeDuration {
    pub duration: Duration,
    pub target: String,
}

impl InternalEvent for ResumeDuration {
    fn emit(self) {
        histogram!("thaw_resume_duration_seconds", "target" => self.target)
            .record(self.duration.as_secs_f64());
    }
}

/// A Delta transaction was committed.
pub struct TableCommitted {
    pub operation: String,
    pub duration: Duration,
    pub target: String,
}

impl InternalEvent for TableCommitted {
    fn emit(self) {
        trace!(operation = %self.operation, target = %self.target, "Table committed");
        counter!(
            "thaw_table_commits_total",
            "operation" => self.operation.clone(),
            "target" => self.target.clone()
        )
        .increment(1);
        histogram!(
            "thaw_table_commit_duration_seconds",
            "operation" => self.operation,
            "target" => self.target
        )
        .record(self.duration.as_secs_f64());
    }
}
