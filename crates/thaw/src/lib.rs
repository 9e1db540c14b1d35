//! thaw: Resume Event Hubs capture archives into Delta Lake tables.
//!
//! A job reads the highest partition already present in the target table,
//! truncates it, re-reads the capture archive from that partition onward and
//! reshapes the records to the target schema before appending them.
//!
//! - `partition` - Partition schemes, partition specs and row masks
//! - `watermark` - Resume point resolution from target partition values
//! - `resume` - Truncate-and-reread coordination
//! - `reconcile` - Target-driven column selection and payload decoding
//! - `sink` - Target tables (Delta Lake, in-memory)
//! - `source` - Capture archive readers
//! - `pipeline` - Per-job orchestration

pub mod config;
pub mod error;
pub mod metrics;
pub mod partition;
pub mod pipeline;
pub mod reconcile;
pub mod resume;
pub mod sink;
pub mod source;
pub mod watermark;

pub use config::{Config, JobConfig};
pub use partition::{PartitionScheme, PartitionSpec, PartitionValue, ResumeMode};
pub use pipeline::{Pipeline, RunSummary, run_jobs};
pub use reconcile::{JsonPayloadDecoder, PayloadDecoder, SchemaReconciler};
pub use resume::{ResumeOutcome, resume};
pub use sink::{DeltaTarget, MemoryTable, TargetTable};
pub use source::{CaptureSource, ObjectStoreCapture};
pub use watermark::{ResumePoint, Watermark, WatermarkResolver};
