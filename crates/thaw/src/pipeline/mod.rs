//! Per-job orchestration.
//!
//! A run is strictly sequential: resume (watermark, truncate, capture read),
//! reconcile against the target schema, append. Jobs run one after another;
//! a failed job stops the run and leaves earlier jobs committed.

use std::time::Instant;

use snafu::prelude::*;
use thaw_core::{StorageProvider, emit};
use tracing::{info, warn};

use crate::config::{Config, JobConfig};
use crate::error::{
    AppendSnafu, ConfigSnafu, OpenSourceSnafu, OpenTargetSnafu, PipelineError, ReconcileSnafu,
    ResumeSnafu, SourceError,
};
use crate::metrics::events::RecordsAppended;
use crate::reconcile::SchemaReconciler;
use crate::resume::resume;
use crate::sink::{DeltaTarget, TargetTable};
use crate::source::{CaptureSource, ObjectStoreCapture};
use crate::watermark::Watermark;

/// What one run of a job did.
#[derive(Debug)]
pub struct RunSummary {
    pub watermark: Watermark,
    /// Rows or files removed from the resume partition.
    pub truncated: usize,
    pub records_read: usize,
    pub records_appended: usize,
}

/// One capture archive feeding one target table.
pub struct Pipeline {
    key: String,
    target: Box<dyn TargetTable>,
    source: Box<dyn CaptureSource>,
    reconciler: SchemaReconciler,
}

impl Pipeline {
    pub fn new(
        key: impl Into<String>,
        target: Box<dyn TargetTable>,
        source: Box<dyn CaptureSource>,
        reconciler: SchemaReconciler,
    ) -> Self {
        Self {
            key: key.into(),
            target,
            source,
            reconciler,
        }
    }

    /// Open the Delta table and capture archive of a configured job.
    pub async fn from_config(key: &str, job: &JobConfig) -> Result<Self, PipelineError> {
        let target = DeltaTarget::open(key, &job.target.table_uri, job.target.storage_options.clone())
            .await
            .context(OpenTargetSnafu { job: key })?;

        let storage =
            StorageProvider::for_url_with_options(&job.source.url, job.source.storage_options.clone())
                .await
                .map_err(|source| SourceError::SourceStorage { source })
                .context(OpenSourceSnafu { job: key })?;
        let source = ObjectStoreCapture::new(
            key,
            storage,
            job.source.partitioning,
            job.source.to_arrow_schema(),
            job.source.batch_size,
            job.source.compression,
        );

        Ok(Self::new(
            key,
            Box::new(target),
            Box::new(source),
            job.reconciler(),
        ))
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn target(&self) -> &dyn TargetTable {
        self.target.as_ref()
    }

    /// Run one resume cycle and append its output.
    pub async fn run_once(&mut self) -> Result<RunSummary, PipelineError> {
        let start = Instant::now();
        let outcome = resume(self.target.as_mut(), self.source.as_ref())
            .await
            .context(ResumeSnafu { job: &self.key })?;
        let records_read = outcome.batch.num_rows();

        let schema = self.target.schema();
        let reconciled = self
            .reconciler
            .reconcile(self.target.table_name(), &outcome.batch, &schema)
            .context(ReconcileSnafu { job: &self.key })?;

        let records_appended = if reconciled.num_rows() > 0 {
            self.target
                .append(reconciled)
                .await
                .context(AppendSnafu { job: &self.key })?
        } else {
            warn!(target = %self.key, "Capture archive has no records at or after the watermark");
            0
        };
        emit!(RecordsAppended {
            count: records_appended as u64,
            target: self.key.clone(),
        });

        info!(
            target = %self.key,
            watermark = outcome.watermark.kind(),
            boundary = ?outcome.watermark.boundary(),
            truncated = outcome.truncated,
            records_read,
            records_appended,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Job run complete"
        );
        Ok(RunSummary {
            watermark: outcome.watermark,
            truncated: outcome.truncated,
            records_read,
            records_appended,
        })
    }
}

/// Run each selected job once, in configuration order.
///
/// An empty selection runs every job. Stops at the first failing job.
pub async fn run_jobs(
    config: &Config,
    selected: &[String],
) -> Result<Vec<(String, RunSummary)>, PipelineError> {
    let jobs = config.select(selected).context(ConfigSnafu)?;
    info!("Running {} job(s)", jobs.len());

    let mut summaries = Vec::with_capacity(jobs.len());
    for (key, job) in jobs {
        let mut pipeline = Pipeline::from_config(key, job).await?;
        let summary = pipeline.run_once().await?;
        summaries.push((key.clone(), summary));
    }
    Ok(summaries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ReconcileError, ResumeError};
    use crate::sink::MemoryTable;
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use deltalake::arrow::array::{Int32Array, RecordBatch, StringArray};
    use deltalake::arrow::datatypes::{DataType, Field, Schema, SchemaRef};
    use std::sync::Arc;

    struct FixedCapture(RecordBatch);

    #[async_trait]
    impl CaptureSource for FixedCapture {
        fn partition_columns(&self) -> Vec<String> {
            ymd()
        }

        fn schema(&self) -> SchemaRef {
            self.0.schema()
        }

        async fn read(&self, _: Option<DateTime<Utc>>) -> Result<RecordBatch, SourceError> {
            Ok(self.0.clone())
        }
    }

    fn ymd() -> Vec<String> {
        vec!["y".into(), "m".into(), "d".into()]
    }

    fn partition_fields() -> Vec<Field> {
        ymd()
            .into_iter()
            .map(|c| Field::new(c, DataType::Int32, false))
            .collect()
    }

    fn capture(bodies: &[&str]) -> FixedCapture {
        let mut fields = vec![Field::new("Body", DataType::Utf8, true)];
        fields.extend(partition_fields());
        FixedCapture(
            RecordBatch::try_new(
                Arc::new(Schema::new(fields)),
                vec![
                    Arc::new(StringArray::from(bodies.to_vec())),
                    Arc::new(Int32Array::from(vec![2024; bodies.len()])),
                    Arc::new(Int32Array::from(vec![1; bodies.len()])),
                    Arc::new(Int32Array::from(vec![2; bodies.len()])),
                ],
            )
            .unwrap(),
        )
    }

    /// A target partitioned by `y`/`m`/`d` with `fields` as data columns.
    fn target(mut fields: Vec<Field>) -> MemoryTable {
        fields.extend(partition_fields());
        MemoryTable::new("events", Arc::new(Schema::new(fields)), ymd()).unwrap()
    }

    #[tokio::test]
    async fn test_run_once_decodes_and_appends() {
        let table = target(vec![Field::new("kind", DataType::Utf8, true)]);
        let mut pipeline = Pipeline::new(
            "events",
            Box::new(table),
            Box::new(capture(&[r#"{"kind": "click"}"#, r#"{"kind": "view"}"#])),
            SchemaReconciler::new("Body"),
        );

        let summary = pipeline.run_once().await.unwrap();

        assert_eq!(summary.watermark, Watermark::Empty);
        assert_eq!(summary.records_read, 2);
        assert_eq!(summary.records_appended, 2);

        let again = pipeline.run_once().await.unwrap();
        assert_eq!(again.truncated, 2);
        assert_eq!(again.records_appended, 2);
    }

    #[test]
    fn test_run_records_cycle_metrics() {
        let recorder = thaw_core::metrics::exporter::builder(&Default::default())
            .unwrap()
            .build_recorder();
        let handle = recorder.handle();
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        metrics::with_local_recorder(&recorder, || {
            runtime.block_on(async {
                let table = target(vec![Field::new("kind", DataType::Utf8, true)]);
                let mut pipeline = Pipeline::new(
                    "events",
                    Box::new(table),
                    Box::new(capture(&[r#"{"kind": "click"}"#])),
                    SchemaReconciler::new("Body"),
                );
                pipeline.run_once().await.unwrap();
                pipeline.run_once().await.unwrap();
            })
        });

        let rendered = handle.render();
        for name in [
            "thaw_watermarks_resolved_total",
            "thaw_partitions_truncated_total",
            "thaw_records_appended_total",
            "thaw_resume_duration_seconds",
        ] {
            assert!(rendered.contains(name), "{name} missing from:\n{rendered}");
        }
        assert!(rendered.contains("kind=\"resume\""), "{rendered}");
        assert!(rendered.contains("target=\"events\""), "{rendered}");
    }

    #[tokio::test]
    async fn test_empty_capture_appends_nothing() {
        let table = target(Vec::new());
        let mut pipeline = Pipeline::new(
            "events",
            Box::new(table),
            Box::new(capture(&[])),
            SchemaReconciler::new("Body"),
        );

        let summary = pipeline.run_once().await.unwrap();

        assert_eq!(summary.records_read, 0);
        assert_eq!(summary.records_appended, 0);
    }

    #[tokio::test]
    async fn test_type_drift_surfaces_job_and_column() {
        let table = target(vec![Field::new("Body", DataType::Binary, true)]);
        let mut pipeline = Pipeline::new(
            "events",
            Box::new(table),
            Box::new(capture(&["{}"])),
            SchemaReconciler::new("Body"),
        );

        let err = pipeline.run_once().await.unwrap_err();

        assert!(matches!(
            err,
            PipelineError::Reconcile {
                source: ReconcileError::TypeMismatch { .. },
                ..
            }
        ));
        let message = err.to_string();
        assert!(message.contains("events"), "{message}");
        assert!(message.contains("Body"), "{message}");
    }

    #[tokio::test]
    async fn test_incompatible_layout_fails_resume() {
        let mut fields = partition_fields();
        fields.push(Field::new("h", DataType::Int32, false));
        let mut hourly = ymd();
        hourly.push("h".into());
        let table = MemoryTable::new("events", Arc::new(Schema::new(fields)), hourly).unwrap();
        let mut pipeline = Pipeline::new(
            "events",
            Box::new(table),
            Box::new(capture(&["{}"])),
            SchemaReconciler::new("Body"),
        );

        let err = pipeline.run_once().await.unwrap_err();

        assert!(matches!(
            err,
            PipelineError::Resume {
                source: ResumeError::Partitioning { .. },
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_run_jobs_rejects_unknown_job() {
        let config = Config::default();

        let err = run_jobs(&config, &["missing".to_string()]).await.unwrap_err();

        assert!(matches!(err, PipelineError::Config { .. }));
    }
}
