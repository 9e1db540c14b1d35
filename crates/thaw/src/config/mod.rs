//! Job configuration.

use std::collections::HashMap;
use std::sync::Arc;

use deltalake::arrow::datatypes::{DataType, Field, Schema, SchemaRef, TimeUnit};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

pub use thaw_core::{
    ConfigPath, Mergeable, MetricsConfig, Resource, interpolate, load_from_paths,
};
use thaw_core::ConfigError;

use crate::partition::{PartitionScheme, RESERVED_COLUMNS};
use crate::reconcile::SchemaReconciler;
pub use crate::source::CompressionFormat;

fn default_batch_size() -> usize {
    8192
}

fn default_payload_column() -> String {
    "Body".to_string()
}

fn default_raw_payload_column() -> String {
    "BodyJson".to_string()
}

fn default_nullable() -> bool {
    true
}

/// Supported capture field types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Int32,
    Int64,
    Float64,
    Boolean,
    Timestamp,
    /// Nested document kept as JSON text.
    Json,
    Binary,
}

impl FieldType {
    pub fn to_arrow_type(self) -> DataType {
        match self {
            FieldType::String | FieldType::Json => DataType::Utf8,
            FieldType::Int32 => DataType::Int32,
            FieldType::Int64 => DataType::Int64,
            FieldType::Float64 => DataType::Float64,
            FieldType::Boolean => DataType::Boolean,
            FieldType::Timestamp => DataType::Timestamp(TimeUnit::Microsecond, Some("UTC".into())),
            FieldType::Binary => DataType::Binary,
        }
    }
}

/// One field of a captured record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default = "default_nullable")]
    pub nullable: bool,
}

impl FieldConfig {
    fn new(name: &str, field_type: FieldType) -> Self {
        Self {
            name: name.to_string(),
            field_type,
            nullable: true,
        }
    }
}

/// Fields written by Event Hubs capture in JSON format.
fn default_fields() -> Vec<FieldConfig> {
    vec![
        FieldConfig::new("SequenceNumber", FieldType::Int64),
        FieldConfig::new("Offset", FieldType::String),
        FieldConfig::new("EnqueuedTimeUtc", FieldType::String),
        FieldConfig::new("SystemProperties", FieldType::Json),
        FieldConfig::new("Properties", FieldType::Json),
        FieldConfig::new("Body", FieldType::String),
    ]
}

/// The capture archive a job reads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Root of the archive (supports S3, GCS, Azure, local).
    pub url: String,
    pub partitioning: PartitionScheme,
    #[serde(default)]
    pub compression: CompressionFormat,
    /// Records per decoded batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default)]
    pub storage_options: HashMap<String, String>,
    /// Schema of one captured record, without partition columns.
    #[serde(default = "default_fields")]
    pub fields: Vec<FieldConfig>,
}

impl SourceConfig {
    pub fn to_arrow_schema(&self) -> SchemaRef {
        let fields: Vec<Field> = self
            .fields
            .iter()
            .map(|f| Field::new(&f.name, f.field_type.to_arrow_type(), f.nullable))
            .collect();
        Arc::new(Schema::new(fields))
    }
}

/// The Delta table a job writes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    pub table_uri: String,
    #[serde(default)]
    pub storage_options: HashMap<String, String>,
}

/// One capture archive feeding one target table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    pub source: SourceConfig,
    pub target: TargetConfig,
    /// Capture field holding the structured document.
    #[serde(default = "default_payload_column")]
    pub payload_column: String,
    /// Also write the undecoded payload as text.
    #[serde(default)]
    pub keep_raw_payload: bool,
    #[serde(default = "default_raw_payload_column")]
    pub raw_payload_column: String,
}

impl JobConfig {
    /// Each job claims its target table.
    pub fn resources(&self) -> Vec<Resource> {
        vec![Resource::location(&self.target.table_uri)]
    }

    pub fn reconciler(&self) -> SchemaReconciler {
        let reconciler = SchemaReconciler::new(&self.payload_column);
        if self.keep_raw_payload {
            reconciler.with_raw_payload(&self.raw_payload_column)
        } else {
            reconciler
        }
    }
}

/// Top-level configuration.
///
/// # Example
///
/// ```yaml
/// jobs:
///   telemetry:
///     source:
///       url: abfss://capture@account.dfs.core.windows.net/ns/telemetry
///       partitioning: ymdh
///     target:
///       table_uri: abfss://lake@account.dfs.core.windows.net/bronze/telemetry
///     keep_raw_payload: true
/// metrics:
///   push_gateway:
///     endpoint: http://pushgateway:9091/metrics/job/thaw
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub jobs: IndexMap<String, JobConfig>,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl Mergeable for Config {
    type Key = String;
    type Component = JobConfig;

    fn components_mut(&mut self) -> &mut IndexMap<Self::Key, Self::Component> {
        &mut self.jobs
    }

    fn metrics_mut(&mut self) -> &mut MetricsConfig {
        &mut self.metrics
    }

    fn parse_yaml(contents: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(contents).map_err(|source| ConfigError::YamlParse { source })
    }
}

impl Config {
    /// Load, merge and validate configuration from files and directories.
    pub fn from_paths(paths: &[ConfigPath]) -> Result<Self, ConfigError> {
        let config: Self = load_from_paths(paths)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a YAML string.
    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        let result = interpolate(contents);
        if !result.is_ok() {
            return Err(ConfigError::EnvInterpolation {
                message: result.errors.join("\n"),
            });
        }

        let config = Self::parse_yaml(&result.text)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// Checks:
    /// - Every job has a source url and a table_uri
    /// - No capture field shadows a partition column
    /// - No two jobs write the same table
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (key, job) in &self.jobs {
            if job.source.url.is_empty() {
                return Err(ConfigError::EmptySourceUrlForJob { job: key.clone() });
            }
            if job.target.table_uri.is_empty() {
                return Err(ConfigError::EmptyTableUriForJob { job: key.clone() });
            }
            if let Some(field) = job
                .source
                .fields
                .iter()
                .find(|f| RESERVED_COLUMNS.contains(&f.name.as_str()))
            {
                return Err(ConfigError::ReservedField {
                    job: key.clone(),
                    field: field.name.clone(),
                });
            }
        }

        let conflicts = Resource::conflicts(
            self.jobs
                .iter()
                .map(|(key, job)| (key.clone(), job.resources())),
        );
        if !conflicts.is_empty() {
            let mut message: Vec<String> = conflicts
                .iter()
                .map(|(resource, keys)| {
                    let mut keys: Vec<_> = keys.iter().cloned().collect();
                    keys.sort();
                    format!("{resource} claimed by: {}", keys.join(", "))
                })
                .collect();
            message.sort();
            return Err(ConfigError::ResourceConflict {
                message: message.join("; "),
            });
        }

        Ok(())
    }

    /// Jobs named in `selected`, or every job when `selected` is empty.
    pub fn select(&self, selected: &[String]) -> Result<Vec<(&String, &JobConfig)>, ConfigError> {
        if selected.is_empty() {
            return Ok(self.jobs.iter().collect());
        }

        let unknown: Vec<String> = selected
            .iter()
            .filter(|key| !self.jobs.contains_key(*key))
            .cloned()
            .collect();
        if !unknown.is_empty() {
            return Err(ConfigError::UnknownJobs { jobs: unknown });
        }
        Ok(self
            .jobs
            .iter()
            .filter(|(key, _)| selected.contains(key))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    const MINIMAL: &str = r#"
jobs:
  telemetry:
    source:
      url: s3://capture/telemetry
      partitioning: ymd
    target:
      table_uri: s3://lake/telemetry
"#;

    #[test]
    fn test_minimal_job_defaults() {
        let config = Config::parse(MINIMAL).unwrap();
        let job = &config.jobs["telemetry"];

        assert_eq!(job.source.partitioning, PartitionScheme::Ymd);
        assert_eq!(job.source.compression, CompressionFormat::Gzip);
        assert_eq!(job.source.batch_size, 8192);
        assert_eq!(job.payload_column, "Body");
        assert!(!job.keep_raw_payload);
        assert_eq!(job.raw_payload_column, "BodyJson");

        let schema = job.source.to_arrow_schema();
        let names: Vec<_> = schema.fields().iter().map(|f| f.name().as_str()).collect();
        assert_eq!(
            names,
            [
                "SequenceNumber",
                "Offset",
                "EnqueuedTimeUtc",
                "SystemProperties",
                "Properties",
                "Body"
            ]
        );
        assert_eq!(schema.field(0).data_type(), &DataType::Int64);
        assert_eq!(schema.field(3).data_type(), &DataType::Utf8);
    }

    #[test]
    fn test_metrics_block() {
        assert!(!Config::parse(MINIMAL).unwrap().metrics.is_exporting());

        let yaml = format!(
            "{MINIMAL}metrics:\n  push_gateway:\n    endpoint: http://gw:9091/metrics/job/thaw\n    interval_secs: 2\n"
        );
        let config = Config::parse(&yaml).unwrap();
        let push = config.metrics.push_gateway.unwrap();
        assert_eq!(push.endpoint, "http://gw:9091/metrics/job/thaw");
        assert_eq!(push.interval_secs, 2);
        assert!(config.metrics.address.is_none());
    }

    #[test]
    fn test_custom_fields_and_options() {
        let yaml = r#"
jobs:
  orders:
    source:
      url: gs://capture/orders
      partitioning: pdate
      compression: none
      batch_size: 100
      storage_options:
        google_service_account: /secrets/sa.json
      fields:
        - { name: payload, type: binary }
        - { name: ts, type: timestamp, nullable: false }
    target:
      table_uri: gs://lake/orders
    payload_column: payload
    keep_raw_payload: true
    raw_payload_column: raw
"#;
        let config = Config::parse(yaml).unwrap();
        let job = &config.jobs["orders"];

        assert_eq!(job.source.compression, CompressionFormat::None);
        assert_eq!(job.source.batch_size, 100);
        assert_eq!(
            job.source.storage_options["google_service_account"],
            "/secrets/sa.json"
        );
        let schema = job.source.to_arrow_schema();
        assert_eq!(schema.field(0).data_type(), &DataType::Binary);
        assert!(!schema.field(1).is_nullable());
        assert_eq!(job.reconciler().payload_column(), "payload");
    }

    #[test]
    fn test_empty_source_url_rejected() {
        let yaml = MINIMAL.replace("s3://capture/telemetry", "\"\"");
        let err = Config::parse(&yaml).unwrap_err();
        assert!(matches!(err, ConfigError::EmptySourceUrlForJob { ref job } if job == "telemetry"));
    }

    #[test]
    fn test_empty_table_uri_rejected() {
        let yaml = MINIMAL.replace("s3://lake/telemetry", "\"\"");
        let err = Config::parse(&yaml).unwrap_err();
        assert!(err.to_string().contains("empty table_uri"));
    }

    #[test]
    fn test_reserved_field_rejected() {
        let yaml = r#"
jobs:
  telemetry:
    source:
      url: s3://capture/telemetry
      partitioning: ymd
      fields:
        - { name: y, type: int32 }
    target:
      table_uri: s3://lake/telemetry
"#;
        let err = Config::parse(yaml).unwrap_err();
        assert!(matches!(err, ConfigError::ReservedField { ref field, .. } if field == "y"));
    }

    #[test]
    fn test_unknown_partitioning_rejected() {
        let yaml = MINIMAL.replace("partitioning: ymd", "partitioning: weekly");
        assert!(matches!(
            Config::parse(&yaml),
            Err(ConfigError::YamlParse { .. })
        ));
    }

    #[test]
    fn test_shared_target_conflicts() {
        let yaml = r#"
jobs:
  a:
    source: { url: "s3://capture/a", partitioning: ymd }
    target: { table_uri: "s3://lake/events" }
  b:
    source: { url: "s3://capture/b", partitioning: ymd }
    target: { table_uri: "s3://lake/events/" }
"#;
        let err = Config::parse(yaml).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Resource conflict: location:s3://lake/events claimed by: a, b"
        );
    }

    #[test]
    fn test_select_jobs() {
        let yaml = r#"
jobs:
  a:
    source: { url: "s3://capture/a", partitioning: ymd }
    target: { table_uri: "s3://lake/a" }
  b:
    source: { url: "s3://capture/b", partitioning: pdate }
    target: { table_uri: "s3://lake/b" }
"#;
        let config = Config::parse(yaml).unwrap();

        assert_eq!(config.select(&[]).unwrap().len(), 2);
        let only_b = config.select(&["b".to_string()]).unwrap();
        assert_eq!(only_b.len(), 1);
        assert_eq!(only_b[0].0, "b");
        let err = config.select(&["c".to_string()]).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownJobs { ref jobs } if jobs == &["c".to_string()]));
    }

    #[test]
    fn test_from_paths_merges_directory() {
        let dir = TempDir::new().unwrap();
        for (name, key) in [("01-a.yaml", "a"), ("02-b.yml", "b")] {
            let mut file = std::fs::File::create(dir.path().join(name)).unwrap();
            write!(
                file,
                "jobs:\n  {key}:\n    source: {{ url: \"s3://capture/{key}\", partitioning: ymd }}\n    target: {{ table_uri: \"s3://lake/{key}\" }}\n"
            )
            .unwrap();
        }

        let config = Config::from_paths(&[ConfigPath::Dir(dir.path().to_path_buf())]).unwrap();

        let keys: Vec<_> = config.jobs.keys().cloned().collect();
        assert_eq!(keys, ["a", "b"]);
    }

    #[test]
    fn test_from_paths_duplicate_job_rejected() {
        let dir = TempDir::new().unwrap();
        let body = r#"
jobs:
  a:
    source: { url: "s3://capture/a", partitioning: ymd }
    target: { table_uri: "s3://lake/a" }
"#;
        let first = dir.path().join("first.yaml");
        let second = dir.path().join("second.yaml");
        std::fs::write(&first, body).unwrap();
        std::fs::write(&second, body).unwrap();

        let err = Config::from_paths(&[ConfigPath::File(first), ConfigPath::File(second)])
            .unwrap_err();

        assert!(err.to_string().contains("Duplicate"));
    }
}
