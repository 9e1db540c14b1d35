//! Opening and creating Delta Lake tables.

use deltalake::DeltaTable;
use deltalake::arrow::datatypes::Schema;
use deltalake::kernel::StructField;
use deltalake::operations::create::CreateBuilder;
use object_store::path::Path;
use snafu::prelude::*;
use thaw_core::storage::{BackendConfig, StorageProvider};
use tracing::info;
use url::Url;

use crate::error::{DeltaSnafu, SchemaConversionSnafu, TableError};

/// Register the cloud object store handlers used by `deltalake`.
///
/// Safe to call more than once.
pub fn ensure_handlers_registered() {
    deltalake::aws::register_handlers(None);
    deltalake::gcp::register_handlers(None);
    deltalake::azure::register_handlers(None);
}

/// Delta column definitions for an Arrow schema.
pub fn delta_columns(schema: &Schema) -> Result<Vec<StructField>, TableError> {
    use deltalake::kernel::DataType as DeltaType;
    use deltalake::kernel::engine::arrow_conversion::TryIntoKernel;

    schema
        .fields()
        .iter()
        .map(|field| {
            let data_type: DeltaType = field
                .data_type()
                .try_into_kernel()
                .context(SchemaConversionSnafu)?;
            Ok(StructField::new(field.name(), data_type, field.is_nullable()))
        })
        .collect()
}

/// The URL `deltalake` expects for the table rooted at `storage`.
pub fn table_url(storage: &StorageProvider) -> Result<Url, TableError> {
    let root = Path::default();
    let url = match storage.config() {
        BackendConfig::S3(s3) => format!("s3://{}/{}", s3.bucket, storage.qualify_path(&root)),
        BackendConfig::Gcs(gcs) => format!("gs://{}/{}", gcs.bucket, storage.qualify_path(&root)),
        BackendConfig::Azure(azure) => {
            format!("abfs://{}/{}", azure.container, storage.qualify_path(&root))
        }
        BackendConfig::Local(local) => format!("file://{}", local.path),
    };
    Url::parse(&url).map_err(|_| TableError::TableUrl { url })
}

pub async fn open_table(storage: &StorageProvider, name: &str) -> Result<DeltaTable, TableError> {
    let url = table_url(storage)?;
    let table = deltalake::open_table_with_storage_options(url, storage.storage_options().clone())
        .await
        .context(DeltaSnafu)?;

    info!(
        target = %name,
        "Opened Delta table at version {}",
        table.version().unwrap_or(-1)
    );
    Ok(table)
}

pub async fn create_table(
    storage: &StorageProvider,
    schema: &Schema,
    partition_columns: &[String],
    name: &str,
) -> Result<DeltaTable, TableError> {
    let url = table_url(storage)?;
    info!(target = %name, partition_columns = ?partition_columns, "Creating Delta table at {url}");

    let mut builder = CreateBuilder::new()
        .with_location(url.as_str())
        .with_columns(delta_columns(schema)?)
        .with_storage_options(storage.storage_options().clone());
    if !partition_columns.is_empty() {
        builder = builder.with_partition_columns(partition_columns.to_vec());
    }

    builder.await.context(DeltaSnafu)
}

#[cfg(test)]
mod tests {
    use super::*;
    use deltalake::arrow::datatypes::{DataType, Field, TimeUnit};
    use std::collections::HashMap;

    #[test]
    fn test_delta_columns() {
        let schema = Schema::new(vec![
            Field::new("id", DataType::Int64, false),
            Field::new(
                "pdate",
                DataType::Timestamp(TimeUnit::Microsecond, Some("UTC".into())),
                true,
            ),
        ]);
        let columns = delta_columns(&schema).unwrap();
        assert_eq!(columns.len(), 2);
        assert_eq!(columns[0].name(), "id");
        assert!(!columns[0].is_nullable());
    }

    #[tokio::test]
    async fn test_local_table_url() {
        let dir = tempfile::TempDir::new().unwrap();
        let storage =
            StorageProvider::for_url_with_options(dir.path().to_str().unwrap(), HashMap::new())
                .await
                .unwrap();
        let url = table_url(&storage).unwrap();
        assert_eq!(url.scheme(), "file");
        assert!(url.path().ends_with(dir.path().file_name().unwrap().to_str().unwrap()));
    }
}
