//! Object storage access for capture archives.
//!
//! Wraps an [`ObjectStore`] for one of S3, GCS, Azure Blob Storage or the
//! local filesystem behind a single provider scoped to a key prefix.

mod backend;

pub use backend::{AzureConfig, BackendConfig, GcsConfig, LocalConfig, S3Config};

use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use futures::{Stream, StreamExt, future::ready};
use object_store::aws::AmazonS3Builder;
use object_store::azure::MicrosoftAzureBuilder;
use object_store::gcp::GoogleCloudStorageBuilder;
use object_store::local::LocalFileSystem;
use object_store::path::Path;
use object_store::{ObjectMeta, ObjectStore, PutPayload, RetryConfig};
use snafu::prelude::*;
use tracing::debug;

use crate::emit;
use crate::error::{
    AzureConfigSnafu, GcsConfigSnafu, IoSnafu, ObjectStoreSnafu, S3ConfigSnafu, StorageError,
};
use crate::metrics::events::{
    RequestStatus, StorageOperation, StorageRequest, StorageRequestDuration,
};

/// A storage location rooted at the key prefix of a URL.
#[derive(Clone)]
pub struct StorageProvider {
    config: BackendConfig,
    object_store: Arc<dyn ObjectStore>,
    canonical_url: String,
    storage_options: HashMap<String, String>,
}

impl std::fmt::Debug for StorageProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "StorageProvider<{}>", self.canonical_url)
    }
}

impl StorageProvider {
    /// Build a provider for `url`.
    ///
    /// `options` are backend configuration keys (for example `aws_region`
    /// or `google_service_account`) applied on top of the environment.
    pub async fn for_url_with_options(
        url: &str,
        options: HashMap<String, String>,
    ) -> Result<Self, StorageError> {
        let config = BackendConfig::parse_url(url)?;
        let object_store = build_store(&config, &options).await?;
        let canonical_url = canonical_url(&config);
        debug!(url = %canonical_url, "Opened storage location");

        Ok(Self {
            config,
            object_store,
            canonical_url,
            storage_options: options,
        })
    }

    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    pub fn canonical_url(&self) -> &str {
        &self.canonical_url
    }

    pub fn storage_options(&self) -> &HashMap<String, String> {
        &self.storage_options
    }

    /// List objects below the prefix.
    ///
    /// Locations in the returned metadata are relative to the prefix. Without
    /// `include_subdirectories` only direct children are returned.
    pub fn list(
        &self,
        include_subdirectories: bool,
    ) -> impl Stream<Item = Result<ObjectMeta, StorageError>> + '_ {
        emit!(StorageRequest {
            operation: StorageOperation::List,
            status: RequestStatus::Success,
        });

        let prefix_len = self.config.key().map(|k| k.parts().count()).unwrap_or(0);
        self.object_store
            .list(self.config.key())
            .filter_map(move |entry| {
                let item = match entry {
                    Ok(mut meta) => {
                        let depth = meta.location.parts().count() - prefix_len;
                        if !include_subdirectories && depth != 1 {
                            None
                        } else {
                            meta.location = meta.location.parts().skip(prefix_len).collect();
                            Some(Ok(meta))
                        }
                    }
                    Err(source) => Some(Err(StorageError::ObjectStore { source })),
                };
                ready(item)
            })
    }

    /// Read a whole object.
    pub async fn get(&self, path: &Path) -> Result<Bytes, StorageError> {
        let start = Instant::now();
        let result = match self.object_store.get(&self.qualify_path(path)).await {
            Ok(response) => response.bytes().await,
            Err(e) => Err(e),
        };
        record(StorageOperation::Get, result.is_ok(), start);
        result.context(ObjectStoreSnafu)
    }

    pub async fn put_payload(&self, path: &Path, payload: PutPayload) -> Result<(), StorageError> {
        let start = Instant::now();
        let result = self
            .object_store
            .put(&self.qualify_path(path), payload)
            .await;
        record(StorageOperation::Put, result.is_ok(), start);
        result.context(ObjectStoreSnafu)?;
        Ok(())
    }

    pub async fn delete(&self, path: &Path) -> Result<(), StorageError> {
        let start = Instant::now();
        let result = self.object_store.delete(&self.qualify_path(path)).await;
        record(StorageOperation::Delete, result.is_ok(), start);
        result.context(ObjectStoreSnafu)
    }

    /// Prepend the configured key prefix to a relative path.
    pub fn qualify_path<'a>(&self, path: &'a Path) -> Cow<'a, Path> {
        match self.config.key() {
            Some(prefix) => Cow::Owned(prefix.parts().chain(path.parts()).collect()),
            None => Cow::Borrowed(path),
        }
    }
}

fn record(operation: StorageOperation, ok: bool, start: Instant) {
    let status = if ok {
        RequestStatus::Success
    } else {
        RequestStatus::Error
    };
    emit!(StorageRequest { operation, status });
    emit!(StorageRequestDuration {
        operation,
        duration: start.elapsed(),
    });
}

async fn build_store(
    config: &BackendConfig,
    options: &HashMap<String, String>,
) -> Result<Arc<dyn ObjectStore>, StorageError> {
    let store: Arc<dyn ObjectStore> = match config {
        BackendConfig::S3(s3) => {
            let mut builder = AmazonS3Builder::from_env()
                .with_bucket_name(&s3.bucket)
                .with_retry(RetryConfig::default());
            if let Some(region) = &s3.region {
                builder = builder.with_region(region);
            }
            for (key, value) in options {
                builder = builder.with_config(key.parse().context(S3ConfigSnafu)?, value);
            }
            Arc::new(builder.build().context(S3ConfigSnafu)?)
        }
        BackendConfig::Gcs(gcs) => {
            let mut builder = GoogleCloudStorageBuilder::from_env()
                .with_bucket_name(&gcs.bucket)
                .with_retry(RetryConfig::default());
            if let Ok(key) = std::env::var("GOOGLE_SERVICE_ACCOUNT_KEY") {
                debug!("Using service account key from environment");
                builder = builder.with_service_account_key(key);
            }
            for (key, value) in options {
                builder = builder.with_config(key.parse().context(GcsConfigSnafu)?, value);
            }
            Arc::new(builder.build().context(GcsConfigSnafu)?)
        }
        BackendConfig::Azure(azure) => {
            let mut builder = MicrosoftAzureBuilder::from_env()
                .with_container_name(&azure.container)
                .with_retry(RetryConfig::default());
            if let Some(account) = &azure.account {
                builder = builder.with_account(account);
            }
            for (key, value) in options {
                builder = builder.with_config(key.parse().context(AzureConfigSnafu)?, value);
            }
            Arc::new(builder.build().context(AzureConfigSnafu)?)
        }
        BackendConfig::Local(local) => {
            tokio::fs::create_dir_all(&local.path)
                .await
                .context(IoSnafu)?;
            Arc::new(LocalFileSystem::new_with_prefix(&local.path).context(ObjectStoreSnafu)?)
        }
    };
    Ok(store)
}

fn canonical_url(config: &BackendConfig) -> String {
    let (base, key) = match config {
        BackendConfig::S3(s3) => (format!("s3://{}", s3.bucket), s3.key.as_ref()),
        BackendConfig::Gcs(gcs) => (format!("gs://{}", gcs.bucket), gcs.key.as_ref()),
        BackendConfig::Azure(azure) => (format!("az://{}", azure.container), azure.key.as_ref()),
        BackendConfig::Local(local) => return format!("file://{}", local.path),
    };
    match key {
        Some(key) => format!("{base}/{key}"),
        None => base,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;
    use tempfile::TempDir;

    async fn local_provider(dir: &TempDir) -> StorageProvider {
        StorageProvider::for_url_with_options(dir.path().to_str().unwrap(), HashMap::new())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_put_get_delete() {
        let dir = TempDir::new().unwrap();
        let storage = local_provider(&dir).await;
        let path = Path::from("y=2024/m=1/d=2/00.json");

        storage
            .put_payload(&path, PutPayload::from_static(b"{}\n"))
            .await
            .unwrap();
        assert_eq!(storage.get(&path).await.unwrap(), Bytes::from_static(b"{}\n"));

        storage.delete(&path).await.unwrap();
        let err = storage.get(&path).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_list_depth() {
        let dir = TempDir::new().unwrap();
        let storage = local_provider(&dir).await;
        for name in ["top.json", "y=2024/a.json", "y=2024/m=1/b.json"] {
            storage
                .put_payload(&Path::from(name), PutPayload::from_static(b"{}"))
                .await
                .unwrap();
        }

        let mut shallow: Vec<String> = storage
            .list(false)
            .map_ok(|meta| meta.location.to_string())
            .try_collect()
            .await
            .unwrap();
        shallow.sort();
        assert_eq!(shallow, vec!["top.json"]);

        let mut deep: Vec<String> = storage
            .list(true)
            .map_ok(|meta| meta.location.to_string())
            .try_collect()
            .await
            .unwrap();
        deep.sort();
        assert_eq!(deep, vec!["top.json", "y=2024/a.json", "y=2024/m=1/b.json"]);
    }

    #[test]
    fn test_canonical_url() {
        let config = BackendConfig::parse_url("gs://lake/capture/").unwrap();
        assert_eq!(canonical_url(&config), "gs://lake/capture");
    }
}
