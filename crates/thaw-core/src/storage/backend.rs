//! Backend selection from storage URLs.
//!
//! Accepted forms:
//! - `s3://bucket/key`, `s3a://bucket/key`
//! - `https://s3.<region>.amazonaws.com/bucket/key`, `https://bucket.s3.<region>.amazonaws.com/key`
//! - `gs://bucket/key`, `https://storage.googleapis.com/bucket/key`, `https://bucket.storage.googleapis.com/key`
//! - `az://container/key`, `abfss://container@account.dfs.core.windows.net/key`,
//!   `https://account.blob.core.windows.net/container/key`
//! - `file:///abs/path`, `/abs/path`, `relative/path`

use object_store::path::Path;
use url::Url;

use crate::error::{InvalidUrlSnafu, StorageError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S3Config {
    pub bucket: String,
    pub region: Option<String>,
    pub key: Option<Path>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GcsConfig {
    pub bucket: String,
    pub key: Option<Path>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AzureConfig {
    /// Taken from the environment when the URL does not name it.
    pub account: Option<String>,
    pub container: String,
    pub key: Option<Path>,
}

/// Local directory acting as the store root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalConfig {
    pub path: String,
}

/// Storage backend and location parsed from a URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendConfig {
    S3(S3Config),
    Gcs(GcsConfig),
    Azure(AzureConfig),
    Local(LocalConfig),
}

impl BackendConfig {
    pub fn parse_url(raw: &str) -> Result<Self, StorageError> {
        let invalid = || {
            InvalidUrlSnafu {
                url: raw.to_string(),
            }
            .build()
        };

        let url = match Url::parse(raw) {
            Ok(url) => url,
            Err(url::ParseError::RelativeUrlWithoutBase) => return Self::local(raw),
            Err(_) => return Err(invalid()),
        };
        let host = url.host_str().unwrap_or_default();

        let config = match url.scheme() {
            "s3" | "s3a" if !host.is_empty() => BackendConfig::S3(S3Config {
                bucket: host.to_string(),
                region: None,
                key: key_from(url.path()),
            }),
            "gs" if !host.is_empty() => BackendConfig::Gcs(GcsConfig {
                bucket: host.to_string(),
                key: key_from(url.path()),
            }),
            "az" | "azure" if !host.is_empty() => BackendConfig::Azure(AzureConfig {
                account: None,
                container: host.to_string(),
                key: key_from(url.path()),
            }),
            "abfs" | "abfss" => {
                let account = host
                    .strip_suffix(".dfs.core.windows.net")
                    .ok_or_else(invalid)?;
                if url.username().is_empty() {
                    return Err(invalid());
                }
                BackendConfig::Azure(AzureConfig {
                    account: Some(account.to_string()),
                    container: url.username().to_string(),
                    key: key_from(url.path()),
                })
            }
            "https" => Self::parse_https(host, url.path()).ok_or_else(invalid)?,
            "file" => {
                let path = url.to_file_path().map_err(|_| invalid())?;
                BackendConfig::Local(LocalConfig {
                    path: path.to_string_lossy().into_owned(),
                })
            }
            _ => return Err(invalid()),
        };
        Ok(config)
    }

    fn parse_https(host: &str, path: &str) -> Option<Self> {
        if let Some(rest) = host.strip_suffix(".amazonaws.com") {
            if let Some(region) = rest.strip_prefix("s3.") {
                let (bucket, key) = split_first_segment(path)?;
                return Some(BackendConfig::S3(S3Config {
                    bucket,
                    region: Some(region.to_string()),
                    key,
                }));
            }
            let (bucket, region) = rest.split_once(".s3.")?;
            return Some(BackendConfig::S3(S3Config {
                bucket: bucket.to_string(),
                region: Some(region.to_string()),
                key: key_from(path),
            }));
        }

        if host == "storage.googleapis.com" {
            let (bucket, key) = split_first_segment(path)?;
            return Some(BackendConfig::Gcs(GcsConfig { bucket, key }));
        }
        if let Some(bucket) = host.strip_suffix(".storage.googleapis.com") {
            return Some(BackendConfig::Gcs(GcsConfig {
                bucket: bucket.to_string(),
                key: key_from(path),
            }));
        }

        let account = host
            .strip_suffix(".blob.core.windows.net")
            .or_else(|| host.strip_suffix(".dfs.core.windows.net"))?;
        let (container, key) = split_first_segment(path)?;
        Some(BackendConfig::Azure(AzureConfig {
            account: Some(account.to_string()),
            container,
            key,
        }))
    }

    fn local(raw: &str) -> Result<Self, StorageError> {
        let path = std::path::absolute(raw).map_err(|_| {
            InvalidUrlSnafu {
                url: raw.to_string(),
            }
            .build()
        })?;
        Ok(BackendConfig::Local(LocalConfig {
            path: path.to_string_lossy().into_owned(),
        }))
    }

    /// Prefix inside the bucket or container that every path is relative to.
    pub(crate) fn key(&self) -> Option<&Path> {
        match self {
            BackendConfig::S3(s3) => s3.key.as_ref(),
            BackendConfig::Gcs(gcs) => gcs.key.as_ref(),
            BackendConfig::Azure(azure) => azure.key.as_ref(),
            BackendConfig::Local(_) => None,
        }
    }
}

fn key_from(url_path: &str) -> Option<Path> {
    let trimmed = url_path.trim_matches('/');
    if trimmed.is_empty() {
        return None;
    }
    Path::from_url_path(trimmed).ok()
}

fn split_first_segment(url_path: &str) -> Option<(String, Option<Path>)> {
    let trimmed = url_path.trim_start_matches('/');
    let (first, rest) = trimmed.split_once('/').unwrap_or((trimmed, ""));
    if first.is_empty() {
        return None;
    }
    Some((first.to_string(), key_from(rest)))
}
