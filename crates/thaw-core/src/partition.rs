//! Partition value extraction from Hive-style object paths.

use std::collections::HashMap;

/// Extracts `key=value` directory segments from object paths.
///
/// Only directory segments are inspected: the final segment is the object
/// name and is never treated as a partition. Keys must match a whole segment
/// prefix, so `id=7` is not mistaken for `d=7`. Values are percent-decoded.
///
/// # Examples
///
/// ```
/// use thaw_core::PartitionExtractor;
///
/// let extractor = PartitionExtractor::new(["y", "m", "d"]);
/// let values = extractor.extract("hub/y=2024/m=01/d=2/id=9/00.json.gz");
/// assert_eq!(values.get("y").map(String::as_str), Some("2024"));
/// assert_eq!(values.get("m").map(String::as_str), Some("01"));
/// assert_eq!(values.get("d").map(String::as_str), Some("2"));
/// assert_eq!(values.len(), 3);
/// ```
#[derive(Debug, Clone)]
pub struct PartitionExtractor {
    columns: Vec<String>,
}

impl PartitionExtractor {
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Values for the configured columns found in `path`.
    ///
    /// Columns absent from the path are absent from the map. When a key
    /// repeats, the segment closest to the object wins.
    pub fn extract(&self, path: &str) -> HashMap<String, String> {
        let mut segments: Vec<&str> = path.split('/').collect();
        segments.pop();

        let mut values = HashMap::new();
        for segment in segments {
            let Some((key, value)) = segment.split_once('=') else {
                continue;
            };
            if !self.columns.iter().any(|c| c == key) {
                continue;
            }
            let value = urlencoding::decode(value)
                .map(|v| v.into_owned())
                .unwrap_or_else(|_| value.to_string());
            values.insert(key.to_string(), value);
        }
        values
    }
}
