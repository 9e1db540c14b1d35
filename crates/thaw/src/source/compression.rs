//! Capture file compression.

use std::io::{BufRead, BufReader, Cursor};

use serde::{Deserialize, Serialize};

/// Compression of capture data files.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionFormat {
    #[default]
    Gzip,
    None,
}

impl CompressionFormat {
    /// Whether `path` names a data file in this format.
    pub fn matches(self, path: &str) -> bool {
        let name = path.rsplit('/').next().unwrap_or(path);
        if name.starts_with('.') || name.starts_with('_') {
            return false;
        }
        match self {
            CompressionFormat::Gzip => name.ends_with(".gz"),
            CompressionFormat::None => name.ends_with(".json") || name.ends_with(".ndjson"),
        }
    }

    /// A reader yielding the decompressed contents of `data`.
    pub fn reader<'a>(self, data: &'a [u8]) -> Box<dyn BufRead + Send + 'a> {
        match self {
            CompressionFormat::Gzip => {
                Box::new(BufReader::new(flate2::read::GzDecoder::new(data)))
            }
            CompressionFormat::None => Box::new(Cursor::new(data)),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            CompressionFormat::Gzip => "gzip",
            CompressionFormat::None => "none",
        }
    }
}
