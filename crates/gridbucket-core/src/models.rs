//! File and bucket models shared by every engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_BUCKET_NAME, DEFAULT_CHUNK_SIZE_BYTES, LATEST_REVISION};
use crate::object_id::ObjectId;

/// Metadata record an engine returns for a stored file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileMetadata {
    pub id: ObjectId,
    pub filename: String,
    /// Total content length in bytes
    pub length: u64,
    pub chunk_size_bytes: u32,
    pub upload_date: DateTime<Utc>,
    /// Arbitrary user metadata attached at upload time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

/// Bucket construction options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketOptions {
    pub bucket_name: String,
    pub chunk_size_bytes: u32,
}

impl Default for BucketOptions {
    fn default() -> Self {
        Self {
            bucket_name: DEFAULT_BUCKET_NAME.to_string(),
            chunk_size_bytes: DEFAULT_CHUNK_SIZE_BYTES,
        }
    }
}

impl BucketOptions {
    pub fn new(bucket_name: impl Into<String>) -> Self {
        Self {
            bucket_name: bucket_name.into(),
            ..Self::default()
        }
    }

    pub fn with_chunk_size_bytes(mut self, chunk_size_bytes: u32) -> Self {
        self.chunk_size_bytes = chunk_size_bytes;
        self
    }
}

/// Per-upload options
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UploadOptions {
    /// Overrides the bucket chunk size for this file
    pub chunk_size_bytes: Option<u32>,
    pub metadata: Option<serde_json::Value>,
}

impl UploadOptions {
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn with_chunk_size_bytes(mut self, chunk_size_bytes: u32) -> Self {
        self.chunk_size_bytes = Some(chunk_size_bytes);
        self
    }
}

/// Options for reading a file by name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadOptions {
    /// `0` is the oldest upload, `1` the next; `-1` is the newest, `-2` the one before.
    pub revision: i32,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            revision: LATEST_REVISION,
        }
    }
}

impl DownloadOptions {
    pub fn revision(revision: i32) -> Self {
        Self { revision }
    }

    /// Pick the index into `count` files sorted oldest first, if the revision exists.
    pub fn select_index(&self, count: usize) -> Option<usize> {
        let count = i64::try_from(count).ok()?;
        let revision = i64::from(self.revision);
        let index = if revision >= 0 { revision } else { count + revision };
        if (0..count).contains(&index) {
            usize::try_from(index).ok()
        } else {
            None
        }
    }
}

/// Filter for listing files
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileFilter {
    pub filename: Option<String>,
}

impl FileFilter {
    pub fn by_name(filename: impl Into<String>) -> Self {
        Self {
            filename: Some(filename.into()),
        }
    }

    pub fn matches(&self, file: &FileMetadata) -> bool {
        self.filename
            .as_deref()
            .map_or(true, |name| name == file.filename)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_bucket_options() {
        let options = BucketOptions::default();
        assert_eq!(options.bucket_name, "fs");
        assert_eq!(options.chunk_size_bytes, 261_120);
    }

    #[test]
    fn revision_selection() {
        assert_eq!(DownloadOptions::default().select_index(3), Some(2));
        assert_eq!(DownloadOptions::revision(0).select_index(3), Some(0));
        assert_eq!(DownloadOptions::revision(2).select_index(3), Some(2));
        assert_eq!(DownloadOptions::revision(-3).select_index(3), Some(0));
        assert_eq!(DownloadOptions::revision(3).select_index(3), None);
        assert_eq!(DownloadOptions::revision(-4).select_index(3), None);
        assert_eq!(DownloadOptions::default().select_index(0), None);
    }

    #[test]
    fn file_metadata_json_omits_empty_user_metadata() {
        let file = FileMetadata {
            id: ObjectId::new(),
            filename: "a.txt".to_string(),
            length: 11,
            chunk_size_bytes: 4,
            upload_date: Utc::now(),
            metadata: None,
        };
        let json = serde_json::to_value(&file).unwrap();
        assert!(json.get("metadata").is_none());
        let back: FileMetadata = serde_json::from_value(json).unwrap();
        assert_eq!(back, file);
    }
}
