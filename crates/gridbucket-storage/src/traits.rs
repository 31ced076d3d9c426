//! Storage engine abstraction
//!
//! This module defines the contract every bucket engine implements: upload and download
//! stream factories keyed by name or identifier, delete, listing and bucket metadata.

use crate::StorageBackend;
use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use gridbucket_core::{
    BucketOptions, DownloadOptions, FileFilter, FileMetadata, ObjectId, ObjectIdError,
    UploadOptions,
};
use std::io;
use std::pin::Pin;
use thiserror::Error;

/// Storage operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Stream read failed: {0}")]
    StreamRead(#[source] io::Error),

    #[error("Stream write failed: {0}")]
    StreamWrite(#[source] io::Error),

    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Invalid file id: {0}")]
    InvalidId(#[from] ObjectIdError),

    #[error("Invalid bucket name: {0}")]
    InvalidBucketName(String),

    #[error("Storage backend error: {0}")]
    BackendError(String),

    #[error("IO error: {0}")]
    IoError(#[from] io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// A chunked read stream over one stored file.
///
/// Yields the file's chunks in order and ends after the last one.
pub type DownloadStream = Pin<Box<dyn Stream<Item = io::Result<Bytes>> + Send>>;

/// A write stream into one new file.
///
/// Nothing is visible to readers until `close` succeeds.
#[async_trait]
pub trait UploadStream: Send {
    /// Identifier the file will be stored under
    fn id(&self) -> ObjectId;

    fn filename(&self) -> &str;

    /// Append a chunk of content
    async fn write(&mut self, chunk: Bytes) -> io::Result<()>;

    /// Signal end-of-input and return the stored file's metadata
    async fn close(self: Box<Self>) -> io::Result<FileMetadata>;
}

/// Bucket engine trait
///
/// All engines (in-memory, local filesystem, MongoDB GridFS) implement this trait so the
/// helpers in [`crate::files`] work with any of them.
#[async_trait]
pub trait BucketEngine: Send + Sync {
    /// Bucket name
    fn name(&self) -> &str {
        &self.options().bucket_name
    }

    /// Options the bucket was created with
    fn options(&self) -> &BucketOptions;

    /// Get the storage backend type
    fn backend_type(&self) -> StorageBackend;

    /// Open an upload stream for a new file under a freshly generated identifier.
    async fn open_upload_stream(
        &self,
        filename: &str,
        options: UploadOptions,
    ) -> StorageResult<Box<dyn UploadStream>> {
        self.open_upload_stream_with_id(ObjectId::new(), filename, options)
            .await
    }

    /// Open an upload stream for a new file under a caller-chosen identifier.
    async fn open_upload_stream_with_id(
        &self,
        id: ObjectId,
        filename: &str,
        options: UploadOptions,
    ) -> StorageResult<Box<dyn UploadStream>>;

    /// Open a read stream over the file with this identifier.
    async fn open_download_stream(&self, id: ObjectId) -> StorageResult<DownloadStream>;

    /// Open a read stream over one revision of the files sharing `filename`.
    async fn open_download_stream_by_name(
        &self,
        filename: &str,
        options: DownloadOptions,
    ) -> StorageResult<DownloadStream>;

    /// Delete a file and its chunks. A missing identifier is `NotFound`.
    async fn delete(&self, id: ObjectId) -> StorageResult<()>;

    /// List files matching the filter, oldest upload first.
    async fn find(&self, filter: FileFilter) -> StorageResult<Vec<FileMetadata>>;

    /// Change a file's name. A missing identifier is `NotFound`.
    async fn rename(&self, id: ObjectId, new_filename: &str) -> StorageResult<()>;

    /// Remove every file in the bucket.
    async fn drop_bucket(&self) -> StorageResult<()>;
}

pub(crate) fn not_found_by_id(id: ObjectId) -> StorageError {
    StorageError::NotFound(format!("no file with id {}", id))
}

pub(crate) fn not_found_by_name(filename: &str, revision: i32) -> StorageError {
    StorageError::NotFound(format!(
        "no file named {:?} at revision {}",
        filename, revision
    ))
}

pub(crate) fn validate_options(options: &BucketOptions) -> StorageResult<()> {
    if !gridbucket_core::config::is_valid_bucket_name(&options.bucket_name) {
        return Err(StorageError::InvalidBucketName(options.bucket_name.clone()));
    }
    if options.chunk_size_bytes == 0 {
        return Err(StorageError::ConfigError(
            "chunk_size_bytes must be greater than zero".to_string(),
        ));
    }
    Ok(())
}
