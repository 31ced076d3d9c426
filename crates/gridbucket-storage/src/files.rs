//! Whole-buffer helpers over a bucket engine
//!
//! Each helper opens the matching engine stream and hands it to [`drain`] or [`fill`].
//! Identifiers may be passed as an `ObjectId`, a string or a number; they are normalized
//! with [`conv_to_object_id`] before reaching the engine.

use crate::stream::{drain, fill};
use crate::traits::{BucketEngine, DownloadStream, StorageResult, UploadStream};
use bytes::Bytes;
use gridbucket_core::{conv_to_object_id, DownloadOptions, FileId, FileMetadata, UploadOptions};

/// Store `file` through an already opened upload stream.
pub async fn write_file_with_stream(
    upload_stream: Box<dyn UploadStream>,
    file: impl Into<Bytes>,
) -> StorageResult<FileMetadata> {
    fill(upload_stream, file).await
}

/// Store `file` under `filename` with a freshly generated identifier.
pub async fn write_file_by_name(
    bucket: &dyn BucketEngine,
    file: impl Into<Bytes>,
    filename: &str,
    options: UploadOptions,
) -> StorageResult<FileMetadata> {
    let upload_stream = bucket.open_upload_stream(filename, options).await?;
    fill(upload_stream, file).await
}

/// Store `file` under `filename` with a caller-chosen identifier.
pub async fn write_file_by_id(
    bucket: &dyn BucketEngine,
    id: impl Into<FileId>,
    file: impl Into<Bytes>,
    filename: &str,
    options: UploadOptions,
) -> StorageResult<FileMetadata> {
    let id = conv_to_object_id(id)?;
    let upload_stream = bucket
        .open_upload_stream_with_id(id, filename, options)
        .await?;
    fill(upload_stream, file).await
}

/// Read a whole file from an already opened download stream.
pub async fn read_file_with_stream(download_stream: DownloadStream) -> StorageResult<Bytes> {
    drain(download_stream).await
}

/// Read one revision of the files named `filename` (the newest by default).
pub async fn read_file_by_name(
    bucket: &dyn BucketEngine,
    filename: &str,
    options: DownloadOptions,
) -> StorageResult<Bytes> {
    let stream = bucket
        .open_download_stream_by_name(filename, options)
        .await?;
    drain(stream).await
}

/// Read the file stored under `id`.
pub async fn read_file_by_id(
    bucket: &dyn BucketEngine,
    id: impl Into<FileId>,
) -> StorageResult<Bytes> {
    let id = conv_to_object_id(id)?;
    let stream = bucket.open_download_stream(id).await?;
    drain(stream).await
}

/// Delete the file stored under `id`.
pub async fn delete_file_by_id(
    bucket: &dyn BucketEngine,
    id: impl Into<FileId>,
) -> StorageResult<()> {
    let id = conv_to_object_id(id)?;
    bucket.delete(id).await
}

/// Read the file stored under `id`, then delete it.
///
/// The file is only deleted once it has been read in full.
pub async fn read_and_delete_by_id(
    bucket: &dyn BucketEngine,
    id: impl Into<FileId>,
) -> StorageResult<Bytes> {
    let id = conv_to_object_id(id)?;
    let data = read_file_by_id(bucket, id).await?;
    bucket.delete(id).await?;

    tracing::debug!(
        bucket = %bucket.name(),
        file_id = %id,
        size_bytes = data.len(),
        "Read and deleted file"
    );

    Ok(data)
}

#[cfg(all(test, feature = "storage-memory"))]
mod tests {
    use super::*;
    use crate::traits::StorageError;
    use crate::MemoryBucket;
    use gridbucket_core::{BucketOptions, FileFilter, ObjectId};

    fn bucket() -> MemoryBucket {
        MemoryBucket::new(BucketOptions::new("files").with_chunk_size_bytes(3)).unwrap()
    }

    #[tokio::test]
    async fn write_and_read_by_name() {
        let bucket = bucket();
        write_file_by_name(&bucket, "hello world", "a.txt", UploadOptions::default())
            .await
            .unwrap();

        let data = read_file_by_name(&bucket, "a.txt", DownloadOptions::default())
            .await
            .unwrap();
        assert_eq!(&data[..], b"hello world");
    }

    #[tokio::test]
    async fn write_by_string_id_and_read_by_native_id() {
        let bucket = bucket();
        let hex = "507f1f77bcf86cd799439011";
        let file = write_file_by_id(
            &bucket,
            hex,
            b"payload".to_vec(),
            "p.bin",
            UploadOptions::default(),
        )
        .await
        .unwrap();
        assert_eq!(file.id.to_hex(), hex);

        let data = read_file_by_id(&bucket, file.id).await.unwrap();
        assert_eq!(&data[..], b"payload");
    }

    #[tokio::test]
    async fn invalid_id_is_rejected_before_the_engine() {
        let bucket = bucket();
        let err = read_file_by_id(&bucket, "nope").await.unwrap_err();
        assert!(matches!(err, StorageError::InvalidId(_)));
    }

    #[tokio::test]
    async fn revisions_select_by_upload_order() {
        let bucket = bucket();
        for content in ["v0", "v1", "v2"] {
            write_file_by_name(&bucket, content, "doc.txt", UploadOptions::default())
                .await
                .unwrap();
        }

        let read = |revision: i32| {
            let bucket = bucket.clone();
            async move {
                read_file_by_name(&bucket, "doc.txt", DownloadOptions::revision(revision)).await
            }
        };
        assert_eq!(&read(0).await.unwrap()[..], b"v0");
        assert_eq!(&read(1).await.unwrap()[..], b"v1");
        assert_eq!(&read(-1).await.unwrap()[..], b"v2");
        assert_eq!(&read(-3).await.unwrap()[..], b"v0");
        assert!(matches!(read(3).await, Err(StorageError::NotFound(_))));
    }

    #[tokio::test]
    async fn read_and_delete_removes_file() {
        let bucket = bucket();
        let file = write_file_by_name(&bucket, "once", "once.txt", UploadOptions::default())
            .await
            .unwrap();

        let data = read_and_delete_by_id(&bucket, file.id).await.unwrap();
        assert_eq!(&data[..], b"once");
        assert!(matches!(
            read_file_by_id(&bucket, file.id).await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn read_and_delete_missing_file_deletes_nothing() {
        let bucket = bucket();
        write_file_by_name(&bucket, "keep", "keep.txt", UploadOptions::default())
            .await
            .unwrap();

        let err = read_and_delete_by_id(&bucket, ObjectId::new()).await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
        assert_eq!(bucket.find(FileFilter::default()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn delete_then_read_fails() {
        let bucket = bucket();
        let file = write_file_by_name(&bucket, "temp", "temp.txt", UploadOptions::default())
            .await
            .unwrap();

        delete_file_by_id(&bucket, file.id.to_hex()).await.unwrap();
        let err = read_file_by_id(&bucket, file.id).await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
    }

    #[tokio::test]
    async fn stream_variants_round_trip() {
        let bucket = bucket();
        let upload = bucket
            .open_upload_stream("s.txt", UploadOptions::default())
            .await
            .unwrap();
        let file = write_file_with_stream(upload, "streamed").await.unwrap();

        let download = bucket.open_download_stream(file.id).await.unwrap();
        let data = read_file_with_stream(download).await.unwrap();
        assert_eq!(&data[..], b"streamed");
    }
}
