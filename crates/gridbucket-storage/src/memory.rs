use crate::traits::{
    not_found_by_id, not_found_by_name, validate_options, BucketEngine, DownloadStream,
    StorageResult, UploadStream,
};
use crate::StorageBackend;
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use chrono::Utc;
use futures::stream;
use gridbucket_core::{
    BucketOptions, DownloadOptions, FileFilter, FileMetadata, ObjectId, UploadOptions,
};
use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

struct StoredFile {
    file: FileMetadata,
    chunks: Vec<Bytes>,
    /// Insertion order, breaks ties between equal upload dates
    seq: u64,
}

struct Inner {
    options: BucketOptions,
    files: RwLock<HashMap<ObjectId, StoredFile>>,
    next_seq: AtomicU64,
}

/// In-process bucket engine
///
/// Files are split into `chunk_size_bytes` pieces on close and served back chunk by
/// chunk, the same shape a database-backed bucket produces.
#[derive(Clone)]
pub struct MemoryBucket {
    inner: Arc<Inner>,
}

impl MemoryBucket {
    pub fn new(options: BucketOptions) -> StorageResult<Self> {
        validate_options(&options)?;

        Ok(MemoryBucket {
            inner: Arc::new(Inner {
                options,
                files: RwLock::new(HashMap::new()),
                next_seq: AtomicU64::new(0),
            }),
        })
    }

    async fn sorted_files(&self, filter: &FileFilter) -> Vec<(u64, FileMetadata)> {
        let files = self.inner.files.read().await;
        let mut matching: Vec<(u64, FileMetadata)> = files
            .values()
            .filter(|stored| filter.matches(&stored.file))
            .map(|stored| (stored.seq, stored.file.clone()))
            .collect();
        matching.sort_by(|(seq_a, a), (seq_b, b)| {
            a.upload_date.cmp(&b.upload_date).then(seq_a.cmp(seq_b))
        });
        matching
    }

    async fn chunk_stream(&self, id: ObjectId) -> StorageResult<DownloadStream> {
        let files = self.inner.files.read().await;
        let stored = files.get(&id).ok_or_else(|| not_found_by_id(id))?;
        let chunks: Vec<io::Result<Bytes>> = stored.chunks.iter().cloned().map(Ok).collect();
        Ok(Box::pin(stream::iter(chunks)))
    }
}

fn split_chunks(content: Bytes, chunk_size: usize) -> Vec<Bytes> {
    (0..content.len())
        .step_by(chunk_size)
        .map(|start| content.slice(start..(start + chunk_size).min(content.len())))
        .collect()
}

struct MemoryUploadStream {
    bucket: MemoryBucket,
    id: ObjectId,
    filename: String,
    chunk_size_bytes: u32,
    metadata: Option<serde_json::Value>,
    buffer: BytesMut,
}

#[async_trait]
impl UploadStream for MemoryUploadStream {
    fn id(&self) -> ObjectId {
        self.id
    }

    fn filename(&self) -> &str {
        &self.filename
    }

    async fn write(&mut self, chunk: Bytes) -> io::Result<()> {
        self.buffer.extend_from_slice(&chunk);
        Ok(())
    }

    async fn close(self: Box<Self>) -> io::Result<FileMetadata> {
        let this = *self;
        let content = this.buffer.freeze();
        let file = FileMetadata {
            id: this.id,
            filename: this.filename,
            length: content.len() as u64,
            chunk_size_bytes: this.chunk_size_bytes,
            upload_date: Utc::now(),
            metadata: this.metadata,
        };
        let chunks = split_chunks(content, this.chunk_size_bytes as usize);

        let inner = &this.bucket.inner;
        let mut files = inner.files.write().await;
        if files.contains_key(&file.id) {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("file with id {} already exists", file.id),
            ));
        }

        let seq = inner.next_seq.fetch_add(1, Ordering::Relaxed);
        files.insert(
            file.id,
            StoredFile {
                file: file.clone(),
                chunks,
                seq,
            },
        );

        tracing::info!(
            bucket = %inner.options.bucket_name,
            file_id = %file.id,
            filename = %file.filename,
            size_bytes = file.length,
            "Memory bucket upload successful"
        );

        Ok(file)
    }
}

#[async_trait]
impl BucketEngine for MemoryBucket {
    fn options(&self) -> &BucketOptions {
        &self.inner.options
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::Memory
    }

    async fn open_upload_stream_with_id(
        &self,
        id: ObjectId,
        filename: &str,
        options: UploadOptions,
    ) -> StorageResult<Box<dyn UploadStream>> {
        Ok(Box::new(MemoryUploadStream {
            bucket: self.clone(),
            id,
            filename: filename.to_string(),
            chunk_size_bytes: options
                .chunk_size_bytes
                .unwrap_or(self.inner.options.chunk_size_bytes)
                .max(1),
            metadata: options.metadata,
            buffer: BytesMut::new(),
        }))
    }

    async fn open_download_stream(&self, id: ObjectId) -> StorageResult<DownloadStream> {
        self.chunk_stream(id).await
    }

    async fn open_download_stream_by_name(
        &self,
        filename: &str,
        options: DownloadOptions,
    ) -> StorageResult<DownloadStream> {
        let files = self.sorted_files(&FileFilter::by_name(filename)).await;
        let index = options
            .select_index(files.len())
            .ok_or_else(|| not_found_by_name(filename, options.revision))?;
        self.chunk_stream(files[index].1.id).await
    }

    async fn delete(&self, id: ObjectId) -> StorageResult<()> {
        let removed = self.inner.files.write().await.remove(&id);
        if removed.is_none() {
            return Err(not_found_by_id(id));
        }

        tracing::info!(
            bucket = %self.inner.options.bucket_name,
            file_id = %id,
            "Memory bucket delete successful"
        );

        Ok(())
    }

    async fn find(&self, filter: FileFilter) -> StorageResult<Vec<FileMetadata>> {
        Ok(self
            .sorted_files(&filter)
            .await
            .into_iter()
            .map(|(_, file)| file)
            .collect())
    }

    async fn rename(&self, id: ObjectId, new_filename: &str) -> StorageResult<()> {
        let mut files = self.inner.files.write().await;
        let stored = files.get_mut(&id).ok_or_else(|| not_found_by_id(id))?;
        stored.file.filename = new_filename.to_string();
        Ok(())
    }

    async fn drop_bucket(&self) -> StorageResult<()> {
        self.inner.files.write().await.clear();
        tracing::info!(
            bucket = %self.inner.options.bucket_name,
            "Memory bucket dropped"
        );
        Ok(())
    }
}

#[cfg(all(test, feature = "storage-memory"))]
mod tests {
    use super::*;
    use crate::traits::StorageError;
    use futures::StreamExt;

    fn bucket(chunk_size: u32) -> MemoryBucket {
        MemoryBucket::new(BucketOptions::new("test").with_chunk_size_bytes(chunk_size)).unwrap()
    }

    async fn put(bucket: &MemoryBucket, name: &str, data: &'static [u8]) -> FileMetadata {
        let mut upload = bucket
            .open_upload_stream(name, UploadOptions::default())
            .await
            .unwrap();
        upload.write(Bytes::from_static(data)).await.unwrap();
        upload.close().await.unwrap()
    }

    #[test]
    fn split_chunks_keeps_remainder() {
        let chunks = split_chunks(Bytes::from_static(b"abcdefghijk"), 4);
        let sizes: Vec<usize> = chunks.iter().map(Bytes::len).collect();
        assert_eq!(sizes, vec![4, 4, 3]);
        assert!(split_chunks(Bytes::new(), 4).is_empty());
    }

    #[test]
    fn rejects_invalid_options() {
        assert!(matches!(
            MemoryBucket::new(BucketOptions::new("a/b")),
            Err(StorageError::InvalidBucketName(_))
        ));
        assert!(matches!(
            MemoryBucket::new(BucketOptions::new("ok").with_chunk_size_bytes(0)),
            Err(StorageError::ConfigError(_))
        ));
    }

    #[tokio::test]
    async fn download_yields_engine_sized_chunks() {
        let bucket = bucket(4);
        let file = put(&bucket, "a.txt", b"hello world").await;
        assert_eq!(file.length, 11);
        assert_eq!(file.chunk_size_bytes, 4);

        let stream = bucket.open_download_stream(file.id).await.unwrap();
        let chunks: Vec<Bytes> = stream.map(|c| c.unwrap()).collect().await;
        assert_eq!(chunks.len(), 3);
        assert_eq!(&chunks[2][..], b"rld");
    }

    #[tokio::test]
    async fn upload_is_invisible_until_closed() {
        let bucket = bucket(4);
        let mut upload = bucket
            .open_upload_stream("pending.txt", UploadOptions::default())
            .await
            .unwrap();
        upload.write(Bytes::from_static(b"data")).await.unwrap();
        let id = upload.id();

        assert!(matches!(
            bucket.open_download_stream(id).await,
            Err(StorageError::NotFound(_))
        ));
        upload.close().await.unwrap();
        assert!(bucket.open_download_stream(id).await.is_ok());
    }

    #[tokio::test]
    async fn duplicate_id_fails_on_close() {
        let bucket = bucket(4);
        let id = ObjectId::new();
        for expect_ok in [true, false] {
            let upload = bucket
                .open_upload_stream_with_id(id, "dup.txt", UploadOptions::default())
                .await
                .unwrap();
            assert_eq!(upload.close().await.is_ok(), expect_ok);
        }
    }

    #[tokio::test]
    async fn find_filters_by_name_oldest_first() {
        let bucket = bucket(4);
        let first = put(&bucket, "x.txt", b"1").await;
        put(&bucket, "y.txt", b"2").await;
        let third = put(&bucket, "x.txt", b"3").await;

        let files = bucket.find(FileFilter::by_name("x.txt")).await.unwrap();
        let ids: Vec<ObjectId> = files.iter().map(|f| f.id).collect();
        assert_eq!(ids, vec![first.id, third.id]);
        assert_eq!(bucket.find(FileFilter::default()).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn rename_and_drop() {
        let bucket = bucket(4);
        let file = put(&bucket, "old.txt", b"content").await;

        bucket.rename(file.id, "new.txt").await.unwrap();
        assert!(bucket.find(FileFilter::by_name("old.txt")).await.unwrap().is_empty());
        assert_eq!(bucket.find(FileFilter::by_name("new.txt")).await.unwrap().len(), 1);
        assert!(matches!(
            bucket.rename(ObjectId::new(), "x").await,
            Err(StorageError::NotFound(_))
        ));

        bucket.drop_bucket().await.unwrap();
        assert!(bucket.find(FileFilter::default()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_missing_is_not_found() {
        let bucket = bucket(4);
        assert!(matches!(
            bucket.delete(ObjectId::new()).await,
            Err(StorageError::NotFound(_))
        ));
    }
}
