use crate::traits::{
    not_found_by_id, not_found_by_name, validate_options, BucketEngine, DownloadStream,
    StorageError, StorageResult, UploadStream,
};
use crate::StorageBackend;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use futures::StreamExt;
use gridbucket_core::{
    BucketOptions, DownloadOptions, FileFilter, FileMetadata, ObjectId, UploadOptions,
};
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

const CONTENT_EXT: &str = "bin";
const METADATA_EXT: &str = "json";
const PARTIAL_EXT: &str = "part";

/// Local filesystem bucket engine
///
/// Each file is stored as `{root}/{bucket}/{id}.bin` with its metadata alongside in
/// `{id}.json`. Uploads write to their own `{id}.{nonce}.part` file and commit by
/// hard-linking content, then metadata, into place; a file exists for readers once its
/// metadata link is made, and only one upload per id can make it.
#[derive(Clone)]
pub struct LocalBucket {
    base_path: PathBuf,
    options: BucketOptions,
}

impl LocalBucket {
    /// Create a new LocalBucket instance
    ///
    /// # Arguments
    /// * `root` - Root directory holding one sub-directory per bucket (e.g., "/var/lib/gridbucket")
    /// * `options` - Bucket name and default chunk size
    pub async fn new(root: impl Into<PathBuf>, options: BucketOptions) -> StorageResult<Self> {
        validate_options(&options)?;
        let base_path = root.into().join(&options.bucket_name);

        fs::create_dir_all(&base_path).await.map_err(|e| {
            StorageError::ConfigError(format!(
                "Failed to create bucket directory {}: {}",
                base_path.display(),
                e
            ))
        })?;

        Ok(LocalBucket { base_path, options })
    }

    fn path_for(&self, id: ObjectId, ext: &str) -> PathBuf {
        self.base_path.join(format!("{}.{}", id.to_hex(), ext))
    }

    async fn read_metadata(&self, id: ObjectId) -> StorageResult<FileMetadata> {
        let path = self.path_for(id, METADATA_EXT);

        if !fs::try_exists(&path).await? {
            return Err(not_found_by_id(id));
        }

        read_metadata_file(&path).await
    }

    async fn content_stream(&self, file: &FileMetadata) -> StorageResult<DownloadStream> {
        let path = self.path_for(file.id, CONTENT_EXT);

        let handle = fs::File::open(&path).await.map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => not_found_by_id(file.id),
            _ => StorageError::IoError(e),
        })?;

        let reader =
            tokio_util::io::ReaderStream::with_capacity(handle, file.chunk_size_bytes as usize);

        let bucket = self.options.bucket_name.clone();
        let id = file.id;
        let logged_stream = reader.map(move |item| {
            if let Err(ref e) = item {
                tracing::error!(
                    error = %e,
                    bucket = %bucket,
                    file_id = %id,
                    "Local bucket stream download error"
                );
            }
            item
        });

        Ok(Box::pin(logged_stream))
    }

    async fn all_files(&self) -> StorageResult<Vec<FileMetadata>> {
        let mut entries = fs::read_dir(&self.base_path).await?;
        let mut files = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(METADATA_EXT) {
                continue;
            }
            files.push(read_metadata_file(&path).await?);
        }

        files.sort_by(|a, b| a.upload_date.cmp(&b.upload_date).then(a.id.cmp(&b.id)));
        Ok(files)
    }
}

async fn read_metadata_file(path: &Path) -> StorageResult<FileMetadata> {
    let raw = fs::read(path).await?;
    serde_json::from_slice(&raw).map_err(|e| {
        StorageError::BackendError(format!(
            "Corrupt metadata file {}: {}",
            path.display(),
            e
        ))
    })
}

async fn write_metadata_file(path: &Path, file: &FileMetadata) -> io::Result<()> {
    let raw = serde_json::to_vec_pretty(file).map_err(io::Error::other)?;
    fs::write(path, raw).await
}

struct LocalUploadStream {
    bucket: LocalBucket,
    id: ObjectId,
    filename: String,
    chunk_size_bytes: u32,
    metadata: Option<serde_json::Value>,
    /// Private to this upload; removed on drop whether or not it committed
    partial_path: PathBuf,
    metadata_partial_path: PathBuf,
    handle: Option<fs::File>,
    length: u64,
    started: std::time::Instant,
}

fn duplicate_id(id: ObjectId) -> io::Error {
    io::Error::new(
        io::ErrorKind::AlreadyExists,
        format!("file with id {} already exists", id),
    )
}

/// Publish `src` under `dst`, failing with `AlreadyExists` if `dst` is taken.
async fn link_new(src: &Path, dst: &Path, id: ObjectId) -> io::Result<()> {
    fs::hard_link(src, dst).await.map_err(|e| match e.kind() {
        io::ErrorKind::AlreadyExists => duplicate_id(id),
        _ => e,
    })
}

impl LocalUploadStream {
    /// Content is linked first and metadata last; the metadata link is the commit point.
    async fn commit(&self, file: &FileMetadata) -> io::Result<PathBuf> {
        let content_path = self.bucket.path_for(self.id, CONTENT_EXT);
        link_new(&self.partial_path, &content_path, self.id).await?;

        let metadata_path = self.bucket.path_for(self.id, METADATA_EXT);
        let committed = async {
            write_metadata_file(&self.metadata_partial_path, file).await?;
            link_new(&self.metadata_partial_path, &metadata_path, self.id).await
        }
        .await;

        if let Err(e) = committed {
            fs::remove_file(&content_path).await.ok();
            return Err(e);
        }

        Ok(content_path)
    }
}

impl Drop for LocalUploadStream {
    fn drop(&mut self) {
        std::fs::remove_file(&self.partial_path).ok();
        std::fs::remove_file(&self.metadata_partial_path).ok();
    }
}

#[async_trait]
impl UploadStream for LocalUploadStream {
    fn id(&self) -> ObjectId {
        self.id
    }

    fn filename(&self) -> &str {
        &self.filename
    }

    async fn write(&mut self, chunk: Bytes) -> io::Result<()> {
        let handle = self
            .handle
            .as_mut()
            .ok_or_else(|| io::Error::other("upload stream already closed"))?;
        handle.write_all(&chunk).await?;
        self.length += chunk.len() as u64;
        Ok(())
    }

    async fn close(self: Box<Self>) -> io::Result<FileMetadata> {
        let mut this = self;
        let mut handle = this
            .handle
            .take()
            .ok_or_else(|| io::Error::other("upload stream already closed"))?;
        handle.flush().await?;
        handle.sync_all().await?;
        drop(handle);

        let file = FileMetadata {
            id: this.id,
            filename: this.filename.clone(),
            length: this.length,
            chunk_size_bytes: this.chunk_size_bytes,
            upload_date: Utc::now(),
            metadata: this.metadata.take(),
        };
        let content_path = this.commit(&file).await?;

        tracing::info!(
            path = %content_path.display(),
            file_id = %file.id,
            filename = %file.filename,
            size_bytes = file.length,
            duration_ms = this.started.elapsed().as_secs_f64() * 1000.0,
            "Local bucket upload successful"
        );

        Ok(file)
    }
}

#[async_trait]
impl BucketEngine for LocalBucket {
    fn options(&self) -> &BucketOptions {
        &self.options
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::Local
    }

    async fn open_upload_stream_with_id(
        &self,
        id: ObjectId,
        filename: &str,
        options: UploadOptions,
    ) -> StorageResult<Box<dyn UploadStream>> {
        let nonce = ObjectId::new().to_hex();
        let partial_path = self
            .base_path
            .join(format!("{}.{}.{}", id.to_hex(), nonce, PARTIAL_EXT));
        let metadata_partial_path = self.base_path.join(format!(
            "{}.{}.{}.{}",
            id.to_hex(),
            nonce,
            METADATA_EXT,
            PARTIAL_EXT
        ));

        let handle = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&partial_path)
            .await
            .map_err(|e| {
                StorageError::BackendError(format!(
                    "Failed to create file {}: {}",
                    partial_path.display(),
                    e
                ))
            })?;

        Ok(Box::new(LocalUploadStream {
            bucket: self.clone(),
            id,
            filename: filename.to_string(),
            chunk_size_bytes: options
                .chunk_size_bytes
                .unwrap_or(self.options.chunk_size_bytes)
                .max(1),
            metadata: options.metadata,
            partial_path,
            metadata_partial_path,
            handle: Some(handle),
            length: 0,
            started: std::time::Instant::now(),
        }))
    }

    async fn open_download_stream(&self, id: ObjectId) -> StorageResult<DownloadStream> {
        let file = self.read_metadata(id).await?;
        self.content_stream(&file).await
    }

    async fn open_download_stream_by_name(
        &self,
        filename: &str,
        options: DownloadOptions,
    ) -> StorageResult<DownloadStream> {
        let filter = FileFilter::by_name(filename);
        let files: Vec<FileMetadata> = self
            .all_files()
            .await?
            .into_iter()
            .filter(|file| filter.matches(file))
            .collect();

        let index = options
            .select_index(files.len())
            .ok_or_else(|| not_found_by_name(filename, options.revision))?;
        self.content_stream(&files[index]).await
    }

    async fn delete(&self, id: ObjectId) -> StorageResult<()> {
        let metadata_path = self.path_for(id, METADATA_EXT);
        let content_path = self.path_for(id, CONTENT_EXT);
        let start = std::time::Instant::now();

        if !fs::try_exists(&metadata_path).await? {
            return Err(not_found_by_id(id));
        }

        fs::remove_file(&metadata_path).await?;
        if let Err(e) = fs::remove_file(&content_path).await {
            if e.kind() != io::ErrorKind::NotFound {
                return Err(StorageError::IoError(e));
            }
        }

        tracing::info!(
            path = %content_path.display(),
            file_id = %id,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local bucket delete successful"
        );

        Ok(())
    }

    async fn find(&self, filter: FileFilter) -> StorageResult<Vec<FileMetadata>> {
        Ok(self
            .all_files()
            .await?
            .into_iter()
            .filter(|file| filter.matches(file))
            .collect())
    }

    async fn rename(&self, id: ObjectId, new_filename: &str) -> StorageResult<()> {
        let mut file = self.read_metadata(id).await?;
        file.filename = new_filename.to_string();
        write_metadata_file(&self.path_for(id, METADATA_EXT), &file).await?;
        Ok(())
    }

    async fn drop_bucket(&self) -> StorageResult<()> {
        fs::remove_dir_all(&self.base_path).await?;
        fs::create_dir_all(&self.base_path).await?;

        tracing::info!(
            path = %self.base_path.display(),
            bucket = %self.options.bucket_name,
            "Local bucket dropped"
        );

        Ok(())
    }
}
