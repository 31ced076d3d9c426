use crate::traits::{
    validate_options, BucketEngine, DownloadStream, StorageError, StorageResult, UploadStream,
};
use crate::StorageBackend;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::io::AsyncWriteExt;
use futures::{StreamExt, TryStreamExt};
use gridbucket_core::{
    BucketOptions, DownloadOptions, FileFilter, FileMetadata, ObjectId, UploadOptions,
};
use mongodb::bson::oid::ObjectId as BsonObjectId;
use mongodb::bson::{doc, Bson, Document};
use mongodb::error::{Error as MongoError, ErrorKind, GridFsErrorKind};
use mongodb::gridfs::{FilesCollectionDocument, GridFsBucket, GridFsUploadStream};
use mongodb::options::GridFsBucketOptions;
use mongodb::{Client, Database};
use std::io;
use tokio_util::compat::FuturesAsyncReadCompatExt;

/// MongoDB GridFS bucket engine
///
/// Chunking, indexing and durability are handled by the driver and the server; this
/// type only adapts the driver's streams to the crate's stream types.
#[derive(Clone)]
pub struct MongoBucket {
    bucket: GridFsBucket,
    options: BucketOptions,
}

impl MongoBucket {
    pub fn new(db: &Database, options: BucketOptions) -> StorageResult<Self> {
        validate_options(&options)?;

        let gridfs_options = GridFsBucketOptions::builder()
            .bucket_name(options.bucket_name.clone())
            .chunk_size_bytes(options.chunk_size_bytes)
            .build();

        Ok(MongoBucket {
            bucket: db.gridfs_bucket(gridfs_options),
            options,
        })
    }

    /// Connect to `uri` and open the bucket in `database`.
    pub async fn connect(uri: &str, database: &str, options: BucketOptions) -> StorageResult<Self> {
        let client = Client::with_uri_str(uri)
            .await
            .map_err(|e| StorageError::ConfigError(format!("MongoDB connection failed: {}", e)))?;

        Self::new(&client.database(database), options)
    }

    async fn find_one(&self, id: ObjectId) -> StorageResult<Option<FileMetadata>> {
        let mut cursor = self
            .bucket
            .find(doc! { "_id": to_bson_id(id) })
            .await
            .map_err(map_mongo_error)?;
        match cursor.try_next().await.map_err(map_mongo_error)? {
            Some(file) => to_file_metadata(file).map(Some),
            None => Ok(None),
        }
    }

    fn reader_stream<R>(&self, reader: R, id_hint: String) -> DownloadStream
    where
        R: futures::io::AsyncRead + Send + 'static,
    {
        let bucket = self.options.bucket_name.clone();
        let stream = tokio_util::io::ReaderStream::with_capacity(
            reader.compat(),
            self.options.chunk_size_bytes as usize,
        )
        .map(move |item| {
            if let Err(ref e) = item {
                tracing::error!(
                    error = %e,
                    bucket = %bucket,
                    file = %id_hint,
                    "GridFS stream download error"
                );
            }
            item
        });

        Box::pin(stream)
    }
}

fn to_bson_id(id: ObjectId) -> Bson {
    Bson::ObjectId(BsonObjectId::from_bytes(id.bytes()))
}

fn to_file_metadata(file: FilesCollectionDocument) -> StorageResult<FileMetadata> {
    let id = match file.id {
        Bson::ObjectId(oid) => ObjectId::from_bytes(oid.bytes()),
        other => {
            return Err(StorageError::BackendError(format!(
                "unsupported GridFS file id {}",
                other
            )))
        }
    };

    Ok(FileMetadata {
        id,
        filename: file.filename.unwrap_or_default(),
        length: file.length,
        chunk_size_bytes: file.chunk_size_bytes,
        upload_date: DateTime::<Utc>::from_timestamp_millis(file.upload_date.timestamp_millis())
            .unwrap_or_default(),
        metadata: file
            .metadata
            .map(|metadata| Bson::Document(metadata).into_relaxed_extjson()),
    })
}

fn map_mongo_error(e: MongoError) -> StorageError {
    if matches!(
        *e.kind,
        ErrorKind::GridFs(GridFsErrorKind::FileNotFound { .. })
            | ErrorKind::GridFs(GridFsErrorKind::RevisionNotFound { .. })
    ) {
        StorageError::NotFound(e.to_string())
    } else {
        StorageError::BackendError(e.to_string())
    }
}

struct MongoUploadStream {
    bucket: MongoBucket,
    id: ObjectId,
    filename: String,
    inner: GridFsUploadStream,
}

#[async_trait]
impl UploadStream for MongoUploadStream {
    fn id(&self) -> ObjectId {
        self.id
    }

    fn filename(&self) -> &str {
        &self.filename
    }

    async fn write(&mut self, chunk: Bytes) -> io::Result<()> {
        self.inner.write_all(&chunk).await
    }

    async fn close(self: Box<Self>) -> io::Result<FileMetadata> {
        let mut this = *self;
        this.inner.close().await?;

        let file = this
            .bucket
            .find_one(this.id)
            .await
            .map_err(io::Error::other)?
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("GridFS file {} missing after upload", this.id),
                )
            })?;

        tracing::info!(
            bucket = %this.bucket.options.bucket_name,
            file_id = %file.id,
            filename = %file.filename,
            size_bytes = file.length,
            "GridFS upload successful"
        );

        Ok(file)
    }
}

#[async_trait]
impl BucketEngine for MongoBucket {
    fn options(&self) -> &BucketOptions {
        &self.options
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::MongoDb
    }

    async fn open_upload_stream_with_id(
        &self,
        id: ObjectId,
        filename: &str,
        options: UploadOptions,
    ) -> StorageResult<Box<dyn UploadStream>> {
        let mut action = self.bucket.open_upload_stream(filename).id(to_bson_id(id));
        if let Some(chunk_size_bytes) = options.chunk_size_bytes {
            action = action.chunk_size_bytes(chunk_size_bytes);
        }
        if let Some(metadata) = options.metadata {
            let metadata: Document = mongodb::bson::to_document(&metadata).map_err(|e| {
                StorageError::BackendError(format!("metadata must be a JSON object: {}", e))
            })?;
            action = action.metadata(metadata);
        }

        let inner = action.await.map_err(map_mongo_error)?;

        Ok(Box::new(MongoUploadStream {
            bucket: self.clone(),
            id,
            filename: filename.to_string(),
            inner,
        }))
    }

    async fn open_download_stream(&self, id: ObjectId) -> StorageResult<DownloadStream> {
        let reader = self
            .bucket
            .open_download_stream(to_bson_id(id))
            .await
            .map_err(map_mongo_error)?;

        Ok(self.reader_stream(reader, id.to_hex()))
    }

    async fn open_download_stream_by_name(
        &self,
        filename: &str,
        options: DownloadOptions,
    ) -> StorageResult<DownloadStream> {
        let reader = self
            .bucket
            .open_download_stream_by_name(filename)
            .revision(options.revision)
            .await
            .map_err(map_mongo_error)?;

        Ok(self.reader_stream(reader, filename.to_string()))
    }

    async fn delete(&self, id: ObjectId) -> StorageResult<()> {
        let start = std::time::Instant::now();

        self.bucket.delete(to_bson_id(id)).await.map_err(|e| {
            tracing::error!(
                error = %e,
                bucket = %self.options.bucket_name,
                file_id = %id,
                "GridFS delete failed"
            );
            map_mongo_error(e)
        })?;

        tracing::info!(
            bucket = %self.options.bucket_name,
            file_id = %id,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "GridFS delete successful"
        );

        Ok(())
    }

    async fn find(&self, filter: FileFilter) -> StorageResult<Vec<FileMetadata>> {
        let query = match filter.filename {
            Some(filename) => doc! { "filename": filename },
            None => doc! {},
        };

        let files: Vec<FilesCollectionDocument> = self
            .bucket
            .find(query)
            .sort(doc! { "uploadDate": 1, "_id": 1 })
            .await
            .map_err(map_mongo_error)?
            .try_collect()
            .await
            .map_err(map_mongo_error)?;

        files.into_iter().map(to_file_metadata).collect()
    }

    async fn rename(&self, id: ObjectId, new_filename: &str) -> StorageResult<()> {
        self.bucket
            .rename(to_bson_id(id), new_filename)
            .await
            .map_err(map_mongo_error)
    }

    async fn drop_bucket(&self) -> StorageResult<()> {
        self.bucket.drop().await.map_err(map_mongo_error)?;

        tracing::info!(bucket = %self.options.bucket_name, "GridFS bucket dropped");
        Ok(())
    }
}
