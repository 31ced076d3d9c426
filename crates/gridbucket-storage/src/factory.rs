#[cfg(feature = "storage-local")]
use crate::LocalBucket;
#[cfg(feature = "storage-memory")]
use crate::MemoryBucket;
#[cfg(feature = "storage-mongodb")]
use crate::MongoBucket;
use crate::{BucketEngine, StorageBackend, StorageError, StorageResult};
use gridbucket_core::Config;
use std::sync::Arc;

/// Create a bucket engine based on configuration
pub async fn create_bucket(config: &Config) -> StorageResult<Arc<dyn BucketEngine>> {
    let options = config.bucket_options();

    let bucket: Arc<dyn BucketEngine> = match config.storage_backend {
        #[cfg(feature = "storage-memory")]
        StorageBackend::Memory => Arc::new(MemoryBucket::new(options)?),

        #[cfg(not(feature = "storage-memory"))]
        StorageBackend::Memory => {
            return Err(StorageError::ConfigError(
                "Memory storage backend not available (storage-memory feature not enabled)"
                    .to_string(),
            ))
        }

        #[cfg(feature = "storage-local")]
        StorageBackend::Local => {
            let root = config.local_storage_path().ok_or_else(|| {
                StorageError::ConfigError("LOCAL_STORAGE_PATH not configured".to_string())
            })?;
            Arc::new(LocalBucket::new(root, options).await?)
        }

        #[cfg(not(feature = "storage-local"))]
        StorageBackend::Local => {
            return Err(StorageError::ConfigError(
                "Local storage backend not available (storage-local feature not enabled)"
                    .to_string(),
            ))
        }

        #[cfg(feature = "storage-mongodb")]
        StorageBackend::MongoDb => {
            let uri = config.mongodb_uri().ok_or_else(|| {
                StorageError::ConfigError("MONGODB_URI not configured".to_string())
            })?;
            let database = config.mongodb_database().ok_or_else(|| {
                StorageError::ConfigError("MONGODB_DATABASE not configured".to_string())
            })?;
            Arc::new(MongoBucket::connect(uri, database, options).await?)
        }

        #[cfg(not(feature = "storage-mongodb"))]
        StorageBackend::MongoDb => {
            return Err(StorageError::ConfigError(
                "MongoDB storage backend not available (storage-mongodb feature not enabled)"
                    .to_string(),
            ))
        }
    };

    tracing::info!(
        backend = %bucket.backend_type(),
        bucket = %bucket.name(),
        chunk_size_bytes = bucket.options().chunk_size_bytes,
        "Bucket created"
    );

    Ok(bucket)
}
