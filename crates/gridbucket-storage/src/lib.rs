//! gridbucket storage library
//!
//! Whole-buffer helpers over chunked blob buckets. A bucket engine hands out upload and
//! download streams; [`drain`] collects a download stream into one buffer and [`fill`]
//! writes one buffer into an upload stream. The helpers in [`files`] combine the two
//! with identifier normalization.
//!
//! # Engines
//!
//! - **memory** (`storage-memory`): in-process, chunked on close.
//! - **local** (`storage-local`): one content file plus a JSON metadata file per object.
//! - **mongodb** (`storage-mongodb`): the MongoDB driver's GridFS bucket.
//!
//! Durability and chunk layout belong to the engine; this crate adds no retries or caching.

pub mod factory;
pub mod files;
#[cfg(feature = "storage-local")]
pub mod local;
#[cfg(feature = "storage-memory")]
pub mod memory;
#[cfg(feature = "storage-mongodb")]
pub mod mongo;
pub mod stream;
pub mod traits;

// Re-export commonly used types
pub use factory::create_bucket;
pub use files::{
    delete_file_by_id, read_and_delete_by_id, read_file_by_id, read_file_by_name,
    read_file_with_stream, write_file_by_id, write_file_by_name, write_file_with_stream,
};
pub use gridbucket_core::StorageBackend;
#[cfg(feature = "storage-local")]
pub use local::LocalBucket;
#[cfg(feature = "storage-memory")]
pub use memory::MemoryBucket;
#[cfg(feature = "storage-mongodb")]
pub use mongo::MongoBucket;
pub use stream::{drain, fill};
pub use traits::{BucketEngine, DownloadStream, StorageError, StorageResult, UploadStream};
