//! gridbucket core library
//!
//! This crate provides the identifier type, file and bucket models, and configuration
//! shared by the storage engines and the command-line client.

pub mod config;
pub mod constants;
pub mod models;
pub mod object_id;
pub mod storage_types;

// Re-export commonly used types
pub use config::Config;
pub use models::{BucketOptions, DownloadOptions, FileFilter, FileMetadata, UploadOptions};
pub use object_id::{conv_to_object_id, FileId, ObjectId, ObjectIdError};
pub use storage_types::StorageBackend;
