//! Configuration module
//!
//! Bucket, backend selection and backend-specific connection settings, loaded from the
//! environment (and a `.env` file when present).

use std::env;

use crate::constants::{DEFAULT_BUCKET_NAME, DEFAULT_CHUNK_SIZE_BYTES};
use crate::models::BucketOptions;
use crate::storage_types::StorageBackend;

/// Application configuration
#[derive(Clone, Debug)]
pub struct Config {
    pub storage_backend: StorageBackend,
    pub bucket_name: String,
    pub chunk_size_bytes: u32,
    // Local filesystem engine
    pub local_storage_path: Option<String>,
    // MongoDB GridFS engine
    pub mongodb_uri: Option<String>,
    pub mongodb_database: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage_backend: StorageBackend::Local,
            bucket_name: DEFAULT_BUCKET_NAME.to_string(),
            chunk_size_bytes: DEFAULT_CHUNK_SIZE_BYTES,
            local_storage_path: None,
            mongodb_uri: None,
            mongodb_database: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();

        let storage_backend = match env::var("STORAGE_BACKEND") {
            Ok(s) => s.parse::<StorageBackend>()?,
            Err(_) => StorageBackend::Local,
        };

        let chunk_size_bytes = env::var("GRIDFS_CHUNK_SIZE_BYTES")
            .unwrap_or_else(|_| DEFAULT_CHUNK_SIZE_BYTES.to_string())
            .parse()
            .map_err(|_| anyhow::anyhow!("GRIDFS_CHUNK_SIZE_BYTES must be a valid number"))?;

        let config = Config {
            storage_backend,
            bucket_name: env::var("GRIDFS_BUCKET_NAME")
                .unwrap_or_else(|_| DEFAULT_BUCKET_NAME.to_string()),
            chunk_size_bytes,
            local_storage_path: env::var("LOCAL_STORAGE_PATH").ok(),
            mongodb_uri: env::var("MONGODB_URI").ok(),
            mongodb_database: env::var("MONGODB_DATABASE").ok(),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.chunk_size_bytes == 0 {
            return Err(anyhow::anyhow!(
                "GRIDFS_CHUNK_SIZE_BYTES must be greater than zero"
            ));
        }

        if !is_valid_bucket_name(&self.bucket_name) {
            return Err(anyhow::anyhow!(
                "GRIDFS_BUCKET_NAME {:?} is not a valid bucket name",
                self.bucket_name
            ));
        }

        match self.storage_backend {
            StorageBackend::Local if self.local_storage_path.is_none() => Err(anyhow::anyhow!(
                "STORAGE_BACKEND=local requires LOCAL_STORAGE_PATH to be set"
            )),
            StorageBackend::MongoDb
                if self.mongodb_uri.is_none() || self.mongodb_database.is_none() =>
            {
                Err(anyhow::anyhow!(
                    "STORAGE_BACKEND=mongodb requires MONGODB_URI and MONGODB_DATABASE to be set"
                ))
            }
            _ => Ok(()),
        }
    }

    pub fn bucket_options(&self) -> BucketOptions {
        BucketOptions::new(self.bucket_name.clone()).with_chunk_size_bytes(self.chunk_size_bytes)
    }

    pub fn local_storage_path(&self) -> Option<&str> {
        self.local_storage_path.as_deref()
    }

    pub fn mongodb_uri(&self) -> Option<&str> {
        self.mongodb_uri.as_deref()
    }

    pub fn mongodb_database(&self) -> Option<&str> {
        self.mongodb_database.as_deref()
    }
}

/// Bucket names become path segments and collection prefixes, so separators,
/// parent references and empty names are refused.
pub fn is_valid_bucket_name(name: &str) -> bool {
    !name.is_empty()
        && !name.contains("..")
        && !name.contains('/')
        && !name.contains('\\')
        && !name.contains('\0')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local_config() -> Config {
        Config {
            local_storage_path: Some("/tmp/gridbucket".to_string()),
            ..Config::default()
        }
    }

    #[test]
    fn validates_local_config() {
        assert!(local_config().validate().is_ok());
        assert!(Config::default().validate().is_err());
    }

    #[test]
    fn rejects_zero_chunk_size() {
        let config = Config {
            chunk_size_bytes: 0,
            ..local_config()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_bad_bucket_names() {
        for name in ["", "..", "a/b", "a\\b"] {
            let config = Config {
                bucket_name: name.to_string(),
                ..local_config()
            };
            assert!(config.validate().is_err(), "{name:?} should be rejected");
        }
        assert!(is_valid_bucket_name("photos.v2"));
    }

    #[test]
    fn mongodb_requires_uri_and_database() {
        let mut config = Config {
            storage_backend: StorageBackend::MongoDb,
            mongodb_uri: Some("mongodb://localhost:27017".to_string()),
            ..Config::default()
        };
        assert!(config.validate().is_err());
        config.mongodb_database = Some("test".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn memory_backend_needs_no_settings() {
        let config = Config {
            storage_backend: StorageBackend::Memory,
            ..Config::default()
        };
        assert!(config.validate().is_ok());
        assert_eq!(config.bucket_options(), BucketOptions::default());
    }
}
