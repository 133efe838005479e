//! Artifact storage for transcoded videos.
//!
//! This crate provides:
//! - The [`Storage`] trait used by the transcoder and the API
//! - A local filesystem backend rooted at a data directory
//! - An S3 backend for AWS or any S3-compatible endpoint (MinIO, R2)
//!
//! Keys are `/`-separated relative paths such as `vid1/720p/index.m3u8`.

pub mod config;
pub mod error;
pub mod local;
pub mod s3;

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

pub use config::{S3Config, StorageConfig};
pub use error::{StorageError, StorageResult};
pub use local::LocalStorage;
pub use s3::S3Storage;

/// Object store for encoded artifacts.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Whether an object exists under `key`.
    async fn exists(&self, key: &str) -> StorageResult<bool>;

    /// Read a whole object. Missing objects are [`StorageError::NotFound`].
    async fn get(&self, key: &str) -> StorageResult<Vec<u8>>;

    /// Write an object, replacing any previous one.
    async fn put(&self, key: &str, data: Vec<u8>, content_type: &str) -> StorageResult<()>;

    /// Upload a local file.
    async fn put_file(&self, path: &Path, key: &str, content_type: &str) -> StorageResult<()>;

    /// Delete one object.
    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// Delete everything under `prefix`. Missing prefixes are not an error.
    async fn delete_dir(&self, prefix: &str) -> StorageResult<()>;

    /// Keys of every object under `prefix`, recursively.
    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>>;

    /// Cheap reachability check for readiness probes.
    async fn check_connectivity(&self) -> StorageResult<()>;
}

/// Build the configured backend.
pub async fn connect(config: StorageConfig) -> StorageResult<Arc<dyn Storage>> {
    let storage: Arc<dyn Storage> = match config {
        StorageConfig::Local { root } => Arc::new(LocalStorage::init(root).await?),
        StorageConfig::S3(s3) => Arc::new(S3Storage::new(s3).await?),
    };
    Ok(storage)
}

/// Reject keys that could escape the storage root.
pub fn validate_key(key: &str) -> StorageResult<()> {
    if key.is_empty()
        || key.starts_with('/')
        || key.contains('\\')
        || key.split('/').any(|segment| segment == "..")
    {
        return Err(StorageError::invalid_key(key));
    }
    Ok(())
}

/// Content type for an artifact, from its extension.
pub fn content_type_for(key: &str) -> &'static str {
    match key.rsplit('.').next() {
        Some("m3u8") => "application/vnd.apple.mpegurl",
        Some("m4s") => "video/iso.segment",
        Some("mp4") => "video/mp4",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("json") => "application/json",
        _ => "application/octet-stream",
    }
}
