//! Filesystem storage rooted at a data directory.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, info};

use crate::error::{StorageError, StorageResult};
use crate::{validate_key, Storage};

/// Stores objects as files under `root`.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    /// Create the root directory if needed.
    pub async fn init(root: impl Into<PathBuf>) -> StorageResult<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;
        info!("Local storage at {}", root.display());
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path(&self, key: &str) -> StorageResult<PathBuf> {
        validate_key(key)?;
        Ok(self.root.join(key))
    }

    async fn ensure_parent(path: &Path) -> StorageResult<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Storage for LocalStorage {
    async fn exists(&self, key: &str) -> StorageResult<bool> {
        let path = self.path(key)?;
        Ok(tokio::fs::try_exists(&path).await?)
    }

    async fn get(&self, key: &str) -> StorageResult<Vec<u8>> {
        let path = self.path(key)?;
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StorageError::not_found(key)),
            Err(e) => Err(StorageError::read(e)),
        }
    }

    async fn put(&self, key: &str, data: Vec<u8>, _content_type: &str) -> StorageResult<()> {
        let path = self.path(key)?;
        Self::ensure_parent(&path).await?;
        debug!("Writing {} bytes to {}", data.len(), path.display());
        tokio::fs::write(&path, data)
            .await
            .map_err(StorageError::write)
    }

    async fn put_file(&self, source: &Path, key: &str, _content_type: &str) -> StorageResult<()> {
        let path = self.path(key)?;
        Self::ensure_parent(&path).await?;
        debug!("Copying {} to {}", source.display(), path.display());
        tokio::fs::copy(source, &path)
            .await
            .map_err(|e| StorageError::write(format!("{}: {}", source.display(), e)))?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        let path = self.path(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StorageError::not_found(key)),
            Err(e) => Err(StorageError::remove(e)),
        }
    }

    async fn delete_dir(&self, prefix: &str) -> StorageResult<()> {
        let path = self.path(prefix.trim_end_matches('/'))?;
        match tokio::fs::remove_dir_all(&path).await {
            Ok(()) => {
                info!("Deleted {}", path.display());
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::remove(e)),
        }
    }

    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>> {
        let start = self.path(prefix.trim_end_matches('/'))?;
        let mut keys = Vec::new();
        let mut pending = vec![start];

        while let Some(dir) = pending.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(StorageError::list(e)),
            };
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if entry.file_type().await?.is_dir() {
                    pending.push(path);
                } else if let Ok(relative) = path.strip_prefix(&self.root) {
                    let key: Vec<_> = relative
                        .components()
                        .map(|c| c.as_os_str().to_string_lossy())
                        .collect();
                    keys.push(key.join("/"));
                }
            }
        }

        keys.sort();
        Ok(keys)
    }

    async fn check_connectivity(&self) -> StorageResult<()> {
        tokio::fs::metadata(&self.root).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn storage() -> (tempfile::TempDir, LocalStorage) {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::init(dir.path().join("data")).await.unwrap();
        (dir, storage)
    }

    #[tokio::test]
    async fn test_put_get_creates_parents() {
        let (_dir, storage) = storage().await;
        storage
            .put("vid1/720p/index.m3u8", b"#EXTM3U".to_vec(), "application/vnd.apple.mpegurl")
            .await
            .unwrap();

        assert!(storage.exists("vid1/720p/index.m3u8").await.unwrap());
        assert_eq!(storage.get("vid1/720p/index.m3u8").await.unwrap(), b"#EXTM3U");
    }

    #[tokio::test]
    async fn test_missing_object() {
        let (_dir, storage) = storage().await;
        assert!(!storage.exists("vid1/meta.json").await.unwrap());
        assert!(matches!(
            storage.get("vid1/meta.json").await,
            Err(StorageError::NotFound(_))
        ));
        assert!(matches!(
            storage.delete("vid1/meta.json").await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_put_file_copies_source() {
        let (dir, storage) = storage().await;
        let source = dir.path().join("seg_000.m4s");
        tokio::fs::write(&source, b"segment").await.unwrap();

        storage
            .put_file(&source, "vid1/480p/seg_000.m4s", "video/iso.segment")
            .await
            .unwrap();
        assert_eq!(storage.get("vid1/480p/seg_000.m4s").await.unwrap(), b"segment");
    }

    #[tokio::test]
    async fn test_list_and_delete_dir() {
        let (_dir, storage) = storage().await;
        for key in ["vid1/meta.json", "vid1/720p/index.m3u8", "vid1/imgs/prev-1.jpg", "vid2/meta.json"] {
            storage.put(key, b"x".to_vec(), "application/octet-stream").await.unwrap();
        }

        let keys = storage.list("vid1/").await.unwrap();
        assert_eq!(
            keys,
            vec!["vid1/720p/index.m3u8", "vid1/imgs/prev-1.jpg", "vid1/meta.json"]
        );

        storage.delete_dir("vid1").await.unwrap();
        assert!(storage.list("vid1").await.unwrap().is_empty());
        assert!(storage.exists("vid2/meta.json").await.unwrap());

        // Already gone
        storage.delete_dir("vid1").await.unwrap();
    }

    #[tokio::test]
    async fn test_rejects_escaping_keys() {
        let (_dir, storage) = storage().await;
        assert!(matches!(
            storage.put("../outside", b"x".to_vec(), "text/plain").await,
            Err(StorageError::InvalidKey(_))
        ));
        assert!(matches!(
            storage.delete_dir("vid1/../..").await,
            Err(StorageError::InvalidKey(_))
        ));
    }
}
