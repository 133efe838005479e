//! Bucket-backed storage for AWS S3, MinIO, R2 and other compatible services.

use std::path::Path;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{Delete, ObjectIdentifier};
use aws_sdk_s3::Client;
use tracing::{debug, info};

use crate::config::S3Config;
use crate::error::{StorageError, StorageResult};
use crate::{validate_key, Storage};

/// Upper bound on keys per DeleteObjects call.
const DELETE_BATCH: usize = 1000;

#[derive(Clone)]
pub struct S3Storage {
    client: Client,
    bucket: String,
}

impl S3Storage {
    pub async fn new(config: S3Config) -> StorageResult<Self> {
        let endpoint = config.endpoint();
        let credentials = Credentials::new(
            config.access_key_id.as_str(),
            config.secret_access_key.as_str(),
            None,
            None,
            "hlsq",
        );
        // Path-style addressing keeps MinIO and other self-hosted endpoints working.
        let client_config = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(config.region))
            .endpoint_url(&endpoint)
            .credentials_provider(credentials)
            .force_path_style(true)
            .build();

        info!(bucket = %config.bucket_name, %endpoint, "Using S3 storage");
        Ok(Self {
            client: Client::from_conf(client_config),
            bucket: config.bucket_name,
        })
    }

    pub async fn from_env() -> StorageResult<Self> {
        Self::new(S3Config::from_env()?).await
    }

    async fn upload(&self, key: &str, body: ByteStream, content_type: &str) -> StorageResult<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(body)
            .send()
            .await
            .map_err(StorageError::write)?;
        Ok(())
    }

    async fn delete_many(&self, keys: &[String]) -> StorageResult<()> {
        let mut objects = Vec::with_capacity(keys.len());
        for key in keys {
            objects.push(ObjectIdentifier::builder().key(key).build().map_err(StorageError::remove)?);
        }
        let request = Delete::builder()
            .set_objects(Some(objects))
            .quiet(true)
            .build()
            .map_err(StorageError::remove)?;

        self.client
            .delete_objects()
            .bucket(&self.bucket)
            .delete(request)
            .send()
            .await
            .map_err(StorageError::remove)?;
        Ok(())
    }
}

#[async_trait]
impl Storage for S3Storage {
    async fn exists(&self, key: &str) -> StorageResult<bool> {
        validate_key(key)?;
        let head = self.client.head_object().bucket(&self.bucket).key(key).send().await;
        match head {
            Ok(_) => Ok(true),
            Err(e) if e.as_service_error().is_some_and(|se| se.is_not_found()) => Ok(false),
            Err(e) => Err(StorageError::read(e)),
        }
    }

    async fn get(&self, key: &str) -> StorageResult<Vec<u8>> {
        validate_key(key)?;
        debug!(key, "Fetching object");

        let object = match self.client.get_object().bucket(&self.bucket).key(key).send().await {
            Ok(object) => object,
            Err(e) if e.as_service_error().is_some_and(|se| se.is_no_such_key()) => {
                return Err(StorageError::not_found(key))
            }
            Err(e) => return Err(StorageError::read(e)),
        };
        let data = object.body.collect().await.map_err(StorageError::read)?;
        Ok(data.into_bytes().to_vec())
    }

    async fn put(&self, key: &str, data: Vec<u8>, content_type: &str) -> StorageResult<()> {
        validate_key(key)?;
        debug!(key, size = data.len(), "Storing object");
        self.upload(key, ByteStream::from(data), content_type).await
    }

    async fn put_file(&self, path: &Path, key: &str, content_type: &str) -> StorageResult<()> {
        validate_key(key)?;
        debug!(key, file = %path.display(), "Storing file");
        let body = ByteStream::from_path(path).await.map_err(StorageError::write)?;
        self.upload(key, body, content_type).await
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        validate_key(key)?;
        debug!(key, "Removing object");
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(StorageError::remove)?;
        Ok(())
    }

    async fn delete_dir(&self, prefix: &str) -> StorageResult<()> {
        let keys = self.list(prefix).await?;
        for chunk in keys.chunks(DELETE_BATCH) {
            self.delete_many(chunk).await?;
        }
        info!(prefix, removed = keys.len(), "Removed objects under prefix");
        Ok(())
    }

    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>> {
        validate_key(prefix)?;
        // "vid1" must not match "vid10/..."
        let prefix = format!("{}/", prefix.trim_end_matches('/'));

        let mut pages = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(&prefix)
            .into_paginator()
            .send();

        let mut keys = Vec::new();
        while let Some(page) = pages.next().await {
            let page = page.map_err(StorageError::list)?;
            keys.extend(page.contents().iter().filter_map(|o| o.key().map(str::to_string)));
        }
        debug!(%prefix, count = keys.len(), "Listed objects");
        Ok(keys)
    }

    async fn check_connectivity(&self) -> StorageResult<()> {
        self.client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .map(|_| ())
            .map_err(|e| StorageError::Unreachable(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_new_uses_static_keys_without_network() {
        let config = S3Config {
            endpoint_url: Some("http://127.0.0.1:9000".to_string()),
            access_key_id: "minio".to_string(),
            secret_access_key: "minio-secret".to_string(),
            bucket_name: "videos".to_string(),
            region: "us-east-1".to_string(),
        };

        let storage = S3Storage::new(config).await.unwrap();
        assert_eq!(storage.bucket, "videos");
        let client_config = storage.client.config();
        assert_eq!(client_config.region().map(|r| r.as_ref()), Some("us-east-1"));
        assert!(client_config.credentials_provider().is_some());
    }
}
