//! Storage configuration.

use std::path::PathBuf;

use crate::error::{StorageError, StorageResult};

/// Configuration for the S3 backend.
#[derive(Debug, Clone)]
pub struct S3Config {
    /// S3 API endpoint; AWS regional endpoint when unset
    pub endpoint_url: Option<String>,
    /// Access key ID
    pub access_key_id: String,
    /// Secret access key
    pub secret_access_key: String,
    /// Bucket name
    pub bucket_name: String,
    /// Region ("auto" for R2)
    pub region: String,
}

impl S3Config {
    /// Create config from environment variables.
    pub fn from_env() -> StorageResult<Self> {
        Ok(Self {
            endpoint_url: std::env::var("S3_ENDPOINT_URL").ok().filter(|s| !s.is_empty()),
            access_key_id: std::env::var("S3_ACCESS_KEY_ID")
                .map_err(|_| StorageError::config("S3_ACCESS_KEY_ID not set"))?,
            secret_access_key: std::env::var("S3_SECRET_ACCESS_KEY")
                .map_err(|_| StorageError::config("S3_SECRET_ACCESS_KEY not set"))?,
            bucket_name: std::env::var("S3_BUCKET_NAME")
                .map_err(|_| StorageError::config("S3_BUCKET_NAME not set"))?,
            region: std::env::var("S3_REGION").unwrap_or_else(|_| "us-east-1".to_string()),
        })
    }

    /// Endpoint to talk to.
    pub fn endpoint(&self) -> String {
        self.endpoint_url
            .clone()
            .unwrap_or_else(|| format!("https://s3.{}.amazonaws.com", self.region))
    }
}

/// Which backend artifacts are written to.
#[derive(Debug, Clone)]
pub enum StorageConfig {
    /// Files under a local directory
    Local { root: PathBuf },
    /// Objects in an S3 bucket
    S3(S3Config),
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::Local {
            root: PathBuf::from("data"),
        }
    }
}

impl StorageConfig {
    /// Create config from environment variables.
    pub fn from_env() -> StorageResult<Self> {
        match std::env::var("STORAGE_MODE").as_deref() {
            Ok("local") | Err(_) => Ok(Self::Local {
                root: std::env::var("STORAGE_DATA_DIR")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| PathBuf::from("data")),
            }),
            Ok("s3") => Ok(Self::S3(S3Config::from_env()?)),
            Ok(other) => Err(StorageError::config(format!(
                "invalid STORAGE_MODE: {}",
                other
            ))),
        }
    }

    pub fn mode(&self) -> &'static str {
        match self {
            Self::Local { .. } => "local",
            Self::S3(_) => "s3",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_endpoint_uses_region() {
        let config = S3Config {
            endpoint_url: None,
            access_key_id: "k".into(),
            secret_access_key: "s".into(),
            bucket_name: "b".into(),
            region: "eu-west-1".into(),
        };
        assert_eq!(config.endpoint(), "https://s3.eu-west-1.amazonaws.com");

        let minio = S3Config {
            endpoint_url: Some("http://localhost:9000".into()),
            ..config
        };
        assert_eq!(minio.endpoint(), "http://localhost:9000");
    }
}
