//! Queue error types.

use thiserror::Error;

use hlsq_models::{JobId, ValidationError};

pub type QueueResult<T> = Result<T, QueueError>;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Job already exists: {0}")]
    AlreadyExists(JobId),

    #[error("Job not found: {0}")]
    NotFound(JobId),

    #[error("Concurrent update conflict on job {0}")]
    Conflict(JobId),

    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl QueueError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    /// Errors the submitter caused and can fix; nothing was written.
    pub fn is_validation(&self) -> bool {
        matches!(self, QueueError::Validation(_) | QueueError::AlreadyExists(_))
    }

    /// Errors from the shared backend being unreachable or misbehaving.
    pub fn is_store_unavailable(&self) -> bool {
        matches!(self, QueueError::Store(_) | QueueError::Redis(_))
    }
}
