use std::fmt::Display;

use thiserror::Error;

pub type StorageResult<T> = Result<T, StorageError>;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage misconfigured: {0}")]
    Config(String),

    #[error("no object at {0}")]
    NotFound(String),

    #[error("rejected object key {0:?}")]
    InvalidKey(String),

    #[error("writing object failed: {0}")]
    Write(String),

    #[error("reading object failed: {0}")]
    Read(String),

    #[error("removing object failed: {0}")]
    Remove(String),

    #[error("listing objects failed: {0}")]
    List(String),

    #[error("storage backend unreachable: {0}")]
    Unreachable(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl StorageError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound(key.into())
    }

    pub fn invalid_key(key: impl Into<String>) -> Self {
        Self::InvalidKey(key.into())
    }

    // Backend failures, usable directly as `map_err(StorageError::write)`.

    pub fn write(err: impl Display) -> Self {
        Self::Write(err.to_string())
    }

    pub fn read(err: impl Display) -> Self {
        Self::Read(err.to_string())
    }

    pub fn remove(err: impl Display) -> Self {
        Self::Remove(err.to_string())
    }

    pub fn list(err: impl Display) -> Self {
        Self::List(err.to_string())
    }
}
