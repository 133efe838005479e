use std::path::PathBuf;

use thiserror::Error;

use hlsq_storage::StorageError;

pub type MediaResult<T> = Result<T, MediaError>;

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("ffmpeg binary not found on PATH")]
    FfmpegNotFound,

    /// `stderr` keeps the last lines FFmpeg printed, when they were captured.
    #[error("ffmpeg failed ({what}){}", stderr.as_deref().map(|s| format!(": {s}")).unwrap_or_default())]
    FfmpegFailed {
        what: String,
        stderr: Option<String>,
        exit_code: Option<i32>,
    },

    #[error("source video {0} does not exist")]
    InputNotFound(PathBuf),

    #[error("ffmpeg killed after {0}s")]
    Timeout(u64),

    #[error("publishing artifacts: {0}")]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("serializing artifact document: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Internal(String),
}

impl MediaError {
    pub fn ffmpeg_failed(
        what: impl Into<String>,
        stderr: Option<String>,
        exit_code: Option<i32>,
    ) -> Self {
        Self::FfmpegFailed {
            what: what.into(),
            stderr,
            exit_code,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }
}
