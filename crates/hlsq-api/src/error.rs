//! Errors returned by handlers and their JSON rendering.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use hlsq_models::ValidationError;
use hlsq_queue::QueueError;
use hlsq_storage::StorageError;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Internal(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

impl ApiError {
    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// HTTP status and the machine-readable `code` sent with it.
    fn classify(&self) -> (StatusCode, &'static str) {
        use StatusCode as S;
        match self {
            Self::Unauthorized(_) => (S::UNAUTHORIZED, "unauthorized"),
            Self::NotFound(_) => (S::NOT_FOUND, "not_found"),
            Self::BadRequest(_) => (S::BAD_REQUEST, "bad_request"),
            Self::Validation(_) => (S::BAD_REQUEST, "validation_error"),
            Self::Queue(e) => match e {
                QueueError::Validation(_) => (S::BAD_REQUEST, "validation_error"),
                QueueError::AlreadyExists(_) => (S::BAD_REQUEST, "already_exists"),
                QueueError::NotFound(_) => (S::NOT_FOUND, "not_found"),
                QueueError::Conflict(_) => (S::CONFLICT, "conflict"),
                e if e.is_store_unavailable() => (S::SERVICE_UNAVAILABLE, "store_unavailable"),
                _ => (S::INTERNAL_SERVER_ERROR, "internal_error"),
            },
            Self::Storage(e) => match e {
                StorageError::NotFound(_) => (S::NOT_FOUND, "not_found"),
                StorageError::InvalidKey(_) => (S::BAD_REQUEST, "bad_request"),
                StorageError::Unreachable(_) => (S::SERVICE_UNAVAILABLE, "storage_unavailable"),
                _ => (S::INTERNAL_SERVER_ERROR, "internal_error"),
            },
            Self::Internal(_) | Self::Config(_) | Self::Io(_) => {
                (S::INTERNAL_SERVER_ERROR, "internal_error")
            }
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    detail: String,
    code: &'static str,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.classify();

        let detail = if let Self::Queue(QueueError::AlreadyExists(_)) = &self {
            "id already exists".to_string()
        } else if status.is_server_error() {
            tracing::error!(status = status.as_u16(), code, "Request failed: {}", self);
            // Production clients only see the code
            let production = std::env::var("ENVIRONMENT")
                .map(|env| env.eq_ignore_ascii_case("production"))
                .unwrap_or(false);
            if production {
                "internal error".to_string()
            } else {
                self.to_string()
            }
        } else {
            self.to_string()
        };

        (status, Json(ErrorBody { detail, code })).into_response()
    }
}
