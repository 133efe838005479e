//! Axum HTTP API server.
//!
//! This crate provides:
//! - Upload and submission of videos to the transcoding queue
//! - Queue snapshot, manual recovery and cleanup endpoints
//! - Artifact lookup and deletion
//! - Scheduled recovery sweeps and finished-job collection
//! - Prometheus metrics

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod scheduler;
pub mod state;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
