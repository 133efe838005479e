//! API routes.

use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::limit::RequestBodyLimitLayer;

use crate::handlers::queue::{cleanup_queue, get_queue, recover_queue};
use crate::handlers::upload::upload;
use crate::handlers::videos::{delete_video, get_video};
use crate::handlers::{health, ready};
use crate::metrics::metrics_middleware;
use crate::middleware::{require_api_key, trace_request};
use crate::state::AppState;

/// Create the API router.
pub fn create_router(state: AppState, metrics_handle: Option<PrometheusHandle>) -> Router {
    let api_routes = Router::new()
        .route("/upload", post(upload))
        .route("/queue", get(get_queue))
        .route("/queue/recover", post(recover_queue))
        .route("/queue/cleanup", post(cleanup_queue))
        .route("/videos/:id", get(get_video).delete(delete_video))
        .layer(middleware::from_fn_with_state(state.clone(), require_api_key));

    let health_routes = Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready));

    let metrics_routes = if let Some(handle) = metrics_handle {
        Router::new().route("/metrics", get(move || async move { handle.render() }))
    } else {
        Router::new()
    };

    Router::new()
        .nest("/api", api_routes)
        .merge(health_routes)
        .merge(metrics_routes)
        // Uploads are bounded by MAX_BODY_SIZE instead of axum's 2MB default
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(state.config.max_body_size))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn(trace_request))
        .with_state(state)
}
