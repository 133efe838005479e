//! Queue inspection and maintenance.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use tracing::info;

use hlsq_models::JobRecord;

use crate::error::ApiResult;
use crate::metrics;
use crate::state::AppState;

#[derive(Serialize)]
pub struct QueueResponse {
    /// Every job record, oldest first
    pub queue: Vec<JobRecord>,
    /// Ids waiting in the dispatch list
    pub pending: usize,
}

/// Snapshot of every job.
pub async fn get_queue(State(state): State<AppState>) -> ApiResult<Json<QueueResponse>> {
    let queue = state.queue.snapshot().await?;
    let pending = state.queue.dispatch().len().await?;
    metrics::set_queue_length(pending);

    Ok(Json(QueueResponse { queue, pending }))
}

/// Run one recovery sweep now.
pub async fn recover_queue(State(state): State<AppState>) -> ApiResult<StatusCode> {
    let report = state.queue.trigger_recovery().await?;
    info!(recovered = report.recovered, failed = report.failed, "Manual recovery finished");
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Serialize)]
pub struct CleanupResponse {
    pub removed: usize,
}

/// Remove finished and failed job records.
pub async fn cleanup_queue(State(state): State<AppState>) -> ApiResult<Json<CleanupResponse>> {
    let removed = state.queue.collect_garbage().await?;
    metrics::record_jobs_collected(removed);
    Ok(Json(CleanupResponse { removed }))
}
