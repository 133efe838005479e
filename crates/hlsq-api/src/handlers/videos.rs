//! Encoded video artifacts.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use tracing::info;

use hlsq_media::manifest::meta_key;
use hlsq_media::VideoMeta;
use hlsq_models::JobId;
use hlsq_storage::StorageError;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// `meta.json` of a finished video.
pub async fn get_video(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<VideoMeta>> {
    let id = JobId::parse(id)?;
    let raw = match state.storage.get(&meta_key(&id)).await {
        Ok(raw) => raw,
        Err(StorageError::NotFound(_)) => return Err(ApiError::not_found("video not found")),
        Err(e) => return Err(e.into()),
    };
    let meta: VideoMeta = serde_json::from_slice(&raw)
        .map_err(|e| ApiError::internal(format!("corrupt meta.json for {}: {}", id, e)))?;
    Ok(Json(meta))
}

/// Delete every artifact of a finished video.
///
/// The completion marker goes first, so a partial delete never leaves a
/// video that looks finished.
pub async fn delete_video(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let id = JobId::parse(id)?;
    let meta = meta_key(&id);
    if !state.storage.exists(&meta).await? {
        return Err(ApiError::not_found("video not found"));
    }

    state.storage.delete(&meta).await?;
    state.storage.delete_dir(id.as_str()).await?;
    info!(video_id = %id, "Deleted video artifacts");
    Ok(StatusCode::NO_CONTENT)
}
