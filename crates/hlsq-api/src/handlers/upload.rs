//! Upload and submission of new videos.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use axum::extract::multipart::Field;
use axum::extract::{Multipart, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};
use uuid::Uuid;
use validator::Validate;

use hlsq_media::manifest::meta_key;
use hlsq_models::{JobId, JobStatus, ProfileList};
use hlsq_queue::QueueError;

use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::state::AppState;

/// Multipart field carrying the source video.
pub const FILE_FIELD: &str = "file";

/// Name of the uploaded source inside the job's work directory.
pub const INPUT_FILE: &str = "input";

#[derive(Debug, Deserialize, Validate)]
pub struct UploadQuery {
    #[validate(length(min = 1, max = 64))]
    pub id: String,

    /// Comma-separated profile labels, e.g. `720p,480p`
    #[validate(length(min = 1))]
    pub profiles: String,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub id: String,
    pub profiles: Vec<String>,
    pub status: JobStatus,
}

/// Path the worker reads the source of `id` from.
pub fn input_path(work_dir: &Path, id: &JobId) -> PathBuf {
    work_dir.join(id.as_str()).join(INPUT_FILE)
}

/// `POST /api/upload?id=..&profiles=..` with the video in the `file` field.
///
/// Ids are checked against existing artifacts and known jobs before any
/// bytes are written; concurrent uploads of a new id are settled when the
/// staged file is claimed as the job input.
pub async fn upload(
    State(state): State<AppState>,
    Query(query): Query<UploadQuery>,
    mut multipart: Multipart,
) -> ApiResult<(StatusCode, Json<UploadResponse>)> {
    query
        .validate()
        .map_err(|e| ApiError::bad_request(e.to_string()))?;
    let id = JobId::parse(query.id)?;
    let profiles = ProfileList::parse(&query.profiles)?;

    if state.storage.exists(&meta_key(&id)).await? || state.queue.jobs().is_taken(&id).await? {
        return Err(QueueError::AlreadyExists(id).into());
    }

    let path = input_path(&state.config.work_dir, &id);
    let mut staged = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(e.to_string()))?
    {
        if field.name() == Some(FILE_FIELD) {
            staged = Some(stage_field(field, &path).await?);
            break;
        }
    }
    let Some((partial, bytes)) = staged else {
        return Err(ApiError::bad_request("file is required"));
    };
    claim_input(&partial, &path, &id).await?;
    info!(job_id = %id, bytes, "Stored upload");

    let source = path.to_string_lossy().into_owned();
    let submitted = state.queue.submit(id.as_str(), &source, profiles.labels()).await;
    let id = match submitted {
        Ok(id) => id,
        Err(e) => {
            // The linked input belongs to this request alone
            discard(&path).await;
            return Err(e.into());
        }
    };

    metrics::record_job_submitted();
    Ok((
        StatusCode::CREATED,
        Json(UploadResponse {
            id: id.to_string(),
            profiles: profiles.labels(),
            status: JobStatus::Waiting,
        }),
    ))
}

/// Stream a multipart field into a staging file next to `path`, private to
/// this request. Returns the staging path and the byte count.
async fn stage_field(mut field: Field<'_>, path: &Path) -> ApiResult<(PathBuf, u64)> {
    if let Some(dir) = path.parent() {
        tokio::fs::create_dir_all(dir).await?;
    }
    let partial = path.with_file_name(format!("{}.{}.part", INPUT_FILE, Uuid::new_v4()));

    let result = async {
        let mut file = tokio::fs::File::create(&partial).await?;
        let mut written = 0u64;
        while let Some(chunk) = field
            .chunk()
            .await
            .map_err(|e| ApiError::bad_request(e.to_string()))?
        {
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        if written == 0 {
            return Err(ApiError::bad_request("file is empty"));
        }
        Ok::<u64, ApiError>(written)
    }
    .await;

    match result {
        Ok(written) => Ok((partial, written)),
        Err(e) => {
            discard(&partial).await;
            Err(e)
        }
    }
}

/// Publish a staged upload as the job input. The link fails when the input
/// already exists, so of two uploads racing for one id exactly one wins and
/// the other never touches its bytes.
async fn claim_input(partial: &Path, path: &Path, id: &JobId) -> ApiResult<()> {
    let linked = tokio::fs::hard_link(partial, path).await;
    discard(partial).await;
    match linked {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
            warn!(job_id = %id, "Upload lost the race for its id");
            Err(QueueError::AlreadyExists(id.clone()).into())
        }
        Err(e) => Err(e.into()),
    }
}

async fn discard(file: &Path) {
    if let Err(e) = tokio::fs::remove_file(file).await {
        warn!("Failed to remove upload file {}: {}", file.display(), e);
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[tokio::test]
    async fn test_claim_input_keeps_the_first_upload() {
        let dir = TempDir::new().unwrap();
        let id = JobId::parse("vid1").unwrap();
        let path = input_path(dir.path(), &id);
        tokio::fs::create_dir_all(path.parent().unwrap()).await.unwrap();

        // Both uploads finish streaming before either is claimed
        let first = path.with_file_name("input.first.part");
        let second = path.with_file_name("input.second.part");
        tokio::fs::write(&first, b"AAAAAAAA").await.unwrap();
        tokio::fs::write(&second, b"BBBBBBBB").await.unwrap();

        claim_input(&first, &path, &id).await.unwrap();
        let err = claim_input(&second, &path, &id).await.unwrap_err();

        assert!(matches!(err, ApiError::Queue(QueueError::AlreadyExists(_))));
        assert_eq!(tokio::fs::read(&path).await.unwrap(), b"AAAAAAAA");
        assert!(!first.exists());
        assert!(!second.exists());
    }
}
