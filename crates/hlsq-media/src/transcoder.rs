//! HLS ladder transcoder.
//!
//! Artifacts for job `{id}` land in storage as:
//!
//! ```text
//! {id}/{label}/index.m3u8, init.mp4, seg_NNN.m4s   one directory per profile
//! {id}/master.m3u8
//! {id}/imgs/thumbnail.jpg, prev-N.jpg, preview.json
//! {id}/meta.json                                     written last
//! ```
//!
//! `meta.json` marks a finished encode. A job that already has one is
//! skipped, which makes re-running a recovered job harmless.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use hlsq_models::{JobId, ProfileList, ResolutionProfile};
use hlsq_storage::{content_type_for, Storage};

use crate::command::FfmpegRunner;
use crate::encode::{self, PASS_LOG_PREFIX};
use crate::error::{MediaError, MediaResult};
use crate::manifest::{self, PreviewSheet, VideoMeta};
use crate::progress::{ProgressSink, Step};

/// One transcoding job.
#[derive(Debug, Clone)]
pub struct TranscodeRequest {
    pub id: JobId,
    /// Local path of the uploaded source
    pub source: PathBuf,
    pub profiles: ProfileList,
}

/// What a successful call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranscodeOutcome {
    Encoded,
    /// `meta.json` was already present; nothing was done
    AlreadyEncoded,
}

/// Turns a source file into stored artifacts.
#[async_trait]
pub trait Transcoder: Send + Sync {
    async fn transcode(
        &self,
        request: &TranscodeRequest,
        progress: &dyn ProgressSink,
    ) -> MediaResult<TranscodeOutcome>;
}

/// Transcoder settings.
#[derive(Debug, Clone)]
pub struct TranscoderConfig {
    /// Scratch space; job `{id}` uses `{work_dir}/{id}`
    pub work_dir: PathBuf,
    /// FFmpeg `-hwaccel` value
    pub hwaccel: Option<String>,
    /// Kill any single FFmpeg run after this many seconds
    pub ffmpeg_timeout_secs: Option<u64>,
}

impl Default for TranscoderConfig {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from("data/tmp"),
            hwaccel: None,
            ffmpeg_timeout_secs: None,
        }
    }
}

/// Two-pass x264 encoder producing fMP4 HLS renditions.
pub struct HlsTranscoder {
    storage: Arc<dyn Storage>,
    config: TranscoderConfig,
    runner: FfmpegRunner,
}

impl HlsTranscoder {
    pub fn new(storage: Arc<dyn Storage>, config: TranscoderConfig) -> Self {
        let runner = match config.ffmpeg_timeout_secs {
            Some(secs) => FfmpegRunner::new().with_timeout(secs),
            None => FfmpegRunner::new(),
        };
        Self {
            storage,
            config,
            runner,
        }
    }

    /// Local directory holding a job's input and intermediate files.
    pub fn job_dir(&self, id: &JobId) -> PathBuf {
        self.config.work_dir.join(id.as_str())
    }

    fn scratch_dir(&self, id: &JobId) -> PathBuf {
        self.job_dir(id).join("out")
    }

    async fn encode(
        &self,
        request: &TranscodeRequest,
        scratch: &Path,
        progress: &dyn ProgressSink,
    ) -> MediaResult<()> {
        let id = &request.id;
        let hwaccel = self.config.hwaccel.as_deref();

        for profile in request.profiles.iter() {
            self.encode_rendition(request, profile, scratch, hwaccel, progress)
                .await?;
        }

        self.storage
            .put(
                &manifest::master_key(id),
                manifest::master_playlist(&request.profiles).into_bytes(),
                "application/vnd.apple.mpegurl",
            )
            .await?;

        progress.step(&Step::Thumbnails.to_string()).await;
        self.create_images(request, scratch).await?;

        progress.step(&Step::Finalizing.to_string()).await;
        let meta = VideoMeta {
            id: id.to_string(),
            sizes: request.profiles.labels(),
            file: request.source.to_string_lossy().to_string(),
        };
        self.storage
            .put(
                &manifest::meta_key(id),
                serde_json::to_vec_pretty(&meta)?,
                "application/json",
            )
            .await?;
        info!(job_id = %id, "Meta file written");
        Ok(())
    }

    async fn encode_rendition(
        &self,
        request: &TranscodeRequest,
        profile: &ResolutionProfile,
        scratch: &Path,
        hwaccel: Option<&str>,
        progress: &dyn ProgressSink,
    ) -> MediaResult<()> {
        let id = &request.id;
        let out_dir = scratch.join(profile.label);
        tokio::fs::create_dir_all(&out_dir).await?;

        progress.step(&Step::FirstPass(profile.label).to_string()).await;
        info!(job_id = %id, profile = profile.label, "Encoding first pass");
        self.runner
            .run(&encode::first_pass(&request.source, &out_dir, profile, hwaccel))
            .await?;

        progress.step(&Step::SecondPass(profile.label).to_string()).await;
        info!(job_id = %id, profile = profile.label, "Encoding second pass");
        self.runner
            .run(&encode::second_pass(&request.source, &out_dir, profile, hwaccel))
            .await?;

        progress.step(&Step::Uploading(profile.label).to_string()).await;
        let prefix = manifest::rendition_prefix(id, profile.label);
        let mut uploaded = 0usize;
        for (name, path) in files_in(&out_dir).await? {
            if name.starts_with(PASS_LOG_PREFIX) {
                continue;
            }
            let key = format!("{}/{}", prefix, name);
            self.storage
                .put_file(&path, &key, content_type_for(&name))
                .await?;
            uploaded += 1;
        }
        debug!(job_id = %id, profile = profile.label, files = uploaded, "Rendition uploaded");

        tokio::fs::remove_dir_all(&out_dir).await?;
        Ok(())
    }

    async fn create_images(&self, request: &TranscodeRequest, scratch: &Path) -> MediaResult<()> {
        let id = &request.id;
        let imgs = scratch.join("imgs");
        tokio::fs::create_dir_all(&imgs).await?;

        info!(job_id = %id, "Creating thumbnails and previews");
        let thumbnail = imgs.join("thumbnail.jpg");
        self.runner
            .run(&encode::thumbnail(&request.source, &thumbnail))
            .await?;
        self.storage
            .put_file(&thumbnail, &manifest::image_key(id, "thumbnail.jpg"), "image/jpeg")
            .await?;

        self.runner
            .run(&encode::preview_sheets(&request.source, &imgs))
            .await?;

        let mut sheets: Vec<(PreviewSheet, PathBuf)> = files_in(&imgs)
            .await?
            .into_iter()
            .filter_map(|(name, path)| {
                PreviewSheet::parse_file_name(&name).map(|n| (PreviewSheet::new(n), path))
            })
            .collect();
        sheets.sort_by_key(|(sheet, _)| sheet.id);

        for (sheet, path) in &sheets {
            self.storage
                .put_file(path, &manifest::image_key(id, &sheet.file_name()), "image/jpeg")
                .await?;
        }

        let index: Vec<PreviewSheet> = sheets.into_iter().map(|(sheet, _)| sheet).collect();
        self.storage
            .put(
                &manifest::image_key(id, "preview.json"),
                serde_json::to_vec(&index)?,
                "application/json",
            )
            .await?;
        info!(job_id = %id, sheets = index.len(), "Thumbnails and previews done");
        Ok(())
    }
}

#[async_trait]
impl Transcoder for HlsTranscoder {
    async fn transcode(
        &self,
        request: &TranscodeRequest,
        progress: &dyn ProgressSink,
    ) -> MediaResult<TranscodeOutcome> {
        let id = &request.id;
        if self.storage.exists(&manifest::meta_key(id)).await? {
            info!(job_id = %id, "Already encoded, skipping");
            return Ok(TranscodeOutcome::AlreadyEncoded);
        }
        if !tokio::fs::try_exists(&request.source).await? {
            return Err(MediaError::InputNotFound(request.source.clone()));
        }

        let scratch = self.scratch_dir(id);
        tokio::fs::create_dir_all(&scratch).await?;

        match self.encode(request, &scratch, progress).await {
            Ok(()) => {
                // Input included; the job is finished
                remove_dir(&self.job_dir(id)).await;
                Ok(TranscodeOutcome::Encoded)
            }
            Err(e) => {
                // Keep the input for the next attempt
                remove_dir(&scratch).await;
                Err(e)
            }
        }
    }
}

/// Regular files directly inside `dir`, by name.
async fn files_in(dir: &Path) -> MediaResult<Vec<(String, PathBuf)>> {
    let mut files = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_file() {
            files.push((entry.file_name().to_string_lossy().to_string(), entry.path()));
        }
    }
    files.sort();
    Ok(files)
}

async fn remove_dir(dir: &Path) {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => debug!("Removed {}", dir.display()),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove {}: {}", dir.display(), e),
    }
}
