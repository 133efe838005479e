//! FFmpeg-driven HLS transcoding.
//!
//! This crate provides:
//! - FFmpeg command building and execution
//! - The [`Transcoder`] and [`ProgressSink`] seams used by the worker
//! - [`HlsTranscoder`]: two-pass renditions, master playlist, thumbnail,
//!   preview sprite sheets and the `meta.json` completion marker

pub mod command;
pub mod encode;
pub mod error;
pub mod manifest;
pub mod progress;
pub mod transcoder;

pub use command::{check_ffmpeg, FfmpegCommand, FfmpegRunner};
pub use error::{MediaError, MediaResult};
pub use manifest::{PreviewSheet, VideoMeta};
pub use progress::{NoProgress, ProgressSink, Step};
pub use transcoder::{HlsTranscoder, TranscodeOutcome, TranscodeRequest, Transcoder, TranscoderConfig};
