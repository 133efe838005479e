//! Step labels reported while a job is transcoding.

use std::fmt;

use async_trait::async_trait;

/// Coarse transcoding stage, rendered as the job's `step` label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step<'a> {
    FirstPass(&'a str),
    SecondPass(&'a str),
    Uploading(&'a str),
    Thumbnails,
    Finalizing,
}

impl fmt::Display for Step<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::FirstPass(label) => write!(f, "encoding_first_pass:{}", label),
            Step::SecondPass(label) => write!(f, "encoding_second_pass:{}", label),
            Step::Uploading(label) => write!(f, "uploading:{}", label),
            Step::Thumbnails => f.write_str("thumbnails"),
            Step::Finalizing => f.write_str("finalizing"),
        }
    }
}

/// Receives step labels. Implementations must not fail the transcode.
#[async_trait]
pub trait ProgressSink: Send + Sync {
    async fn step(&self, step: &str);
}

/// Discards progress.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

#[async_trait]
impl ProgressSink for NoProgress {
    async fn step(&self, _step: &str) {}
}
