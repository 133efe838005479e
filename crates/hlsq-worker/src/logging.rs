//! Per-job log context.

use tracing::{error, info, info_span, warn, Span};

use hlsq_models::{JobId, WorkerId};

/// Tags every line about one job with the job and worker ids.
#[derive(Debug, Clone)]
pub struct JobLogger {
    job: String,
    worker: String,
}

impl JobLogger {
    pub fn new(job_id: &JobId, worker_id: &WorkerId) -> Self {
        Self {
            job: job_id.to_string(),
            worker: worker_id.to_string(),
        }
    }

    pub fn log_start(&self, message: &str) {
        info!(job_id = %self.job, worker_id = %self.worker, "Claimed job: {}", message);
    }

    /// One line per transcoder step.
    pub fn log_progress(&self, step: &str) {
        info!(job_id = %self.job, worker_id = %self.worker, step, "Step finished");
    }

    pub fn log_warning(&self, message: &str) {
        warn!(job_id = %self.job, worker_id = %self.worker, "{}", message);
    }

    pub fn log_error(&self, message: &str) {
        error!(job_id = %self.job, worker_id = %self.worker, "Transcode failed: {}", message);
    }

    pub fn log_completion(&self, message: &str) {
        info!(job_id = %self.job, worker_id = %self.worker, "Job done: {}", message);
    }

    pub fn span(&self) -> Span {
        info_span!("job", job_id = %self.job, worker_id = %self.worker)
    }
}

