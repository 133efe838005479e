use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

/// Failures that stop the worker from handling a job.
///
/// Transcoder errors never surface here; they are recorded on the job and
/// fed to the retry policy instead.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("job store: {0}")]
    Queue(#[from] hlsq_queue::QueueError),
}
