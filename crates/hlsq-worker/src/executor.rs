//! Job executor: the per-worker processing loop.
//!
//! One iteration takes the next id off the dispatch queue, claims the job
//! (`Waiting -> Processing` under this worker), runs the transcoder and
//! finalizes the record. Finalization only applies while this worker still
//! owns the job; if a recovery sweep took it away in the meantime the
//! recovered state is left alone.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn, Instrument};

use hlsq_media::{ProgressSink, TranscodeOutcome, TranscodeRequest, Transcoder};
use hlsq_models::{JobId, JobRecord, WorkerId};
use hlsq_queue::{JobQueue, ProgressReporter, QueueError, RetryDecision, RetryPolicy};

use crate::config::WorkerConfig;
use crate::error::WorkerResult;
use crate::logging::JobLogger;
use crate::metrics;

/// Attempts at writing a final status before giving up on it.
const FINALIZE_ATTEMPTS: u32 = 5;

/// What happened to one dequeued job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    /// Marked `Done`
    Completed,
    /// Failed, back to `Waiting` and re-enqueued
    Requeued { attempts: u32 },
    /// Failed for good
    Failed { attempts: u32 },
    /// Record missing or not `Waiting`; nothing was run
    Skipped,
    /// Ran, but the lease was lost before the result could be written
    LeaseLost,
}

/// Writes transcoder steps to the job record.
struct RecordProgress {
    reporter: ProgressReporter,
    job_id: JobId,
    worker_id: WorkerId,
    logger: JobLogger,
}

#[async_trait]
impl ProgressSink for RecordProgress {
    async fn step(&self, step: &str) {
        self.logger.log_progress(step);
        self.reporter.report(&self.job_id, &self.worker_id, step).await;
    }
}

/// Job executor that processes jobs from the queue, one at a time.
pub struct JobExecutor {
    config: WorkerConfig,
    queue: JobQueue,
    transcoder: Arc<dyn Transcoder>,
    worker_id: WorkerId,
    policy: RetryPolicy,
}

impl JobExecutor {
    /// `worker_id` must be the id whose heartbeat this process keeps alive.
    pub fn new(
        config: WorkerConfig,
        queue: JobQueue,
        transcoder: Arc<dyn Transcoder>,
        worker_id: WorkerId,
    ) -> Self {
        Self {
            config,
            queue,
            transcoder,
            worker_id,
            policy: RetryPolicy,
        }
    }

    pub fn worker_id(&self) -> &WorkerId {
        &self.worker_id
    }

    /// Process jobs until `cancel` fires.
    ///
    /// Cancellation is checked between jobs; a job already running is
    /// finished before this returns.
    pub async fn run(&self, cancel: CancellationToken) -> WorkerResult<()> {
        info!(worker_id = %self.worker_id, "Starting job executor");

        while !cancel.is_cancelled() {
            if let Err(e) = self.process_next().await {
                error!(worker_id = %self.worker_id, "Processing loop error: {}", e);
                metrics::record_store_error();
                if !self.config.store_error_backoff.is_zero() {
                    tokio::select! {
                        _ = cancel.cancelled() => {}
                        _ = tokio::time::sleep(self.config.store_error_backoff) => {}
                    }
                }
            }
        }

        info!(worker_id = %self.worker_id, "Job executor stopped");
        Ok(())
    }

    /// One loop iteration. Returns `None` when no job arrived within the
    /// queue's poll window.
    pub async fn process_next(&self) -> WorkerResult<Option<(JobId, JobOutcome)>> {
        let poll = self.queue.config().pop_timeout;
        let Some(id) = self.queue.dispatch().dequeue_timeout(poll).await? else {
            return Ok(None);
        };
        let outcome = self.process_job(id.clone()).await?;
        Ok(Some((id, outcome)))
    }

    /// Claim, run and finalize one dequeued job.
    pub async fn process_job(&self, id: JobId) -> WorkerResult<JobOutcome> {
        let record = match self.claim(&id).await? {
            Some(record) => record,
            None => return Ok(JobOutcome::Skipped),
        };

        let logger = JobLogger::new(&id, &self.worker_id);
        let span = logger.span();
        logger.log_start(&format!(
            "profiles {} (attempt {})",
            record.profiles,
            record.attempts + 1
        ));
        metrics::record_job_started();

        let request = TranscodeRequest {
            id: id.clone(),
            source: PathBuf::from(&record.source),
            profiles: record.profiles.clone(),
        };
        let progress = RecordProgress {
            reporter: self.queue.progress().clone(),
            job_id: id.clone(),
            worker_id: self.worker_id.clone(),
            logger: logger.clone(),
        };

        let result = self
            .transcoder
            .transcode(&request, &progress)
            .instrument(span.clone())
            .await;

        match result {
            Ok(outcome) => self.finish_success(&id, outcome, &logger).instrument(span).await,
            Err(e) => {
                logger.log_error(&e.to_string());
                self.finish_failure(&id, &logger).instrument(span).await
            }
        }
    }

    /// `Waiting -> Processing` under this worker.
    async fn claim(&self, id: &JobId) -> WorkerResult<Option<JobRecord>> {
        match self.queue.jobs().update(id, |r| r.claim(&self.worker_id)).await {
            Ok(Some(record)) => Ok(Some(record)),
            Ok(None) => {
                warn!(job_id = %id, "Dispatched job is not waiting, skipping");
                metrics::record_job_skipped("not_waiting");
                Ok(None)
            }
            Err(QueueError::NotFound(_)) => {
                warn!(job_id = %id, "Dispatched job has no record, skipping");
                metrics::record_job_skipped("missing");
                Ok(None)
            }
            Err(e) => {
                // The id is already off the list; put it back so it is not stranded.
                if let Err(requeue) = self.queue.dispatch().enqueue(id).await {
                    error!(job_id = %id, "Failed to return unclaimed job to the queue: {}", requeue);
                }
                Err(e.into())
            }
        }
    }

    async fn finish_success(
        &self,
        id: &JobId,
        outcome: TranscodeOutcome,
        logger: &JobLogger,
    ) -> WorkerResult<JobOutcome> {
        let updated = self
            .finalize(id, |record| {
                record.complete();
                true
            })
            .await?;

        if updated.is_none() {
            logger.log_warning("lease lost before completion could be recorded");
            metrics::record_lease_lost();
            return Ok(JobOutcome::LeaseLost);
        }

        match outcome {
            TranscodeOutcome::Encoded => logger.log_completion("encoded"),
            TranscodeOutcome::AlreadyEncoded => logger.log_completion("artifacts already present"),
        }
        metrics::record_job_completed();
        Ok(JobOutcome::Completed)
    }

    async fn finish_failure(&self, id: &JobId, logger: &JobLogger) -> WorkerResult<JobOutcome> {
        let mut decision = None;
        let updated = self
            .finalize(id, |record| {
                decision = Some(self.policy.apply(record));
                true
            })
            .await?;

        let (Some(_), Some(decision)) = (updated, decision) else {
            logger.log_warning("lease lost before failure could be recorded");
            metrics::record_lease_lost();
            return Ok(JobOutcome::LeaseLost);
        };

        match decision {
            RetryDecision::Requeue { attempts } => {
                self.queue.dispatch().enqueue(id).await?;
                warn!(job_id = %id, attempts, "Job failed, requeued");
                metrics::record_job_retried();
                Ok(JobOutcome::Requeued { attempts })
            }
            RetryDecision::Fail { attempts } => {
                error!(job_id = %id, attempts, "Job failed, attempts exhausted");
                metrics::record_job_failed();
                Ok(JobOutcome::Failed { attempts })
            }
        }
    }

    /// Apply a final transition while this worker still owns the job.
    ///
    /// Store errors are retried with the configured backoff; the job stays
    /// `Processing` under a live worker until one write lands.
    async fn finalize<F>(&self, id: &JobId, mut transition: F) -> WorkerResult<Option<JobRecord>>
    where
        F: FnMut(&mut JobRecord) -> bool + Send,
    {
        let mut attempt = 1;
        loop {
            let result = self
                .queue
                .jobs()
                .update(id, |record| {
                    if !record.is_owned_by(&self.worker_id) {
                        return false;
                    }
                    transition(record)
                })
                .await;

            match result {
                Ok(updated) => return Ok(updated),
                Err(QueueError::NotFound(_)) => return Ok(None),
                Err(e) if attempt < FINALIZE_ATTEMPTS => {
                    warn!(job_id = %id, attempt, "Failed to finalize job, retrying: {}", e);
                    attempt += 1;
                    let backoff = self.config.store_error_backoff.max(Duration::from_millis(50));
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}
