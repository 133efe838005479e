//! Recovery of jobs orphaned by dead workers.
//!
//! A sweep scans every job record. A `Processing` job whose owner's
//! heartbeat has expired is put back to `Waiting` with one more attempt
//! consumed and re-enqueued. The status check and the write are a single
//! conditional update, so overlapping sweeps and a finishing worker cannot
//! both act on the same lease.

use std::collections::HashMap;
use std::time::Duration;

use metrics::counter;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use hlsq_models::{JobId, JobRecord, JobStatus, WorkerId};

use crate::dispatch::DispatchQueue;
use crate::error::QueueResult;
use crate::heartbeat::Heartbeat;
use crate::job_store::JobStore;
use crate::retry::{RetryDecision, RetryPolicy};

pub const JOBS_RECOVERED_TOTAL: &str = "hlsq_jobs_recovered_total";
pub const JOBS_FAILED_BY_RECOVERY_TOTAL: &str = "hlsq_jobs_failed_by_recovery_total";

/// Counters from one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Records examined
    pub scanned: usize,
    /// Orphans moved back to `Waiting` and re-enqueued
    pub recovered: usize,
    /// Orphans failed for good (only with the retry cap enabled)
    pub failed: usize,
    /// Records skipped because of store errors
    pub errors: usize,
}

impl SweepReport {
    pub fn changed(&self) -> usize {
        self.recovered + self.failed
    }
}

/// Scans for expired leases and repairs them.
#[derive(Clone)]
pub struct RecoverySweeper {
    jobs: JobStore,
    dispatch: DispatchQueue,
    heartbeat: Heartbeat,
    policy: RetryPolicy,
    apply_retry_cap: bool,
}

impl RecoverySweeper {
    pub fn new(jobs: JobStore, dispatch: DispatchQueue, heartbeat: Heartbeat) -> Self {
        Self {
            jobs,
            dispatch,
            heartbeat,
            policy: RetryPolicy,
            apply_retry_cap: false,
        }
    }

    /// Fail orphans whose attempt budget is spent instead of requeueing them.
    pub fn with_retry_cap(mut self, apply: bool) -> Self {
        self.apply_retry_cap = apply;
        self
    }

    /// Run one full scan-and-repair pass.
    pub async fn sweep(&self) -> QueueResult<SweepReport> {
        info!("Recovering stuck processing jobs");
        let records = self.jobs.list().await?;

        let mut report = SweepReport {
            scanned: records.len(),
            ..Default::default()
        };
        let mut liveness: HashMap<WorkerId, bool> = HashMap::new();

        for record in records {
            let Some(owner) = orphan_candidate(&record) else {
                continue;
            };

            let alive = match liveness.get(owner) {
                Some(alive) => *alive,
                None => match self.heartbeat.is_alive(owner).await {
                    Ok(alive) => {
                        liveness.insert(owner.clone(), alive);
                        alive
                    }
                    Err(e) => {
                        warn!(job_id = %record.id, worker_id = %owner, "Failed to check worker liveness: {}", e);
                        report.errors += 1;
                        continue;
                    }
                },
            };
            if alive {
                continue;
            }

            match self.recover(&record.id, owner).await {
                Ok(Some(decision)) if decision.requeues() => report.recovered += 1,
                Ok(Some(_)) => report.failed += 1,
                Ok(None) => debug!(job_id = %record.id, "Job changed before recovery, skipped"),
                Err(e) => {
                    error!(job_id = %record.id, "Failed to recover job: {}", e);
                    report.errors += 1;
                }
            }
        }

        counter!(JOBS_RECOVERED_TOTAL).increment(report.recovered as u64);
        counter!(JOBS_FAILED_BY_RECOVERY_TOTAL).increment(report.failed as u64);
        info!(
            scanned = report.scanned,
            recovered = report.recovered,
            failed = report.failed,
            errors = report.errors,
            "Recovery done"
        );
        Ok(report)
    }

    /// Revert one orphan if it is still held by `dead_owner`.
    async fn recover(&self, id: &JobId, dead_owner: &WorkerId) -> QueueResult<Option<RetryDecision>> {
        let mut decision = None;
        let updated = self
            .jobs
            .update(id, |record| {
                if !record.is_owned_by(dead_owner) {
                    return false;
                }
                decision = Some(if self.apply_retry_cap {
                    self.policy.apply(record)
                } else {
                    record.requeue();
                    RetryDecision::Requeue {
                        attempts: record.attempts,
                    }
                });
                true
            })
            .await?;

        let Some(record) = updated else {
            return Ok(None);
        };

        match record.status {
            JobStatus::Waiting => {
                info!(job_id = %id, worker_id = %dead_owner, attempts = record.attempts, "Recovered stuck job");
                self.dispatch.enqueue(id).await?;
            }
            _ => {
                warn!(job_id = %id, worker_id = %dead_owner, attempts = record.attempts, "Stuck job exhausted its attempts, marked failed");
            }
        }
        Ok(decision)
    }

    /// Sweep every `interval` until cancelled. Errors are logged and the
    /// schedule continues.
    pub async fn run(&self, interval: Duration, cancel: CancellationToken) {
        info!(interval = ?interval, "Starting recovery sweeper");
        let mut ticker = tokio::time::interval(interval);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Recovery sweeper stopping");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.sweep().await {
                        error!("Recovery sweep failed: {}", e);
                    }
                }
            }
        }
    }
}

/// Owner of a `Processing` record, if it has one.
fn orphan_candidate(record: &JobRecord) -> Option<&WorkerId> {
    if record.status != JobStatus::Processing {
        return None;
    }
    record.worker_id.as_ref().filter(|w| !w.as_str().is_empty())
}
