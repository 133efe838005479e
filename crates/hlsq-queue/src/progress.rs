//! Best-effort progress labels.

use tracing::debug;

use hlsq_models::{JobId, WorkerId};

use crate::job_store::JobStore;

/// Writes the advisory `step` label of a processing job.
///
/// Reporting never fails from the caller's point of view and never changes
/// status, attempts or ownership. Only the owning worker's reports land.
#[derive(Clone)]
pub struct ProgressReporter {
    jobs: JobStore,
}

impl ProgressReporter {
    pub fn new(jobs: JobStore) -> Self {
        Self { jobs }
    }

    /// Record `step` on a job `worker` still holds. Errors are swallowed.
    pub async fn report(&self, id: &JobId, worker: &WorkerId, step: &str) {
        let result = self
            .jobs
            .update(id, |record| {
                if !record.is_owned_by(worker) {
                    return false;
                }
                record.step = Some(step.to_string());
                true
            })
            .await;

        match result {
            Ok(Some(_)) => debug!(job_id = %id, step, "Progress reported"),
            Ok(None) => debug!(job_id = %id, step, "Progress ignored, job no longer held by this worker"),
            Err(e) => debug!(job_id = %id, step, "Progress report dropped: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use hlsq_models::{JobStatus, ProfileList};

    use super::*;
    use crate::keys::KeySpace;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn test_report_sets_step_only() {
        let jobs = JobStore::new(Arc::new(MemoryStore::new()), KeySpace::default());
        let id = JobId::parse("vid1").unwrap();
        jobs.create(id.clone(), "src", ProfileList::parse("720p").unwrap())
            .await
            .unwrap();
        let worker = WorkerId::new();
        jobs.update(&id, |r| r.claim(&worker)).await.unwrap();

        let reporter = ProgressReporter::new(jobs.clone());
        reporter.report(&id, &worker, "encoding_first_pass:720p").await;

        let record = jobs.get(&id).await.unwrap();
        assert_eq!(record.step.as_deref(), Some("encoding_first_pass:720p"));
        assert!(record.is_owned_by(&worker));
        assert_eq!(record.attempts, 0);
    }

    #[tokio::test]
    async fn test_report_is_silent_on_missing_or_idle_jobs() {
        let jobs = JobStore::new(Arc::new(MemoryStore::new()), KeySpace::default());
        let reporter = ProgressReporter::new(jobs.clone());
        let worker = WorkerId::new();
        reporter.report(&JobId::parse("ghost").unwrap(), &worker, "x").await;

        let id = JobId::parse("vid1").unwrap();
        jobs.create(id.clone(), "src", ProfileList::parse("720p").unwrap())
            .await
            .unwrap();
        reporter.report(&id, &worker, "x").await;
        assert_eq!(jobs.get(&id).await.unwrap().step, None);
    }

    #[tokio::test]
    async fn test_report_from_previous_owner_is_ignored() {
        let jobs = JobStore::new(Arc::new(MemoryStore::new()), KeySpace::default());
        let id = JobId::parse("vid1").unwrap();
        jobs.create(id.clone(), "src", ProfileList::parse("720p").unwrap())
            .await
            .unwrap();

        // Worker A loses the job to a sweep and worker B claims it
        let stale = WorkerId::new();
        jobs.update(&id, |r| r.claim(&stale)).await.unwrap();
        jobs.update(&id, |r| {
            r.requeue();
            true
        })
        .await
        .unwrap();
        let owner = WorkerId::new();
        jobs.update(&id, |r| r.claim(&owner)).await.unwrap();

        let reporter = ProgressReporter::new(jobs.clone());
        reporter.report(&id, &owner, "encoding_first_pass:720p").await;
        let before = jobs.get(&id).await.unwrap();

        reporter.report(&id, &stale, "encoding_second_pass:720p").await;
        let after = jobs.get(&id).await.unwrap();
        assert_eq!(after, before);
        assert_eq!(after.status, JobStatus::Processing);
        assert_eq!(after.step.as_deref(), Some("encoding_first_pass:720p"));
    }
}
