//! Queue facade used by the API and worker processes.

use std::sync::Arc;

use tracing::{error, info, warn};

use hlsq_models::{JobId, JobRecord, ProfileList};

use crate::config::QueueConfig;
use crate::dispatch::DispatchQueue;
use crate::error::QueueResult;
use crate::heartbeat::Heartbeat;
use crate::job_store::JobStore;
use crate::progress::ProgressReporter;
use crate::store::{self, KvStore};
use crate::sweeper::{RecoverySweeper, SweepReport};

/// All queue components wired to one store client.
#[derive(Clone)]
pub struct JobQueue {
    config: QueueConfig,
    store: Arc<dyn KvStore>,
    jobs: JobStore,
    dispatch: DispatchQueue,
    heartbeat: Heartbeat,
    sweeper: RecoverySweeper,
    progress: ProgressReporter,
}

impl JobQueue {
    /// Wire the components around an existing store client.
    pub fn new(store: Arc<dyn KvStore>, config: QueueConfig) -> Self {
        let keys = config.keys();
        let jobs = JobStore::new(Arc::clone(&store), keys.clone());
        let dispatch = DispatchQueue::new(Arc::clone(&store), keys);
        let heartbeat = Heartbeat::from_config(Arc::clone(&store), &config);
        let sweeper = RecoverySweeper::new(jobs.clone(), dispatch.clone(), heartbeat.clone())
            .with_retry_cap(config.recovery_applies_retry_cap);
        let progress = ProgressReporter::new(jobs.clone());

        Self {
            config,
            store,
            jobs,
            dispatch,
            heartbeat,
            sweeper,
            progress,
        }
    }

    /// Connect to the configured backend; fails if it does not answer.
    pub async fn connect(config: QueueConfig) -> QueueResult<Self> {
        config.validate()?;
        let store = store::connect(&config).await?;
        Ok(Self::new(store, config))
    }

    /// Connect using environment configuration.
    pub async fn from_env() -> QueueResult<Self> {
        Self::connect(QueueConfig::from_env()?).await
    }

    /// Validate and durably queue a job.
    ///
    /// Nothing is written when validation fails. If the enqueue after the
    /// record write fails, the record is removed again so no orphan
    /// `Waiting` record is left behind.
    pub async fn submit<I, S>(&self, id: &str, source: &str, profiles: I) -> QueueResult<JobId>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let id = JobId::parse(id)?;
        let profiles = ProfileList::new(profiles)?;

        let record = self.jobs.create(id, source, profiles).await?;
        if let Err(e) = self.dispatch.enqueue(&record.id).await {
            error!(job_id = %record.id, "Failed to enqueue new job, rolling back record: {}", e);
            if let Err(rollback) = self.store.delete(&self.config.keys().job(&record.id)).await {
                warn!(job_id = %record.id, "Rollback of job record failed: {}", rollback);
            }
            return Err(e);
        }

        info!(job_id = %record.id, profiles = %record.profiles, "Job submitted");
        Ok(record.id)
    }

    /// Current state of every job, oldest first.
    pub async fn snapshot(&self) -> QueueResult<Vec<JobRecord>> {
        self.jobs.list().await
    }

    /// Run one recovery sweep synchronously.
    pub async fn trigger_recovery(&self) -> QueueResult<SweepReport> {
        self.sweeper.sweep().await
    }

    /// Remove `Done`/`Fail` records. Their ids stay retired.
    pub async fn collect_garbage(&self) -> QueueResult<usize> {
        let mut removed = 0;
        for record in self.jobs.list().await? {
            if !record.is_terminal() {
                continue;
            }
            match self.jobs.remove_terminal(&record.id).await {
                Ok(true) => {
                    info!(job_id = %record.id, status = %record.status, "Removed finished job");
                    removed += 1;
                }
                Ok(false) => {}
                Err(e) => error!(job_id = %record.id, "Failed to remove job: {}", e),
            }
        }
        Ok(removed)
    }

    /// Store round trip, for readiness checks.
    pub async fn ping(&self) -> QueueResult<()> {
        self.store.ping().await
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    pub fn jobs(&self) -> &JobStore {
        &self.jobs
    }

    pub fn dispatch(&self) -> &DispatchQueue {
        &self.dispatch
    }

    pub fn heartbeat(&self) -> &Heartbeat {
        &self.heartbeat
    }

    pub fn sweeper(&self) -> &RecoverySweeper {
        &self.sweeper
    }

    pub fn progress(&self) -> &ProgressReporter {
        &self.progress
    }
}
