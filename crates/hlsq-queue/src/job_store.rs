//! Per-job state records.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, warn};

use hlsq_models::{JobId, JobRecord, ProfileList};

use crate::error::{QueueError, QueueResult};
use crate::keys::KeySpace;
use crate::store::KvStore;

/// Attempts at a conditional write before giving up with [`QueueError::Conflict`].
const MAX_UPDATE_ATTEMPTS: usize = 8;

/// CRUD over job records.
///
/// Updates are read-modify-write guarded by compare-and-swap on the raw
/// record, so a mutation is always applied to the latest stored state.
#[derive(Clone)]
pub struct JobStore {
    store: Arc<dyn KvStore>,
    keys: KeySpace,
}

impl JobStore {
    pub fn new(store: Arc<dyn KvStore>, keys: KeySpace) -> Self {
        Self { store, keys }
    }

    /// Create a waiting record. Fails with `AlreadyExists` if the id was ever used.
    pub async fn create(
        &self,
        id: JobId,
        source: impl Into<String>,
        profiles: ProfileList,
    ) -> QueueResult<JobRecord> {
        let record = JobRecord::new(id, source, profiles);
        let key = self.keys.job(&record.id);
        let payload = serde_json::to_string(&record)?;

        if !self.store.set_if_absent(&key, &payload).await? {
            return Err(QueueError::AlreadyExists(record.id));
        }

        // Checked after the write: collection retires the id before deleting the record.
        let retired = match self.store.exists(&self.keys.retired(&record.id)).await {
            Ok(retired) => retired,
            Err(e) => {
                if let Err(rollback) = self.store.delete(&key).await {
                    warn!(job_id = %record.id, "Rollback of job record failed: {}", rollback);
                }
                return Err(e);
            }
        };
        if retired {
            self.store.delete(&key).await?;
            return Err(QueueError::AlreadyExists(record.id));
        }

        debug!(job_id = %record.id, "Created job record");
        Ok(record)
    }

    /// True if `id` has a record or was retired by collection.
    pub async fn is_taken(&self, id: &JobId) -> QueueResult<bool> {
        if self.store.exists(&self.keys.job(id)).await? {
            return Ok(true);
        }
        self.store.exists(&self.keys.retired(id)).await
    }

    pub async fn get(&self, id: &JobId) -> QueueResult<JobRecord> {
        let raw = self
            .store
            .get(&self.keys.job(id))
            .await?
            .ok_or_else(|| QueueError::NotFound(id.clone()))?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Apply `mutate` to the current record and write it back.
    ///
    /// `mutate` returns false to leave the record untouched; the call then
    /// yields `Ok(None)`. On a concurrent write the record is re-read and
    /// `mutate` runs again against the fresh state.
    pub async fn update<F>(&self, id: &JobId, mut mutate: F) -> QueueResult<Option<JobRecord>>
    where
        F: FnMut(&mut JobRecord) -> bool + Send,
    {
        let key = self.keys.job(id);

        for attempt in 1..=MAX_UPDATE_ATTEMPTS {
            let raw = self
                .store
                .get(&key)
                .await?
                .ok_or_else(|| QueueError::NotFound(id.clone()))?;
            let mut record: JobRecord = serde_json::from_str(&raw)?;

            if !mutate(&mut record) {
                return Ok(None);
            }
            record.revision += 1;
            record.updated_at = Utc::now();

            let payload = serde_json::to_string(&record)?;
            if self.store.compare_and_swap(&key, &raw, &payload).await? {
                return Ok(Some(record));
            }
            debug!(job_id = %id, attempt, "Job record changed concurrently, retrying update");
        }

        warn!(job_id = %id, "Giving up on contended job update");
        Err(QueueError::Conflict(id.clone()))
    }

    /// Every readable record. Unreadable entries are logged and skipped.
    pub async fn list(&self) -> QueueResult<Vec<JobRecord>> {
        let keys = self.store.scan(&self.keys.job_prefix()).await?;
        let mut records = Vec::with_capacity(keys.len());

        for key in keys {
            let raw = match self.store.get(&key).await {
                Ok(Some(raw)) => raw,
                // Removed between scan and get
                Ok(None) => continue,
                Err(e) => {
                    warn!(key = %key, "Failed to read job record: {}", e);
                    continue;
                }
            };
            match serde_json::from_str::<JobRecord>(&raw) {
                Ok(record) => records.push(record),
                Err(e) => warn!(key = %key, "Failed to parse job record: {}", e),
            }
        }

        records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(records)
    }

    /// Remove a terminal record and retire its id for good.
    ///
    /// Returns false if the record is missing or not terminal.
    pub async fn remove_terminal(&self, id: &JobId) -> QueueResult<bool> {
        let record = match self.get(id).await {
            Ok(record) => record,
            Err(QueueError::NotFound(_)) => return Ok(false),
            Err(e) => return Err(e),
        };
        if !record.is_terminal() {
            return Ok(false);
        }

        self.store
            .set(&self.keys.retired(id), record.status.as_str(), None)
            .await?;
        self.store.delete(&self.keys.job(id)).await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use hlsq_models::{JobStatus, WorkerId};

    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::store::MemoryStore;

    /// Store that cannot answer existence checks on retired ids.
    struct NoRetiredLookup(MemoryStore);

    #[async_trait]
    impl KvStore for NoRetiredLookup {
        async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> QueueResult<()> {
            self.0.set(key, value, ttl).await
        }
        async fn set_if_absent(&self, key: &str, value: &str) -> QueueResult<bool> {
            self.0.set_if_absent(key, value).await
        }
        async fn compare_and_swap(&self, key: &str, expected: &str, value: &str) -> QueueResult<bool> {
            self.0.compare_and_swap(key, expected, value).await
        }
        async fn get(&self, key: &str) -> QueueResult<Option<String>> {
            self.0.get(key).await
        }
        async fn exists(&self, key: &str) -> QueueResult<bool> {
            if key.contains("retired") {
                return Err(QueueError::store("connection reset"));
            }
            self.0.exists(key).await
        }
        async fn delete(&self, key: &str) -> QueueResult<()> {
            self.0.delete(key).await
        }
        async fn push(&self, list_key: &str, value: &str) -> QueueResult<()> {
            self.0.push(list_key, value).await
        }
        async fn blocking_pop(&self, list_key: &str) -> QueueResult<String> {
            self.0.blocking_pop(list_key).await
        }
        async fn pop_timeout(&self, list_key: &str, timeout: Duration) -> QueueResult<Option<String>> {
            self.0.pop_timeout(list_key, timeout).await
        }
        async fn list(&self, list_key: &str) -> QueueResult<Vec<String>> {
            self.0.list(list_key).await
        }
        async fn scan(&self, prefix: &str) -> QueueResult<Vec<String>> {
            self.0.scan(prefix).await
        }
        async fn ping(&self) -> QueueResult<()> {
            Ok(())
        }
    }

    fn job_store() -> JobStore {
        JobStore::new(Arc::new(MemoryStore::new()), KeySpace::new("t:"))
    }

    fn id(s: &str) -> JobId {
        JobId::parse(s).unwrap()
    }

    fn profiles() -> ProfileList {
        ProfileList::parse("720p,480p").unwrap()
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let jobs = job_store();
        let created = jobs.create(id("vid1"), "src", profiles()).await.unwrap();
        assert_eq!(created.status, JobStatus::Waiting);
        assert_eq!(created.attempts, 0);

        let fetched = jobs.get(&id("vid1")).await.unwrap();
        assert_eq!(fetched, created);
    }

    #[tokio::test]
    async fn test_create_duplicate_fails() {
        let jobs = job_store();
        jobs.create(id("vid1"), "src", profiles()).await.unwrap();
        let err = jobs.create(id("vid1"), "other", profiles()).await.unwrap_err();
        assert!(matches!(err, QueueError::AlreadyExists(_)));
        assert_eq!(jobs.get(&id("vid1")).await.unwrap().source, "src");
    }

    #[tokio::test]
    async fn test_get_missing() {
        let jobs = job_store();
        let err = jobs.get(&id("nope")).await.unwrap_err();
        assert!(matches!(err, QueueError::NotFound(_)));
        let err = jobs.update(&id("nope"), |_| true).await.unwrap_err();
        assert!(matches!(err, QueueError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_update_bumps_revision() {
        let jobs = job_store();
        jobs.create(id("vid1"), "src", profiles()).await.unwrap();
        let worker = WorkerId::new();

        let updated = jobs
            .update(&id("vid1"), |r| r.claim(&worker))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.revision, 1);
        assert!(updated.is_owned_by(&worker));

        // Second claim is refused by the closure and nothing is written
        let other = WorkerId::new();
        assert!(jobs.update(&id("vid1"), |r| r.claim(&other)).await.unwrap().is_none());
        assert_eq!(jobs.get(&id("vid1")).await.unwrap().revision, 1);
    }

    #[tokio::test]
    async fn test_concurrent_updates_are_not_lost() {
        let jobs = job_store();
        jobs.create(id("vid1"), "src", profiles()).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..4 {
            let jobs = jobs.clone();
            handles.push(tokio::spawn(async move {
                jobs.update(&id("vid1"), |r| {
                    r.attempts += 1;
                    true
                })
                .await
            }));
        }
        for h in handles {
            h.await.unwrap().unwrap();
        }

        let record = jobs.get(&id("vid1")).await.unwrap();
        assert_eq!(record.attempts, 4);
        assert_eq!(record.revision, 4);
    }

    #[tokio::test]
    async fn test_remove_terminal_retires_id() {
        let jobs = job_store();
        assert!(!jobs.is_taken(&id("vid1")).await.unwrap());
        jobs.create(id("vid1"), "src", profiles()).await.unwrap();
        assert!(jobs.is_taken(&id("vid1")).await.unwrap());
        assert!(!jobs.remove_terminal(&id("vid1")).await.unwrap());

        jobs.update(&id("vid1"), |r| {
            r.fail();
            true
        })
        .await
        .unwrap();
        assert!(jobs.remove_terminal(&id("vid1")).await.unwrap());
        assert!(jobs.list().await.unwrap().is_empty());
        assert!(jobs.is_taken(&id("vid1")).await.unwrap());

        let err = jobs.create(id("vid1"), "src", profiles()).await.unwrap_err();
        assert!(matches!(err, QueueError::AlreadyExists(_)));
        assert!(jobs.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_skips_corrupt_records() {
        let store = Arc::new(MemoryStore::new());
        let jobs = JobStore::new(store.clone(), KeySpace::new("t:"));
        jobs.create(id("a"), "src", profiles()).await.unwrap();
        store.set("t:job:broken", "{not json", None).await.unwrap();

        let records = jobs.list().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, id("a"));
    }

    #[tokio::test]
    async fn test_create_rolls_back_when_retired_check_fails() {
        let store = Arc::new(NoRetiredLookup(MemoryStore::new()));
        let jobs = JobStore::new(store.clone(), KeySpace::new("t:"));

        let err = jobs.create(id("vid1"), "src", profiles()).await.unwrap_err();
        assert!(matches!(err, QueueError::Store(_)));
        assert!(store.0.get("t:job:vid1").await.unwrap().is_none());
        assert!(jobs.list().await.unwrap().is_empty());
    }
}
