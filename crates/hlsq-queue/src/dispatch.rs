//! FIFO dispatch list of job ids.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use hlsq_models::JobId;

use crate::error::QueueResult;
use crate::keys::KeySpace;
use crate::store::KvStore;

/// Ids waiting for a worker, pushed at the tail and popped from the head.
#[derive(Clone)]
pub struct DispatchQueue {
    store: Arc<dyn KvStore>,
    keys: KeySpace,
}

impl DispatchQueue {
    pub fn new(store: Arc<dyn KvStore>, keys: KeySpace) -> Self {
        Self { store, keys }
    }

    /// Append an id to the tail.
    pub async fn enqueue(&self, id: &JobId) -> QueueResult<()> {
        self.store.push(&self.keys.dispatch(), id.as_str()).await?;
        debug!(job_id = %id, "Enqueued job");
        Ok(())
    }

    /// Wait until an id is available and take it from the head.
    ///
    /// Entries that are not valid job ids are dropped with a warning.
    pub async fn dequeue_blocking(&self) -> QueueResult<JobId> {
        loop {
            let raw = self.store.blocking_pop(&self.keys.dispatch()).await?;
            match JobId::parse(raw.clone()) {
                Ok(id) => return Ok(id),
                Err(e) => warn!(entry = %raw, "Discarding malformed dispatch entry: {}", e),
            }
        }
    }

    /// Take the head id, waiting at most about `timeout`.
    ///
    /// Malformed entries are dropped like in [`dequeue_blocking`](Self::dequeue_blocking)
    /// and count as an empty wait.
    pub async fn dequeue_timeout(&self, timeout: Duration) -> QueueResult<Option<JobId>> {
        let Some(raw) = self.store.pop_timeout(&self.keys.dispatch(), timeout).await? else {
            return Ok(None);
        };
        match JobId::parse(raw.clone()) {
            Ok(id) => Ok(Some(id)),
            Err(e) => {
                warn!(entry = %raw, "Discarding malformed dispatch entry: {}", e);
                Ok(None)
            }
        }
    }

    /// Snapshot of pending ids, head first.
    pub async fn pending(&self) -> QueueResult<Vec<String>> {
        self.store.list(&self.keys.dispatch()).await
    }

    pub async fn len(&self) -> QueueResult<usize> {
        Ok(self.pending().await?.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn test_fifo_order() {
        let queue = DispatchQueue::new(Arc::new(MemoryStore::new()), KeySpace::default());
        for name in ["a", "b", "c"] {
            queue.enqueue(&JobId::parse(name).unwrap()).await.unwrap();
        }
        assert_eq!(queue.len().await.unwrap(), 3);

        let mut order = Vec::new();
        for _ in 0..3 {
            order.push(queue.dequeue_blocking().await.unwrap().to_string());
        }
        assert_eq!(order, vec!["a", "b", "c"]);
        assert_eq!(queue.len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_malformed_entries_are_skipped() {
        let store = Arc::new(MemoryStore::new());
        let keys = KeySpace::default();
        let queue = DispatchQueue::new(store.clone(), keys.clone());

        store.push(&keys.dispatch(), "not an id").await.unwrap();
        queue.enqueue(&JobId::parse("ok").unwrap()).await.unwrap();

        assert_eq!(queue.dequeue_blocking().await.unwrap().as_str(), "ok");
    }

    #[tokio::test(start_paused = true)]
    async fn test_dequeue_timeout_returns_none_when_idle() {
        let queue = DispatchQueue::new(Arc::new(MemoryStore::new()), KeySpace::default());
        assert_eq!(queue.dequeue_timeout(Duration::from_secs(5)).await.unwrap(), None);

        queue.enqueue(&JobId::parse("vid1").unwrap()).await.unwrap();
        let id = queue.dequeue_timeout(Duration::from_secs(5)).await.unwrap();
        assert_eq!(id.map(|id| id.to_string()).as_deref(), Some("vid1"));
    }
}
