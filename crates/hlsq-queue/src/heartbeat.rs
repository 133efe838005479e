//! Worker liveness leases.
//!
//! A worker proves it is alive by refreshing `worker:{id}:heartbeat` with a
//! TTL on a fixed cadence. There is no explicit release: when refreshing
//! stops the key expires and the worker is considered dead.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use hlsq_models::WorkerId;

use crate::config::QueueConfig;
use crate::error::QueueResult;
use crate::keys::KeySpace;
use crate::store::KvStore;

/// Heartbeat writer and liveness checker.
#[derive(Clone)]
pub struct Heartbeat {
    store: Arc<dyn KvStore>,
    keys: KeySpace,
    ttl: Duration,
    interval: Duration,
}

impl Heartbeat {
    pub fn new(store: Arc<dyn KvStore>, keys: KeySpace, ttl: Duration, interval: Duration) -> Self {
        Self {
            store,
            keys,
            ttl,
            interval,
        }
    }

    pub fn from_config(store: Arc<dyn KvStore>, config: &QueueConfig) -> Self {
        Self::new(store, config.keys(), config.heartbeat_ttl, config.heartbeat_interval)
    }

    /// Generate a worker id, write its first beat and start refreshing it.
    ///
    /// The first write happens before returning so a worker never claims a
    /// job without a live lease; a failure here means the store is down.
    pub async fn start(&self) -> QueueResult<HeartbeatHandle> {
        let worker_id = WorkerId::new();
        let key = self.keys.heartbeat(&worker_id);
        self.store.set(&key, "1", Some(self.ttl)).await?;

        let cancel = CancellationToken::new();
        let task = tokio::spawn(refresh_loop(
            Arc::clone(&self.store),
            key,
            self.ttl,
            self.interval,
            cancel.clone(),
        ));

        info!(worker_id = %worker_id, ttl = ?self.ttl, interval = ?self.interval, "Heartbeat started");
        Ok(HeartbeatHandle {
            worker_id,
            cancel,
            task: Some(task),
        })
    }

    /// Whether `worker`'s liveness key currently exists.
    pub async fn is_alive(&self, worker: &WorkerId) -> QueueResult<bool> {
        self.store.exists(&self.keys.heartbeat(worker)).await
    }
}

async fn refresh_loop(
    store: Arc<dyn KvStore>,
    key: String,
    ttl: Duration,
    interval: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!(key = %key, "Heartbeat refresh stopping");
                break;
            }
            _ = ticker.tick() => {
                if let Err(e) = store.set(&key, "1", Some(ttl)).await {
                    warn!(key = %key, "Failed to refresh heartbeat: {}", e);
                }
            }
        }
    }
}

/// Running heartbeat of this process.
///
/// [`stop`](Self::stop) consumes the handle, so the refresh task is stopped
/// exactly once; dropping the handle also cancels it.
pub struct HeartbeatHandle {
    worker_id: WorkerId,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl HeartbeatHandle {
    pub fn worker_id(&self) -> &WorkerId {
        &self.worker_id
    }

    /// Stop refreshing and wait for the task to exit. The key is left to expire.
    pub async fn stop(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!("Heartbeat task ended abnormally: {}", e);
            }
        }
        info!(worker_id = %self.worker_id, "Heartbeat stopped");
    }
}

impl Drop for HeartbeatHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn heartbeat(store: Arc<dyn KvStore>) -> Heartbeat {
        Heartbeat::new(
            store,
            KeySpace::new("t:"),
            Duration::from_secs(35),
            Duration::from_secs(10),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_alive_while_refreshing() {
        let hb = heartbeat(Arc::new(MemoryStore::new()));
        let handle = hb.start().await.unwrap();
        let worker = handle.worker_id().clone();
        assert!(hb.is_alive(&worker).await.unwrap());

        // Well past one TTL; refreshes keep it alive
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert!(hb.is_alive(&worker).await.unwrap());

        handle.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_expires_after_stop() {
        let hb = heartbeat(Arc::new(MemoryStore::new()));
        let handle = hb.start().await.unwrap();
        let worker = handle.worker_id().clone();

        tokio::time::sleep(Duration::from_secs(12)).await;
        handle.stop().await;
        assert!(hb.is_alive(&worker).await.unwrap());

        tokio::time::sleep(Duration::from_secs(36)).await;
        assert!(!hb.is_alive(&worker).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_cancels_refresh() {
        let hb = heartbeat(Arc::new(MemoryStore::new()));
        let handle = hb.start().await.unwrap();
        let worker = handle.worker_id().clone();
        drop(handle);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(!hb.is_alive(&worker).await.unwrap());
    }

    #[tokio::test]
    async fn test_unknown_worker_is_dead() {
        let hb = heartbeat(Arc::new(MemoryStore::new()));
        assert!(!hb.is_alive(&WorkerId::new()).await.unwrap());
    }
}
