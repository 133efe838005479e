//! Background maintenance for the queue.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use hlsq_queue::JobQueue;

use crate::metrics;

/// Collect finished jobs every `interval` until cancelled.
pub async fn run_garbage_collector(queue: JobQueue, interval: Duration, cancel: CancellationToken) {
    info!(interval = ?interval, "Starting job garbage collector");
    let mut ticker = tokio::time::interval(interval);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("Job garbage collector stopping");
                break;
            }
            _ = ticker.tick() => {
                match queue.collect_garbage().await {
                    Ok(removed) => metrics::record_jobs_collected(removed),
                    Err(e) => error!("Job garbage collection failed: {}", e),
                }
            }
        }
    }
}

/// Spawn the enabled schedules. Each stops when `cancel` fires.
pub fn spawn_schedules(
    queue: &JobQueue,
    recovery_interval: Option<Duration>,
    gc_interval: Option<Duration>,
    cancel: &CancellationToken,
) -> Vec<JoinHandle<()>> {
    let mut tasks = Vec::new();

    if let Some(interval) = recovery_interval {
        let sweeper = queue.sweeper().clone();
        let cancel = cancel.clone();
        tasks.push(tokio::spawn(async move { sweeper.run(interval, cancel).await }));
    }

    if let Some(interval) = gc_interval {
        let queue = queue.clone();
        let cancel = cancel.clone();
        tasks.push(tokio::spawn(run_garbage_collector(queue, interval, cancel)));
    }

    tasks
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use hlsq_models::{JobId, JobStatus, WorkerId};
    use hlsq_queue::{MemoryStore, QueueConfig, StoreBackend};

    use super::*;

    fn memory_queue() -> JobQueue {
        JobQueue::new(
            Arc::new(MemoryStore::new()),
            QueueConfig {
                backend: StoreBackend::Memory,
                ..Default::default()
            },
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_schedules_recover_and_collect() {
        let queue = memory_queue();
        queue.submit("stuck", "src", ["360p"]).await.unwrap();
        queue.submit("done", "src", ["360p"]).await.unwrap();
        let dead = WorkerId::new();
        for name in ["stuck", "done"] {
            queue.dispatch().dequeue_blocking().await.unwrap();
            queue
                .jobs()
                .update(&JobId::parse(name).unwrap(), |r| r.claim(&dead))
                .await
                .unwrap();
        }
        queue
            .jobs()
            .update(&JobId::parse("done").unwrap(), |r| {
                r.complete();
                true
            })
            .await
            .unwrap();

        let cancel = CancellationToken::new();
        let tasks = spawn_schedules(
            &queue,
            Some(Duration::from_secs(30)),
            Some(Duration::from_secs(60)),
            &cancel,
        );
        assert_eq!(tasks.len(), 2);
        tokio::time::sleep(Duration::from_secs(1)).await;

        let snapshot = queue.snapshot().await.unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].id.as_str(), "stuck");
        assert_eq!(snapshot[0].status, JobStatus::Waiting);

        cancel.cancel();
        for task in tasks {
            task.await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_disabled_schedules_spawn_nothing() {
        let queue = memory_queue();
        let tasks = spawn_schedules(&queue, None, None, &CancellationToken::new());
        assert!(tasks.is_empty());
    }
}
