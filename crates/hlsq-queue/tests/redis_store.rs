//! Queue integration tests against a real Redis.
//!
//! Run with `REDIS_URL=redis://localhost:6379 cargo test -- --ignored`.

use std::time::Duration;

use hlsq_models::{JobStatus, WorkerId};
use hlsq_queue::{JobQueue, QueueConfig, QueueError, StoreBackend};

/// Queue on a key prefix no other test run shares.
async fn redis_queue() -> JobQueue {
    dotenvy::dotenv().ok();

    let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());
    let config = QueueConfig {
        backend: StoreBackend::Redis { url },
        key_prefix: format!("hlsq-test:{}:", WorkerId::new()),
        heartbeat_ttl: Duration::from_secs(3),
        heartbeat_interval: Duration::from_secs(1),
        pop_timeout: Duration::from_secs(1),
        ..Default::default()
    };
    JobQueue::connect(config).await.expect("Failed to connect to Redis")
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn test_redis_connection() {
    let queue = redis_queue().await;
    queue.ping().await.expect("Failed to ping");
    assert!(queue.snapshot().await.expect("Failed to list").is_empty());
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn test_submit_claim_complete_cycle() {
    let queue = redis_queue().await;
    let id = queue
        .submit("vid1", "tmp/vid1/input", ["720p", "480p"])
        .await
        .expect("Failed to submit");

    let popped = queue.dispatch().dequeue_blocking().await.expect("Failed to dequeue");
    assert_eq!(popped, id);

    let worker = WorkerId::new();
    let claimed = queue
        .jobs()
        .update(&id, |r| r.claim(&worker))
        .await
        .expect("Failed to claim")
        .expect("Claim skipped");
    assert_eq!(claimed.status, JobStatus::Processing);

    queue
        .jobs()
        .update(&id, |r| {
            if !r.is_owned_by(&worker) {
                return false;
            }
            r.complete();
            true
        })
        .await
        .expect("Failed to complete");

    let record = queue.jobs().get(&id).await.expect("Failed to read");
    assert_eq!(record.status, JobStatus::Done);
    assert!(record.worker_id.is_none());
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn test_duplicate_submit() {
    let queue = redis_queue().await;
    queue.submit("dup", "src", ["360p"]).await.expect("Failed to submit");
    let err = queue.submit("dup", "src", ["360p"]).await.unwrap_err();
    assert!(matches!(err, QueueError::AlreadyExists(_)));
    assert_eq!(queue.dispatch().len().await.unwrap(), 1);
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn test_dispatch_is_fifo() {
    let queue = redis_queue().await;
    for name in ["one", "two", "three"] {
        queue.submit(name, "src", ["360p"]).await.expect("Failed to submit");
    }
    for name in ["one", "two", "three"] {
        let id = queue.dispatch().dequeue_blocking().await.expect("Failed to dequeue");
        assert_eq!(id.as_str(), name);
    }
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn test_dead_worker_job_is_recovered() {
    let queue = redis_queue().await;
    let id = queue.submit("orphan", "src", ["360p"]).await.expect("Failed to submit");
    queue.dispatch().dequeue_blocking().await.expect("Failed to dequeue");

    let handle = queue.heartbeat().start().await.expect("Failed to start heartbeat");
    let worker = handle.worker_id().clone();
    queue
        .jobs()
        .update(&id, |r| r.claim(&worker))
        .await
        .expect("Failed to claim");

    // Alive: untouched
    let report = queue.trigger_recovery().await.expect("Failed to sweep");
    assert_eq!(report.changed(), 0);

    handle.stop().await;
    tokio::time::sleep(Duration::from_secs(4)).await;

    let report = queue.trigger_recovery().await.expect("Failed to sweep");
    assert_eq!(report.recovered, 1);

    let record = queue.jobs().get(&id).await.expect("Failed to read");
    assert_eq!(record.status, JobStatus::Waiting);
    assert_eq!(record.attempts, 1);
    assert_eq!(queue.dispatch().pending().await.unwrap(), vec!["orphan"]);
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn test_heartbeat_key_expires() {
    let queue = redis_queue().await;
    let handle = queue.heartbeat().start().await.expect("Failed to start heartbeat");
    let worker = handle.worker_id().clone();

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!(queue.heartbeat().is_alive(&worker).await.unwrap());

    handle.stop().await;
    tokio::time::sleep(Duration::from_secs(4)).await;
    assert!(!queue.heartbeat().is_alive(&worker).await.unwrap());
}
