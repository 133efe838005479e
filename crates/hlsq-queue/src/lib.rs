//! Distributed job queue for video transcoding.
//!
//! Jobs are durable records in a shared key/value store plus a FIFO list of
//! ids waiting for dispatch. Workers claim jobs from the list, prove they are
//! alive with an expiring heartbeat key, and a recovery sweep puts jobs held
//! by dead workers back into circulation.
//!
//! Every record write goes through a compare-and-swap on the record's
//! `revision`, so status transitions from workers, sweeps and the API never
//! overwrite each other.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod heartbeat;
pub mod job_store;
pub mod keys;
pub mod progress;
pub mod queue;
pub mod retry;
pub mod store;
pub mod sweeper;

pub use config::{QueueConfig, StoreBackend};
pub use dispatch::DispatchQueue;
pub use error::{QueueError, QueueResult};
pub use heartbeat::{Heartbeat, HeartbeatHandle};
pub use job_store::JobStore;
pub use keys::KeySpace;
pub use progress::ProgressReporter;
pub use queue::JobQueue;
pub use retry::{RetryDecision, RetryPolicy, MAX_ATTEMPTS};
pub use store::{KvStore, MemoryStore, RedisStore};
pub use sweeper::{RecoverySweeper, SweepReport};
