//! Transcoding worker.
//!
//! This crate provides:
//! - Job executor: claim, transcode, finalize under a heartbeat lease
//! - Bounded retries with requeue
//! - Progress emission to the job record
//! - Graceful shutdown

pub mod config;
pub mod error;
pub mod executor;
pub mod logging;
pub mod metrics;

pub use config::WorkerConfig;
pub use error::{WorkerError, WorkerResult};
pub use executor::{JobExecutor, JobOutcome};
pub use logging::JobLogger;
