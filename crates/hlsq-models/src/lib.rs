//! Shared data models for the hlsq backend.
//!
//! This crate provides Serde-serializable types for:
//! - Job records and their lifecycle status
//! - Job and worker identifiers
//! - The resolution profile registry

pub mod error;
pub mod job;
pub mod profile;

// Re-export common types
pub use error::{ValidationError, ValidationResult};
pub use job::{JobId, JobRecord, JobStatus, WorkerId, MAX_JOB_ID_LEN};
pub use profile::{ProfileList, ResolutionProfile, PROFILES};
