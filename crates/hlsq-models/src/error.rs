//! Validation error types.

use thiserror::Error;

pub type ValidationResult<T> = Result<T, ValidationError>;

/// Reasons a submission is rejected before any record is created.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Job id is required")]
    EmptyId,

    #[error("Job id may only contain alphanumeric characters: {0}")]
    InvalidIdCharset(String),

    #[error("Job id exceeds {max} characters")]
    IdTooLong { max: usize },

    #[error("At least one profile is required")]
    EmptyProfiles,

    #[error("Unknown profile: {0}")]
    UnknownProfile(String),

    #[error("Duplicate profile: {0}")]
    DuplicateProfile(String),
}
