//! Job records tracked by the queue.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::{ValidationError, ValidationResult};
use crate::profile::ProfileList;

/// Maximum length of a caller-supplied job id.
pub const MAX_JOB_ID_LEN: usize = 64;

/// Caller-supplied job identifier (ASCII alphanumeric).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct JobId(String);

impl JobId {
    /// Validate and wrap a job id.
    pub fn parse(s: impl Into<String>) -> ValidationResult<Self> {
        let s = s.into();
        if s.is_empty() {
            return Err(ValidationError::EmptyId);
        }
        if s.len() > MAX_JOB_ID_LEN {
            return Err(ValidationError::IdTooLong { max: MAX_JOB_ID_LEN });
        }
        if !s.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(ValidationError::InvalidIdCharset(s));
        }
        Ok(Self(s))
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for JobId {
    type Error = ValidationError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(s)
    }
}

impl From<JobId> for String {
    fn from(id: JobId) -> Self {
        id.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque identifier of one worker process lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkerId(String);

impl WorkerId {
    /// Generate a new random worker id.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for WorkerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Queued, waiting for a worker
    #[default]
    Waiting,
    /// Claimed by a worker
    Processing,
    /// Transcoded successfully
    Done,
    /// Attempt budget exhausted
    Fail,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Waiting => "waiting",
            JobStatus::Processing => "processing",
            JobStatus::Done => "done",
            JobStatus::Fail => "fail",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Fail)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persisted state of one submitted job.
///
/// The transition methods keep `worker_id` set exactly while the status is
/// [`JobStatus::Processing`] and never decrease `attempts`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: JobId,

    /// Source locator resolved by the transcoder (path or URI)
    pub source: String,

    /// Requested renditions
    pub profiles: ProfileList,

    #[serde(default)]
    pub status: JobStatus,

    /// Last reported progress label (advisory only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<String>,

    /// Processing attempts consumed so far
    #[serde(default)]
    pub attempts: u32,

    /// Owning worker while processing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker_id: Option<WorkerId>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,

    /// Bumped on every write; guards conditional updates
    #[serde(default)]
    pub revision: u64,
}

impl JobRecord {
    /// Create a fresh waiting record.
    pub fn new(id: JobId, source: impl Into<String>, profiles: ProfileList) -> Self {
        let now = Utc::now();
        Self {
            id,
            source: source.into(),
            profiles,
            status: JobStatus::Waiting,
            step: None,
            attempts: 0,
            worker_id: None,
            created_at: now,
            updated_at: now,
            revision: 0,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// True while `worker` holds the lease on this job.
    pub fn is_owned_by(&self, worker: &WorkerId) -> bool {
        self.status == JobStatus::Processing && self.worker_id.as_ref() == Some(worker)
    }

    /// `Waiting -> Processing` under `worker`. Returns false for any other status.
    pub fn claim(&mut self, worker: &WorkerId) -> bool {
        if self.status != JobStatus::Waiting {
            return false;
        }
        self.status = JobStatus::Processing;
        self.worker_id = Some(worker.clone());
        true
    }

    /// `Processing -> Done`, attempts unchanged.
    pub fn complete(&mut self) {
        self.status = JobStatus::Done;
        self.worker_id = None;
    }

    /// Back to `Waiting` with one more attempt consumed.
    pub fn requeue(&mut self) {
        self.status = JobStatus::Waiting;
        self.attempts = self.attempts.saturating_add(1);
        self.worker_id = None;
    }

    /// Terminal failure with one more attempt consumed.
    pub fn fail(&mut self) {
        self.status = JobStatus::Fail;
        self.attempts = self.attempts.saturating_add(1);
        self.worker_id = None;
    }

    /// Owner is present exactly when processing.
    pub fn owner_consistent(&self) -> bool {
        match self.status {
            JobStatus::Processing => self.worker_id.as_ref().is_some_and(|w| !w.as_str().is_empty()),
            _ => self.worker_id.is_none(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> JobRecord {
        JobRecord::new(
            JobId::parse("vid1").unwrap(),
            "data/tmp/vid1/input",
            ProfileList::parse("720p,480p").unwrap(),
        )
    }

    #[test]
    fn test_job_id_validation() {
        assert!(JobId::parse("abcXYZ019").is_ok());
        assert_eq!(JobId::parse(""), Err(ValidationError::EmptyId));
        assert!(matches!(
            JobId::parse("has space"),
            Err(ValidationError::InvalidIdCharset(_))
        ));
        assert!(matches!(JobId::parse("../etc"), Err(ValidationError::InvalidIdCharset(_))));
        assert!(matches!(JobId::parse("vidé"), Err(ValidationError::InvalidIdCharset(_))));
        assert_eq!(
            JobId::parse("a".repeat(MAX_JOB_ID_LEN + 1)),
            Err(ValidationError::IdTooLong { max: MAX_JOB_ID_LEN })
        );
    }

    #[test]
    fn test_lifecycle_keeps_owner_invariant() {
        let worker = WorkerId::new();
        let mut job = record();
        assert!(job.owner_consistent());

        assert!(job.claim(&worker));
        assert!(job.is_owned_by(&worker));
        assert!(job.owner_consistent());

        job.requeue();
        assert_eq!(job.status, JobStatus::Waiting);
        assert_eq!(job.attempts, 1);
        assert!(job.owner_consistent());

        assert!(job.claim(&worker));
        job.complete();
        assert_eq!(job.status, JobStatus::Done);
        assert_eq!(job.attempts, 1);
        assert!(job.owner_consistent());
    }

    #[test]
    fn test_claim_only_from_waiting() {
        let a = WorkerId::new();
        let b = WorkerId::new();
        let mut job = record();
        assert!(job.claim(&a));
        assert!(!job.claim(&b));
        assert!(job.is_owned_by(&a));

        job.fail();
        assert!(job.is_terminal());
        assert!(!job.claim(&b));
    }

    #[test]
    fn test_record_json_shape() {
        let job = record();
        let value = serde_json::to_value(&job).unwrap();
        assert_eq!(value["status"], "waiting");
        assert_eq!(value["profiles"], serde_json::json!(["720p", "480p"]));
        assert!(value.get("worker_id").is_none());
        assert!(value.get("step").is_none());

        let back: JobRecord = serde_json::from_value(value).unwrap();
        assert_eq!(back, job);
    }

    #[test]
    fn test_invalid_id_rejected_on_deserialize() {
        let mut value = serde_json::to_value(record()).unwrap();
        value["id"] = serde_json::json!("bad id");
        assert!(serde_json::from_value::<JobRecord>(value).is_err());
    }
}
