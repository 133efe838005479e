//! Key layout in the shared store.

use hlsq_models::{JobId, WorkerId};

/// Namespaced key builder.
///
/// Layout under `prefix`:
/// - `job:{id}`: serialized [`JobRecord`](hlsq_models::JobRecord)
/// - `dispatch`: FIFO list of pending job ids
/// - `worker:{id}:heartbeat`: liveness key with TTL
/// - `retired:{id}`: permanent marker for garbage-collected ids
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySpace {
    prefix: String,
}

impl KeySpace {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn job(&self, id: &JobId) -> String {
        format!("{}job:{}", self.prefix, id)
    }

    /// Prefix shared by every job record key.
    pub fn job_prefix(&self) -> String {
        format!("{}job:", self.prefix)
    }

    pub fn dispatch(&self) -> String {
        format!("{}dispatch", self.prefix)
    }

    pub fn heartbeat(&self, worker: &WorkerId) -> String {
        format!("{}worker:{}:heartbeat", self.prefix, worker)
    }

    pub fn retired(&self, id: &JobId) -> String {
        format!("{}retired:{}", self.prefix, id)
    }
}

impl Default for KeySpace {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_KEY_PREFIX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_keys_do_not_collide_with_dispatch() {
        let keys = KeySpace::new("t:");
        let id = JobId::parse("dispatch").unwrap();
        assert_eq!(keys.job(&id), "t:job:dispatch");
        assert_ne!(keys.job(&id), keys.dispatch());
        assert!(keys.job(&id).starts_with(&keys.job_prefix()));
        assert!(!keys.dispatch().starts_with(&keys.job_prefix()));
    }
}
