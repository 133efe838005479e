//! Retry decisions for failed processing attempts.

use hlsq_models::JobRecord;

/// Processing attempts a job gets before it is failed for good.
pub const MAX_ATTEMPTS: u32 = 3;

/// Outcome of a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Back to `Waiting` and onto the tail of the dispatch queue.
    Requeue { attempts: u32 },
    /// Terminal `Fail`; never enqueued again.
    Fail { attempts: u32 },
}

impl RetryDecision {
    pub fn attempts(&self) -> u32 {
        match self {
            RetryDecision::Requeue { attempts } | RetryDecision::Fail { attempts } => *attempts,
        }
    }

    pub fn requeues(&self) -> bool {
        matches!(self, RetryDecision::Requeue { .. })
    }
}

/// Fixed attempt budget shared by every job.
#[derive(Debug, Clone, Copy, Default)]
pub struct RetryPolicy;

impl RetryPolicy {
    /// Decide what a failure does to a job that had consumed `attempts`.
    ///
    /// The failing attempt is counted; once the count reaches
    /// [`MAX_ATTEMPTS`] the job is terminal.
    pub fn decide(&self, attempts: u32) -> RetryDecision {
        let next = attempts.saturating_add(1);
        if next >= MAX_ATTEMPTS {
            RetryDecision::Fail { attempts: next }
        } else {
            RetryDecision::Requeue { attempts: next }
        }
    }

    /// Apply the decision for `record`'s current attempt count to it.
    pub fn apply(&self, record: &mut JobRecord) -> RetryDecision {
        let decision = self.decide(record.attempts);
        match decision {
            RetryDecision::Requeue { .. } => record.requeue(),
            RetryDecision::Fail { .. } => record.fail(),
        }
        decision
    }
}
