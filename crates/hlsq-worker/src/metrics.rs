//! Job lifecycle counters.

use metrics::counter;

/// Metric names as constants for consistency.
pub mod names {
    pub const JOBS_STARTED_TOTAL: &str = "hlsq_jobs_started_total";
    pub const JOBS_COMPLETED_TOTAL: &str = "hlsq_jobs_completed_total";
    pub const JOBS_RETRIED_TOTAL: &str = "hlsq_jobs_retried_total";
    pub const JOBS_FAILED_TOTAL: &str = "hlsq_jobs_failed_total";
    pub const JOBS_SKIPPED_TOTAL: &str = "hlsq_jobs_skipped_total";
    pub const LEASES_LOST_TOTAL: &str = "hlsq_leases_lost_total";
    pub const STORE_ERRORS_TOTAL: &str = "hlsq_worker_store_errors_total";
}

pub fn record_job_started() {
    counter!(names::JOBS_STARTED_TOTAL).increment(1);
}

pub fn record_job_completed() {
    counter!(names::JOBS_COMPLETED_TOTAL).increment(1);
}

pub fn record_job_retried() {
    counter!(names::JOBS_RETRIED_TOTAL).increment(1);
}

pub fn record_job_failed() {
    counter!(names::JOBS_FAILED_TOTAL).increment(1);
}

/// Dispatch entry whose record was missing or not waiting.
pub fn record_job_skipped(reason: &'static str) {
    let labels = [("reason", reason)];
    counter!(names::JOBS_SKIPPED_TOTAL, &labels).increment(1);
}

pub fn record_lease_lost() {
    counter!(names::LEASES_LOST_TOTAL).increment(1);
}

pub fn record_store_error() {
    counter!(names::STORE_ERRORS_TOTAL).increment(1);
}
