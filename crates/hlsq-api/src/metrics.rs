//! Prometheus instrumentation of the HTTP surface and queue endpoints.

use std::time::Instant;

use axum::extract::Request;
use axum::middleware::Next;
use axum::response::Response;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

/// Install the global recorder; the handle renders `/metrics`.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

pub mod names {
    pub const HTTP_REQUESTS_TOTAL: &str = "hlsq_http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "hlsq_http_request_duration_seconds";
    pub const HTTP_REQUESTS_IN_FLIGHT: &str = "hlsq_http_requests_in_flight";

    pub const JOBS_SUBMITTED_TOTAL: &str = "hlsq_jobs_submitted_total";
    pub const JOBS_COLLECTED_TOTAL: &str = "hlsq_jobs_collected_total";
    pub const QUEUE_LENGTH: &str = "hlsq_queue_length";
}

pub fn record_job_submitted() {
    counter!(names::JOBS_SUBMITTED_TOTAL).increment(1);
}

pub fn record_jobs_collected(count: usize) {
    counter!(names::JOBS_COLLECTED_TOTAL).increment(count as u64);
}

pub fn set_queue_length(length: usize) {
    gauge!(names::QUEUE_LENGTH).set(length as f64);
}

/// Route label for `path`, with video ids replaced by `:id`.
fn route_label(path: &str) -> String {
    let mut label = String::with_capacity(path.len());
    let mut after_videos = false;
    for (i, segment) in path.split('/').enumerate() {
        if i > 0 {
            label.push('/');
        }
        label.push_str(if after_videos && !segment.is_empty() { ":id" } else { segment });
        after_videos = segment == "videos";
    }
    label
}

/// Keeps the in-flight gauge balanced even if the handler future is dropped.
struct InFlight;

impl InFlight {
    fn enter() -> Self {
        gauge!(names::HTTP_REQUESTS_IN_FLIGHT).increment(1.0);
        InFlight
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        gauge!(names::HTTP_REQUESTS_IN_FLIGHT).decrement(1.0);
    }
}

/// Count and time every request by method, route and status.
pub async fn metrics_middleware(request: Request, next: Next) -> Response {
    let method = request.method().as_str().to_owned();
    let route = route_label(request.uri().path());
    let started = Instant::now();

    let response = {
        let _guard = InFlight::enter();
        next.run(request).await
    };

    let labels = [
        ("method", method),
        ("path", route),
        ("status", response.status().as_u16().to_string()),
    ];
    counter!(names::HTTP_REQUESTS_TOTAL, &labels).increment(1);
    histogram!(names::HTTP_REQUEST_DURATION_SECONDS, &labels)
        .record(started.elapsed().as_secs_f64());

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_label_hides_video_ids() {
        assert_eq!(route_label("/api/videos/abc123"), "/api/videos/:id");
        assert_eq!(route_label("/api/queue"), "/api/queue");
        assert_eq!(route_label("/api/videos/"), "/api/videos/");
        assert_eq!(route_label("/health"), "/health");
    }
}
