//! Prometheus metrics for the API server.

use std::time::Instant;

use axum::body::Body;
use axum::http::{Request, Response};
use axum::middleware::Next;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Initialize the Prometheus metrics recorder.
/// Returns a handle that can be used to render metrics.
pub fn init_metrics() -> PrometheusHandle {
    PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus recorder")
}

/// Metric names as constants for consistency.
pub mod names {
    // HTTP metrics
    pub const HTTP_REQUESTS_TOTAL: &str = "vidgate_http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "vidgate_http_request_duration_seconds";
    pub const HTTP_REQUESTS_IN_FLIGHT: &str = "vidgate_http_requests_in_flight";

    // Upload metrics
    pub const CHUNKS_ACCEPTED_TOTAL: &str = "vidgate_chunks_accepted_total";
    pub const UPLOAD_BYTES_TOTAL: &str = "vidgate_upload_bytes_total";
    pub const UPLOADS_COMPLETED_TOTAL: &str = "vidgate_uploads_completed_total";
    pub const UPLOADS_FAILED_TOTAL: &str = "vidgate_uploads_failed_total";
    pub const UPLOADS_ABORTED_TOTAL: &str = "vidgate_uploads_aborted_total";
    pub const SESSIONS_ACTIVE: &str = "vidgate_sessions_active";
}

/// Record an HTTP request.
pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    let labels = [
        ("method", method.to_string()),
        ("path", path.to_string()),
        ("status", status.to_string()),
    ];

    counter!(names::HTTP_REQUESTS_TOTAL, &labels).increment(1);
    histogram!(names::HTTP_REQUEST_DURATION_SECONDS, &labels).record(duration_secs);
}

/// Record a chunk accepted into a session.
pub fn record_chunk_accepted(bytes: usize) {
    counter!(names::CHUNKS_ACCEPTED_TOTAL).increment(1);
    counter!(names::UPLOAD_BYTES_TOTAL).increment(bytes as u64);
}

/// Record a completed upload.
pub fn record_upload_completed() {
    counter!(names::UPLOADS_COMPLETED_TOTAL).increment(1);
}

/// Record a failed upload.
pub fn record_upload_failed() {
    counter!(names::UPLOADS_FAILED_TOTAL).increment(1);
}

/// Record an explicitly aborted upload.
pub fn record_upload_aborted() {
    counter!(names::UPLOADS_ABORTED_TOTAL).increment(1);
}

/// Update the in-flight session gauge.
pub fn set_active_sessions(count: usize) {
    gauge!(names::SESSIONS_ACTIVE).set(count as f64);
}

/// Metrics middleware for HTTP requests.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response<Body> {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).increment(1.0);

    let response = next.run(request).await;

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).decrement(1.0);

    let status = response.status().as_u16();
    let duration = start.elapsed().as_secs_f64();

    record_http_request(&method, &path, status, duration);

    response
}
