//! Prometheus metrics for the worker's REST surface.
//!
//! Pipeline metrics (`strata_backup_*`, `strata_restore_*`, ...) are
//! registered by `strata-runtime`; this module adds request metrics and
//! renders the whole default registry for `GET /metrics`.
//!
//! # Example Queries
//!
//! ```promql
//! # Restore requests rejected as not restorable (last hour)
//! sum(increase(strata_http_requests_total{endpoint="/backup/restore",status_code="409"}[1h]))
//!
//! # P99 latency per endpoint
//! histogram_quantile(0.99, sum by (le, endpoint) (rate(strata_http_request_duration_seconds_bucket[5m])))
//! ```

use axum::extract::{MatchedPath, Request};
use axum::middleware::Next;
use axum::response::Response;
use prometheus::{register_counter_vec, register_histogram_vec, CounterVec, Encoder, HistogramVec, TextEncoder};
use std::sync::LazyLock;
use std::time::Instant;

/// Total number of HTTP requests by endpoint and status.
///
/// Labels:
/// - `endpoint`: matched route, e.g. `/backup/test/:id`
/// - `status_code`: HTTP status code (200, 202, 400, 404, 409, 500, etc.)
pub static HTTP_REQUESTS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    register_counter_vec!(
        "strata_http_requests_total",
        "Total number of HTTP requests by endpoint and status",
        &["endpoint", "status_code"]
    )
    .expect("Failed to register strata_http_requests_total metric")
});

/// HTTP request duration in seconds.
///
/// Buckets: 1ms, 5ms, 10ms, 50ms, 100ms, 250ms, 500ms, 1s, 5s
pub static HTTP_REQUEST_DURATION_SECONDS: LazyLock<HistogramVec> = LazyLock::new(|| {
    register_histogram_vec!(
        "strata_http_request_duration_seconds",
        "HTTP request duration in seconds",
        &["endpoint"],
        vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 5.0]
    )
    .expect("Failed to register strata_http_request_duration_seconds metric")
});

/// Record an HTTP request.
pub fn record_http_request(endpoint: &str, status_code: &str, duration_secs: f64) {
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[endpoint, status_code])
        .inc();

    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[endpoint])
        .observe(duration_secs);
}

/// Middleware recording [`HTTP_REQUESTS_TOTAL`] and [`HTTP_REQUEST_DURATION_SECONDS`]
pub async fn track_requests(request: Request, next: Next) -> Response {
    let endpoint = request
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());
    let started = Instant::now();

    let response = next.run(request).await;

    record_http_request(
        &endpoint,
        response.status().as_str(),
        started.elapsed().as_secs_f64(),
    );
    response
}

/// Encode every registered metric in the Prometheus text format
pub fn render() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&prometheus::gather(), &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}

/// Register the request metrics before the first request arrives
pub fn init_metrics() {
    let _ = &*HTTP_REQUESTS_TOTAL;
    let _ = &*HTTP_REQUEST_DURATION_SECONDS;

    tracing::info!("Prometheus metrics initialized");
}
