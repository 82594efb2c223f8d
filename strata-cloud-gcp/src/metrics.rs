//! Prometheus metrics for GCP API calls

use lazy_static::lazy_static;
use prometheus::{register_histogram_vec, register_int_counter_vec, HistogramVec, IntCounterVec};

lazy_static! {
    /// Duration of individual GCP API requests in seconds
    ///
    /// Labels:
    /// - operation: "gcs_put", "gcs_get", "gcs_copy", "gcs_delete", "kms_encrypt", "kms_decrypt"
    pub static ref GCP_REQUEST_DURATION: HistogramVec = register_histogram_vec!(
        "strata_gcp_request_duration_seconds",
        "Duration of GCP API requests",
        &["operation"],
        vec![0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 120.0]
    )
    .expect("strata_gcp_request_duration_seconds metric registration");

    /// Completed GCP API calls
    ///
    /// Labels:
    /// - operation: as above
    /// - outcome: "success", "not_found", "transient", "permanent"
    pub static ref GCP_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "strata_gcp_requests_total",
        "Total number of GCP API calls",
        &["operation", "outcome"]
    )
    .expect("strata_gcp_requests_total metric registration");

    /// Number of retry attempts for GCP API calls
    ///
    /// Labels:
    /// - reason: "5xx", "429", "network"
    pub static ref GCP_REQUEST_RETRIES: IntCounterVec = register_int_counter_vec!(
        "strata_gcp_request_retries_total",
        "Number of retry attempts for GCP API calls",
        &["reason"]
    )
    .expect("strata_gcp_request_retries_total metric registration");

    /// Duration of OAuth2 token acquisition
    ///
    /// Labels:
    /// - cached: "true" (served from cache), "false" (fetched)
    pub static ref TOKEN_ACQUISITION_DURATION: HistogramVec = register_histogram_vec!(
        "strata_gcp_token_acquisition_duration_seconds",
        "Duration of OAuth2 token acquisition",
        &["cached"],
        vec![0.001, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]
    )
    .expect("strata_gcp_token_acquisition_duration_seconds metric registration");
}
