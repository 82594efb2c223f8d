//! Authorized HTTP calls to Google APIs with bounded retries

use crate::auth::{GcpAuth, CLOUD_PLATFORM_SCOPE};
use crate::classify::{is_network_error, is_transient_status};
use crate::metrics::{GCP_REQUESTS_TOTAL, GCP_REQUEST_DURATION, GCP_REQUEST_RETRIES};
use crate::{Error, Result};
use std::sync::Arc;
use std::time::Duration;

const MAX_ATTEMPTS: u32 = 3;
const INITIAL_BACKOFF_MS: u64 = 100;

/// Shared client for Cloud Storage and Cloud KMS calls
///
/// Transient failures (network, 408, 429, 5xx) are retried with
/// exponential backoff and jitter. A 429 `Retry-After` header overrides
/// the backoff delay.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    auth: Arc<GcpAuth>,
    max_attempts: u32,
    initial_backoff_ms: u64,
}

impl ApiClient {
    pub fn new(auth: Arc<GcpAuth>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(300))
            .build()
            .map_err(|e| Error::Internal(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            http,
            auth,
            max_attempts: MAX_ATTEMPTS,
            initial_backoff_ms: INITIAL_BACKOFF_MS,
        })
    }

    /// Override the retry budget
    pub fn with_retries(mut self, max_attempts: u32, initial_backoff: Duration) -> Self {
        self.max_attempts = max_attempts.max(1);
        self.initial_backoff_ms = initial_backoff.as_millis().max(1) as u64;
        self
    }

    /// Send the request produced by `build` until it succeeds or the
    /// failure is permanent. Non-success responses become [`Error::Api`].
    pub async fn send<F>(&self, operation: &str, build: F) -> Result<reqwest::Response>
    where
        F: Fn(&reqwest::Client) -> reqwest::RequestBuilder,
    {
        let mut attempt = 0;
        let mut backoff_ms = self.initial_backoff_ms;

        loop {
            attempt += 1;
            let token = self.auth.get_access_token(CLOUD_PLATFORM_SCOPE).await?;

            let timer = GCP_REQUEST_DURATION
                .with_label_values(&[operation])
                .start_timer();
            let result = build(&self.http).bearer_auth(&token).send().await;
            drop(timer);

            let response = match result {
                Ok(response) => response,
                Err(e) if is_network_error(&e) && attempt < self.max_attempts => {
                    GCP_REQUEST_RETRIES.with_label_values(&["network"]).inc();
                    tracing::warn!(
                        operation = operation,
                        attempt = attempt,
                        error = %e,
                        "GCP request failed, retrying"
                    );
                    sleep_with_jitter(backoff_ms).await;
                    backoff_ms *= 2;
                    continue;
                }
                Err(e) => {
                    let error = Error::Http(e);
                    record_outcome(operation, &error);
                    return Err(error);
                }
            };

            let status = response.status();
            if status.is_success() {
                GCP_REQUESTS_TOTAL
                    .with_label_values(&[operation, "success"])
                    .inc();
                return Ok(response);
            }

            let retry_after_ms = if status.as_u16() == 429 {
                response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|s| s.parse::<u64>().ok())
                    .map(|secs| secs * 1000)
            } else {
                None
            };
            let body = response.text().await.unwrap_or_default();
            let error = Error::Api {
                status: status.as_u16(),
                message: body,
            };

            if !is_transient_status(status.as_u16()) || attempt >= self.max_attempts {
                record_outcome(operation, &error);
                if attempt > 1 {
                    tracing::warn!(
                        operation = operation,
                        attempts = attempt,
                        status = %status,
                        "GCP request failed after retries"
                    );
                }
                return Err(error);
            }

            let reason = if status.as_u16() == 429 { "429" } else { "5xx" };
            GCP_REQUEST_RETRIES.with_label_values(&[reason]).inc();
            tracing::warn!(
                operation = operation,
                status = %status,
                attempt = attempt,
                max_attempts = self.max_attempts,
                retry_after = ?retry_after_ms,
                "GCP request returned retryable status"
            );

            match retry_after_ms {
                Some(delay_ms) => {
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                }
                None => {
                    sleep_with_jitter(backoff_ms).await;
                    backoff_ms *= 2;
                }
            }
        }
    }
}

async fn sleep_with_jitter(backoff_ms: u64) {
    let jitter = rand::random::<u64>() % (backoff_ms / 2).max(1);
    tokio::time::sleep(Duration::from_millis(backoff_ms + jitter)).await;
}

fn record_outcome(operation: &str, error: &Error) {
    let outcome = if error.is_not_found() {
        "not_found"
    } else if error.is_transient() {
        "transient"
    } else {
        "permanent"
    };
    GCP_REQUESTS_TOTAL
        .with_label_values(&[operation, outcome])
        .inc();
}
