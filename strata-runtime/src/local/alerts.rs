use crate::services::{AlertSink, Severity};
use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use std::time::Duration;
use tracing::{error, info, warn};

/// Writes alerts to the log at a level matching their severity
#[derive(Debug, Default, Clone)]
pub struct LogAlertSink;

fn log_alert(code: &str, message: &str, severity: Severity) {
    match severity {
        Severity::Info => info!(alert.code = code, alert.severity = %severity, "{}", message),
        Severity::Warning => warn!(alert.code = code, alert.severity = %severity, "{}", message),
        Severity::Critical => error!(alert.code = code, alert.severity = %severity, "{}", message),
    }
}

#[async_trait]
impl AlertSink for LogAlertSink {
    async fn send_alert(&self, code: &str, message: &str, severity: Severity) {
        log_alert(code, message, severity);
    }
}

#[derive(Debug, Serialize)]
struct AlertPayload<'a> {
    code: &'a str,
    message: &'a str,
    severity: Severity,
    source: &'static str,
    timestamp: String,
}

/// Logs every alert and POSTs it as JSON to a webhook
#[derive(Debug, Clone)]
pub struct WebhookAlertSink {
    client: reqwest::Client,
    url: String,
}

impl WebhookAlertSink {
    pub fn new(url: impl Into<String>) -> crate::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| crate::Error::Internal(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl AlertSink for WebhookAlertSink {
    async fn send_alert(&self, code: &str, message: &str, severity: Severity) {
        log_alert(code, message, severity);

        let payload = AlertPayload {
            code,
            message,
            severity,
            source: "strata",
            timestamp: Utc::now().to_rfc3339(),
        };

        match self.client.post(&self.url).json(&payload).send().await {
            Ok(response) if response.status().is_success() => {}
            Ok(response) => warn!(
                alert.code = code,
                status = %response.status(),
                "Alert webhook rejected notification"
            ),
            Err(e) => warn!(alert.code = code, error = %e, "Alert webhook unreachable"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_webhook_posts_json() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/alerts"))
            .and(body_partial_json(serde_json::json!({
                "code": "BACKUP_FAILED",
                "severity": "CRITICAL",
                "source": "strata"
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let sink = WebhookAlertSink::new(format!("{}/alerts", server.uri())).unwrap();
        sink.send_alert("BACKUP_FAILED", "dump failed", Severity::Critical)
            .await;
    }

    #[tokio::test]
    async fn test_webhook_failure_is_swallowed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let sink = WebhookAlertSink::new(server.uri()).unwrap();
        sink.send_alert("RECOVERY_TEST_PASSED", "ok", Severity::Info)
            .await;
    }
}
