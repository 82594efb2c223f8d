//! Type definitions for the worker HTTP API
//!
//! Request and response bodies use camelCase field names.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strata_runtime::HealthReport;
use strata_storage::{PerformanceMetrics, RecoveryTestModel, ValidationResults};
use uuid::Uuid;

/// Body of `POST /backup/restore` and `POST /backup/test`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupRequest {
    pub backup_record_id: Uuid,
}

/// Response to an accepted restore request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreAccepted {
    pub backup_record_id: Uuid,
    pub job_id: Uuid,
    pub status: String,
}

impl RestoreAccepted {
    pub fn new(backup_record_id: Uuid, job_id: Uuid) -> Self {
        Self {
            backup_record_id,
            job_id,
            status: "accepted".to_string(),
        }
    }
}

/// Persisted state of a recovery test, as returned to pollers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryTestDto {
    pub id: Uuid,
    pub backup_record_id: Uuid,
    pub status: String,
    pub test_database_name: String,
    pub validation_results: Option<ValidationResults>,
    pub performance_metrics: Option<PerformanceMetrics>,
    pub error_message: Option<String>,
    pub retry_count: i32,
    pub test_completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<RecoveryTestModel> for RecoveryTestDto {
    fn from(test: RecoveryTestModel) -> Self {
        Self {
            id: test.id,
            backup_record_id: test.backup_record_id,
            status: test.status,
            test_database_name: test.test_database_name,
            validation_results: test.validation_results.map(|json| json.0),
            performance_metrics: test.performance_metrics.map(|json| json.0),
            error_message: test.error_message,
            retry_count: test.retry_count,
            test_completed_at: test.test_completed_at,
            created_at: test.created_at,
            updated_at: test.updated_at,
        }
    }
}

/// Response of `GET /backup/health`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupHealthResponse {
    pub healthy: bool,
    pub issues: Vec<String>,
}

impl From<HealthReport> for BackupHealthResponse {
    fn from(report: HealthReport) -> Self {
        Self {
            healthy: report.healthy,
            issues: report.issues,
        }
    }
}

/// Liveness / readiness response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl HealthResponse {
    pub fn healthy() -> Self {
        Self {
            status: "healthy".to_string(),
            version: Some(env!("CARGO_PKG_VERSION").to_string()),
            error: None,
        }
    }

    pub fn unavailable(error: impl Into<String>) -> Self {
        Self {
            status: "unavailable".to_string(),
            version: None,
            error: Some(error.into()),
        }
    }
}

/// Error body for every non-2xx response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
