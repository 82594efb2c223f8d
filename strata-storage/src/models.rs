//! Database models for backup metadata

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Backup statuses as stored in the database
pub mod backup_status {
    pub const PENDING: &str = "pending";
    pub const IN_PROGRESS: &str = "in_progress";
    pub const COMPLETED: &str = "completed";
    pub const FAILED: &str = "failed";

    pub const ALL: [&str; 4] = [PENDING, IN_PROGRESS, COMPLETED, FAILED];
}

/// Backup types as stored in the database
pub mod backup_type {
    pub const FULL: &str = "full";
    pub const INCREMENTAL: &str = "incremental";
}

/// Recovery test statuses as stored in the database
pub mod test_status {
    pub const PENDING: &str = "pending";
    pub const RUNNING: &str = "running";
    pub const PASSED: &str = "passed";
    pub const FAILED: &str = "failed";

    pub const ALL: [&str; 4] = [PENDING, RUNNING, PASSED, FAILED];
}

/// Job queue states as stored in the database
pub mod job_state {
    pub const QUEUED: &str = "queued";
    pub const RUNNING: &str = "running";
    pub const SUCCEEDED: &str = "succeeded";
    pub const FAILED: &str = "failed";
}

/// One row per backup attempt
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct BackupRecordModel {
    pub id: Uuid,
    pub backup_type: String,
    pub status: String,
    pub region: String,
    pub database_name: String,
    pub storage_key: Option<String>,
    pub encrypted_storage_key: Option<String>,
    pub replicated_storage_key: Option<String>,
    pub encryption_key_id: Option<String>,
    pub backup_size_bytes: Option<i64>,
    pub checksum_md5: Option<String>,
    pub checksum_sha256: Option<String>,
    pub integrity_verified: bool,
    pub retry_count: i32,
    pub error_message: Option<String>,
    pub metadata: sqlx::types::Json<serde_json::Value>,
    pub verified_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BackupRecordModel {
    /// Create a new pending record expiring `retention_days` after creation
    pub fn pending(
        backup_type: &str,
        database_name: &str,
        region: &str,
        retention_days: i64,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            backup_type: backup_type.to_string(),
            status: backup_status::PENDING.to_string(),
            region: region.to_string(),
            database_name: database_name.to_string(),
            storage_key: None,
            encrypted_storage_key: None,
            replicated_storage_key: None,
            encryption_key_id: None,
            backup_size_bytes: None,
            checksum_md5: None,
            checksum_sha256: None,
            integrity_verified: false,
            retry_count: 0,
            error_message: None,
            metadata: sqlx::types::Json(serde_json::json!({})),
            verified_at: None,
            completed_at: None,
            expires_at: now + chrono::Duration::days(retention_days),
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether this backup may be used as a restore source
    pub fn is_restorable(&self) -> bool {
        self.status == backup_status::COMPLETED && self.integrity_verified
    }
}

/// Outcome of the validation battery run against a restored database
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResults {
    pub table_count_match: bool,
    /// The live-row estimate was read from the restored database. Not a
    /// comparison against the source: no row count is recorded at dump time.
    pub row_count_match: bool,
    pub checksum_match: bool,
    pub connection_successful: bool,
    pub queries_executed: u32,
    pub table_count: i64,
    pub row_count: i64,
    pub errors: Vec<String>,
}

/// Per-phase timings of a recovery test, in milliseconds
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceMetrics {
    pub download_duration_ms: u64,
    pub decrypt_duration_ms: u64,
    pub restore_duration_ms: u64,
    pub validate_duration_ms: u64,
    pub total_duration_ms: u64,
}

/// One row per disaster-recovery drill
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct RecoveryTestModel {
    pub id: Uuid,
    pub backup_record_id: Uuid,
    pub status: String,
    pub test_database_name: String,
    pub validation_results: Option<sqlx::types::Json<ValidationResults>>,
    pub performance_metrics: Option<sqlx::types::Json<PerformanceMetrics>>,
    pub error_message: Option<String>,
    pub retry_count: i32,
    pub test_completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RecoveryTestModel {
    /// Create a new pending recovery test for a backup
    pub fn pending(backup_record_id: Uuid, test_database_name: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            backup_record_id,
            status: test_status::PENDING.to_string(),
            test_database_name,
            validation_results: None,
            performance_metrics: None,
            error_message: None,
            retry_count: 0,
            test_completed_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Persistent job queue entry
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct BackupJobModel {
    pub id: Uuid,
    pub job_name: String,
    pub payload: sqlx::types::Json<serde_json::Value>,
    pub state: String,
    pub attempts: i32,
    pub max_attempts: i32,
    pub backoff_kind: String,
    pub backoff_delay_ms: i64,
    pub timeout_ms: i64,
    pub run_at: DateTime<Utc>,
    pub locked_until: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}
