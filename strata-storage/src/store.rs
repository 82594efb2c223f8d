//! Storage traits shared by the PostgreSQL and in-memory backends
//!
//! Records are plain values. All mutation goes through the explicit
//! "update fields by id" calls below; there is no object-graph tracking.

use crate::models::{
    BackupJobModel, BackupRecordModel, PerformanceMetrics, RecoveryTestModel, ValidationResults,
};
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Partial update of a backup record. `None` leaves the column untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BackupRecordUpdate {
    pub status: Option<String>,
    pub storage_key: Option<String>,
    pub encrypted_storage_key: Option<String>,
    pub replicated_storage_key: Option<String>,
    pub encryption_key_id: Option<String>,
    pub backup_size_bytes: Option<i64>,
    pub checksum_md5: Option<String>,
    pub checksum_sha256: Option<String>,
    pub integrity_verified: Option<bool>,
    pub retry_count: Option<i32>,
    /// `Some(None)` clears the message
    pub error_message: Option<Option<String>>,
    /// Shallow-merged into the existing metadata object
    pub metadata: Option<serde_json::Value>,
    pub verified_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl BackupRecordUpdate {
    pub fn status(status: &str) -> Self {
        Self {
            status: Some(status.to_string()),
            ..Default::default()
        }
    }

    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(Some(message.into()));
        self
    }

    pub fn clear_error(mut self) -> Self {
        self.error_message = Some(None);
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn with_retry_count(mut self, retry_count: i32) -> Self {
        self.retry_count = Some(retry_count);
        self
    }
}

/// Partial update of a recovery test. `None` leaves the column untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecoveryTestUpdate {
    pub status: Option<String>,
    pub validation_results: Option<ValidationResults>,
    pub performance_metrics: Option<PerformanceMetrics>,
    pub error_message: Option<Option<String>>,
    pub retry_count: Option<i32>,
    pub test_completed_at: Option<DateTime<Utc>>,
}

impl RecoveryTestUpdate {
    pub fn status(status: &str) -> Self {
        Self {
            status: Some(status.to_string()),
            ..Default::default()
        }
    }
}

/// Backup record persistence
#[async_trait]
pub trait BackupStore: Send + Sync {
    /// Insert a new backup record
    async fn create_backup_record(&self, record: &BackupRecordModel) -> Result<()>;

    /// Fetch a backup record, `Error::NotFound` if missing
    async fn get_backup_record(&self, id: Uuid) -> Result<BackupRecordModel>;

    /// Apply a partial update and return the updated row
    async fn update_backup_record(
        &self,
        id: Uuid,
        update: &BackupRecordUpdate,
    ) -> Result<BackupRecordModel>;

    /// Delete a backup record. Returns `false` when no row existed.
    async fn delete_backup_record(&self, id: Uuid) -> Result<bool>;

    /// Most recent completed and verified backup, newest `completed_at` first
    async fn find_latest_verified(&self) -> Result<Option<BackupRecordModel>>;

    /// Completed backups created strictly before `cutoff`
    async fn find_expired(&self, cutoff: DateTime<Utc>) -> Result<Vec<BackupRecordModel>>;

    /// All completed and verified backups
    async fn list_verified(&self) -> Result<Vec<BackupRecordModel>>;

    /// Page through backups, newest first, optionally filtered by status
    async fn list_backup_records(
        &self,
        status: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<BackupRecordModel>>;

    /// Backups in `status` last updated at or after `since`
    async fn list_backup_records_updated_since(
        &self,
        status: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<BackupRecordModel>>;

    /// Readiness probe
    async fn health_check(&self) -> Result<()>;
}

/// Recovery test persistence
#[async_trait]
pub trait RecoveryTestStore: Send + Sync {
    async fn create_recovery_test(&self, test: &RecoveryTestModel) -> Result<()>;

    async fn get_recovery_test(&self, id: Uuid) -> Result<RecoveryTestModel>;

    async fn update_recovery_test(
        &self,
        id: Uuid,
        update: &RecoveryTestUpdate,
    ) -> Result<RecoveryTestModel>;

    /// Most recently created test that reached a terminal state
    async fn latest_finished_recovery_test(&self) -> Result<Option<RecoveryTestModel>>;

    async fn list_recovery_tests_for_backup(
        &self,
        backup_record_id: Uuid,
    ) -> Result<Vec<RecoveryTestModel>>;
}

/// Persistent, at-least-once job queue
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn enqueue_job(&self, job: &BackupJobModel) -> Result<()>;

    async fn get_job(&self, id: Uuid) -> Result<BackupJobModel>;

    /// Atomically claim the next runnable job.
    ///
    /// Runnable means `queued` with `run_at <= now`, or `running` with an
    /// expired lock (the previous holder timed out or crashed). Claiming
    /// increments `attempts` and locks the job until `now + timeout`.
    async fn claim_next_job(&self, now: DateTime<Utc>) -> Result<Option<BackupJobModel>>;

    async fn complete_job(&self, id: Uuid) -> Result<()>;

    /// Put a failed attempt back in the queue
    async fn reschedule_job(&self, id: Uuid, run_at: DateTime<Utc>, error: &str) -> Result<()>;

    /// Mark a job terminally failed
    async fn fail_job(&self, id: Uuid, error: &str) -> Result<()>;

    /// Jobs per state, for operator tooling
    async fn count_jobs_by_state(&self) -> Result<Vec<(String, i64)>>;
}

/// Everything the pipeline needs from the metadata store
pub trait MetadataStore: BackupStore + RecoveryTestStore + JobStore {}

impl<T> MetadataStore for T where T: BackupStore + RecoveryTestStore + JobStore {}

/// Validate a backup status string
pub(crate) fn validate_backup_status(status: &str) -> Result<()> {
    if crate::models::backup_status::ALL.contains(&status) {
        Ok(())
    } else {
        Err(crate::Error::ValidationError(format!(
            "Invalid backup status: {}",
            status
        )))
    }
}

/// Validate a recovery test status string
pub(crate) fn validate_test_status(status: &str) -> Result<()> {
    if crate::models::test_status::ALL.contains(&status) {
        Ok(())
    } else {
        Err(crate::Error::ValidationError(format!(
            "Invalid recovery test status: {}",
            status
        )))
    }
}

/// Validate that a string field is not empty
pub(crate) fn validate_non_empty_string(value: &str, field_name: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(crate::Error::ValidationError(format!(
            "{} cannot be empty",
            field_name
        )));
    }
    Ok(())
}

/// Validate pagination parameters
pub(crate) fn validate_pagination_params(limit: i64, offset: i64) -> Result<()> {
    if limit <= 0 {
        return Err(crate::Error::ValidationError(
            "Limit must be greater than 0".to_string(),
        ));
    }
    if limit > 1000 {
        return Err(crate::Error::ValidationError(
            "Limit cannot exceed 1000".to_string(),
        ));
    }
    if offset < 0 {
        return Err(crate::Error::ValidationError(
            "Offset must be non-negative".to_string(),
        ));
    }
    Ok(())
}

/// Shallow-merge `patch` into `target` when both are JSON objects
pub(crate) fn merge_metadata(target: &mut serde_json::Value, patch: &serde_json::Value) {
    match (target.as_object_mut(), patch.as_object()) {
        (Some(target), Some(patch)) => {
            for (key, value) in patch {
                target.insert(key.clone(), value.clone());
            }
        }
        _ => *target = patch.clone(),
    }
}
