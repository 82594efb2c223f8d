//! Test data factories for Strata types
//!
//! Pre-built records with sensible defaults for quick test setup.

use chrono::{Duration, Utc};
use strata_storage::models::{backup_status, backup_type};
use strata_storage::{BackupRecordModel, RecoveryTestModel};
use uuid::Uuid;

/// Deterministic dump contents of `len` bytes
pub fn dump_bytes(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

/// Backup record fixture factories
pub mod backup {
    use super::*;

    /// A freshly requested full backup of `teachlink` in `us-east-1`
    pub fn pending() -> BackupRecordModel {
        BackupRecordModel::pending(backup_type::FULL, "teachlink", "us-east-1", 30)
    }

    /// A pending backup created `days` ago
    pub fn created_days_ago(days: i64) -> BackupRecordModel {
        let mut record = pending();
        record.created_at = Utc::now() - Duration::days(days);
        record.expires_at = record.created_at + Duration::days(30);
        record.updated_at = record.created_at;
        record
    }

    /// A completed backup (not yet verified) created `days` ago
    pub fn completed_days_ago(days: i64) -> BackupRecordModel {
        let mut record = created_days_ago(days);
        record.status = backup_status::COMPLETED.to_string();
        record.completed_at = Some(record.created_at);
        record.checksum_md5 = Some("d41d8cd98f00b204e9800998ecf8427e".to_string());
        record.checksum_sha256 = Some(
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855".to_string(),
        );
        record
    }

    pub fn failed(reason: &str) -> BackupRecordModel {
        let mut record = pending();
        record.status = backup_status::FAILED.to_string();
        record.error_message = Some(reason.to_string());
        record
    }

    /// Multiple pending backups (useful for pagination tests)
    pub fn batch(count: usize) -> Vec<BackupRecordModel> {
        (0..count).map(|_| pending()).collect()
    }
}

/// Recovery test fixture factories
pub mod recovery_test {
    use super::*;

    pub fn pending(backup_record_id: Uuid) -> RecoveryTestModel {
        RecoveryTestModel::pending(
            backup_record_id,
            format!("recovery_test_{}", Uuid::new_v4().simple()),
        )
    }
}
