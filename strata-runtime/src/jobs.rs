//! Job-submission contract
//!
//! A job is `{name, payload, max_attempts, backoff, timeout}`. The payload
//! carries the id of the single record the job owns.

use crate::retry::BackoffPolicy;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobName {
    CreateBackup,
    VerifyBackup,
    DeleteBackup,
    RecoveryTest,
    Restore,
}

impl JobName {
    pub fn as_str(self) -> &'static str {
        match self {
            JobName::CreateBackup => "create-backup",
            JobName::VerifyBackup => "verify-backup",
            JobName::DeleteBackup => "delete-backup",
            JobName::RecoveryTest => "recovery-test",
            JobName::Restore => "restore",
        }
    }
}

impl std::fmt::Display for JobName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for JobName {
    type Error = crate::Error;

    fn try_from(s: &str) -> std::result::Result<Self, Self::Error> {
        match s {
            "create-backup" => Ok(JobName::CreateBackup),
            "verify-backup" => Ok(JobName::VerifyBackup),
            "delete-backup" => Ok(JobName::DeleteBackup),
            "recovery-test" => Ok(JobName::RecoveryTest),
            "restore" => Ok(JobName::Restore),
            _ => Err(crate::Error::Queue(format!("Unknown job name: {}", s))),
        }
    }
}

/// What a job operates on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobPayload {
    CreateBackup { backup_id: Uuid },
    VerifyBackup { backup_id: Uuid },
    DeleteBackup { backup_id: Uuid },
    RecoveryTest { test_id: Uuid },
    /// `None` restores the latest verified backup
    Restore { backup_id: Option<Uuid> },
}

impl JobPayload {
    pub fn name(&self) -> JobName {
        match self {
            JobPayload::CreateBackup { .. } => JobName::CreateBackup,
            JobPayload::VerifyBackup { .. } => JobName::VerifyBackup,
            JobPayload::DeleteBackup { .. } => JobName::DeleteBackup,
            JobPayload::RecoveryTest { .. } => JobName::RecoveryTest,
            JobPayload::Restore { .. } => JobName::Restore,
        }
    }
}

/// A job ready for submission
#[derive(Debug, Clone, PartialEq)]
pub struct JobSpec {
    pub payload: JobPayload,
    pub max_attempts: u32,
    pub backoff: BackoffPolicy,
    pub timeout: Duration,
}

impl JobSpec {
    pub fn name(&self) -> JobName {
        self.payload.name()
    }

    /// 3 attempts, exponential backoff from 10s, 1h timeout
    pub fn create_backup(backup_id: Uuid) -> Self {
        Self {
            payload: JobPayload::CreateBackup { backup_id },
            max_attempts: 3,
            backoff: BackoffPolicy::exponential(Duration::from_secs(10)),
            timeout: Duration::from_secs(60 * 60),
        }
    }

    /// 3 attempts, 10s apart, 30min timeout
    pub fn verify_backup(backup_id: Uuid) -> Self {
        Self {
            payload: JobPayload::VerifyBackup { backup_id },
            max_attempts: 3,
            backoff: BackoffPolicy::fixed(Duration::from_secs(10)),
            timeout: Duration::from_secs(30 * 60),
        }
    }

    /// 3 attempts, 5s apart, 5min timeout
    pub fn delete_backup(backup_id: Uuid) -> Self {
        Self {
            payload: JobPayload::DeleteBackup { backup_id },
            max_attempts: 3,
            backoff: BackoffPolicy::fixed(Duration::from_secs(5)),
            timeout: Duration::from_secs(5 * 60),
        }
    }

    pub fn recovery_test(test_id: Uuid) -> Self {
        Self {
            payload: JobPayload::RecoveryTest { test_id },
            max_attempts: 1,
            backoff: BackoffPolicy::none(),
            timeout: Duration::from_secs(2 * 60 * 60),
        }
    }

    /// Full-database restores are never retried automatically
    pub fn restore(backup_id: Option<Uuid>) -> Self {
        Self {
            payload: JobPayload::Restore { backup_id },
            max_attempts: 1,
            backoff: BackoffPolicy::none(),
            timeout: Duration::from_secs(2 * 60 * 60),
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::BackoffKind;

    #[test]
    fn test_create_backup_defaults() {
        let spec = JobSpec::create_backup(Uuid::new_v4());
        assert_eq!(spec.name(), JobName::CreateBackup);
        assert_eq!(spec.max_attempts, 3);
        assert_eq!(spec.backoff.kind, BackoffKind::Exponential);
        assert_eq!(spec.backoff.delay, Duration::from_secs(10));
        assert_eq!(spec.timeout, Duration::from_secs(3600));
    }

    #[test]
    fn test_restore_is_single_attempt() {
        let spec = JobSpec::restore(None);
        assert_eq!(spec.max_attempts, 1);
        assert_eq!(spec.backoff.kind, BackoffKind::None);
    }

    #[test]
    fn test_payload_wire_format() {
        let id = Uuid::new_v4();
        let json = serde_json::to_value(JobPayload::VerifyBackup { backup_id: id }).unwrap();
        assert_eq!(json["kind"], "verify_backup");
        assert_eq!(json["backup_id"], id.to_string());

        let restore: JobPayload =
            serde_json::from_value(serde_json::json!({"kind": "restore", "backup_id": null}))
                .unwrap();
        assert_eq!(restore, JobPayload::Restore { backup_id: None });
    }

    #[test]
    fn test_job_name_parsing() {
        assert_eq!(JobName::try_from("delete-backup").unwrap(), JobName::DeleteBackup);
        assert!(JobName::try_from("compact").is_err());
    }
}
