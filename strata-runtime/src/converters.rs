//! Converters between storage models and runtime domain types.

use crate::jobs::{JobName, JobPayload, JobSpec};
use crate::retry::{BackoffKind, BackoffPolicy};
use crate::state_machine::{BackupStatus, TestStatus};
use crate::worker::JobContext;
use crate::Result;
use chrono::{DateTime, Utc};
use std::time::Duration;
use strata_storage::models::job_state;
use strata_storage::{BackupJobModel, BackupRecordModel, Json, RecoveryTestModel};
use uuid::Uuid;

/// A claimed job decoded into typed parts
#[derive(Debug, Clone)]
pub struct ClaimedJob {
    pub context: JobContext,
    pub payload: JobPayload,
    pub backoff: BackoffPolicy,
    pub timeout: Duration,
}

impl JobSpec {
    /// Queue row for this job, runnable from `run_at`
    pub fn to_model(&self, run_at: DateTime<Utc>) -> Result<BackupJobModel> {
        let payload = serde_json::to_value(&self.payload)
            .map_err(|e| crate::Error::Queue(format!("Failed to encode job payload: {}", e)))?;
        let now = Utc::now();

        Ok(BackupJobModel {
            id: Uuid::new_v4(),
            job_name: self.name().as_str().to_string(),
            payload: Json(payload),
            state: job_state::QUEUED.to_string(),
            attempts: 0,
            max_attempts: self.max_attempts as i32,
            backoff_kind: self.backoff.kind.as_str().to_string(),
            backoff_delay_ms: self.backoff.delay.as_millis() as i64,
            timeout_ms: self.timeout.as_millis() as i64,
            run_at,
            locked_until: None,
            last_error: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        })
    }
}

impl TryFrom<&BackupJobModel> for ClaimedJob {
    type Error = crate::Error;

    fn try_from(model: &BackupJobModel) -> Result<Self> {
        let name = JobName::try_from(model.job_name.as_str())?;
        let payload: JobPayload = serde_json::from_value(model.payload.0.clone())
            .map_err(|e| crate::Error::Queue(format!("Malformed payload for job {}: {}", model.id, e)))?;
        if payload.name() != name {
            return Err(crate::Error::Queue(format!(
                "Job {} is named {} but carries a {} payload",
                model.id,
                name,
                payload.name()
            )));
        }

        let kind = BackoffKind::try_from(model.backoff_kind.as_str())?;
        let delay = Duration::from_millis(model.backoff_delay_ms.max(0) as u64);
        let backoff = match kind {
            BackoffKind::None => BackoffPolicy::none(),
            BackoffKind::Fixed => BackoffPolicy::fixed(delay),
            BackoffKind::Exponential => BackoffPolicy::exponential(delay),
        };

        Ok(Self {
            context: JobContext {
                job_id: model.id,
                name,
                attempt: model.attempts.max(0) as u32,
                max_attempts: model.max_attempts.max(1) as u32,
            },
            payload,
            backoff,
            timeout: Duration::from_millis(model.timeout_ms.max(1) as u64),
        })
    }
}

/// Typed status of a stored backup record
pub fn backup_status(record: &BackupRecordModel) -> Result<BackupStatus> {
    BackupStatus::try_from(record.status.as_str())
}

/// Typed status of a stored recovery test
pub fn test_status(test: &RecoveryTestModel) -> Result<TestStatus> {
    TestStatus::try_from(test.status.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spec_to_model_and_back() {
        let backup_id = Uuid::new_v4();
        let spec = JobSpec::create_backup(backup_id);
        let mut model = spec.to_model(Utc::now()).expect("encode");
        assert_eq!(model.job_name, "create-backup");
        assert_eq!(model.state, "queued");
        assert_eq!(model.timeout_ms, 3_600_000);
        assert_eq!(model.backoff_kind, "exponential");

        model.attempts = 2;
        let claimed = ClaimedJob::try_from(&model).expect("decode");
        assert_eq!(claimed.payload, JobPayload::CreateBackup { backup_id });
        assert_eq!(claimed.context.attempt, 2);
        assert_eq!(claimed.context.max_attempts, 3);
        assert!(!claimed.context.is_last_attempt());
        assert_eq!(claimed.backoff, spec.backoff);
        assert_eq!(claimed.timeout, spec.timeout);
    }

    #[test]
    fn test_mismatched_name_is_rejected() {
        let mut model = JobSpec::verify_backup(Uuid::new_v4())
            .to_model(Utc::now())
            .expect("encode");
        model.job_name = "delete-backup".to_string();
        assert!(matches!(
            ClaimedJob::try_from(&model),
            Err(crate::Error::Queue(_))
        ));
    }

    #[test]
    fn test_invalid_status_is_rejected() {
        let mut record = BackupRecordModel::pending("full", "teachlink", "us-east-1", 30);
        assert_eq!(backup_status(&record).unwrap(), BackupStatus::Pending);
        record.status = "bogus".to_string();
        assert!(matches!(
            backup_status(&record),
            Err(crate::Error::InvalidState(_))
        ));
    }
}
