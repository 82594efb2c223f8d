//! Status state machines for backups and recovery tests

use crate::Result;
use serde::{Deserialize, Serialize};
use strata_storage::models::{backup_status, test_status};

/// Lifecycle of a backup record
///
/// `PENDING → IN_PROGRESS → COMPLETED | FAILED`. A completed backup can
/// still drop to `FAILED` when verification or sampling finds it corrupt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BackupStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl BackupStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            BackupStatus::Pending => backup_status::PENDING,
            BackupStatus::InProgress => backup_status::IN_PROGRESS,
            BackupStatus::Completed => backup_status::COMPLETED,
            BackupStatus::Failed => backup_status::FAILED,
        }
    }

    /// Check if a status transition is valid
    pub fn is_valid_transition(self, next: BackupStatus) -> bool {
        use BackupStatus::*;

        match (self, next) {
            (Pending, InProgress | Failed) => true,
            // A redelivered job re-enters IN_PROGRESS
            (InProgress, InProgress | Completed | Failed) => true,
            // Verification keeps COMPLETED or demotes to FAILED
            (Completed, Completed | Failed) => true,
            _ => false,
        }
    }

    pub fn ensure_transition(self, next: BackupStatus) -> Result<()> {
        if self.is_valid_transition(next) {
            Ok(())
        } else {
            Err(crate::Error::InvalidState(format!(
                "Invalid backup transition from {:?} to {:?}",
                self, next
            )))
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, BackupStatus::Completed | BackupStatus::Failed)
    }
}

/// Lifecycle of a recovery test
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TestStatus {
    Pending,
    Running,
    Passed,
    Failed,
}

impl TestStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TestStatus::Pending => test_status::PENDING,
            TestStatus::Running => test_status::RUNNING,
            TestStatus::Passed => test_status::PASSED,
            TestStatus::Failed => test_status::FAILED,
        }
    }

    pub fn is_valid_transition(self, next: TestStatus) -> bool {
        use TestStatus::*;

        match (self, next) {
            (Pending, Running | Failed) => true,
            (Running, Passed | Failed) => true,
            _ => false,
        }
    }

    pub fn ensure_transition(self, next: TestStatus) -> Result<()> {
        if self.is_valid_transition(next) {
            Ok(())
        } else {
            Err(crate::Error::InvalidState(format!(
                "Invalid recovery test transition from {:?} to {:?}",
                self, next
            )))
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, TestStatus::Passed | TestStatus::Failed)
    }
}

impl From<BackupStatus> for String {
    fn from(status: BackupStatus) -> Self {
        status.as_str().to_string()
    }
}

impl TryFrom<&str> for BackupStatus {
    type Error = crate::Error;

    fn try_from(s: &str) -> std::result::Result<Self, Self::Error> {
        match s {
            backup_status::PENDING => Ok(BackupStatus::Pending),
            backup_status::IN_PROGRESS => Ok(BackupStatus::InProgress),
            backup_status::COMPLETED => Ok(BackupStatus::Completed),
            backup_status::FAILED => Ok(BackupStatus::Failed),
            _ => Err(crate::Error::InvalidState(format!(
                "Unknown backup status: {}",
                s
            ))),
        }
    }
}

impl From<TestStatus> for String {
    fn from(status: TestStatus) -> Self {
        status.as_str().to_string()
    }
}

impl TryFrom<&str> for TestStatus {
    type Error = crate::Error;

    fn try_from(s: &str) -> std::result::Result<Self, Self::Error> {
        match s {
            test_status::PENDING => Ok(TestStatus::Pending),
            test_status::RUNNING => Ok(TestStatus::Running),
            test_status::PASSED => Ok(TestStatus::Passed),
            test_status::FAILED => Ok(TestStatus::Failed),
            _ => Err(crate::Error::InvalidState(format!(
                "Unknown recovery test status: {}",
                s
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backup_happy_path() {
        use BackupStatus::*;
        assert!(Pending.is_valid_transition(InProgress));
        assert!(InProgress.is_valid_transition(Completed));
        assert!(Completed.is_valid_transition(Completed));
    }

    #[test]
    fn test_verification_can_demote_completed() {
        assert!(BackupStatus::Completed.is_valid_transition(BackupStatus::Failed));
    }

    #[test]
    fn test_failed_is_final() {
        use BackupStatus::*;
        for next in [Pending, InProgress, Completed] {
            assert!(Failed.ensure_transition(next).is_err());
        }
        assert!(Completed.ensure_transition(InProgress).is_err());
        assert!(Pending.ensure_transition(Completed).is_err());
    }

    #[test]
    fn test_recovery_test_transitions() {
        use TestStatus::*;
        assert!(Pending.is_valid_transition(Running));
        assert!(Running.is_valid_transition(Passed));
        assert!(Pending.is_valid_transition(Failed));
        assert!(!Passed.is_valid_transition(Failed));
        assert!(!Pending.is_valid_transition(Passed));
    }

    #[test]
    fn test_string_conversions() {
        assert_eq!(BackupStatus::try_from("in_progress").unwrap(), BackupStatus::InProgress);
        assert_eq!(String::from(BackupStatus::Completed), "completed");
        assert!(matches!(
            BackupStatus::try_from("COMPLETED"),
            Err(crate::Error::InvalidState(_))
        ));
        assert_eq!(TestStatus::try_from("passed").unwrap(), TestStatus::Passed);
        assert_eq!(
            serde_json::to_value(BackupStatus::InProgress).unwrap(),
            serde_json::json!("IN_PROGRESS")
        );
    }
}
