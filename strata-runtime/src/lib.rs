//! # Strata Runtime
//!
//! Backup job pipeline, scheduler, disaster-recovery orchestrator,
//! recovery-test harness and integrity sampler, plus the persistent job
//! worker that drives them.

pub mod checksum;
pub mod concurrency;
pub mod converters;
pub mod disaster_recovery;
pub mod envelope;
pub mod health;
pub mod integrity;
pub mod jobs;
pub mod local;
pub mod metrics;
pub mod pipeline;
pub mod queue;
pub mod retry;
pub mod scheduler;
pub mod scratch;
pub mod services;
pub mod state_machine;
pub mod worker;

// Re-export commonly used types
pub use checksum::Checksums;
pub use disaster_recovery::{DisasterRecoveryOrchestrator, RestoreConfig, RestoreReport};
pub use envelope::{EnvelopeEncryption, KeyWrapper};
pub use health::{BackupHealth, HealthReport};
pub use integrity::{IntegritySampler, SampleReport, SamplerConfig};
pub use jobs::{JobName, JobPayload, JobSpec};
pub use pipeline::{BackupPipeline, PipelineConfig};
pub use queue::JobQueue;
pub use recovery_test::RecoveryTestHarness;
pub use retry::{BackoffKind, BackoffPolicy};
pub use scheduler::{BackupScheduler, ScheduleConfig};
pub use services::{
    AlertSink, DatabaseTool, EncryptionService, ObjectStorage, Services, Severity,
};
pub use state_machine::{BackupStatus, TestStatus};
pub use worker::{JobContext, JobDispatcher, JobHandler, WorkerConfig, WorkerPool};

/// Result type for runtime operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for runtime operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Storage error: {0}")]
    Storage(#[from] strata_storage::Error),

    #[error("Object storage error: {message}")]
    ObjectStorage { message: String, retryable: bool },

    #[error("Encryption error: {message}")]
    Encryption { message: String, retryable: bool },

    #[error("Database tool error: {0}")]
    DatabaseTool(String),

    #[error("Integrity error: {0}")]
    Integrity(String),

    #[error("Precondition failed: {0}")]
    Precondition(String),

    #[error("Queue error: {0}")]
    Queue(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Timeout error: {0}")]
    Timeout(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Transient object storage failure
    pub fn object_storage(message: impl Into<String>) -> Self {
        Error::ObjectStorage {
            message: message.into(),
            retryable: true,
        }
    }

    /// Object storage failure that will not go away on retry (auth, bad request)
    pub fn object_storage_permanent(message: impl Into<String>) -> Self {
        Error::ObjectStorage {
            message: message.into(),
            retryable: false,
        }
    }

    /// Transient encryption service failure
    pub fn encryption(message: impl Into<String>) -> Self {
        Error::Encryption {
            message: message.into(),
            retryable: true,
        }
    }

    /// Encryption failure that will not go away on retry (unknown key, permission)
    pub fn encryption_permanent(message: impl Into<String>) -> Self {
        Error::Encryption {
            message: message.into(),
            retryable: false,
        }
    }

    /// Whether the queue should re-deliver the job after this error.
    ///
    /// Transient infrastructure failures are retryable. Integrity,
    /// precondition, invalid-state and not-found errors are terminal.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Storage(e) => e.is_transient(),
            Error::ObjectStorage { retryable, .. } | Error::Encryption { retryable, .. } => {
                *retryable
            }
            Error::DatabaseTool(_) | Error::Queue(_) | Error::Timeout(_) | Error::Io(_) => true,
            Error::Integrity(_)
            | Error::Precondition(_)
            | Error::InvalidState(_)
            | Error::NotFound(_)
            | Error::Internal(_) => false,
        }
    }

    /// Whether this is a missing record or object
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Error::NotFound(_) | Error::Storage(strata_storage::Error::NotFound(_))
        )
    }
}
