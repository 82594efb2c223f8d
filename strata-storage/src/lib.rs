//! # Strata Storage
//!
//! Durable state for the backup and disaster-recovery pipeline: backup
//! records, recovery-test records and the persistent job queue. Every
//! mutation is a single-row update keyed by id.

pub mod admin;
pub mod memory;
pub mod migrations;
pub mod models;
pub mod postgres;
pub mod store;

// Re-export commonly used types
pub use admin::{validate_identifier, DatabaseAdmin, PostgresAdmin};
pub use memory::InMemoryStorage;
pub use models::{
    BackupJobModel, BackupRecordModel, PerformanceMetrics, RecoveryTestModel, ValidationResults,
};
pub use postgres::{PoolConfig, PostgresStorage};
pub use sqlx::types::Json;
pub use store::{
    BackupRecordUpdate, BackupStore, JobStore, MetadataStore, RecoveryTestStore,
    RecoveryTestUpdate,
};

/// Result type for storage operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for storage operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Connection pool exhausted: {0}")]
    PoolExhausted(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
}

impl Error {
    /// Whether the failure is an infrastructure hiccup worth retrying
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::Database(_) | Error::PoolExhausted(_) | Error::ConnectionFailed(_)
        )
    }
}
