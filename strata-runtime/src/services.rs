//! Contracts for the external collaborators the pipeline drives

use crate::Result;
use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use strata_storage::{DatabaseAdmin, MetadataStore};

/// Blob storage addressed by opaque keys
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Store `bytes` under `key`, overwriting any existing object
    async fn put(&self, key: &str, bytes: Bytes, content_type: &str) -> Result<String>;

    /// Fetch an object. Missing objects yield `Error::NotFound`.
    async fn get(&self, key: &str) -> Result<Bytes>;

    /// Copy an object into another region, returning the new key
    async fn copy(&self, src_key: &str, dest_region: &str) -> Result<String>;

    /// Delete an object. Missing objects yield `Error::NotFound`.
    async fn delete(&self, key: &str) -> Result<()>;
}

/// Envelope encryption of byte buffers
#[async_trait]
pub trait EncryptionService: Send + Sync {
    async fn encrypt(&self, key_id: &str, plaintext: &[u8]) -> Result<Vec<u8>>;

    /// The key id travels inside the ciphertext
    async fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>>;
}

/// Dump/restore tool for the database being protected
#[async_trait]
pub trait DatabaseTool: Send + Sync {
    /// Write a single archive of `database` to `output`
    async fn dump(&self, database: &str, output: &Path) -> Result<()>;

    /// Restore the archive at `input` into `database`.
    ///
    /// With `clean`, conflicting objects are dropped before being recreated.
    async fn restore(&self, database: &str, input: &Path, clean: bool) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Info => "INFO",
            Severity::Warning => "WARNING",
            Severity::Critical => "CRITICAL",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fire-and-forget operator notifications
#[async_trait]
pub trait AlertSink: Send + Sync {
    /// Delivery failures are the sink's problem; callers never see them
    async fn send_alert(&self, code: &str, message: &str, severity: Severity);
}

/// Alert codes emitted by the pipeline
pub mod alert_codes {
    pub const BACKUP_FAILED: &str = "BACKUP_FAILED";
    pub const BACKUP_VERIFICATION_FAILED: &str = "BACKUP_VERIFICATION_FAILED";
    pub const BACKUP_SCHEDULING_FAILED: &str = "BACKUP_SCHEDULING_FAILED";
    pub const BACKUP_CLEANUP_FAILED: &str = "BACKUP_CLEANUP_FAILED";
    pub const BACKUP_CORRUPTION_DETECTED: &str = "BACKUP_CORRUPTION_DETECTED";
    pub const INTEGRITY_SAMPLING_FAILED: &str = "INTEGRITY_SAMPLING_FAILED";
    pub const DISASTER_RECOVERY_FAILED: &str = "DISASTER_RECOVERY_FAILED";
    pub const DISASTER_RECOVERY_RTO_EXCEEDED: &str = "DISASTER_RECOVERY_RTO_EXCEEDED";
    pub const DISASTER_RECOVERY_COMPLETED: &str = "DISASTER_RECOVERY_COMPLETED";
    pub const RECOVERY_TEST_PASSED: &str = "RECOVERY_TEST_PASSED";
    pub const RECOVERY_TEST_FAILED: &str = "RECOVERY_TEST_FAILED";
}

/// Handles to every collaborator, shared by the pipeline components
#[derive(Clone)]
pub struct Services {
    pub store: Arc<dyn MetadataStore>,
    pub objects: Arc<dyn ObjectStorage>,
    pub encryption: Arc<dyn EncryptionService>,
    pub db_tool: Arc<dyn DatabaseTool>,
    pub db_admin: Arc<dyn DatabaseAdmin>,
    pub alerts: Arc<dyn AlertSink>,
}
