//! In-memory implementations of every external collaborator
//!
//! Each mock records its calls and supports failure injection so tests
//! can drive the pipeline through transient and terminal error paths.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use strata_runtime::pipeline::{encrypted_storage_key, raw_storage_key};
use strata_runtime::services::{
    AlertSink, DatabaseTool, EncryptionService, ObjectStorage, Services, Severity,
};
use strata_runtime::{Checksums, Error, Result};
use strata_storage::models::{backup_status, backup_type};
use strata_storage::{
    BackupRecordModel, BackupStore, DatabaseAdmin, InMemoryStorage, ValidationResults,
};

/// Object storage operations that can be made to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectOp {
    Put,
    Get,
    Copy,
    Delete,
}

#[derive(Debug, Clone)]
struct InjectedFailure {
    /// Only keys containing this fragment fail; `None` fails every key
    key_fragment: Option<String>,
    transient: bool,
}

/// Object storage backed by a map; `copy` follows the `replicas/{region}/{src}` layout
#[derive(Debug, Default)]
pub struct InMemoryObjectStorage {
    objects: Mutex<HashMap<String, Bytes>>,
    failures: Mutex<HashMap<ObjectOp, InjectedFailure>>,
    calls: Mutex<Vec<(ObjectOp, String)>>,
}

impl InMemoryObjectStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every call to `op` until cleared
    pub fn fail(&self, op: ObjectOp, transient: bool) {
        self.failures.lock().insert(
            op,
            InjectedFailure {
                key_fragment: None,
                transient,
            },
        );
    }

    /// Fail calls to `op` whose key contains `fragment`
    pub fn fail_matching(&self, op: ObjectOp, fragment: &str, transient: bool) {
        self.failures.lock().insert(
            op,
            InjectedFailure {
                key_fragment: Some(fragment.to_string()),
                transient,
            },
        );
    }

    pub fn clear_failures(&self) {
        self.failures.lock().clear();
    }

    pub fn insert(&self, key: &str, bytes: impl Into<Bytes>) {
        self.objects.lock().insert(key.to_string(), bytes.into());
    }

    pub fn remove(&self, key: &str) {
        self.objects.lock().remove(key);
    }

    pub fn object(&self, key: &str) -> Option<Bytes> {
        self.objects.lock().get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.objects.lock().contains_key(key)
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<_> = self.objects.lock().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Flip one byte of a stored object
    pub fn corrupt(&self, key: &str) {
        let mut objects = self.objects.lock();
        if let Some(bytes) = objects.get_mut(key) {
            let mut data = bytes.to_vec();
            let middle = data.len() / 2;
            if let Some(byte) = data.get_mut(middle) {
                *byte ^= 0xFF;
            }
            *bytes = Bytes::from(data);
        }
    }

    pub fn calls(&self, op: ObjectOp) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter(|(called, _)| *called == op)
            .map(|(_, key)| key.clone())
            .collect()
    }

    fn check(&self, op: ObjectOp, key: &str) -> Result<()> {
        self.calls.lock().push((op, key.to_string()));
        let failures = self.failures.lock();
        let Some(failure) = failures.get(&op) else {
            return Ok(());
        };
        let applies = failure
            .key_fragment
            .as_deref()
            .map_or(true, |fragment| key.contains(fragment));
        if !applies {
            return Ok(());
        }
        let message = format!("injected {:?} failure for {}", op, key);
        if failure.transient {
            Err(Error::object_storage(message))
        } else {
            Err(Error::object_storage_permanent(message))
        }
    }
}

#[async_trait]
impl ObjectStorage for InMemoryObjectStorage {
    async fn put(&self, key: &str, bytes: Bytes, _content_type: &str) -> Result<String> {
        self.check(ObjectOp::Put, key)?;
        self.objects.lock().insert(key.to_string(), bytes);
        Ok(key.to_string())
    }

    async fn get(&self, key: &str) -> Result<Bytes> {
        self.check(ObjectOp::Get, key)?;
        self.object(key)
            .ok_or_else(|| Error::NotFound(format!("object {}", key)))
    }

    async fn copy(&self, src_key: &str, dest_region: &str) -> Result<String> {
        self.check(ObjectOp::Copy, src_key)?;
        let bytes = self
            .object(src_key)
            .ok_or_else(|| Error::NotFound(format!("object {}", src_key)))?;
        let dest = format!("replicas/{}/{}", dest_region, src_key);
        self.objects.lock().insert(dest.clone(), bytes);
        Ok(dest)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.check(ObjectOp::Delete, key)?;
        self.objects
            .lock()
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| Error::NotFound(format!("object {}", key)))
    }
}

const FAKE_MAGIC: &[u8] = b"FAKE1";
const FAKE_MASK: u8 = 0x5A;

/// Reversible stand-in for envelope encryption.
///
/// Layout: `FAKE1 | key_id_len u8 | key_id | payload ^ 0x5A`.
#[derive(Debug, Default)]
pub struct FakeEncryption {
    fail_encrypt: Mutex<Option<bool>>,
    fail_decrypt: Mutex<Option<bool>>,
    encrypted_with: Mutex<Vec<String>>,
}

impl FakeEncryption {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_encrypt(&self, transient: bool) {
        *self.fail_encrypt.lock() = Some(transient);
    }

    pub fn fail_decrypt(&self, transient: bool) {
        *self.fail_decrypt.lock() = Some(transient);
    }

    pub fn clear_failures(&self) {
        *self.fail_encrypt.lock() = None;
        *self.fail_decrypt.lock() = None;
    }

    /// Key ids passed to `encrypt`, in call order
    pub fn key_ids(&self) -> Vec<String> {
        self.encrypted_with.lock().clone()
    }

    /// Synchronous encryption for seeding fixtures
    pub fn seal(key_id: &str, plaintext: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(FAKE_MAGIC.len() + 1 + key_id.len() + plaintext.len());
        out.extend_from_slice(FAKE_MAGIC);
        out.push(key_id.len() as u8);
        out.extend_from_slice(key_id.as_bytes());
        out.extend(plaintext.iter().map(|b| b ^ FAKE_MASK));
        out
    }

    fn open(ciphertext: &[u8]) -> Result<Vec<u8>> {
        let rest = ciphertext
            .strip_prefix(FAKE_MAGIC)
            .ok_or_else(|| Error::Integrity("not a fake envelope".to_string()))?;
        let (&key_len, rest) = rest
            .split_first()
            .ok_or_else(|| Error::Integrity("truncated fake envelope".to_string()))?;
        let payload = rest
            .get(key_len as usize..)
            .ok_or_else(|| Error::Integrity("truncated fake envelope".to_string()))?;
        Ok(payload.iter().map(|b| b ^ FAKE_MASK).collect())
    }
}

fn encryption_failure(transient: bool) -> Error {
    if transient {
        Error::encryption("injected encryption outage")
    } else {
        Error::encryption_permanent("injected key permission failure")
    }
}

#[async_trait]
impl EncryptionService for FakeEncryption {
    async fn encrypt(&self, key_id: &str, plaintext: &[u8]) -> Result<Vec<u8>> {
        if let Some(transient) = *self.fail_encrypt.lock() {
            return Err(encryption_failure(transient));
        }
        self.encrypted_with.lock().push(key_id.to_string());
        Ok(Self::seal(key_id, plaintext))
    }

    async fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>> {
        if let Some(transient) = *self.fail_decrypt.lock() {
            return Err(encryption_failure(transient));
        }
        Self::open(ciphertext)
    }
}

/// A recorded restore invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreCall {
    pub database: String,
    pub clean: bool,
    /// Contents of the input file at call time
    pub input: Vec<u8>,
}

/// Dump/restore tool that writes fixed bytes and records restores
#[derive(Debug)]
pub struct FakeDatabaseTool {
    dump_bytes: Mutex<Vec<u8>>,
    restore_delay: Mutex<Duration>,
    fail_dump: Mutex<bool>,
    fail_restore: Mutex<bool>,
    dumps: Mutex<Vec<String>>,
    restores: Mutex<Vec<RestoreCall>>,
    scratch_paths: Mutex<Vec<std::path::PathBuf>>,
}

impl FakeDatabaseTool {
    pub fn new(dump_bytes: Vec<u8>) -> Self {
        Self {
            dump_bytes: Mutex::new(dump_bytes),
            restore_delay: Mutex::new(Duration::ZERO),
            fail_dump: Mutex::new(false),
            fail_restore: Mutex::new(false),
            dumps: Mutex::new(Vec::new()),
            restores: Mutex::new(Vec::new()),
            scratch_paths: Mutex::new(Vec::new()),
        }
    }

    pub fn set_dump_bytes(&self, bytes: Vec<u8>) {
        *self.dump_bytes.lock() = bytes;
    }

    /// Make every restore take at least `delay`
    pub fn set_restore_delay(&self, delay: Duration) {
        *self.restore_delay.lock() = delay;
    }

    pub fn fail_dump(&self, fail: bool) {
        *self.fail_dump.lock() = fail;
    }

    pub fn fail_restore(&self, fail: bool) {
        *self.fail_restore.lock() = fail;
    }

    pub fn dump_calls(&self) -> Vec<String> {
        self.dumps.lock().clone()
    }

    pub fn restore_calls(&self) -> Vec<RestoreCall> {
        self.restores.lock().clone()
    }

    /// Every scratch file path the tool was handed
    pub fn scratch_paths(&self) -> Vec<std::path::PathBuf> {
        self.scratch_paths.lock().clone()
    }
}

#[async_trait]
impl DatabaseTool for FakeDatabaseTool {
    async fn dump(&self, database: &str, output: &Path) -> Result<()> {
        self.dumps.lock().push(database.to_string());
        self.scratch_paths.lock().push(output.to_path_buf());
        if *self.fail_dump.lock() {
            return Err(Error::DatabaseTool("pg_dump exited with status 1".to_string()));
        }
        let bytes = self.dump_bytes.lock().clone();
        tokio::fs::write(output, bytes).await?;
        Ok(())
    }

    async fn restore(&self, database: &str, input: &Path, clean: bool) -> Result<()> {
        self.scratch_paths.lock().push(input.to_path_buf());
        let contents = tokio::fs::read(input).await?;
        self.restores.lock().push(RestoreCall {
            database: database.to_string(),
            clean,
            input: contents,
        });

        let delay = *self.restore_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if *self.fail_restore.lock() {
            return Err(Error::DatabaseTool("pg_restore exited with status 1".to_string()));
        }
        Ok(())
    }
}

/// Database admin tracking which throwaway databases exist
#[derive(Debug)]
pub struct FakeDatabaseAdmin {
    databases: Mutex<HashSet<String>>,
    created: Mutex<Vec<String>>,
    validation: Mutex<ValidationResults>,
    fail_drop: Mutex<bool>,
}

impl Default for FakeDatabaseAdmin {
    fn default() -> Self {
        Self {
            databases: Mutex::new(HashSet::new()),
            created: Mutex::new(Vec::new()),
            validation: Mutex::new(Self::healthy_validation()),
            fail_drop: Mutex::new(false),
        }
    }
}

impl FakeDatabaseAdmin {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn healthy_validation() -> ValidationResults {
        ValidationResults {
            table_count_match: true,
            row_count_match: true,
            checksum_match: false,
            connection_successful: true,
            queries_executed: 4,
            table_count: 12,
            row_count: 4_200,
            errors: Vec::new(),
        }
    }

    /// Results returned by `run_validation` for existing databases
    pub fn set_validation(&self, results: ValidationResults) {
        *self.validation.lock() = results;
    }

    pub fn fail_drop(&self, fail: bool) {
        *self.fail_drop.lock() = fail;
    }

    pub fn exists(&self, name: &str) -> bool {
        self.databases.lock().contains(name)
    }

    pub fn existing(&self) -> Vec<String> {
        self.databases.lock().iter().cloned().collect()
    }

    /// Every database ever created, in order
    pub fn created(&self) -> Vec<String> {
        self.created.lock().clone()
    }
}

#[async_trait]
impl DatabaseAdmin for FakeDatabaseAdmin {
    async fn recreate_database(&self, name: &str) -> strata_storage::Result<()> {
        strata_storage::validate_identifier(name, "Database name")?;
        self.databases.lock().insert(name.to_string());
        self.created.lock().push(name.to_string());
        Ok(())
    }

    async fn drop_database(&self, name: &str) -> strata_storage::Result<()> {
        if *self.fail_drop.lock() {
            return Err(strata_storage::Error::ConnectionFailed(
                "injected drop failure".to_string(),
            ));
        }
        self.databases.lock().remove(name);
        Ok(())
    }

    async fn database_exists(&self, name: &str) -> strata_storage::Result<bool> {
        Ok(self.exists(name))
    }

    async fn run_validation(&self, name: &str) -> strata_storage::Result<ValidationResults> {
        if !self.exists(name) {
            return Ok(ValidationResults {
                errors: vec![format!("connection failed: database {} does not exist", name)],
                ..Default::default()
            });
        }
        Ok(self.validation.lock().clone())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedAlert {
    pub code: String,
    pub message: String,
    pub severity: Severity,
}

/// Alert sink that keeps every alert for inspection
#[derive(Debug, Default)]
pub struct RecordingAlertSink {
    alerts: Mutex<Vec<RecordedAlert>>,
}

impl RecordingAlertSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alerts(&self) -> Vec<RecordedAlert> {
        self.alerts.lock().clone()
    }

    pub fn codes(&self) -> Vec<String> {
        self.alerts.lock().iter().map(|a| a.code.clone()).collect()
    }

    pub fn count(&self, code: &str) -> usize {
        self.alerts.lock().iter().filter(|a| a.code == code).count()
    }

    pub fn with_code(&self, code: &str) -> Vec<RecordedAlert> {
        self.alerts
            .lock()
            .iter()
            .filter(|a| a.code == code)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl AlertSink for RecordingAlertSink {
    async fn send_alert(&self, code: &str, message: &str, severity: Severity) {
        self.alerts.lock().push(RecordedAlert {
            code: code.to_string(),
            message: message.to_string(),
            severity,
        });
    }
}

/// Every mock wired together, with typed handles for assertions
pub struct MockServices {
    pub store: Arc<InMemoryStorage>,
    pub objects: Arc<InMemoryObjectStorage>,
    pub encryption: Arc<FakeEncryption>,
    pub db_tool: Arc<FakeDatabaseTool>,
    pub db_admin: Arc<FakeDatabaseAdmin>,
    pub alerts: Arc<RecordingAlertSink>,
}

impl MockServices {
    /// Mocks whose dump tool produces `dump_bytes`
    pub fn new(dump_bytes: Vec<u8>) -> Self {
        Self {
            store: Arc::new(InMemoryStorage::new()),
            objects: Arc::new(InMemoryObjectStorage::new()),
            encryption: Arc::new(FakeEncryption::new()),
            db_tool: Arc::new(FakeDatabaseTool::new(dump_bytes)),
            db_admin: Arc::new(FakeDatabaseAdmin::new()),
            alerts: Arc::new(RecordingAlertSink::new()),
        }
    }

    pub fn services(&self) -> Services {
        Services {
            store: self.store.clone(),
            objects: self.objects.clone(),
            encryption: self.encryption.clone(),
            db_tool: self.db_tool.clone(),
            db_admin: self.db_admin.clone(),
            alerts: self.alerts.clone(),
        }
    }

    /// Store a completed, verified backup of `data` with both encrypted
    /// copies present under the standard key layout
    pub async fn seed_verified_backup(
        &self,
        data: &[u8],
        completed_at: DateTime<Utc>,
    ) -> BackupRecordModel {
        let mut record =
            BackupRecordModel::pending(backup_type::FULL, "teachlink", "us-east-1", 30);
        let raw_key = raw_storage_key(&record.region, &record.database_name, record.id);
        let encrypted_key = encrypted_storage_key(&raw_key);
        let replica_key = format!("replicas/us-west-2/{}", encrypted_key);
        let sealed = FakeEncryption::seal("backup-master-key", data);
        self.objects.insert(&encrypted_key, sealed.clone());
        self.objects.insert(&replica_key, sealed);

        let checksums = Checksums::compute(data);
        record.status = backup_status::COMPLETED.to_string();
        record.storage_key = Some(raw_key);
        record.encrypted_storage_key = Some(encrypted_key);
        record.replicated_storage_key = Some(replica_key);
        record.encryption_key_id = Some("backup-master-key".to_string());
        record.backup_size_bytes = Some(data.len() as i64);
        record.checksum_md5 = Some(checksums.md5);
        record.checksum_sha256 = Some(checksums.sha256);
        record.integrity_verified = true;
        record.verified_at = Some(completed_at);
        record.completed_at = Some(completed_at);

        self.store
            .create_backup_record(&record)
            .await
            .expect("seed backup record");
        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_object_storage_copy_layout() {
        let objects = InMemoryObjectStorage::new();
        objects.insert("backups/a.enc", Bytes::from_static(b"x"));
        let dest = objects.copy("backups/a.enc", "us-west-2").await.unwrap();
        assert_eq!(dest, "replicas/us-west-2/backups/a.enc");
        assert!(objects.contains(&dest));
        assert!(objects.delete("missing").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_fake_encryption_round_trip_and_tamper() {
        let encryption = FakeEncryption::new();
        let sealed = encryption.encrypt("k1", b"payload").await.unwrap();
        assert_eq!(encryption.decrypt(&sealed).await.unwrap(), b"payload");
        assert!(matches!(
            encryption.decrypt(b"garbage").await,
            Err(Error::Integrity(_))
        ));
        assert_eq!(encryption.key_ids(), vec!["k1".to_string()]);
    }

    #[tokio::test]
    async fn test_injected_failures_respect_fragment() {
        let objects = InMemoryObjectStorage::new();
        objects.fail_matching(ObjectOp::Put, ".enc", true);
        assert!(objects.put("a", Bytes::new(), "x").await.is_ok());
        let err = objects.put("a.enc", Bytes::new(), "x").await.unwrap_err();
        assert!(err.is_retryable());
    }
}
