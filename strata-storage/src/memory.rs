//! In-memory storage backend
//!
//! Same semantics as [`PostgresStorage`](crate::PostgresStorage) for
//! single-process use and tests. Each call takes one lock, so every
//! single-row update is atomic.

use crate::models::*;
use crate::store::{
    merge_metadata, validate_backup_status, validate_non_empty_string,
    validate_pagination_params, validate_test_status, BackupRecordUpdate, BackupStore, JobStore,
    RecoveryTestStore, RecoveryTestUpdate,
};
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use sqlx::types::Json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use uuid::Uuid;

#[derive(Default)]
pub struct InMemoryStorage {
    backups: RwLock<HashMap<Uuid, BackupRecordModel>>,
    tests: RwLock<HashMap<Uuid, RecoveryTestModel>>,
    jobs: RwLock<HashMap<Uuid, BackupJobModel>>,
    unavailable: AtomicBool,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate an outage: every call fails with `ConnectionFailed` until reset
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(Error::ConnectionFailed(
                "in-memory store marked unavailable".to_string(),
            ));
        }
        Ok(())
    }

    /// Snapshot of all backup records
    pub fn all_backup_records(&self) -> Vec<BackupRecordModel> {
        self.backups.read().values().cloned().collect()
    }

    /// Snapshot of all jobs, oldest first
    pub fn all_jobs(&self) -> Vec<BackupJobModel> {
        let mut jobs: Vec<_> = self.jobs.read().values().cloned().collect();
        jobs.sort_by_key(|job| job.created_at);
        jobs
    }

    fn job_mut<F>(&self, id: Uuid, f: F) -> Result<()>
    where
        F: FnOnce(&mut BackupJobModel),
    {
        self.check_available()?;
        let mut jobs = self.jobs.write();
        let job = jobs
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("Job {}", id)))?;
        f(job);
        job.updated_at = Utc::now();
        Ok(())
    }
}

#[async_trait]
impl BackupStore for InMemoryStorage {
    async fn create_backup_record(&self, record: &BackupRecordModel) -> Result<()> {
        self.check_available()?;
        validate_non_empty_string(&record.database_name, "Database name")?;
        validate_non_empty_string(&record.region, "Region")?;
        validate_backup_status(&record.status)?;

        let mut backups = self.backups.write();
        if backups.contains_key(&record.id) {
            return Err(Error::AlreadyExists(format!("Backup record {}", record.id)));
        }
        backups.insert(record.id, record.clone());
        Ok(())
    }

    async fn get_backup_record(&self, id: Uuid) -> Result<BackupRecordModel> {
        self.check_available()?;
        self.backups
            .read()
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("Backup record {}", id)))
    }

    async fn update_backup_record(
        &self,
        id: Uuid,
        update: &BackupRecordUpdate,
    ) -> Result<BackupRecordModel> {
        self.check_available()?;
        if let Some(status) = &update.status {
            validate_backup_status(status)?;
        }

        let mut backups = self.backups.write();
        let record = backups
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("Backup record {}", id)))?;

        if let Some(v) = &update.status {
            record.status = v.clone();
        }
        if let Some(v) = &update.storage_key {
            record.storage_key = Some(v.clone());
        }
        if let Some(v) = &update.encrypted_storage_key {
            record.encrypted_storage_key = Some(v.clone());
        }
        if let Some(v) = &update.replicated_storage_key {
            record.replicated_storage_key = Some(v.clone());
        }
        if let Some(v) = &update.encryption_key_id {
            record.encryption_key_id = Some(v.clone());
        }
        if let Some(v) = update.backup_size_bytes {
            record.backup_size_bytes = Some(v);
        }
        if let Some(v) = &update.checksum_md5 {
            record.checksum_md5 = Some(v.clone());
        }
        if let Some(v) = &update.checksum_sha256 {
            record.checksum_sha256 = Some(v.clone());
        }
        if let Some(v) = update.integrity_verified {
            record.integrity_verified = v;
        }
        if let Some(v) = update.retry_count {
            record.retry_count = v;
        }
        if let Some(v) = &update.error_message {
            record.error_message = v.clone();
        }
        if let Some(patch) = &update.metadata {
            merge_metadata(&mut record.metadata.0, patch);
        }
        if let Some(v) = update.verified_at {
            record.verified_at = Some(v);
        }
        if let Some(v) = update.completed_at {
            record.completed_at = Some(v);
        }
        record.updated_at = Utc::now();

        Ok(record.clone())
    }

    async fn delete_backup_record(&self, id: Uuid) -> Result<bool> {
        self.check_available()?;
        Ok(self.backups.write().remove(&id).is_some())
    }

    async fn find_latest_verified(&self) -> Result<Option<BackupRecordModel>> {
        self.check_available()?;
        Ok(self
            .backups
            .read()
            .values()
            .filter(|r| r.is_restorable())
            .max_by_key(|r| (r.completed_at, r.created_at))
            .cloned())
    }

    async fn find_expired(&self, cutoff: DateTime<Utc>) -> Result<Vec<BackupRecordModel>> {
        self.check_available()?;
        let mut expired: Vec<_> = self
            .backups
            .read()
            .values()
            .filter(|r| r.status == backup_status::COMPLETED && r.created_at < cutoff)
            .cloned()
            .collect();
        expired.sort_by_key(|r| r.created_at);
        Ok(expired)
    }

    async fn list_verified(&self) -> Result<Vec<BackupRecordModel>> {
        self.check_available()?;
        let mut verified: Vec<_> = self
            .backups
            .read()
            .values()
            .filter(|r| r.is_restorable())
            .cloned()
            .collect();
        verified.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(verified)
    }

    async fn list_backup_records(
        &self,
        status: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<BackupRecordModel>> {
        self.check_available()?;
        validate_pagination_params(limit, offset)?;
        if let Some(status) = status {
            validate_backup_status(status)?;
        }

        let mut records: Vec<_> = self
            .backups
            .read()
            .values()
            .filter(|r| status.map_or(true, |s| r.status == s))
            .cloned()
            .collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect())
    }

    async fn list_backup_records_updated_since(
        &self,
        status: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<BackupRecordModel>> {
        self.check_available()?;
        validate_backup_status(status)?;

        let mut records: Vec<_> = self
            .backups
            .read()
            .values()
            .filter(|r| r.status == status && r.updated_at >= since)
            .cloned()
            .collect();
        records.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(records)
    }

    async fn health_check(&self) -> Result<()> {
        self.check_available()
    }
}

#[async_trait]
impl RecoveryTestStore for InMemoryStorage {
    async fn create_recovery_test(&self, test: &RecoveryTestModel) -> Result<()> {
        self.check_available()?;
        validate_non_empty_string(&test.test_database_name, "Test database name")?;
        validate_test_status(&test.status)?;

        if !self.backups.read().contains_key(&test.backup_record_id) {
            return Err(Error::NotFound(format!(
                "Backup record {}",
                test.backup_record_id
            )));
        }

        let mut tests = self.tests.write();
        if tests.contains_key(&test.id) {
            return Err(Error::AlreadyExists(format!("Recovery test {}", test.id)));
        }
        tests.insert(test.id, test.clone());
        Ok(())
    }

    async fn get_recovery_test(&self, id: Uuid) -> Result<RecoveryTestModel> {
        self.check_available()?;
        self.tests
            .read()
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("Recovery test {}", id)))
    }

    async fn update_recovery_test(
        &self,
        id: Uuid,
        update: &RecoveryTestUpdate,
    ) -> Result<RecoveryTestModel> {
        self.check_available()?;
        if let Some(status) = &update.status {
            validate_test_status(status)?;
        }

        let mut tests = self.tests.write();
        let test = tests
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("Recovery test {}", id)))?;

        if let Some(v) = &update.status {
            test.status = v.clone();
        }
        if let Some(v) = &update.validation_results {
            test.validation_results = Some(Json(v.clone()));
        }
        if let Some(v) = &update.performance_metrics {
            test.performance_metrics = Some(Json(v.clone()));
        }
        if let Some(v) = &update.error_message {
            test.error_message = v.clone();
        }
        if let Some(v) = update.retry_count {
            test.retry_count = v;
        }
        if let Some(v) = update.test_completed_at {
            test.test_completed_at = Some(v);
        }
        test.updated_at = Utc::now();

        Ok(test.clone())
    }

    async fn latest_finished_recovery_test(&self) -> Result<Option<RecoveryTestModel>> {
        self.check_available()?;
        Ok(self
            .tests
            .read()
            .values()
            .filter(|t| t.status == test_status::PASSED || t.status == test_status::FAILED)
            .max_by_key(|t| t.created_at)
            .cloned())
    }

    async fn list_recovery_tests_for_backup(
        &self,
        backup_record_id: Uuid,
    ) -> Result<Vec<RecoveryTestModel>> {
        self.check_available()?;
        let mut tests: Vec<_> = self
            .tests
            .read()
            .values()
            .filter(|t| t.backup_record_id == backup_record_id)
            .cloned()
            .collect();
        tests.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(tests)
    }
}

#[async_trait]
impl JobStore for InMemoryStorage {
    async fn enqueue_job(&self, job: &BackupJobModel) -> Result<()> {
        self.check_available()?;
        validate_non_empty_string(&job.job_name, "Job name")?;

        let mut jobs = self.jobs.write();
        if jobs.contains_key(&job.id) {
            return Err(Error::AlreadyExists(format!("Job {}", job.id)));
        }
        jobs.insert(job.id, job.clone());
        Ok(())
    }

    async fn get_job(&self, id: Uuid) -> Result<BackupJobModel> {
        self.check_available()?;
        self.jobs
            .read()
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("Job {}", id)))
    }

    async fn claim_next_job(&self, now: DateTime<Utc>) -> Result<Option<BackupJobModel>> {
        self.check_available()?;
        let mut jobs = self.jobs.write();

        let candidate = jobs
            .values()
            .filter(|job| {
                (job.state == job_state::QUEUED && job.run_at <= now)
                    || (job.state == job_state::RUNNING
                        && job.locked_until.map_or(false, |until| until < now))
            })
            .min_by_key(|job| (job.run_at, job.created_at))
            .map(|job| job.id);

        let Some(id) = candidate else {
            return Ok(None);
        };
        let Some(job) = jobs.get_mut(&id) else {
            return Ok(None);
        };

        if job.state == job_state::RUNNING {
            job.last_error = Some("Reclaimed after lock expiry".to_string());
        }
        job.state = job_state::RUNNING.to_string();
        job.attempts += 1;
        job.locked_until = Some(now + chrono::Duration::milliseconds(job.timeout_ms));
        job.updated_at = now;

        Ok(Some(job.clone()))
    }

    async fn complete_job(&self, id: Uuid) -> Result<()> {
        self.job_mut(id, |job| {
            job.state = job_state::SUCCEEDED.to_string();
            job.locked_until = None;
            job.completed_at = Some(Utc::now());
        })
    }

    async fn reschedule_job(&self, id: Uuid, run_at: DateTime<Utc>, error: &str) -> Result<()> {
        self.job_mut(id, |job| {
            job.state = job_state::QUEUED.to_string();
            job.run_at = run_at;
            job.locked_until = None;
            job.last_error = Some(error.to_string());
        })
    }

    async fn fail_job(&self, id: Uuid, error: &str) -> Result<()> {
        self.job_mut(id, |job| {
            job.state = job_state::FAILED.to_string();
            job.locked_until = None;
            job.last_error = Some(error.to_string());
            job.completed_at = Some(Utc::now());
        })
    }

    async fn count_jobs_by_state(&self) -> Result<Vec<(String, i64)>> {
        self.check_available()?;
        let mut counts: HashMap<String, i64> = HashMap::new();
        for job in self.jobs.read().values() {
            *counts.entry(job.state.clone()).or_default() += 1;
        }
        let mut counts: Vec<_> = counts.into_iter().collect();
        counts.sort();
        Ok(counts)
    }
}
