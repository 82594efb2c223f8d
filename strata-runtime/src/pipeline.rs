//! Backup pipeline
//!
//! One `create-backup` job takes a record from PENDING to COMPLETED:
//! dump, upload, encrypt, replicate, checksum, persist. A `verify-backup`
//! job then proves the encrypted copy decrypts to the checksummed dump
//! before the backup becomes a restore source.

use crate::checksum::Checksums;
use crate::converters::backup_status;
use crate::jobs::JobSpec;
use crate::metrics::{observe_step, BACKUP_SIZE_BYTES};
use crate::queue::JobQueue;
use crate::scratch::ScratchFile;
use crate::services::{alert_codes, Services, Severity};
use crate::state_machine::BackupStatus;
use crate::worker::JobContext;
use crate::Result;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde_json::json;
use std::path::PathBuf;
use std::time::Instant;
use strata_storage::models::{backup_status as status, backup_type};
use strata_storage::{validate_identifier, BackupRecordModel, BackupRecordUpdate};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

const CONTENT_TYPE: &str = "application/octet-stream";

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Database backed up by the scheduled jobs
    pub primary_database: String,
    pub primary_region: String,
    /// Region receiving the replica of every encrypted backup
    pub secondary_region: String,
    pub retention_days: i64,
    pub encryption_key_id: String,
    /// Where dumps are staged while a job runs
    pub scratch_dir: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            primary_database: "teachlink".to_string(),
            primary_region: "us-east-1".to_string(),
            secondary_region: "us-west-2".to_string(),
            retention_days: 30,
            encryption_key_id: "backup-master-key".to_string(),
            scratch_dir: std::env::temp_dir().join("strata"),
        }
    }
}

/// Object key of the plaintext dump
pub fn raw_storage_key(region: &str, database: &str, backup_id: Uuid) -> String {
    format!("backups/{}/{}/{}", region, database, backup_id)
}

/// Object key of the encrypted dump
pub fn encrypted_storage_key(raw_key: &str) -> String {
    format!("{}.enc", raw_key)
}

/// Object key of the cross-region copy of `encrypted_key`
pub fn replica_storage_key(region: &str, encrypted_key: &str) -> String {
    format!("replicas/{}/{}", region, encrypted_key)
}

/// Download `key`, decrypt it and check the plaintext against the
/// record's stored digests
pub(crate) async fn verify_stored_copy(
    services: &Services,
    record: &BackupRecordModel,
    key: &str,
) -> Result<()> {
    let sealed = services.objects.get(key).await?;
    let plaintext = services.encryption.decrypt(&sealed).await?;
    Checksums::compute(&plaintext).verify(
        record.checksum_md5.as_deref(),
        record.checksum_sha256.as_deref(),
    )
}

pub struct BackupPipeline {
    services: Services,
    queue: JobQueue,
    config: PipelineConfig,
}

impl BackupPipeline {
    pub fn new(services: Services, config: PipelineConfig) -> Self {
        let queue = JobQueue::new(services.store.clone());
        Self {
            services,
            queue,
            config,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn queue(&self) -> &JobQueue {
        &self.queue
    }

    /// Create a PENDING full backup record and enqueue its job
    pub async fn enqueue_full_backup(&self, database_name: &str, region: &str) -> Result<Uuid> {
        self.enqueue_full_backup_with(backup_type::FULL, database_name, region)
            .await
    }

    /// Create a PENDING record of the given type and enqueue its job.
    ///
    /// Incremental backups run through the same full-dump pipeline.
    #[instrument(skip(self))]
    pub async fn enqueue_full_backup_with(
        &self,
        kind: &str,
        database_name: &str,
        region: &str,
    ) -> Result<Uuid> {
        if kind != backup_type::FULL && kind != backup_type::INCREMENTAL {
            return Err(crate::Error::Precondition(format!(
                "Unknown backup type: {}",
                kind
            )));
        }
        validate_identifier(database_name, "Database name")?;
        validate_identifier(region, "Region")?;

        let record =
            BackupRecordModel::pending(kind, database_name, region, self.config.retention_days);
        self.services.store.create_backup_record(&record).await?;

        if let Err(e) = self.queue.enqueue(JobSpec::create_backup(record.id)).await {
            let update = BackupRecordUpdate::status(status::FAILED)
                .with_error(format!("Failed to enqueue backup job: {}", e));
            if let Err(store_err) = self
                .services
                .store
                .update_backup_record(record.id, &update)
                .await
            {
                error!(backup_id = %record.id, error = %store_err, "Failed to mark unqueued backup failed");
            }
            return Err(e);
        }

        info!(backup_id = %record.id, "Backup requested");
        Ok(record.id)
    }

    /// Body of the `create-backup` job
    #[instrument(skip(self, ctx), fields(attempt = ctx.attempt, max_attempts = ctx.max_attempts))]
    pub async fn run_backup_job(
        &self,
        ctx: &JobContext,
        backup_id: Uuid,
    ) -> Result<BackupRecordModel> {
        let record = self.services.store.get_backup_record(backup_id).await?;

        match backup_status(&record)? {
            BackupStatus::Completed => {
                // Redelivered after the work finished
                if !record.integrity_verified {
                    self.queue.enqueue(JobSpec::verify_backup(backup_id)).await?;
                }
                info!("Backup already completed, skipping");
                return Ok(record);
            }
            BackupStatus::Failed => {
                warn!("Backup already failed, skipping");
                return Ok(record);
            }
            current => current.ensure_transition(BackupStatus::InProgress)?,
        }

        let record = self
            .services
            .store
            .update_backup_record(backup_id, &BackupRecordUpdate::status(status::IN_PROGRESS))
            .await?;
        info!(database = %record.database_name, region = %record.region, "Backup started");

        let mut uploaded = Vec::new();
        match self.execute_backup_steps(ctx, &record, &mut uploaded).await {
            Ok(completed) => {
                self.queue.enqueue(JobSpec::verify_backup(backup_id)).await?;
                info!(
                    size_bytes = completed.backup_size_bytes.unwrap_or_default(),
                    "Backup completed, verification queued"
                );
                Ok(completed)
            }
            Err(e) => {
                self.record_backup_failure(ctx, &record, &e, &uploaded).await;
                Err(e)
            }
        }
    }

    async fn execute_backup_steps(
        &self,
        ctx: &JobContext,
        record: &BackupRecordModel,
        uploaded: &mut Vec<String>,
    ) -> Result<BackupRecordModel> {
        let mut scratch = ScratchFile::new(&self.config.scratch_dir, "backup").await?;
        let result = self.dump_and_store(ctx, record, &scratch, uploaded).await;
        if let Err(e) = scratch.remove().await {
            warn!(error = %e, "Failed to remove backup scratch file");
        }
        result
    }

    async fn dump_and_store(
        &self,
        ctx: &JobContext,
        record: &BackupRecordModel,
        scratch: &ScratchFile,
        uploaded: &mut Vec<String>,
    ) -> Result<BackupRecordModel> {
        let services = &self.services;
        let total = Instant::now();

        let step = Instant::now();
        services
            .db_tool
            .dump(&record.database_name, scratch.path())
            .await?;
        let dump_elapsed = step.elapsed();
        observe_step("dump", dump_elapsed);

        let data = Bytes::from(tokio::fs::read(scratch.path()).await?);
        let raw_key = raw_storage_key(&record.region, &record.database_name, record.id);

        let step = Instant::now();
        let raw_key = services
            .objects
            .put(&raw_key, data.clone(), CONTENT_TYPE)
            .await?;
        uploaded.push(raw_key.clone());
        let upload_elapsed = step.elapsed();
        observe_step("upload", upload_elapsed);

        let step = Instant::now();
        let sealed = services
            .encryption
            .encrypt(&self.config.encryption_key_id, &data)
            .await?;
        let encrypted_key = services
            .objects
            .put(&encrypted_storage_key(&raw_key), Bytes::from(sealed), CONTENT_TYPE)
            .await?;
        uploaded.push(encrypted_key.clone());

        // Plaintext never stays in the bucket once the encrypted copy exists
        match services.objects.delete(&raw_key).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }
        uploaded.retain(|key| key != &raw_key);
        let encrypt_elapsed = step.elapsed();
        observe_step("encrypt", encrypt_elapsed);

        let step = Instant::now();
        let replica_key = services
            .objects
            .copy(&encrypted_key, &self.config.secondary_region)
            .await?;
        uploaded.push(replica_key.clone());
        let replicate_elapsed = step.elapsed();
        observe_step("replicate", replicate_elapsed);

        let step = Instant::now();
        let checksums = Checksums::compute_file(scratch.path()).await?;
        observe_step("checksum", step.elapsed());

        let size = data.len() as i64;
        BackupStatus::InProgress.ensure_transition(BackupStatus::Completed)?;
        let update = BackupRecordUpdate {
            status: Some(status::COMPLETED.to_string()),
            storage_key: Some(raw_key),
            encrypted_storage_key: Some(encrypted_key),
            replicated_storage_key: Some(replica_key),
            encryption_key_id: Some(self.config.encryption_key_id.clone()),
            backup_size_bytes: Some(size),
            checksum_md5: Some(checksums.md5),
            checksum_sha256: Some(checksums.sha256),
            error_message: Some(None),
            completed_at: Some(Utc::now()),
            metadata: Some(json!({
                "attempt": ctx.attempt,
                "secondaryRegion": self.config.secondary_region,
                "dumpDurationMs": dump_elapsed.as_millis() as u64,
                "uploadDurationMs": upload_elapsed.as_millis() as u64,
                "encryptDurationMs": encrypt_elapsed.as_millis() as u64,
                "replicateDurationMs": replicate_elapsed.as_millis() as u64,
                "totalDurationMs": total.elapsed().as_millis() as u64,
            })),
            ..Default::default()
        };

        let completed = services
            .store
            .update_backup_record(record.id, &update)
            .await?;
        BACKUP_SIZE_BYTES.observe(size as f64);
        Ok(completed)
    }

    async fn record_backup_failure(
        &self,
        ctx: &JobContext,
        record: &BackupRecordModel,
        err: &crate::Error,
        uploaded: &[String],
    ) {
        let terminal = ctx.is_last_attempt() || !err.is_retryable();
        let mut update = BackupRecordUpdate::default()
            .with_retry_count(record.retry_count + 1)
            .with_error(err.to_string());
        if terminal {
            update.status = Some(status::FAILED.to_string());
        }

        if let Err(store_err) = self
            .services
            .store
            .update_backup_record(record.id, &update)
            .await
        {
            error!(error = %store_err, "Failed to record backup failure");
        }

        if !terminal {
            warn!(error = %err, "Backup attempt failed, will retry");
            return;
        }

        let mut keys = self.backup_object_keys(record);
        for key in uploaded {
            if !keys.contains(key) {
                keys.push(key.clone());
            }
        }
        self.delete_objects(&keys).await;
        error!(error = %err, "Backup failed");
        self.services
            .alerts
            .send_alert(
                alert_codes::BACKUP_FAILED,
                &format!(
                    "Backup {} of {} in {} failed after {} attempt(s): {}",
                    record.id, record.database_name, record.region, ctx.attempt, err
                ),
                Severity::Critical,
            )
            .await;
    }

    /// Every key a backup attempt can write, whichever attempt wrote it
    fn backup_object_keys(&self, record: &BackupRecordModel) -> Vec<String> {
        let raw_key = raw_storage_key(&record.region, &record.database_name, record.id);
        let encrypted_key = encrypted_storage_key(&raw_key);
        let replica_key = replica_storage_key(&self.config.secondary_region, &encrypted_key);
        vec![raw_key, encrypted_key, replica_key]
    }

    /// Best-effort removal of partial uploads
    async fn delete_objects(&self, keys: &[String]) {
        for key in keys {
            match self.services.objects.delete(key).await {
                Ok(()) => {}
                Err(e) if e.is_not_found() => {}
                Err(e) => warn!(key = %key, error = %e, "Failed to remove partial upload"),
            }
        }
    }

    /// Fail a backup whose job will not run again. No-op once the record
    /// is terminal.
    #[instrument(skip(self))]
    pub async fn mark_backup_failed(&self, backup_id: Uuid, reason: &str) -> Result<()> {
        let record = match self.services.store.get_backup_record(backup_id).await {
            Ok(record) => record,
            Err(strata_storage::Error::NotFound(_)) => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        if backup_status(&record)?.is_terminal() {
            return Ok(());
        }

        let update = BackupRecordUpdate::status(status::FAILED)
            .with_retry_count(record.retry_count + 1)
            .with_error(reason.to_string());
        self.services
            .store
            .update_backup_record(backup_id, &update)
            .await?;

        self.delete_objects(&self.backup_object_keys(&record)).await;

        self.services
            .alerts
            .send_alert(
                alert_codes::BACKUP_FAILED,
                &format!(
                    "Backup {} of {} in {} failed: {}",
                    record.id, record.database_name, record.region, reason
                ),
                Severity::Critical,
            )
            .await;
        Ok(())
    }

    /// Body of the `verify-backup` job
    #[instrument(skip(self, ctx), fields(attempt = ctx.attempt))]
    pub async fn verify_backup(
        &self,
        ctx: &JobContext,
        backup_id: Uuid,
    ) -> Result<BackupRecordModel> {
        let record = self.services.store.get_backup_record(backup_id).await?;
        match backup_status(&record)? {
            BackupStatus::Completed => {}
            BackupStatus::Failed => {
                info!("Backup already failed, skipping verification");
                return Ok(record);
            }
            other => {
                return Err(crate::Error::InvalidState(format!(
                    "Backup {} cannot be verified while {}",
                    backup_id,
                    other.as_str()
                )))
            }
        }
        if record.integrity_verified {
            return Ok(record);
        }

        let key = record.encrypted_storage_key.clone().ok_or_else(|| {
            crate::Error::Integrity(format!("Backup {} has no encrypted copy", backup_id))
        })?;

        let step = Instant::now();
        match verify_stored_copy(&self.services, &record, &key).await {
            Ok(()) => {
                let elapsed = step.elapsed();
                observe_step("verify", elapsed);
                let update = BackupRecordUpdate {
                    integrity_verified: Some(true),
                    verified_at: Some(Utc::now()),
                    error_message: Some(None),
                    metadata: Some(json!({ "verifyDurationMs": elapsed.as_millis() as u64 })),
                    ..Default::default()
                };
                let verified = self
                    .services
                    .store
                    .update_backup_record(backup_id, &update)
                    .await?;
                info!("Backup verified");
                Ok(verified)
            }
            Err(e) => {
                let terminal = matches!(e, crate::Error::Integrity(_))
                    || ctx.is_last_attempt()
                    || !e.is_retryable();
                if terminal {
                    self.fail_verification(&record, &e.to_string()).await?;
                } else {
                    warn!(error = %e, "Verification attempt failed, will retry");
                    let update = BackupRecordUpdate::default().with_error(e.to_string());
                    if let Err(store_err) = self
                        .services
                        .store
                        .update_backup_record(backup_id, &update)
                        .await
                    {
                        error!(error = %store_err, "Failed to record verification error");
                    }
                }
                Err(e)
            }
        }
    }

    /// Fail an unverified backup whose verify job will not run again
    pub async fn mark_verification_failed(&self, backup_id: Uuid, reason: &str) -> Result<()> {
        let record = match self.services.store.get_backup_record(backup_id).await {
            Ok(record) => record,
            Err(strata_storage::Error::NotFound(_)) => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        if record.integrity_verified || backup_status(&record)? != BackupStatus::Completed {
            return Ok(());
        }
        self.fail_verification(&record, reason).await
    }

    async fn fail_verification(&self, record: &BackupRecordModel, reason: &str) -> Result<()> {
        BackupStatus::Completed.ensure_transition(BackupStatus::Failed)?;
        let update = BackupRecordUpdate {
            integrity_verified: Some(false),
            ..BackupRecordUpdate::status(status::FAILED)
        }
        .with_error(format!("Verification failed: {}", reason));
        self.services
            .store
            .update_backup_record(record.id, &update)
            .await?;

        error!(backup_id = %record.id, reason = %reason, "Backup verification failed");
        self.services
            .alerts
            .send_alert(
                alert_codes::BACKUP_VERIFICATION_FAILED,
                &format!("Backup {} failed verification: {}", record.id, reason),
                Severity::Critical,
            )
            .await;
        Ok(())
    }

    /// Body of the `delete-backup` job.
    ///
    /// Missing records and objects are treated as already deleted. The row
    /// is only removed after every object is gone.
    #[instrument(skip(self))]
    pub async fn delete_backup(&self, backup_id: Uuid) -> Result<()> {
        let record = match self.services.store.get_backup_record(backup_id).await {
            Ok(record) => record,
            Err(strata_storage::Error::NotFound(_)) => {
                info!("Backup already deleted");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        let keys = [
            record.storage_key.as_deref(),
            record.encrypted_storage_key.as_deref(),
            record.replicated_storage_key.as_deref(),
        ];
        for key in keys.into_iter().flatten() {
            match self.services.objects.delete(key).await {
                Ok(()) => {}
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e),
            }
        }

        self.services.store.delete_backup_record(backup_id).await?;
        info!("Backup deleted");
        Ok(())
    }

    /// Enqueue a delete job for every backup past its retention window.
    ///
    /// Returns the ids that were scheduled for deletion.
    #[instrument(skip(self))]
    pub async fn cleanup_expired(&self, now: DateTime<Utc>) -> Result<Vec<Uuid>> {
        let cutoff = now - chrono::Duration::days(self.config.retention_days);
        let expired = self.services.store.find_expired(cutoff).await?;

        let mut scheduled = Vec::with_capacity(expired.len());
        for record in expired {
            self.queue.enqueue(JobSpec::delete_backup(record.id)).await?;
            scheduled.push(record.id);
        }

        info!(count = scheduled.len(), cutoff = %cutoff, "Expired backups scheduled for deletion");
        Ok(scheduled)
    }
}
