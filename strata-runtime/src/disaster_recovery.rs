//! Disaster-recovery restores
//!
//! Restores the latest verified backup (or a chosen one) into the target
//! database, preferring the replica in the secondary region, and measures
//! the wall-clock time against the recovery-time objective.

use crate::checksum::Checksums;
use crate::metrics::{RESTORE_DURATION, RTO_EXCEEDED_TOTAL};
use crate::scratch::ScratchFile;
use crate::services::{alert_codes, Services, Severity};
use crate::Result;
use bytes::Bytes;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use strata_storage::{validate_identifier, BackupRecordModel};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct RestoreConfig {
    pub target_database: String,
    /// Recovery-time objective (default: 15 minutes)
    pub rto: Duration,
    pub scratch_dir: PathBuf,
}

impl Default for RestoreConfig {
    fn default() -> Self {
        Self {
            target_database: "teachlink".to_string(),
            rto: Duration::from_secs(15 * 60),
            scratch_dir: std::env::temp_dir().join("strata"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RestoreReport {
    pub backup_id: Uuid,
    /// Object the dump was read from
    pub source_key: String,
    /// Measured from the start of the restore request
    pub elapsed: Duration,
    pub rto_exceeded: bool,
}

pub struct DisasterRecoveryOrchestrator {
    services: Services,
    config: RestoreConfig,
}

impl DisasterRecoveryOrchestrator {
    pub fn new(services: Services, config: RestoreConfig) -> Self {
        Self { services, config }
    }

    pub fn config(&self) -> &RestoreConfig {
        &self.config
    }

    /// Restore the most recent verified backup
    #[instrument(skip(self), fields(target = %self.config.target_database))]
    pub async fn execute_restore(&self) -> Result<RestoreReport> {
        let started = Instant::now();
        let result = async {
            let record = self
                .services
                .store
                .find_latest_verified()
                .await?
                .ok_or_else(|| {
                    crate::Error::Precondition("No verified backup available for restore".to_string())
                })?;
            self.restore_record(&record, started).await
        }
        .await;
        self.finish(result).await
    }

    /// Restore a specific backup, which must be completed and verified
    #[instrument(skip(self), fields(target = %self.config.target_database))]
    pub async fn execute_restore_of(&self, backup_id: Uuid) -> Result<RestoreReport> {
        let started = Instant::now();
        let result = async {
            let record = self.validate_restorable(backup_id).await?;
            self.restore_record(&record, started).await
        }
        .await;
        self.finish(result).await
    }

    /// Fetch a backup and check it may be used as a restore source
    pub async fn validate_restorable(&self, backup_id: Uuid) -> Result<BackupRecordModel> {
        let record = match self.services.store.get_backup_record(backup_id).await {
            Ok(record) => record,
            Err(strata_storage::Error::NotFound(_)) => {
                return Err(crate::Error::NotFound(format!("Backup {} not found", backup_id)))
            }
            Err(e) => return Err(e.into()),
        };

        if !record.is_restorable() {
            return Err(crate::Error::Precondition(format!(
                "Backup {} is not restorable (status {}, verified {})",
                backup_id, record.status, record.integrity_verified
            )));
        }
        Ok(record)
    }

    async fn restore_record(
        &self,
        record: &BackupRecordModel,
        started: Instant,
    ) -> Result<RestoreReport> {
        validate_identifier(&self.config.target_database, "Target database")?;
        info!(backup_id = %record.id, "Restoring backup");

        let (source_key, sealed) = self.fetch_source(record).await?;
        let plaintext = self.services.encryption.decrypt(&sealed).await?;
        Checksums::compute(&plaintext).verify(
            record.checksum_md5.as_deref(),
            record.checksum_sha256.as_deref(),
        )?;

        let mut scratch = ScratchFile::new(&self.config.scratch_dir, "restore").await?;
        let restored = async {
            tokio::fs::write(scratch.path(), &plaintext).await?;
            self.services
                .db_tool
                .restore(&self.config.target_database, scratch.path(), true)
                .await
        }
        .await;
        if let Err(e) = scratch.remove().await {
            warn!(error = %e, "Failed to remove restore scratch file");
        }
        restored?;

        let elapsed = started.elapsed();
        Ok(RestoreReport {
            backup_id: record.id,
            source_key,
            elapsed,
            rto_exceeded: elapsed > self.config.rto,
        })
    }

    /// Read the replica when there is one, the primary encrypted copy otherwise
    async fn fetch_source(&self, record: &BackupRecordModel) -> Result<(String, Bytes)> {
        if let Some(replica) = &record.replicated_storage_key {
            match self.services.objects.get(replica).await {
                Ok(bytes) => return Ok((replica.clone(), bytes)),
                Err(e) => warn!(
                    key = %replica,
                    error = %e,
                    "Replica unavailable, falling back to primary copy"
                ),
            }
        }

        let primary = record.encrypted_storage_key.clone().ok_or_else(|| {
            crate::Error::Integrity(format!("Backup {} has no encrypted copy", record.id))
        })?;
        let bytes = self.services.objects.get(&primary).await?;
        Ok((primary, bytes))
    }

    async fn finish(&self, result: Result<RestoreReport>) -> Result<RestoreReport> {
        let alerts = &self.services.alerts;
        match result {
            Ok(report) => {
                RESTORE_DURATION.observe(report.elapsed.as_secs_f64());
                if report.rto_exceeded {
                    RTO_EXCEEDED_TOTAL.inc();
                    warn!(
                        elapsed_secs = report.elapsed.as_secs(),
                        rto_secs = self.config.rto.as_secs(),
                        "Restore exceeded the RTO"
                    );
                    alerts
                        .send_alert(
                            alert_codes::DISASTER_RECOVERY_RTO_EXCEEDED,
                            &format!(
                                "Restore of backup {} took {}s, exceeding the RTO of {}s",
                                report.backup_id,
                                report.elapsed.as_secs(),
                                self.config.rto.as_secs()
                            ),
                            Severity::Critical,
                        )
                        .await;
                }

                info!(
                    backup_id = %report.backup_id,
                    source = %report.source_key,
                    elapsed_ms = report.elapsed.as_millis() as u64,
                    "Disaster recovery restore completed"
                );
                alerts
                    .send_alert(
                        alert_codes::DISASTER_RECOVERY_COMPLETED,
                        &format!(
                            "Restored backup {} into {} in {}s",
                            report.backup_id,
                            self.config.target_database,
                            report.elapsed.as_secs()
                        ),
                        Severity::Info,
                    )
                    .await;
                Ok(report)
            }
            Err(e) => {
                error!(error = %e, "Disaster recovery restore failed");
                alerts
                    .send_alert(
                        alert_codes::DISASTER_RECOVERY_FAILED,
                        &format!(
                            "Restore into {} failed: {}",
                            self.config.target_database, e
                        ),
                        Severity::Critical,
                    )
                    .await;
                Err(e)
            }
        }
    }
}
