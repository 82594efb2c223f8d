//! Integrity sampler
//!
//! Periodically re-verifies a random subset of verified backups: both
//! encrypted copies are downloaded, decrypted and checked against the
//! stored digests, optionally followed by a restore test. Corrupted
//! backups accumulate in a set until it reaches the configured threshold;
//! one aggregated alert then covers the whole set and the set starts over.

use crate::metrics::INTEGRITY_CHECKS_TOTAL;
use crate::pipeline::verify_stored_copy;
use crate::recovery_test::RecoveryTestHarness;
use crate::services::{alert_codes, Services, Severity};
use crate::Result;
use parking_lot::Mutex;
use rand::seq::SliceRandom;
use std::collections::HashSet;
use std::sync::Arc;
use strata_storage::models::{backup_status, test_status};
use strata_storage::{BackupRecordModel, BackupRecordUpdate};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct SamplerConfig {
    /// Share of verified backups checked per run, in percent (default: 10)
    pub sample_percent: f64,
    /// Corrupted-set size that triggers the aggregated alert (default: 1)
    pub corruption_threshold: usize,
    /// Also restore each sampled backup into a throwaway database
    pub restore_test: bool,
    /// Overwrite a corrupted copy with the healthy one
    pub auto_repair: bool,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            sample_percent: 10.0,
            corruption_threshold: 1,
            restore_test: false,
            auto_repair: true,
        }
    }
}

/// Outcome of one sampling run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SampleReport {
    pub sampled: Vec<Uuid>,
    /// Backups still corrupted after any repair attempt
    pub corrupted: Vec<Uuid>,
    pub repaired: Vec<Uuid>,
    pub alert_fired: bool,
}

/// Number of backups to check out of `total`: at least one when any exist
pub fn sample_size(total: usize, percent: f64) -> usize {
    if total == 0 {
        return 0;
    }
    let percent = percent.clamp(0.0, 100.0);
    let wanted = (total as f64 * percent / 100.0).ceil() as usize;
    wanted.clamp(1, total)
}

/// Corrupted backups not yet covered by an alert
#[derive(Debug, Default)]
struct CorruptionState {
    ids: HashSet<Uuid>,
}

/// Result of checking one stored copy
enum CopyCheck {
    Healthy,
    Corrupted(String),
    /// Transient failure; says nothing about the data
    Inconclusive(String),
}

pub struct IntegritySampler {
    services: Services,
    harness: Option<Arc<RecoveryTestHarness>>,
    config: SamplerConfig,
    state: Mutex<CorruptionState>,
}

impl IntegritySampler {
    pub fn new(services: Services, config: SamplerConfig) -> Self {
        Self {
            services,
            harness: None,
            config,
            state: Mutex::new(CorruptionState::default()),
        }
    }

    /// Harness used when `restore_test` is enabled
    pub fn with_harness(mut self, harness: Arc<RecoveryTestHarness>) -> Self {
        self.harness = Some(harness);
        self
    }

    /// Corrupted backups found since the last aggregated alert
    pub fn corrupted_ids(&self) -> Vec<Uuid> {
        self.state.lock().ids.iter().copied().collect()
    }

    #[instrument(skip(self), fields(percent = self.config.sample_percent))]
    pub async fn run_sample(&self) -> Result<SampleReport> {
        let verified = self.services.store.list_verified().await?;
        let count = sample_size(verified.len(), self.config.sample_percent);
        let chosen: Vec<BackupRecordModel> = verified
            .choose_multiple(&mut rand::thread_rng(), count)
            .cloned()
            .collect();

        let mut report = SampleReport::default();
        for record in chosen {
            report.sampled.push(record.id);
            match self.check_backup(&record).await {
                BackupCheck::Healthy => {
                    INTEGRITY_CHECKS_TOTAL.with_label_values(&["healthy"]).inc();
                }
                BackupCheck::Repaired => {
                    INTEGRITY_CHECKS_TOTAL.with_label_values(&["repaired"]).inc();
                    report.repaired.push(record.id);
                }
                BackupCheck::Corrupted(reason) => {
                    INTEGRITY_CHECKS_TOTAL.with_label_values(&["corrupted"]).inc();
                    self.quarantine(&record, &reason).await;
                    report.corrupted.push(record.id);
                }
                BackupCheck::Skipped => {}
            }
        }

        report.alert_fired = self.update_corruption_state(&report).await;
        info!(
            sampled = report.sampled.len(),
            corrupted = report.corrupted.len(),
            repaired = report.repaired.len(),
            "Integrity sample finished"
        );
        Ok(report)
    }

    async fn check_backup(&self, record: &BackupRecordModel) -> BackupCheck {
        let Some(primary_key) = record.encrypted_storage_key.clone() else {
            return BackupCheck::Corrupted("no encrypted copy recorded".to_string());
        };
        let primary = self.check_copy(record, &primary_key).await;
        let replica = match &record.replicated_storage_key {
            Some(key) => Some((key.clone(), self.check_copy(record, key).await)),
            None => None,
        };

        let mut repaired = false;
        match (&primary, &replica) {
            (CopyCheck::Inconclusive(reason), _) | (_, Some((_, CopyCheck::Inconclusive(reason)))) => {
                warn!(backup_id = %record.id, reason = %reason, "Integrity check inconclusive, skipping backup");
                return BackupCheck::Skipped;
            }
            (CopyCheck::Healthy, None | Some((_, CopyCheck::Healthy))) => {}
            (CopyCheck::Corrupted(reason), Some((replica_key, CopyCheck::Healthy))) => {
                warn!(backup_id = %record.id, reason = %reason, "Primary copy corrupted");
                if !self.config.auto_repair {
                    return BackupCheck::Corrupted(format!("primary copy: {}", reason));
                }
                if let Err(e) = self.repair(record, replica_key, &primary_key).await {
                    return BackupCheck::Corrupted(format!("primary copy: {}; repair failed: {}", reason, e));
                }
                repaired = true;
            }
            (CopyCheck::Healthy, Some((replica_key, CopyCheck::Corrupted(reason)))) => {
                warn!(backup_id = %record.id, reason = %reason, "Replica corrupted");
                if !self.config.auto_repair {
                    return BackupCheck::Corrupted(format!("replica: {}", reason));
                }
                if let Err(e) = self.repair(record, &primary_key, replica_key).await {
                    return BackupCheck::Corrupted(format!("replica: {}; repair failed: {}", reason, e));
                }
                repaired = true;
            }
            (CopyCheck::Corrupted(reason), None) => {
                return BackupCheck::Corrupted(format!("primary copy: {}", reason));
            }
            (CopyCheck::Corrupted(reason), Some((_, CopyCheck::Corrupted(replica_reason)))) => {
                return BackupCheck::Corrupted(format!(
                    "primary copy: {}; replica: {}",
                    reason, replica_reason
                ));
            }
        }

        if self.config.restore_test {
            if let Some(reason) = self.restore_test(record).await {
                return BackupCheck::Corrupted(reason);
            }
        }

        if repaired {
            BackupCheck::Repaired
        } else {
            BackupCheck::Healthy
        }
    }

    async fn check_copy(&self, record: &BackupRecordModel, key: &str) -> CopyCheck {
        match verify_stored_copy(&self.services, record, key).await {
            Ok(()) => CopyCheck::Healthy,
            Err(e) if e.is_not_found() || !e.is_retryable() => CopyCheck::Corrupted(e.to_string()),
            Err(e) => CopyCheck::Inconclusive(e.to_string()),
        }
    }

    /// Overwrite `bad_key` with the bytes at `good_key`, then re-check it
    async fn repair(&self, record: &BackupRecordModel, good_key: &str, bad_key: &str) -> Result<()> {
        let bytes = self.services.objects.get(good_key).await?;
        self.services
            .objects
            .put(bad_key, bytes, "application/octet-stream")
            .await?;
        verify_stored_copy(&self.services, record, bad_key).await?;
        info!(backup_id = %record.id, repaired = %bad_key, source = %good_key, "Corrupted copy repaired");
        Ok(())
    }

    async fn restore_test(&self, record: &BackupRecordModel) -> Option<String> {
        let harness = self.harness.as_ref()?;
        match harness.run_inline(record.id).await {
            Ok(test) if test.status == test_status::PASSED => None,
            Ok(test) => Some(format!(
                "restore test {} failed: {}",
                test.id,
                test.error_message.unwrap_or_default()
            )),
            Err(e) => Some(format!("restore test could not run: {}", e)),
        }
    }

    /// Take a corrupted backup out of the restore pool
    async fn quarantine(&self, record: &BackupRecordModel, reason: &str) {
        error!(backup_id = %record.id, reason = %reason, "Backup corrupted");
        let update = BackupRecordUpdate {
            integrity_verified: Some(false),
            ..BackupRecordUpdate::status(backup_status::FAILED)
        }
        .with_error(format!("Integrity sampling failed: {}", reason));
        if let Err(e) = self
            .services
            .store
            .update_backup_record(record.id, &update)
            .await
        {
            error!(backup_id = %record.id, error = %e, "Failed to mark corrupted backup failed");
        }
    }

    /// Returns whether the aggregated alert fired on this run
    async fn update_corruption_state(&self, report: &SampleReport) -> bool {
        let (fire, size) = {
            let mut state = self.state.lock();
            for id in &report.repaired {
                state.ids.remove(id);
            }
            state.ids.extend(report.corrupted.iter().copied());

            let size = state.ids.len();
            let fire = size >= self.config.corruption_threshold.max(1);
            if fire {
                // Alerted backups are quarantined and leave the sample pool
                state.ids.clear();
            }
            (fire, size)
        };

        if fire {
            self.services
                .alerts
                .send_alert(
                    alert_codes::BACKUP_CORRUPTION_DETECTED,
                    &format!(
                        "{} backup(s) failed integrity sampling (threshold {})",
                        size, self.config.corruption_threshold
                    ),
                    Severity::Critical,
                )
                .await;
        }
        fire
    }
}

enum BackupCheck {
    Healthy,
    Repaired,
    Corrupted(String),
    Skipped,
}
