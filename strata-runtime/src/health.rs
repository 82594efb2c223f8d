//! Backup health evaluation for `GET /backup/health`

use crate::Result;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::sync::Arc;
use strata_storage::models::{backup_status, test_status};
use strata_storage::MetadataStore;

/// Latest verified backup may be at most this old
const MAX_VERIFIED_AGE_DAYS: i64 = 8;
/// Window in which any failed backup is reported
const FAILURE_WINDOW_DAYS: i64 = 7;
/// Matches the create-backup job timeout
const STUCK_AFTER_HOURS: i64 = 1;
const STUCK_SCAN_LIMIT: i64 = 1000;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthReport {
    pub healthy: bool,
    pub issues: Vec<String>,
}

pub struct BackupHealth {
    store: Arc<dyn MetadataStore>,
}

impl BackupHealth {
    pub fn new(store: Arc<dyn MetadataStore>) -> Self {
        Self { store }
    }

    pub async fn evaluate(&self, now: DateTime<Utc>) -> Result<HealthReport> {
        let mut issues = Vec::new();

        match self.store.find_latest_verified().await? {
            None => issues.push("No verified backup available".to_string()),
            Some(latest) => {
                let taken_at = latest.completed_at.unwrap_or(latest.created_at);
                let age = now - taken_at;
                if age > Duration::days(MAX_VERIFIED_AGE_DAYS) {
                    issues.push(format!(
                        "Latest verified backup {} is {} days old",
                        latest.id,
                        age.num_days()
                    ));
                }
            }
        }

        let failed = self
            .store
            .list_backup_records_updated_since(
                backup_status::FAILED,
                now - Duration::days(FAILURE_WINDOW_DAYS),
            )
            .await?;
        if !failed.is_empty() {
            issues.push(format!(
                "{} backup(s) failed in the last {} days",
                failed.len(),
                FAILURE_WINDOW_DAYS
            ));
        }

        if let Some(test) = self.store.latest_finished_recovery_test().await? {
            if test.status == test_status::FAILED {
                issues.push(format!(
                    "Latest recovery test {} failed: {}",
                    test.id,
                    test.error_message.as_deref().unwrap_or("no details")
                ));
            }
        }

        let stuck_cutoff = now - Duration::hours(STUCK_AFTER_HOURS);
        let stuck = self
            .store
            .list_backup_records(Some(backup_status::IN_PROGRESS), STUCK_SCAN_LIMIT, 0)
            .await?
            .into_iter()
            .filter(|record| record.updated_at < stuck_cutoff)
            .count();
        if stuck > 0 {
            issues.push(format!(
                "{} backup(s) in progress for more than {} hour(s)",
                stuck, STUCK_AFTER_HOURS
            ));
        }

        Ok(HealthReport {
            healthy: issues.is_empty(),
            issues,
        })
    }
}
