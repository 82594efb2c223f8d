//! Disaster-recovery restore tests against in-memory collaborators

use chrono::{Duration as ChronoDuration, Utc};
use std::time::Duration;
use strata_runtime::services::{alert_codes, Severity};
use strata_runtime::{DisasterRecoveryOrchestrator, Error, RestoreConfig};
use strata_storage::BackupStore;
use strata_tests::mocks::{MockServices, ObjectOp};
use strata_tests::{dump_bytes, BackupRecordBuilder};
use tempfile::TempDir;
use uuid::Uuid;

fn orchestrator(mocks: &MockServices, scratch: &TempDir, rto: Duration) -> DisasterRecoveryOrchestrator {
    DisasterRecoveryOrchestrator::new(
        mocks.services(),
        RestoreConfig {
            rto,
            scratch_dir: scratch.path().to_path_buf(),
            ..Default::default()
        },
    )
}

fn scratch_is_empty(scratch: &TempDir) -> bool {
    std::fs::read_dir(scratch.path()).unwrap().next().is_none()
}

#[tokio::test]
async fn test_restore_without_verified_backup_fails_before_restoring() {
    let scratch = tempfile::tempdir().unwrap();
    let mocks = MockServices::new(Vec::new());
    let unverified = BackupRecordBuilder::new().completed_with(b"dump").build();
    mocks.store.create_backup_record(&unverified).await.unwrap();

    let recovery = orchestrator(&mocks, &scratch, Duration::from_secs(900));
    let err = recovery.execute_restore().await.unwrap_err();

    assert!(matches!(err, Error::Precondition(_)));
    assert!(mocks.db_tool.restore_calls().is_empty());
    let failed = mocks.alerts.with_code(alert_codes::DISASTER_RECOVERY_FAILED);
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].severity, Severity::Critical);
}

#[tokio::test]
async fn test_restore_uses_latest_verified_replica() {
    let scratch = tempfile::tempdir().unwrap();
    let mocks = MockServices::new(Vec::new());
    let data = dump_bytes(2048);
    mocks
        .seed_verified_backup(b"older", Utc::now() - ChronoDuration::days(2))
        .await;
    let latest = mocks.seed_verified_backup(&data, Utc::now()).await;

    let recovery = orchestrator(&mocks, &scratch, Duration::from_secs(900));
    let report = recovery.execute_restore().await.unwrap();

    assert_eq!(report.backup_id, latest.id);
    assert_eq!(
        Some(report.source_key.as_str()),
        latest.replicated_storage_key.as_deref()
    );
    assert!(!report.rto_exceeded);

    let restores = mocks.db_tool.restore_calls();
    assert_eq!(restores.len(), 1);
    assert_eq!(restores[0].database, "teachlink");
    assert!(restores[0].clean);
    assert_eq!(restores[0].input, data);

    assert!(scratch_is_empty(&scratch));
    assert_eq!(mocks.alerts.count(alert_codes::DISASTER_RECOVERY_COMPLETED), 1);
    assert_eq!(mocks.alerts.count(alert_codes::DISASTER_RECOVERY_RTO_EXCEEDED), 0);
}

#[tokio::test]
async fn test_restore_falls_back_to_primary_copy() {
    let scratch = tempfile::tempdir().unwrap();
    let mocks = MockServices::new(Vec::new());
    let record = mocks.seed_verified_backup(&dump_bytes(512), Utc::now()).await;
    mocks.objects.fail_matching(ObjectOp::Get, "replicas/", true);

    let recovery = orchestrator(&mocks, &scratch, Duration::from_secs(900));
    let report = recovery.execute_restore().await.unwrap();

    assert_eq!(
        Some(report.source_key.as_str()),
        record.encrypted_storage_key.as_deref()
    );
    assert_eq!(mocks.db_tool.restore_calls().len(), 1);
}

#[tokio::test]
async fn test_corrupted_copy_is_never_restored() {
    let scratch = tempfile::tempdir().unwrap();
    let mocks = MockServices::new(Vec::new());
    let record = mocks.seed_verified_backup(&dump_bytes(512), Utc::now()).await;
    mocks
        .objects
        .corrupt(record.replicated_storage_key.as_deref().unwrap());

    let recovery = orchestrator(&mocks, &scratch, Duration::from_secs(900));
    let err = recovery.execute_restore().await.unwrap_err();

    assert!(matches!(err, Error::Integrity(_)));
    assert!(mocks.db_tool.restore_calls().is_empty());
    assert_eq!(mocks.alerts.count(alert_codes::DISASTER_RECOVERY_FAILED), 1);
}

#[tokio::test]
async fn test_rto_breach_alerts_once_and_keeps_restore() {
    let scratch = tempfile::tempdir().unwrap();
    let mocks = MockServices::new(Vec::new());
    mocks.seed_verified_backup(&dump_bytes(64), Utc::now()).await;
    mocks.db_tool.set_restore_delay(Duration::from_millis(150));

    let recovery = orchestrator(&mocks, &scratch, Duration::from_millis(50));
    let report = recovery.execute_restore().await.unwrap();

    assert!(report.rto_exceeded);
    assert!(report.elapsed > Duration::from_millis(50));
    let breaches = mocks
        .alerts
        .with_code(alert_codes::DISASTER_RECOVERY_RTO_EXCEEDED);
    assert_eq!(breaches.len(), 1);
    assert_eq!(breaches[0].severity, Severity::Critical);
    assert_eq!(mocks.alerts.count(alert_codes::DISASTER_RECOVERY_COMPLETED), 1);
}

#[tokio::test]
async fn test_restore_tool_failure_is_reported() {
    let scratch = tempfile::tempdir().unwrap();
    let mocks = MockServices::new(Vec::new());
    mocks.seed_verified_backup(&dump_bytes(64), Utc::now()).await;
    mocks.db_tool.fail_restore(true);

    let recovery = orchestrator(&mocks, &scratch, Duration::from_secs(900));
    let err = recovery.execute_restore().await.unwrap_err();

    assert!(matches!(err, Error::DatabaseTool(_)));
    assert!(scratch_is_empty(&scratch));
    assert_eq!(mocks.alerts.codes(), vec![alert_codes::DISASTER_RECOVERY_FAILED.to_string()]);
}

#[tokio::test]
async fn test_named_restore_requires_verified_backup() {
    let scratch = tempfile::tempdir().unwrap();
    let mocks = MockServices::new(Vec::new());
    let unverified = BackupRecordBuilder::new().completed_with(b"dump").build();
    mocks.store.create_backup_record(&unverified).await.unwrap();
    let recovery = orchestrator(&mocks, &scratch, Duration::from_secs(900));

    let err = recovery.execute_restore_of(unverified.id).await.unwrap_err();
    assert!(matches!(err, Error::Precondition(_)));

    let err = recovery.validate_restorable(Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
    assert!(mocks.db_tool.restore_calls().is_empty());
}

#[tokio::test]
async fn test_named_restore_of_verified_backup() {
    let scratch = tempfile::tempdir().unwrap();
    let mocks = MockServices::new(Vec::new());
    let older = mocks
        .seed_verified_backup(b"older dump", Utc::now() - ChronoDuration::days(3))
        .await;
    mocks.seed_verified_backup(b"newer dump", Utc::now()).await;

    let recovery = orchestrator(&mocks, &scratch, Duration::from_secs(900));
    let report = recovery.execute_restore_of(older.id).await.unwrap();

    assert_eq!(report.backup_id, older.id);
    assert_eq!(mocks.db_tool.restore_calls()[0].input, b"older dump".to_vec());
}
