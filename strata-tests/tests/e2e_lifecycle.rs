//! End-to-end backup lifecycle against in-memory collaborators
//!
//! Schedules a backup, drives it through the worker, proves it with a
//! recovery test, restores from it, samples it and finally expires it.

use chrono::{Duration, Utc};
use std::sync::Arc;
use strata_runtime::services::alert_codes;
use strata_runtime::{
    BackupHealth, BackupPipeline, BackupScheduler, DisasterRecoveryOrchestrator, IntegritySampler,
    JobDispatcher, JobSpec, PipelineConfig, RecoveryTestHarness, RestoreConfig, SamplerConfig,
    ScheduleConfig, WorkerConfig, WorkerPool,
};
use strata_storage::models::{backup_status, job_state, test_status};
use strata_storage::{BackupStore, RecoveryTestStore};
use strata_tests::assertions::{assert_no_objects_for, assert_verification_gating};
use strata_tests::{dump_bytes, MockServices};

struct Stack {
    mocks: MockServices,
    pipeline: Arc<BackupPipeline>,
    harness: Arc<RecoveryTestHarness>,
    recovery: Arc<DisasterRecoveryOrchestrator>,
    scheduler: BackupScheduler,
    pool: WorkerPool,
    _scratch: tempfile::TempDir,
}

impl Stack {
    fn new() -> Self {
        let scratch = tempfile::tempdir().unwrap();
        let mocks = MockServices::new(dump_bytes(4096));
        let pipeline = Arc::new(BackupPipeline::new(
            mocks.services(),
            PipelineConfig {
                scratch_dir: scratch.path().to_path_buf(),
                ..Default::default()
            },
        ));
        let harness = Arc::new(RecoveryTestHarness::new(
            mocks.services(),
            scratch.path().to_path_buf(),
        ));
        let recovery = Arc::new(DisasterRecoveryOrchestrator::new(
            mocks.services(),
            RestoreConfig {
                scratch_dir: scratch.path().to_path_buf(),
                ..Default::default()
            },
        ));
        let sampler = Arc::new(
            IntegritySampler::new(
                mocks.services(),
                SamplerConfig {
                    sample_percent: 100.0,
                    restore_test: true,
                    ..Default::default()
                },
            )
            .with_harness(harness.clone()),
        );
        let scheduler = BackupScheduler::new(
            pipeline.clone(),
            mocks.alerts.clone(),
            ScheduleConfig::default(),
        )
        .with_sampler(sampler);
        let dispatcher = Arc::new(JobDispatcher::new(
            pipeline.clone(),
            harness.clone(),
            recovery.clone(),
        ));
        let pool = WorkerPool::new(mocks.store.clone(), dispatcher, WorkerConfig::default());

        Self {
            mocks,
            pipeline,
            harness,
            recovery,
            scheduler,
            pool,
            _scratch: scratch,
        }
    }
}

#[tokio::test]
async fn test_backup_lifecycle() {
    let stack = Stack::new();
    let health = BackupHealth::new(stack.mocks.store.clone());

    let before = health.evaluate(Utc::now()).await.unwrap();
    assert!(!before.healthy);

    // Weekly backup runs and verifies
    let backup_id = stack.scheduler.run_weekly_backup().await.unwrap();
    stack.pool.run_until_idle().await.unwrap();
    let record = stack.mocks.store.get_backup_record(backup_id).await.unwrap();
    assert_eq!(record.status, backup_status::COMPLETED);
    assert!(record.integrity_verified);

    // Recovery test through the queue
    let test = stack.harness.create_recovery_test(backup_id).await.unwrap();
    stack.pool.run_until_idle().await.unwrap();
    let test = stack.mocks.store.get_recovery_test(test.id).await.unwrap();
    assert_eq!(test.status, test_status::PASSED);
    assert!(stack.mocks.db_admin.existing().is_empty());

    let after = health.evaluate(Utc::now()).await.unwrap();
    assert!(after.healthy, "unexpected issues: {:?}", after.issues);

    // Restore through the queue
    stack
        .pipeline
        .queue()
        .enqueue(JobSpec::restore(None))
        .await
        .unwrap();
    stack.pool.run_until_idle().await.unwrap();
    let restores = stack.mocks.db_tool.restore_calls();
    let full_restore = restores.last().unwrap();
    assert_eq!(full_restore.database, "teachlink");
    assert!(full_restore.clean);
    assert_eq!(full_restore.input, dump_bytes(4096));
    assert_eq!(
        stack
            .mocks
            .alerts
            .count(alert_codes::DISASTER_RECOVERY_COMPLETED),
        1
    );

    // Sampling with restore tests finds nothing wrong
    let report = stack.scheduler.run_integrity_sample().await.unwrap();
    assert_eq!(report.sampled, vec![backup_id]);
    assert!(report.corrupted.is_empty());

    // Past retention the backup and its objects disappear
    let later = Utc::now() + Duration::days(31);
    let expired = stack.scheduler.run_daily_cleanup(later).await.unwrap();
    assert_eq!(expired, vec![backup_id]);
    stack.pool.run_until_idle().await.unwrap();
    assert!(stack.mocks.store.get_backup_record(backup_id).await.is_err());
    assert_no_objects_for(&stack.mocks.objects.keys(), &record);

    assert!(stack
        .mocks
        .store
        .all_jobs()
        .iter()
        .all(|job| job.state == job_state::SUCCEEDED));
    assert!(stack
        .mocks
        .alerts
        .codes()
        .iter()
        .all(|code| code != alert_codes::BACKUP_FAILED));
}

#[tokio::test]
async fn test_failed_backup_never_becomes_restore_source() {
    let stack = Stack::new();
    stack.mocks.encryption.fail_encrypt(false);

    let backup_id = stack.scheduler.run_weekly_backup().await.unwrap();
    stack.pool.run_until_idle().await.unwrap();

    let record = stack.mocks.store.get_backup_record(backup_id).await.unwrap();
    assert_eq!(record.status, backup_status::FAILED);
    assert_verification_gating(&stack.mocks.store.all_backup_records());

    assert!(stack.recovery.execute_restore().await.is_err());
    assert!(stack.harness.create_recovery_test(backup_id).await.is_err());
    assert!(stack.mocks.db_tool.restore_calls().is_empty());
    assert_eq!(stack.mocks.alerts.count(alert_codes::BACKUP_FAILED), 1);
}
