//! Scheduler tests: scheduled entry points, failure alerts, start/stop

use chrono::{Duration, Utc};
use std::sync::Arc;
use strata_runtime::services::{alert_codes, Severity};
use strata_runtime::{
    BackupPipeline, BackupScheduler, IntegritySampler, PipelineConfig, SamplerConfig,
    ScheduleConfig,
};
use strata_storage::models::backup_status;
use strata_storage::BackupStore;
use strata_tests::mocks::MockServices;
use strata_tests::BackupRecordBuilder;

fn scheduler(mocks: &MockServices) -> BackupScheduler {
    let pipeline = Arc::new(BackupPipeline::new(
        mocks.services(),
        PipelineConfig::default(),
    ));
    BackupScheduler::new(pipeline, mocks.alerts.clone(), ScheduleConfig::default())
}

#[tokio::test]
async fn test_weekly_backup_targets_primary_database() {
    let mocks = MockServices::new(Vec::new());
    let id = scheduler(&mocks).run_weekly_backup().await.unwrap();

    let record = mocks.store.get_backup_record(id).await.unwrap();
    assert_eq!(record.database_name, "teachlink");
    assert_eq!(record.region, "us-east-1");
    assert_eq!(record.status, backup_status::PENDING);
    assert_eq!(mocks.store.all_jobs().len(), 1);
}

#[tokio::test]
async fn test_weekly_backup_failure_raises_critical_alert() {
    let mocks = MockServices::new(Vec::new());
    mocks.store.set_unavailable(true);

    assert!(scheduler(&mocks).run_weekly_backup().await.is_none());

    let alerts = mocks.alerts.with_code(alert_codes::BACKUP_SCHEDULING_FAILED);
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].severity, Severity::Critical);
    assert!(alerts[0].message.contains("teachlink"));
}

#[tokio::test]
async fn test_daily_cleanup_schedules_expired_deletes() {
    let mocks = MockServices::new(Vec::new());
    let now = Utc::now();
    let expired = BackupRecordBuilder::new()
        .created_at(now - Duration::days(31))
        .completed_with(b"dump")
        .build();
    mocks.store.create_backup_record(&expired).await.unwrap();

    let scheduled = scheduler(&mocks).run_daily_cleanup(now).await.unwrap();
    assert_eq!(scheduled, vec![expired.id]);
}

#[tokio::test]
async fn test_cleanup_failure_raises_warning() {
    let mocks = MockServices::new(Vec::new());
    mocks.store.set_unavailable(true);

    assert!(scheduler(&mocks)
        .run_daily_cleanup(Utc::now())
        .await
        .is_none());

    let alerts = mocks.alerts.with_code(alert_codes::BACKUP_CLEANUP_FAILED);
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].severity, Severity::Warning);
}

#[tokio::test]
async fn test_integrity_sample_needs_sampler() {
    let mocks = MockServices::new(Vec::new());
    assert!(scheduler(&mocks).run_integrity_sample().await.is_none());

    let sampler = Arc::new(IntegritySampler::new(
        mocks.services(),
        SamplerConfig::default(),
    ));
    let with_sampler = scheduler(&mocks).with_sampler(sampler);
    let report = with_sampler.run_integrity_sample().await.unwrap();
    assert!(report.sampled.is_empty());

    mocks.store.set_unavailable(true);
    assert!(with_sampler.run_integrity_sample().await.is_none());
    assert_eq!(mocks.alerts.count(alert_codes::INTEGRITY_SAMPLING_FAILED), 1);
}

#[tokio::test]
async fn test_start_and_stop() {
    let mocks = MockServices::new(Vec::new());
    let scheduler = Arc::new(scheduler(&mocks));

    scheduler.start();
    scheduler.start();
    tokio::time::timeout(std::time::Duration::from_secs(5), scheduler.stop())
        .await
        .expect("scheduler stops promptly");

    // Nothing is due within the test window
    assert!(mocks.store.all_backup_records().is_empty());
}
