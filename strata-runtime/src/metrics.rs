//! Prometheus metrics for backup, restore and verification jobs

use lazy_static::lazy_static;
use prometheus::{
    register_histogram, register_histogram_vec, register_int_counter,
    register_int_counter_vec, Histogram, HistogramVec, IntCounter, IntCounterVec,
};

lazy_static! {
    /// Job outcomes
    ///
    /// Labels:
    /// - job: "create-backup", "verify-backup", "delete-backup", "recovery-test", "restore"
    /// - outcome: "succeeded", "retrying", "failed"
    pub static ref BACKUP_JOBS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "strata_backup_jobs_total",
        "Total number of processed jobs by outcome",
        &["job", "outcome"]
    )
    .expect("strata_backup_jobs_total metric registration");

    /// Duration of individual pipeline steps in seconds
    ///
    /// Labels:
    /// - step: "dump", "upload", "encrypt", "replicate", "checksum", "verify"
    pub static ref BACKUP_STEP_DURATION: HistogramVec = register_histogram_vec!(
        "strata_backup_step_duration_seconds",
        "Duration of backup pipeline steps",
        &["step"],
        vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 15.0, 60.0, 300.0, 900.0, 3600.0]
    )
    .expect("strata_backup_step_duration_seconds metric registration");

    /// Size of completed backup dumps
    pub static ref BACKUP_SIZE_BYTES: Histogram = register_histogram!(
        "strata_backup_size_bytes",
        "Size of completed backup dumps in bytes",
        prometheus::exponential_buckets(1024.0, 4.0, 12)
            .expect("strata_backup_size_bytes buckets")
    )
    .expect("strata_backup_size_bytes metric registration");

    /// Wall-clock restore duration in seconds
    pub static ref RESTORE_DURATION: Histogram = register_histogram!(
        "strata_restore_duration_seconds",
        "Duration of disaster-recovery restores",
        vec![1.0, 10.0, 60.0, 300.0, 600.0, 900.0, 1800.0, 3600.0, 7200.0]
    )
    .expect("strata_restore_duration_seconds metric registration");

    /// Restores that took longer than the recovery-time objective
    pub static ref RTO_EXCEEDED_TOTAL: IntCounter = register_int_counter!(
        "strata_rto_exceeded_total",
        "Total number of restores exceeding the RTO"
    )
    .expect("strata_rto_exceeded_total metric registration");

    /// Labels:
    /// - outcome: "passed", "failed"
    pub static ref RECOVERY_TESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "strata_recovery_tests_total",
        "Total number of recovery tests by outcome",
        &["outcome"]
    )
    .expect("strata_recovery_tests_total metric registration");

    /// Labels:
    /// - outcome: "healthy", "corrupted", "repaired"
    pub static ref INTEGRITY_CHECKS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "strata_integrity_checks_total",
        "Total number of sampled integrity checks by outcome",
        &["outcome"]
    )
    .expect("strata_integrity_checks_total metric registration");

    pub static ref JOB_RETRIES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "strata_job_retries_total",
        "Total number of job re-deliveries scheduled after a failure",
        &["job"]
    )
    .expect("strata_job_retries_total metric registration");
}

/// Record how long a pipeline step took
pub fn observe_step(step: &str, elapsed: std::time::Duration) {
    BACKUP_STEP_DURATION
        .with_label_values(&[step])
        .observe(elapsed.as_secs_f64());
}
