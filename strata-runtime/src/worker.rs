//! Queue worker pool
//!
//! Polls the persistent queue, runs each claimed job under its timeout and
//! either completes, reschedules (retryable error, attempts left) or fails
//! it. Retry decisions use [`Error::is_retryable`](crate::Error::is_retryable).

use crate::concurrency::ConcurrencyLimiter;
use crate::converters::ClaimedJob;
use crate::disaster_recovery::DisasterRecoveryOrchestrator;
use crate::jobs::{JobName, JobPayload};
use crate::metrics::{BACKUP_JOBS_TOTAL, JOB_RETRIES_TOTAL};
use crate::pipeline::BackupPipeline;
use crate::recovery_test::RecoveryTestHarness;
use crate::Result;
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use strata_storage::{BackupJobModel, MetadataStore};
use tokio::sync::watch;
use tokio::time::interval;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

/// Delivery metadata handed to a job handler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobContext {
    pub job_id: Uuid,
    pub name: JobName,
    /// 1-based attempt number of this delivery
    pub attempt: u32,
    pub max_attempts: u32,
}

impl JobContext {
    /// Context for running a job body directly, outside the queue
    pub fn inline(name: JobName) -> Self {
        Self {
            job_id: Uuid::nil(),
            name,
            attempt: 1,
            max_attempts: 1,
        }
    }

    pub fn is_last_attempt(&self) -> bool {
        self.attempt >= self.max_attempts
    }
}

#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, ctx: &JobContext, payload: &JobPayload) -> Result<()>;

    /// Called once a job will not be delivered again: last attempt failed,
    /// timed out, or the worker holding it disappeared.
    async fn on_exhausted(&self, _ctx: &JobContext, _payload: &JobPayload, _error: &str) -> Result<()> {
        Ok(())
    }
}

/// Outcome of processing one claimed job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Succeeded,
    Retrying,
    Failed,
}

impl JobOutcome {
    fn as_str(self) -> &'static str {
        match self {
            JobOutcome::Succeeded => "succeeded",
            JobOutcome::Retrying => "retrying",
            JobOutcome::Failed => "failed",
        }
    }
}

/// Configuration for the worker pool
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// How often to poll for runnable jobs (default: 1 second)
    pub poll_interval: Duration,
    /// Maximum jobs running at once in this process (default: 2)
    pub concurrency: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            concurrency: 2,
        }
    }
}

pub struct WorkerPool {
    store: Arc<dyn MetadataStore>,
    handler: Arc<dyn JobHandler>,
    config: WorkerConfig,
    limiter: ConcurrencyLimiter,
}

impl WorkerPool {
    pub fn new(
        store: Arc<dyn MetadataStore>,
        handler: Arc<dyn JobHandler>,
        config: WorkerConfig,
    ) -> Self {
        let limiter = ConcurrencyLimiter::new(config.concurrency);
        Self {
            store,
            handler,
            config,
            limiter,
        }
    }

    /// Poll until `shutdown` flips to true, then wait for running jobs
    #[instrument(skip(self, shutdown), fields(concurrency = self.config.concurrency))]
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        info!("Starting job worker pool");
        let mut poll_interval = interval(self.config.poll_interval);

        loop {
            tokio::select! {
                _ = poll_interval.tick() => {
                    match self.poll_once().await {
                        Ok(claimed) if claimed > 0 => debug!(claimed, "Claimed jobs"),
                        Ok(_) => {}
                        Err(e) => error!(error = %e, "Error polling job queue"),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Worker pool stopping, waiting for running jobs");
        self.limiter.drain().await
    }

    /// Claim as many runnable jobs as there are free slots and spawn them
    pub async fn poll_once(&self) -> Result<usize> {
        let mut claimed = 0;

        while let Some(permit) = self.limiter.try_acquire() {
            let Some(job) = self.store.claim_next_job(Utc::now()).await? else {
                break;
            };

            let store = self.store.clone();
            let handler = self.handler.clone();
            tokio::spawn(async move {
                let _permit = permit;
                process_job(store.as_ref(), handler.as_ref(), job).await;
            });
            claimed += 1;
        }

        Ok(claimed)
    }

    /// Claim and run jobs inline until nothing is runnable.
    ///
    /// Follow-up jobs enqueued by handlers run too. Jobs rescheduled into
    /// the future are left for a later poll.
    pub async fn run_until_idle(&self) -> Result<Vec<(Uuid, JobOutcome)>> {
        let mut processed = Vec::new();
        while let Some(job) = self.store.claim_next_job(Utc::now()).await? {
            let id = job.id;
            let outcome = process_job(self.store.as_ref(), self.handler.as_ref(), job).await;
            processed.push((id, outcome));
        }
        Ok(processed)
    }
}

/// Run one claimed job and settle its queue state
#[instrument(skip_all, fields(job_id = %job.id, job = %job.job_name, attempt = job.attempts))]
pub async fn process_job(
    store: &dyn MetadataStore,
    handler: &dyn JobHandler,
    job: BackupJobModel,
) -> JobOutcome {
    let claimed = match ClaimedJob::try_from(&job) {
        Ok(claimed) => claimed,
        Err(e) => {
            error!(error = %e, "Undecodable job, failing without retry");
            settle_failed(store, job.id, &e.to_string()).await;
            return JobOutcome::Failed;
        }
    };
    let ctx = claimed.context;

    // Reclaimed after the final attempt's lock expired
    if ctx.attempt > ctx.max_attempts {
        let reason = format!(
            "Attempts exhausted: {}",
            job.last_error.as_deref().unwrap_or("worker lost")
        );
        warn!(reason = %reason, "Job reclaimed with no attempts left");
        notify_exhausted(handler, &ctx, &claimed.payload, &reason).await;
        settle_failed(store, job.id, &reason).await;
        record_outcome(ctx.name, JobOutcome::Failed);
        return JobOutcome::Failed;
    }

    let result = match tokio::time::timeout(claimed.timeout, handler.handle(&ctx, &claimed.payload)).await {
        Ok(result) => result,
        Err(_) => Err(crate::Error::Timeout(format!(
            "{} exceeded its timeout of {}s",
            ctx.name,
            claimed.timeout.as_secs()
        ))),
    };

    let outcome = match result {
        Ok(()) => {
            if let Err(e) = store.complete_job(ctx.job_id).await {
                error!(error = %e, "Failed to mark job succeeded");
            }
            info!("Job succeeded");
            JobOutcome::Succeeded
        }
        Err(e) if e.is_retryable() && !ctx.is_last_attempt() => {
            let delay = claimed.backoff.calculate_delay(ctx.attempt);
            let run_at = Utc::now()
                + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero());
            warn!(
                error = %e,
                retry_in_ms = delay.as_millis() as u64,
                "Job attempt failed, rescheduling"
            );
            if let Err(store_err) = store.reschedule_job(ctx.job_id, run_at, &e.to_string()).await {
                error!(error = %store_err, "Failed to reschedule job");
            }
            JOB_RETRIES_TOTAL
                .with_label_values(&[ctx.name.as_str()])
                .inc();
            JobOutcome::Retrying
        }
        Err(e) => {
            error!(error = %e, retryable = e.is_retryable(), "Job failed terminally");
            let message = e.to_string();
            notify_exhausted(handler, &ctx, &claimed.payload, &message).await;
            settle_failed(store, ctx.job_id, &message).await;
            JobOutcome::Failed
        }
    };

    record_outcome(ctx.name, outcome);
    outcome
}

async fn notify_exhausted(handler: &dyn JobHandler, ctx: &JobContext, payload: &JobPayload, reason: &str) {
    if let Err(e) = handler.on_exhausted(ctx, payload, reason).await {
        error!(error = %e, "Exhaustion handler failed");
    }
}

async fn settle_failed(store: &dyn MetadataStore, job_id: Uuid, reason: &str) {
    if let Err(e) = store.fail_job(job_id, reason).await {
        error!(error = %e, "Failed to mark job failed");
    }
}

fn record_outcome(name: JobName, outcome: JobOutcome) {
    BACKUP_JOBS_TOTAL
        .with_label_values(&[name.as_str(), outcome.as_str()])
        .inc();
}

/// Routes queue payloads to the pipeline components
pub struct JobDispatcher {
    pipeline: Arc<BackupPipeline>,
    harness: Arc<RecoveryTestHarness>,
    recovery: Arc<DisasterRecoveryOrchestrator>,
}

impl JobDispatcher {
    pub fn new(
        pipeline: Arc<BackupPipeline>,
        harness: Arc<RecoveryTestHarness>,
        recovery: Arc<DisasterRecoveryOrchestrator>,
    ) -> Self {
        Self {
            pipeline,
            harness,
            recovery,
        }
    }
}

#[async_trait]
impl JobHandler for JobDispatcher {
    async fn handle(&self, ctx: &JobContext, payload: &JobPayload) -> Result<()> {
        match payload {
            JobPayload::CreateBackup { backup_id } => {
                self.pipeline.run_backup_job(ctx, *backup_id).await.map(|_| ())
            }
            JobPayload::VerifyBackup { backup_id } => {
                self.pipeline.verify_backup(ctx, *backup_id).await.map(|_| ())
            }
            JobPayload::DeleteBackup { backup_id } => self.pipeline.delete_backup(*backup_id).await,
            JobPayload::RecoveryTest { test_id } => {
                self.harness.execute_recovery_test(*test_id).await.map(|_| ())
            }
            JobPayload::Restore { backup_id: None } => {
                self.recovery.execute_restore().await.map(|_| ())
            }
            JobPayload::Restore {
                backup_id: Some(backup_id),
            } => self.recovery.execute_restore_of(*backup_id).await.map(|_| ()),
        }
    }

    async fn on_exhausted(&self, _ctx: &JobContext, payload: &JobPayload, error: &str) -> Result<()> {
        match payload {
            JobPayload::CreateBackup { backup_id } => {
                self.pipeline.mark_backup_failed(*backup_id, error).await
            }
            JobPayload::VerifyBackup { backup_id } => {
                self.pipeline.mark_verification_failed(*backup_id, error).await
            }
            JobPayload::RecoveryTest { test_id } => self.harness.mark_failed(*test_id, error).await,
            JobPayload::DeleteBackup { .. } | JobPayload::Restore { .. } => Ok(()),
        }
    }
}
