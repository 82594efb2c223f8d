//! Backup scheduler
//!
//! A process-wide object started once at boot: weekly full backup, daily
//! retention sweep and (optionally) a daily integrity sample, all in UTC.
//! A failed tick is alerted and not retried; the next tick runs normally.

use crate::integrity::{IntegritySampler, SampleReport};
use crate::pipeline::BackupPipeline;
use crate::services::{alert_codes, AlertSink, Severity};
use chrono::{DateTime, Datelike, Duration as ChronoDuration, NaiveTime, TimeZone, Utc, Weekday};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct ScheduleConfig {
    pub weekly_day: Weekday,
    pub weekly_hour: u32,
    pub cleanup_hour: u32,
    /// `None` disables the integrity sampler
    pub sample_hour: Option<u32>,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            weekly_day: Weekday::Sun,
            weekly_hour: 2,
            cleanup_hour: 3,
            sample_hour: Some(4),
        }
    }
}

fn at_hour(date: chrono::NaiveDate, hour: u32) -> DateTime<Utc> {
    let time = NaiveTime::from_hms_opt(hour.min(23), 0, 0).unwrap_or_default();
    Utc.from_utc_datetime(&date.and_time(time))
}

/// First `day` at `hour`:00 UTC strictly after `after`
pub fn next_weekly_run(after: DateTime<Utc>, day: Weekday, hour: u32) -> DateTime<Utc> {
    let today = after.weekday().num_days_from_monday();
    let days_ahead = (day.num_days_from_monday() + 7 - today) % 7;
    let candidate = at_hour(after.date_naive(), hour) + ChronoDuration::days(days_ahead as i64);
    if candidate <= after {
        candidate + ChronoDuration::days(7)
    } else {
        candidate
    }
}

/// First `hour`:00 UTC strictly after `after`
pub fn next_daily_run(after: DateTime<Utc>, hour: u32) -> DateTime<Utc> {
    let candidate = at_hour(after.date_naive(), hour);
    if candidate <= after {
        candidate + ChronoDuration::days(1)
    } else {
        candidate
    }
}

pub struct BackupScheduler {
    pipeline: Arc<BackupPipeline>,
    sampler: Option<Arc<IntegritySampler>>,
    alerts: Arc<dyn AlertSink>,
    config: ScheduleConfig,
    shutdown: watch::Sender<bool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl BackupScheduler {
    pub fn new(
        pipeline: Arc<BackupPipeline>,
        alerts: Arc<dyn AlertSink>,
        config: ScheduleConfig,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            pipeline,
            sampler: None,
            alerts,
            config,
            shutdown,
            handle: Mutex::new(None),
        }
    }

    pub fn with_sampler(mut self, sampler: Arc<IntegritySampler>) -> Self {
        self.sampler = Some(sampler);
        self
    }

    /// Weekly tick: enqueue a full backup of the primary database
    pub async fn run_weekly_backup(&self) -> Option<Uuid> {
        let config = self.pipeline.config();
        match self
            .pipeline
            .enqueue_full_backup(&config.primary_database, &config.primary_region)
            .await
        {
            Ok(id) => {
                info!(backup_id = %id, "Scheduled weekly backup");
                Some(id)
            }
            Err(e) => {
                error!(error = %e, "Failed to schedule weekly backup");
                self.alerts
                    .send_alert(
                        alert_codes::BACKUP_SCHEDULING_FAILED,
                        &format!(
                            "Weekly backup of {} could not be scheduled: {}",
                            config.primary_database, e
                        ),
                        Severity::Critical,
                    )
                    .await;
                None
            }
        }
    }

    /// Daily tick: enqueue deletion of expired backups
    pub async fn run_daily_cleanup(&self, now: DateTime<Utc>) -> Option<Vec<Uuid>> {
        match self.pipeline.cleanup_expired(now).await {
            Ok(ids) => Some(ids),
            Err(e) => {
                error!(error = %e, "Retention sweep failed");
                self.alerts
                    .send_alert(
                        alert_codes::BACKUP_CLEANUP_FAILED,
                        &format!("Retention sweep failed: {}", e),
                        Severity::Warning,
                    )
                    .await;
                None
            }
        }
    }

    /// Daily tick: re-verify a random sample of verified backups
    pub async fn run_integrity_sample(&self) -> Option<SampleReport> {
        let sampler = self.sampler.as_ref()?;
        match sampler.run_sample().await {
            Ok(report) => Some(report),
            Err(e) => {
                error!(error = %e, "Integrity sampling failed");
                self.alerts
                    .send_alert(
                        alert_codes::INTEGRITY_SAMPLING_FAILED,
                        &format!("Integrity sampling failed: {}", e),
                        Severity::Warning,
                    )
                    .await;
                None
            }
        }
    }

    /// Spawn the trigger loop. Calling twice has no effect.
    pub fn start(self: &Arc<Self>) {
        let mut handle = self.handle.lock();
        if handle.is_some() {
            warn!("Scheduler already started");
            return;
        }
        let scheduler = Arc::clone(self);
        let shutdown = self.shutdown.subscribe();
        *handle = Some(tokio::spawn(async move {
            scheduler.run_loop(shutdown).await;
        }));
        info!(
            weekly_day = %self.config.weekly_day,
            weekly_hour = self.config.weekly_hour,
            cleanup_hour = self.config.cleanup_hour,
            "Backup scheduler started"
        );
    }

    /// Signal the loop to exit and wait for it
    pub async fn stop(&self) {
        self.shutdown.send_replace(true);
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!(error = %e, "Scheduler task ended abnormally");
            }
        }
        info!("Backup scheduler stopped");
    }

    async fn run_loop(&self, mut shutdown: watch::Receiver<bool>) {
        let config = &self.config;
        let now = Utc::now();
        let mut next_weekly = next_weekly_run(now, config.weekly_day, config.weekly_hour);
        let mut next_cleanup = next_daily_run(now, config.cleanup_hour);
        let mut next_sample = config.sample_hour.map(|hour| next_daily_run(now, hour));

        loop {
            let mut due = next_weekly.min(next_cleanup);
            if let Some(sample) = next_sample {
                due = due.min(sample);
            }
            let wait = (due - Utc::now()).to_std().unwrap_or(Duration::ZERO);

            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
            }

            let now = Utc::now();
            if now >= next_weekly {
                self.run_weekly_backup().await;
                next_weekly = next_weekly_run(now, config.weekly_day, config.weekly_hour);
            }
            if now >= next_cleanup {
                self.run_daily_cleanup(now).await;
                next_cleanup = next_daily_run(now, config.cleanup_hour);
            }
            if let (Some(sample), Some(hour)) = (next_sample, config.sample_hour) {
                if now >= sample {
                    self.run_integrity_sample().await;
                    next_sample = Some(next_daily_run(now, hour));
                }
            }
        }
    }
}
