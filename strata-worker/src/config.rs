//! Worker configuration module
//!
//! Loads and validates the worker configuration from environment variables.
//! Everything is checked at boot so a bad value stops the process before it
//! touches the metadata store.

use anyhow::{anyhow, bail, Context, Result};
use chrono::Weekday;
use std::path::PathBuf;
use std::time::Duration;
use strata_runtime::local::{PgConnection, PgToolConfig};
use strata_runtime::{
    PipelineConfig, RestoreConfig, SamplerConfig, ScheduleConfig, WorkerConfig,
};
use strata_storage::validate_identifier;

/// Where encrypted backups are stored
#[derive(Debug, Clone, PartialEq)]
pub enum StorageBackend {
    /// Filesystem directory, one subtree per region
    Local { root: PathBuf },
    /// One Cloud Storage bucket per region, `region=bucket,...`
    Gcs { buckets: String },
}

/// Who wraps the per-backup data keys
#[derive(Clone, PartialEq)]
pub enum KeyBackend {
    /// `keyId=<base64 32 bytes>,...`
    LocalMasterKeys(String),
    /// `keyId=projects/.../cryptoKeys/...,...`
    CloudKms(String),
}

impl std::fmt::Debug for KeyBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeyBackend::LocalMasterKeys(_) => f.write_str("LocalMasterKeys(***)"),
            KeyBackend::CloudKms(keys) => f.debug_tuple("CloudKms").field(keys).finish(),
        }
    }
}

/// Settings consumed by the pipeline components
#[derive(Debug, Clone, Default)]
pub struct RuntimeSettings {
    pub pipeline: PipelineConfig,
    pub restore: RestoreConfig,
    pub schedule: ScheduleConfig,
    pub sampler: SamplerConfig,
    pub worker: WorkerConfig,
}

/// Full process configuration
#[derive(Debug, Clone)]
pub struct Settings {
    pub database_url: String,
    /// Maintenance database used to create and drop recovery-test databases
    pub admin_database_url: String,
    pub port: u16,
    pub storage: StorageBackend,
    pub keys: KeyBackend,
    pub pg_tools: PgToolConfig,
    pub alert_webhook_url: Option<String>,
    pub runtime: RuntimeSettings,
}

impl Settings {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through `lookup`, which returns a variable's value
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let or = |key: &str, default: &str| var(key).unwrap_or_else(|| default.to_string());

        let database_url = var("DATABASE_URL").context("DATABASE_URL must be set")?;
        let admin_database_url =
            var("STRATA_ADMIN_DATABASE_URL").unwrap_or_else(|| database_url.clone());
        let port = parse(&or("PORT", "8080"), "PORT")?;

        let scratch_dir = var("STRATA_SCRATCH_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| std::env::temp_dir().join("strata"));

        let pipeline = PipelineConfig {
            primary_database: or("STRATA_PRIMARY_DATABASE", "teachlink"),
            primary_region: or("STRATA_PRIMARY_REGION", "us-east-1"),
            secondary_region: or("STRATA_SECONDARY_REGION", "us-west-2"),
            retention_days: parse(&or("STRATA_RETENTION_DAYS", "30"), "STRATA_RETENTION_DAYS")?,
            encryption_key_id: or("STRATA_ENCRYPTION_KEY_ID", "backup-master-key"),
            scratch_dir: scratch_dir.clone(),
        };

        let restore = RestoreConfig {
            target_database: pipeline.primary_database.clone(),
            rto: Duration::from_secs(parse(&or("STRATA_RTO_SECONDS", "900"), "STRATA_RTO_SECONDS")?),
            scratch_dir,
        };

        let sample_hour = match or("STRATA_SAMPLE_HOUR", "4").as_str() {
            "off" | "disabled" => None,
            hour => Some(parse(hour, "STRATA_SAMPLE_HOUR")?),
        };
        let schedule = ScheduleConfig {
            weekly_day: or("STRATA_WEEKLY_BACKUP_DAY", "Sun")
                .parse::<Weekday>()
                .map_err(|_| anyhow!("STRATA_WEEKLY_BACKUP_DAY must be a weekday name"))?,
            weekly_hour: parse(&or("STRATA_WEEKLY_BACKUP_HOUR", "2"), "STRATA_WEEKLY_BACKUP_HOUR")?,
            cleanup_hour: parse(&or("STRATA_CLEANUP_HOUR", "3"), "STRATA_CLEANUP_HOUR")?,
            sample_hour,
        };

        let sampler = SamplerConfig {
            sample_percent: parse(&or("STRATA_SAMPLE_PERCENT", "10"), "STRATA_SAMPLE_PERCENT")?,
            corruption_threshold: parse(
                &or("STRATA_CORRUPTION_ALERT_THRESHOLD", "1"),
                "STRATA_CORRUPTION_ALERT_THRESHOLD",
            )?,
            restore_test: parse(
                &or("STRATA_SAMPLE_RESTORE_TEST", "false"),
                "STRATA_SAMPLE_RESTORE_TEST",
            )?,
            auto_repair: parse(&or("STRATA_AUTO_REPAIR", "true"), "STRATA_AUTO_REPAIR")?,
        };

        let worker = WorkerConfig {
            poll_interval: Duration::from_millis(parse(
                &or("STRATA_POLL_INTERVAL_MS", "1000"),
                "STRATA_POLL_INTERVAL_MS",
            )?),
            concurrency: parse(&or("STRATA_WORKER_CONCURRENCY", "2"), "STRATA_WORKER_CONCURRENCY")?,
        };

        let storage = match or("STRATA_STORAGE_BACKEND", "local").as_str() {
            "local" => StorageBackend::Local {
                root: PathBuf::from(or("STRATA_LOCAL_STORAGE_ROOT", "./strata-data")),
            },
            "gcs" => StorageBackend::Gcs {
                buckets: var("STRATA_GCS_BUCKETS")
                    .context("STRATA_GCS_BUCKETS must be set when STRATA_STORAGE_BACKEND=gcs")?,
            },
            other => bail!("STRATA_STORAGE_BACKEND must be 'local' or 'gcs', got '{}'", other),
        };

        let keys = match (var("STRATA_KMS_KEYS"), var("STRATA_LOCAL_MASTER_KEYS")) {
            (Some(kms), _) => KeyBackend::CloudKms(kms),
            (None, Some(local)) => KeyBackend::LocalMasterKeys(local),
            (None, None) => bail!("Either STRATA_KMS_KEYS or STRATA_LOCAL_MASTER_KEYS must be set"),
        };

        let pg_tools = PgToolConfig {
            pg_dump_path: PathBuf::from(or("STRATA_PG_DUMP_PATH", "pg_dump")),
            pg_restore_path: PathBuf::from(or("STRATA_PG_RESTORE_PATH", "pg_restore")),
            connection: PgConnection {
                host: or("STRATA_PG_HOST", "localhost"),
                port: parse(&or("STRATA_PG_PORT", "5432"), "STRATA_PG_PORT")?,
                user: or("STRATA_PG_USER", "postgres"),
                password: var("STRATA_PG_PASSWORD"),
            },
            ..PgToolConfig::default()
        };

        let settings = Self {
            database_url,
            admin_database_url,
            port,
            storage,
            keys,
            pg_tools,
            alert_webhook_url: var("STRATA_ALERT_WEBHOOK_URL"),
            runtime: RuntimeSettings {
                pipeline,
                restore,
                schedule,
                sampler,
                worker,
            },
        };
        settings.validate()?;
        Ok(settings)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        let pipeline = &self.runtime.pipeline;
        validate_identifier(&pipeline.primary_database, "STRATA_PRIMARY_DATABASE")?;
        validate_identifier(&pipeline.primary_region, "STRATA_PRIMARY_REGION")?;
        validate_identifier(&pipeline.secondary_region, "STRATA_SECONDARY_REGION")?;
        if pipeline.primary_region == pipeline.secondary_region {
            bail!("STRATA_SECONDARY_REGION must differ from STRATA_PRIMARY_REGION");
        }
        if pipeline.retention_days <= 0 {
            bail!("STRATA_RETENTION_DAYS must be positive");
        }
        if pipeline.encryption_key_id.trim().is_empty() {
            bail!("STRATA_ENCRYPTION_KEY_ID cannot be empty");
        }

        let schedule = &self.runtime.schedule;
        for (name, hour) in [
            ("STRATA_WEEKLY_BACKUP_HOUR", Some(schedule.weekly_hour)),
            ("STRATA_CLEANUP_HOUR", Some(schedule.cleanup_hour)),
            ("STRATA_SAMPLE_HOUR", schedule.sample_hour),
        ] {
            if matches!(hour, Some(h) if h > 23) {
                bail!("{} must be between 0 and 23", name);
            }
        }

        let sampler = &self.runtime.sampler;
        if !(sampler.sample_percent > 0.0 && sampler.sample_percent <= 100.0) {
            bail!("STRATA_SAMPLE_PERCENT must be in (0, 100]");
        }
        if sampler.corruption_threshold == 0 {
            bail!("STRATA_CORRUPTION_ALERT_THRESHOLD must be at least 1");
        }

        if self.runtime.restore.rto.is_zero() {
            bail!("STRATA_RTO_SECONDS must be positive");
        }
        if self.runtime.worker.concurrency == 0 {
            bail!("STRATA_WORKER_CONCURRENCY must be at least 1");
        }
        if self.runtime.worker.poll_interval.is_zero() {
            bail!("STRATA_POLL_INTERVAL_MS must be positive");
        }

        if let Some(url) = &self.alert_webhook_url {
            if !url.starts_with("https://") && !url.starts_with("http://") {
                bail!("STRATA_ALERT_WEBHOOK_URL must be a valid HTTP(S) URL");
            }
        }
        Ok(())
    }
}

fn parse<T>(value: &str, name: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse::<T>()
        .map_err(|e| anyhow!("Invalid {} value '{}': {}", name, value, e))
}

/// Mask password in database URL for logging
pub fn mask_password(url: &str) -> String {
    if let Some(at_pos) = url.find('@') {
        if let Some(colon_pos) = url[..at_pos].rfind(':') {
            if !url[colon_pos..].starts_with("://") {
                let mut masked = url.to_string();
                masked.replace_range(colon_pos + 1..at_pos, "****");
                return masked;
            }
        }
    }
    url.to_string()
}
