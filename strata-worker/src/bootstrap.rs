//! Wiring of adapters and pipeline components

use crate::config::{KeyBackend, RuntimeSettings, Settings, StorageBackend};
use anyhow::{Context, Result};
use std::sync::Arc;
use strata_cloud_gcp::{CloudKmsKeyWrapper, GcpAuth, GcsConfig, GcsObjectStorage, KmsConfig};
use strata_runtime::local::{FsObjectStorage, LocalKeyWrapper, LogAlertSink, PgDumpTool, WebhookAlertSink};
use strata_runtime::services::{AlertSink, EncryptionService, ObjectStorage, Services};
use strata_runtime::{
    BackupHealth, BackupPipeline, BackupScheduler, DisasterRecoveryOrchestrator,
    EnvelopeEncryption, IntegritySampler, JobDispatcher, RecoveryTestHarness, WorkerPool,
};
use strata_storage::migrations::run_migrations;
use strata_storage::{PostgresAdmin, PostgresStorage};
use tokio::sync::OnceCell;
use tracing::info;

/// Every long-lived component of the worker process
pub struct Runtime {
    pub services: Services,
    pub pipeline: Arc<BackupPipeline>,
    pub harness: Arc<RecoveryTestHarness>,
    pub recovery: Arc<DisasterRecoveryOrchestrator>,
    pub sampler: Arc<IntegritySampler>,
    pub scheduler: Arc<BackupScheduler>,
    pub pool: Arc<WorkerPool>,
    pub health: Arc<BackupHealth>,
}

impl Runtime {
    /// Build the pipeline components on top of `services`
    pub fn assemble(services: Services, settings: &RuntimeSettings) -> Self {
        let pipeline = Arc::new(BackupPipeline::new(
            services.clone(),
            settings.pipeline.clone(),
        ));
        let harness = Arc::new(RecoveryTestHarness::new(
            services.clone(),
            settings.pipeline.scratch_dir.clone(),
        ));
        let recovery = Arc::new(DisasterRecoveryOrchestrator::new(
            services.clone(),
            settings.restore.clone(),
        ));

        let mut sampler = IntegritySampler::new(services.clone(), settings.sampler.clone());
        if settings.sampler.restore_test {
            sampler = sampler.with_harness(harness.clone());
        }
        let sampler = Arc::new(sampler);

        let scheduler = Arc::new(
            BackupScheduler::new(
                pipeline.clone(),
                services.alerts.clone(),
                settings.schedule.clone(),
            )
            .with_sampler(sampler.clone()),
        );

        let dispatcher = Arc::new(JobDispatcher::new(
            pipeline.clone(),
            harness.clone(),
            recovery.clone(),
        ));
        let pool = Arc::new(WorkerPool::new(
            services.store.clone(),
            dispatcher,
            settings.worker.clone(),
        ));
        let health = Arc::new(BackupHealth::new(services.store.clone()));

        Self {
            services,
            pipeline,
            harness,
            recovery,
            sampler,
            scheduler,
            pool,
            health,
        }
    }
}

/// Connect to the metadata store (running migrations) and build the
/// production adapters selected by `settings`
pub async fn connect_services(settings: &Settings) -> Result<Services> {
    let storage = Arc::new(
        PostgresStorage::new(&settings.database_url)
            .await
            .context("Failed to initialize metadata store")?,
    );
    run_migrations(storage.pool())
        .await
        .context("Failed to run migrations")?;
    info!("Metadata store initialized");

    let db_admin = Arc::new(
        PostgresAdmin::connect(&settings.admin_database_url)
            .await
            .context("Failed to connect to admin database")?,
    );

    let auth = OnceCell::new();
    let objects = object_storage(settings, &auth).await?;
    let encryption = encryption(settings, &auth).await?;

    let alerts: Arc<dyn AlertSink> = match &settings.alert_webhook_url {
        Some(url) => Arc::new(WebhookAlertSink::new(url.clone())?),
        None => Arc::new(LogAlertSink),
    };

    Ok(Services {
        store: storage,
        objects,
        encryption,
        db_tool: Arc::new(PgDumpTool::new(settings.pg_tools.clone())),
        db_admin,
        alerts,
    })
}

async fn gcp_auth(cell: &OnceCell<Arc<GcpAuth>>) -> Result<Arc<GcpAuth>> {
    let auth = cell
        .get_or_try_init(|| async { GcpAuth::auto().await.map(Arc::new) })
        .await
        .context("Failed to initialize GCP authentication")?;
    Ok(auth.clone())
}

async fn object_storage(
    settings: &Settings,
    auth: &OnceCell<Arc<GcpAuth>>,
) -> Result<Arc<dyn ObjectStorage>> {
    match &settings.storage {
        StorageBackend::Local { root } => {
            info!(root = %root.display(), "Using filesystem object storage");
            Ok(Arc::new(FsObjectStorage::new(root.clone())))
        }
        StorageBackend::Gcs { buckets } => {
            let mut config = GcsConfig::parse(buckets, &settings.runtime.pipeline.primary_region)?;
            if let Ok(endpoint) = std::env::var("STRATA_GCS_ENDPOINT") {
                config = config.with_endpoint(endpoint);
            }
            if config
                .bucket_for(&settings.runtime.pipeline.secondary_region)
                .is_none()
            {
                anyhow::bail!(
                    "STRATA_GCS_BUCKETS has no bucket for secondary region {}",
                    settings.runtime.pipeline.secondary_region
                );
            }
            info!(buckets = config.buckets.len(), "Using Cloud Storage object storage");
            Ok(Arc::new(GcsObjectStorage::new(gcp_auth(auth).await?, config)?))
        }
    }
}

async fn encryption(
    settings: &Settings,
    auth: &OnceCell<Arc<GcpAuth>>,
) -> Result<Arc<dyn EncryptionService>> {
    let key_id = &settings.runtime.pipeline.encryption_key_id;
    match &settings.keys {
        KeyBackend::LocalMasterKeys(spec) => {
            let wrapper = LocalKeyWrapper::from_spec(spec)?;
            if !wrapper.has_key(key_id) {
                anyhow::bail!("STRATA_LOCAL_MASTER_KEYS has no key named {}", key_id);
            }
            info!(key_id = %key_id, "Using local master keys for envelope encryption");
            Ok(Arc::new(EnvelopeEncryption::new(wrapper)))
        }
        KeyBackend::CloudKms(spec) => {
            let mut config = KmsConfig::parse(spec)?;
            if let Ok(endpoint) = std::env::var("STRATA_KMS_ENDPOINT") {
                config = config.with_endpoint(endpoint);
            }
            if !config.keys.contains_key(key_id) {
                anyhow::bail!("STRATA_KMS_KEYS has no key named {}", key_id);
            }
            info!(key_id = %key_id, "Using Cloud KMS for envelope encryption");
            let wrapper = CloudKmsKeyWrapper::new(gcp_auth(auth).await?, config)?;
            Ok(Arc::new(EnvelopeEncryption::new(wrapper)))
        }
    }
}
