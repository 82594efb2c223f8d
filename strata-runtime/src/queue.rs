//! Job submission onto the persistent queue

use crate::jobs::JobSpec;
use crate::Result;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use strata_storage::MetadataStore;
use tracing::{info, instrument};
use uuid::Uuid;

/// Enqueues jobs into the `backup_jobs` table.
///
/// Delivery is at-least-once: a job whose worker dies or times out is
/// reclaimed once its lock expires.
#[derive(Clone)]
pub struct JobQueue {
    store: Arc<dyn MetadataStore>,
}

impl JobQueue {
    pub fn new(store: Arc<dyn MetadataStore>) -> Self {
        Self { store }
    }

    /// Submit a job runnable immediately
    pub async fn enqueue(&self, spec: JobSpec) -> Result<Uuid> {
        self.enqueue_at(spec, Utc::now()).await
    }

    /// Submit a job runnable from `run_at`
    #[instrument(skip(self, spec), fields(job = %spec.name()))]
    pub async fn enqueue_at(&self, spec: JobSpec, run_at: DateTime<Utc>) -> Result<Uuid> {
        let model = spec.to_model(run_at)?;
        self.store.enqueue_job(&model).await.map_err(|e| {
            crate::Error::Queue(format!("Failed to enqueue {}: {}", spec.name(), e))
        })?;

        info!(
            job_id = %model.id,
            job = %spec.name(),
            max_attempts = spec.max_attempts,
            timeout_ms = model.timeout_ms,
            "Enqueued job"
        );
        Ok(model.id)
    }
}
