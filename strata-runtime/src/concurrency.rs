//! Concurrency control for job workers

use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Bounds how many jobs one worker process runs at once
#[derive(Clone)]
pub struct ConcurrencyLimiter {
    semaphore: Arc<Semaphore>,
    max_concurrent: usize,
}

impl ConcurrencyLimiter {
    pub fn new(max_concurrent: usize) -> Self {
        let max_concurrent = max_concurrent.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
        }
    }

    /// Wait for a free slot. The permit can move into a spawned task.
    #[tracing::instrument(
        name = "concurrency.acquire",
        skip(self),
        fields(
            max_concurrent = %self.max_concurrent,
            available_before = tracing::field::Empty,
            wait_duration_ms = tracing::field::Empty,
        )
    )]
    pub async fn acquire(&self) -> crate::Result<OwnedSemaphorePermit> {
        let span = tracing::Span::current();
        span.record("available_before", self.semaphore.available_permits());

        let start = Instant::now();
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| crate::Error::Internal("Concurrency limiter closed".to_string()))?;

        span.record("wait_duration_ms", start.elapsed().as_millis() as u64);
        Ok(permit)
    }

    /// Take a slot only if one is free right now
    pub fn try_acquire(&self) -> Option<OwnedSemaphorePermit> {
        self.semaphore.clone().try_acquire_owned().ok()
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Wait until every outstanding permit has been returned
    pub async fn drain(&self) -> crate::Result<()> {
        let _all = self
            .semaphore
            .acquire_many(self.max_concurrent as u32)
            .await
            .map_err(|_| crate::Error::Internal("Concurrency limiter closed".to_string()))?;
        Ok(())
    }
}
