//! Cached readiness checks
//!
//! Readiness probes hit the metadata store; results are cached so a probe
//! storm does not turn into a connection storm.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Readiness results are reused for this long
pub const READY_CACHE_TTL: Duration = Duration::from_secs(10);

/// Cached health check result
#[derive(Debug, Clone)]
pub struct HealthCheckResult {
    pub healthy: bool,
    pub checked_at: Instant,
    pub error_message: Option<String>,
}

/// Cached health checker with TTL
pub struct CachedHealthCheck {
    last_result: Arc<RwLock<Option<HealthCheckResult>>>,
    ttl: Duration,
}

impl CachedHealthCheck {
    pub fn new(ttl: Duration) -> Self {
        Self {
            last_result: Arc::new(RwLock::new(None)),
            ttl,
        }
    }

    /// Return the cached result, or run `check_fn` if the cache is stale
    pub async fn check<F, Fut>(&self, check_fn: F) -> HealthCheckResult
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<(), String>>,
    {
        {
            let cached = self.last_result.read().await;
            if let Some(result) = cached.as_ref() {
                if result.checked_at.elapsed() < self.ttl {
                    return result.clone();
                }
            }
        }

        let checked_at = Instant::now();
        let result = match check_fn().await {
            Ok(()) => HealthCheckResult {
                healthy: true,
                checked_at,
                error_message: None,
            },
            Err(err) => HealthCheckResult {
                healthy: false,
                checked_at,
                error_message: Some(err),
            },
        };

        *self.last_result.write().await = Some(result.clone());
        result
    }
}

impl Default for CachedHealthCheck {
    fn default() -> Self {
        Self::new(READY_CACHE_TTL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_results_are_cached_until_ttl() {
        let health_check = CachedHealthCheck::new(Duration::from_millis(100));
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..2 {
            let counter = counter.clone();
            let result = health_check
                .check(|| async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
                .await;
            assert!(result.healthy);
        }
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_millis(150)).await;

        let counter_clone = counter.clone();
        health_check
            .check(|| async move {
                counter_clone.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await;
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failures_are_cached_too() {
        let health_check = CachedHealthCheck::new(Duration::from_secs(60));

        let result = health_check
            .check(|| async { Err("connection refused".to_string()) })
            .await;
        assert!(!result.healthy);
        assert_eq!(result.error_message.as_deref(), Some("connection refused"));

        let result = health_check.check(|| async { Ok(()) }).await;
        assert!(!result.healthy);
    }
}
