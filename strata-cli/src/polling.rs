//! Status polling for recovery tests

use anyhow::{Context, Result};
use strata_runtime::TestStatus;
use strata_storage::models::RecoveryTestModel;
use strata_storage::RecoveryTestStore;
use std::time::Duration;
use tokio::time::{interval, timeout};
use tracing::{debug, info};
use uuid::Uuid;

/// Parse a stored test status
pub fn parse_test_status(status: &str) -> Option<TestStatus> {
    TestStatus::try_from(status).ok()
}

/// Display recovery test status to the user
pub fn display_status(test: &RecoveryTestModel) {
    let status_icon = match test.status.as_str() {
        "pending" => "⏳",
        "running" => "🔄",
        "passed" => "✅",
        "failed" => "❌",
        _ => "❓",
    };

    info!(
        "{} Recovery test {} is {}",
        status_icon, test.id, test.status
    );

    if test.status == "failed" {
        if let Some(error) = &test.error_message {
            info!("   Error: {}", error);
        }
    }

    if let Some(metrics) = &test.performance_metrics {
        info!(
            "   Restore: {}ms, validation: {}ms",
            metrics.restore_duration_ms, metrics.validate_duration_ms
        );
    }
}

/// Poll a recovery test until it reaches a terminal state
///
/// Returns the final test record or times out
pub async fn poll_recovery_test<S>(
    test_id: Uuid,
    store: &S,
    timeout_duration: Duration,
    poll_interval_duration: Duration,
) -> Result<RecoveryTestModel>
where
    S: RecoveryTestStore + ?Sized,
{
    debug!(
        "Starting to poll recovery test {} with timeout {:?} and interval {:?}",
        test_id, timeout_duration, poll_interval_duration
    );

    let mut poll_ticker = interval(poll_interval_duration);

    let result = timeout(timeout_duration, async {
        loop {
            poll_ticker.tick().await;

            let test = store
                .get_recovery_test(test_id)
                .await
                .context("Failed to fetch recovery test status")?;

            debug!("Polled recovery test {}: status = {}", test_id, test.status);

            display_status(&test);

            let status = parse_test_status(&test.status).context("Invalid test status")?;
            if status.is_terminal() {
                info!("Recovery test {} finished with status: {}", test_id, test.status);
                return Ok(test);
            }
        }
    })
    .await;

    match result {
        Ok(test_result) => test_result,
        Err(_) => {
            anyhow::bail!(
                "Recovery test {} did not finish within timeout of {:?}",
                test_id,
                timeout_duration
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_storage::models::test_status;
    use strata_storage::models::BackupRecordModel;
    use strata_storage::{BackupStore, InMemoryStorage, RecoveryTestUpdate};

    async fn store_with_test(name: &str) -> (InMemoryStorage, RecoveryTestModel) {
        let store = InMemoryStorage::new();
        let backup = BackupRecordModel::pending("full", "teachlink", "us-east-1", 30);
        store.create_backup_record(&backup).await.unwrap();
        let test = RecoveryTestModel::pending(backup.id, name.to_string());
        store.create_recovery_test(&test).await.unwrap();
        (store, test)
    }

    #[test]
    fn test_parse_test_status() {
        assert_eq!(parse_test_status("pending"), Some(TestStatus::Pending));
        assert_eq!(parse_test_status("passed"), Some(TestStatus::Passed));
        assert_eq!(parse_test_status("unknown"), None);
    }

    #[tokio::test]
    async fn test_poll_returns_terminal_test() {
        let (store, test) = store_with_test("recovery_test_a").await;
        store
            .update_recovery_test(test.id, &RecoveryTestUpdate::status(test_status::PASSED))
            .await
            .unwrap();

        let finished = poll_recovery_test(
            test.id,
            &store,
            Duration::from_secs(1),
            Duration::from_millis(10),
        )
        .await
        .unwrap();
        assert_eq!(finished.status, test_status::PASSED);
    }

    #[tokio::test]
    async fn test_poll_times_out_while_pending() {
        let (store, test) = store_with_test("recovery_test_b").await;

        let err = poll_recovery_test(
            test.id,
            &store,
            Duration::from_millis(50),
            Duration::from_millis(10),
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("did not finish"));
    }
}
