//! API contract tests for the worker REST surface
//!
//! Requests go through the real router with `tower::ServiceExt::oneshot`;
//! every collaborator is an in-memory mock, so no database is required.

use axum::Router;
use chrono::Utc;
use serde_json::json;
use strata_runtime::JobName;
use strata_storage::models::{backup_status, test_status};
use strata_storage::{BackupStore, JobStore};
use strata_tests::assertions::{assert_valid_uuid, ResponseAssertions};
use strata_tests::{dump_bytes, ApiRequestBuilder, BackupRecordBuilder, MockServices};
use strata_worker::bootstrap::Runtime;
use strata_worker::config::RuntimeSettings;
use strata_worker::handler::{router, AppState};
use tower::ServiceExt;
use uuid::Uuid;

struct Api {
    mocks: MockServices,
    runtime: Runtime,
    app: Router,
    _scratch: tempfile::TempDir,
}

impl Api {
    fn new() -> Self {
        let scratch = tempfile::tempdir().expect("scratch dir");
        let mocks = MockServices::new(dump_bytes(512));

        let mut settings = RuntimeSettings::default();
        settings.pipeline.scratch_dir = scratch.path().to_path_buf();
        settings.restore.scratch_dir = scratch.path().to_path_buf();

        let runtime = Runtime::assemble(mocks.services(), &settings);
        let app = router(AppState::from_runtime(&runtime));
        Self {
            mocks,
            runtime,
            app,
            _scratch: scratch,
        }
    }

    async fn send(&self, request: ApiRequestBuilder) -> ResponseAssertions {
        let response = self
            .app
            .clone()
            .oneshot(request.build())
            .await
            .expect("router is infallible");
        ResponseAssertions::new(response)
    }
}

mod restore_contract {
    use super::*;

    #[tokio::test]
    async fn verified_backup_is_accepted_and_queued() {
        let api = Api::new();
        let record = api.mocks.seed_verified_backup(b"dump", Utc::now()).await;

        let body = api
            .send(ApiRequestBuilder::restore(record.id))
            .await
            .assert_accepted()
            .into_json()
            .await;

        assert_eq!(body["backupRecordId"], json!(record.id));
        assert_eq!(body["status"], "accepted");
        let job_id = body["jobId"].as_str().unwrap();
        assert_valid_uuid(job_id);

        let job = api
            .mocks
            .store
            .get_job(Uuid::parse_str(job_id).unwrap())
            .await
            .unwrap();
        assert_eq!(job.job_name, JobName::Restore.as_str());
        assert_eq!(job.max_attempts, 1);
    }

    #[tokio::test]
    async fn unverified_backup_conflicts_without_queueing() {
        let api = Api::new();
        let record = BackupRecordBuilder::new().completed_with(b"dump").build();
        api.mocks.store.create_backup_record(&record).await.unwrap();

        let body = api
            .send(ApiRequestBuilder::restore(record.id))
            .await
            .assert_conflict()
            .into_json()
            .await;
        assert!(body["error"].as_str().unwrap().contains("not restorable"));

        let counts = api.mocks.store.count_jobs_by_state().await.unwrap();
        assert!(counts.iter().all(|(_, n)| *n == 0));
    }

    #[tokio::test]
    async fn unknown_backup_is_not_found() {
        let api = Api::new();
        api.send(ApiRequestBuilder::restore(Uuid::new_v4()))
            .await
            .assert_not_found();
    }

    #[tokio::test]
    async fn malformed_body_is_bad_request() {
        let api = Api::new();
        let body = api
            .send(ApiRequestBuilder::post("/backup/restore").json(json!({ "backupRecordId": "nope" })))
            .await
            .assert_bad_request()
            .into_json()
            .await;
        assert_eq!(body["error"], "invalid payload");

        api.send(ApiRequestBuilder::post("/backup/restore"))
            .await
            .assert_bad_request();
    }

    #[tokio::test]
    async fn queued_restore_runs_on_the_worker() {
        let api = Api::new();
        let record = api.mocks.seed_verified_backup(b"dump", Utc::now()).await;

        api.send(ApiRequestBuilder::restore(record.id))
            .await
            .assert_accepted();
        api.runtime.pool.run_until_idle().await.unwrap();

        let restores = api.mocks.db_tool.restore_calls();
        assert_eq!(restores.len(), 1);
        assert_eq!(restores[0].database, "teachlink");
        assert_eq!(api.mocks.alerts.count("DISASTER_RECOVERY_COMPLETED"), 1);
    }
}

mod recovery_test_contract {
    use super::*;

    #[tokio::test]
    async fn create_then_poll_until_passed() {
        let api = Api::new();
        let record = api.mocks.seed_verified_backup(b"dump", Utc::now()).await;

        let created = api
            .send(ApiRequestBuilder::recovery_test(record.id))
            .await
            .assert_accepted()
            .into_json()
            .await;
        assert_eq!(created["status"], test_status::PENDING);
        assert_eq!(created["backupRecordId"], json!(record.id));
        assert!(created["testDatabaseName"]
            .as_str()
            .unwrap()
            .starts_with("recovery_test_"));
        let test_id = created["id"].as_str().unwrap().to_string();

        api.runtime.pool.run_until_idle().await.unwrap();

        let polled = api
            .send(ApiRequestBuilder::get(&format!("/backup/test/{}", test_id)))
            .await
            .assert_ok()
            .into_json()
            .await;
        assert_eq!(polled["status"], test_status::PASSED);
        assert_eq!(polled["validationResults"]["tableCountMatch"], true);
        assert!(polled["performanceMetrics"]["totalDurationMs"].is_u64());
        assert!(polled["testCompletedAt"].is_string());
    }

    #[tokio::test]
    async fn failed_backup_cannot_be_tested() {
        let api = Api::new();
        let record = BackupRecordBuilder::new()
            .status(backup_status::FAILED)
            .build();
        api.mocks.store.create_backup_record(&record).await.unwrap();

        api.send(ApiRequestBuilder::recovery_test(record.id))
            .await
            .assert_conflict();
    }

    #[tokio::test]
    async fn unknown_test_id_is_not_found() {
        let api = Api::new();
        api.send(ApiRequestBuilder::get(&format!("/backup/test/{}", Uuid::new_v4())))
            .await
            .assert_not_found();
        api.send(ApiRequestBuilder::get("/backup/test/not-a-uuid"))
            .await
            .assert_bad_request();
    }
}

mod health_contract {
    use super::*;

    #[tokio::test]
    async fn backup_health_reports_issues() {
        let api = Api::new();

        let body = api
            .send(ApiRequestBuilder::get("/backup/health"))
            .await
            .assert_ok()
            .into_json()
            .await;
        assert_eq!(body["healthy"], false);
        assert!(!body["issues"].as_array().unwrap().is_empty());

        api.mocks.seed_verified_backup(b"dump", Utc::now()).await;
        let body = api
            .send(ApiRequestBuilder::get("/backup/health"))
            .await
            .assert_ok()
            .into_json()
            .await;
        assert_eq!(body["healthy"], true);
        assert_eq!(body["issues"], json!([]));
    }

    #[tokio::test]
    async fn liveness_and_readiness() {
        let api = Api::new();

        let body = api
            .send(ApiRequestBuilder::get("/health"))
            .await
            .assert_ok()
            .into_json()
            .await;
        assert_eq!(body["status"], "healthy");

        let body = api
            .send(ApiRequestBuilder::get("/ready"))
            .await
            .assert_ok()
            .into_json()
            .await;
        assert_eq!(body["status"], "healthy");
    }

    #[tokio::test]
    async fn metrics_are_exposed_as_text() {
        let api = Api::new();
        api.send(ApiRequestBuilder::get("/health")).await.assert_ok();

        let response = api
            .app
            .clone()
            .oneshot(ApiRequestBuilder::get("/metrics").build())
            .await
            .unwrap();
        assert_eq!(response.status(), axum::http::StatusCode::OK);
        let bytes = http_body_util::BodyExt::collect(response.into_body())
            .await
            .unwrap()
            .to_bytes();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.contains("strata_http_requests_total"));
    }
}
