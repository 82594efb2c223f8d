//! HTTP handlers for the worker API
//!
//! Implements:
//! - POST /backup/restore - Queue a restore of a verified backup
//! - POST /backup/test - Queue a recovery test of a completed backup
//! - GET /backup/test/:id - Poll a recovery test
//! - GET /backup/health - Backup posture report
//! - GET /health - Liveness
//! - GET /ready - Metadata store reachability (cached)
//! - GET /metrics - Prometheus text format

use crate::bootstrap::Runtime;
use crate::health::CachedHealthCheck;
use crate::metrics;
use crate::types::{
    BackupHealthResponse, BackupRequest, ErrorResponse, HealthResponse, RecoveryTestDto,
    RestoreAccepted,
};
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use std::sync::Arc;
use strata_runtime::{
    BackupHealth, BackupPipeline, DisasterRecoveryOrchestrator, JobSpec, RecoveryTestHarness,
};
use strata_storage::{BackupStore, MetadataStore, RecoveryTestStore};
use tracing::{error, info, warn};
use uuid::Uuid;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn MetadataStore>,
    pub pipeline: Arc<BackupPipeline>,
    pub harness: Arc<RecoveryTestHarness>,
    pub recovery: Arc<DisasterRecoveryOrchestrator>,
    pub health: Arc<BackupHealth>,
    pub readiness: Arc<CachedHealthCheck>,
}

impl AppState {
    pub fn from_runtime(runtime: &Runtime) -> Self {
        Self {
            store: runtime.services.store.clone(),
            pipeline: runtime.pipeline.clone(),
            harness: runtime.harness.clone(),
            recovery: runtime.recovery.clone(),
            health: runtime.health.clone(),
            readiness: Arc::new(CachedHealthCheck::default()),
        }
    }
}

/// Routes of the REST surface, without transport layers
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/backup/restore", post(restore_handler))
        .route("/backup/test", post(create_test_handler))
        .route("/backup/test/:id", get(get_test_handler))
        .route("/backup/health", get(backup_health_handler))
        .route("/health", get(health_handler))
        .route("/ready", get(ready_handler))
        .route("/metrics", get(metrics_handler))
        .layer(axum::middleware::from_fn(metrics::track_requests))
        .with_state(state)
}

/// Queue a restore of a specific backup
///
/// The backup must exist and be completed and verified; otherwise the
/// request is rejected synchronously and nothing is queued.
pub async fn restore_handler(
    State(state): State<AppState>,
    payload: Result<Json<BackupRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<RestoreAccepted>), ApiError> {
    let Json(request) = payload?;
    let backup_id = request.backup_record_id;

    state.recovery.validate_restorable(backup_id).await?;
    let job_id = state
        .pipeline
        .queue()
        .enqueue(JobSpec::restore(Some(backup_id)))
        .await?;

    info!(backup_id = %backup_id, job_id = %job_id, "Restore queued");
    Ok((
        StatusCode::ACCEPTED,
        Json(RestoreAccepted::new(backup_id, job_id)),
    ))
}

/// Queue a recovery test against a completed backup
pub async fn create_test_handler(
    State(state): State<AppState>,
    payload: Result<Json<BackupRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<RecoveryTestDto>), ApiError> {
    let Json(request) = payload?;
    let test = state
        .harness
        .create_recovery_test(request.backup_record_id)
        .await?;
    Ok((StatusCode::ACCEPTED, Json(test.into())))
}

/// Current state of a recovery test
pub async fn get_test_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<RecoveryTestDto>, ApiError> {
    let id = Uuid::parse_str(&id)
        .map_err(|_| ApiError::InvalidPayload(format!("Invalid test id: {}", id)))?;
    let test = state
        .store
        .get_recovery_test(id)
        .await
        .map_err(strata_runtime::Error::from)?;
    Ok(Json(test.into()))
}

pub async fn backup_health_handler(
    State(state): State<AppState>,
) -> Result<Json<BackupHealthResponse>, ApiError> {
    let report = state.health.evaluate(Utc::now()).await?;
    if !report.healthy {
        warn!(issues = ?report.issues, "Backup health degraded");
    }
    Ok(Json(report.into()))
}

/// Returns 200 OK while the process is running
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}

/// 200 when the metadata store answers, 503 otherwise
pub async fn ready_handler(State(state): State<AppState>) -> Response {
    let store = state.store.clone();
    let result = state
        .readiness
        .check(|| async move { store.health_check().await.map_err(|e| e.to_string()) })
        .await;

    if result.healthy {
        (StatusCode::OK, Json(HealthResponse::healthy())).into_response()
    } else {
        let message = result.error_message.unwrap_or_default();
        warn!(error = %message, "Readiness check failed");
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(HealthResponse::unavailable("metadata store unavailable")),
        )
            .into_response()
    }
}

pub async fn metrics_handler() -> Response {
    match metrics::render() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => ApiError::Internal(e.to_string()).into_response(),
    }
}

/// Error types for API handlers
#[derive(Debug)]
pub enum ApiError {
    InvalidPayload(String),
    NotFound(String),
    Conflict(String),
    Internal(String),
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::InvalidPayload(rejection.body_text())
    }
}

impl From<strata_runtime::Error> for ApiError {
    fn from(e: strata_runtime::Error) -> Self {
        match e {
            e if e.is_not_found() => ApiError::NotFound(e.to_string()),
            strata_runtime::Error::Precondition(message)
            | strata_runtime::Error::InvalidState(message) => ApiError::Conflict(message),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::InvalidPayload(msg) => {
                warn!(error = %msg, "Invalid payload received");
                (StatusCode::BAD_REQUEST, "invalid payload".to_string())
            }
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::Internal(msg) => {
                error!(error = %msg, "Request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal error".to_string(),
                )
            }
        };

        (status, Json(ErrorResponse { error: message })).into_response()
    }
}
