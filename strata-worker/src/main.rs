//! Strata Worker
//!
//! Long-running process that owns the backup pipeline.
//!
//! # Architecture
//!
//! - Job worker pool polling the persistent `backup_jobs` queue
//! - Backup scheduler (weekly backup, daily retention sweep, integrity sampling)
//! - REST surface:
//!   - POST /backup/restore, POST /backup/test, GET /backup/test/:id
//!   - GET /backup/health, GET /health, GET /ready, GET /metrics
//!
//! # Configuration
//!
//! Environment variables, see [`strata_worker::config::Settings`]. The most
//! important ones:
//! - DATABASE_URL - PostgreSQL metadata store (records and job queue)
//! - STRATA_STORAGE_BACKEND - `local` or `gcs`
//! - STRATA_LOCAL_MASTER_KEYS or STRATA_KMS_KEYS - envelope key wrapping
//! - PORT - HTTP port (default: 8080)

use std::time::Duration;
use strata_worker::bootstrap::{connect_services, Runtime};
use strata_worker::config::{mask_password, Settings};
use strata_worker::handler::{router, AppState};
use strata_worker::metrics;
use tokio::signal;
use tokio::sync::watch;
use tower_http::{limit::RequestBodyLimitLayer, timeout::TimeoutLayer, trace::TraceLayer};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    // JSON logs for Cloud Logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "strata_worker=info,strata_runtime=info,tower_http=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting Strata worker");

    let settings = match Settings::from_env() {
        Ok(settings) => settings,
        Err(e) => {
            error!(error = %format!("{:#}", e), "Failed to load configuration");
            std::process::exit(1);
        }
    };

    let runtime_settings = &settings.runtime;
    info!(
        database_url = %mask_password(&settings.database_url),
        port = settings.port,
        primary_database = %runtime_settings.pipeline.primary_database,
        primary_region = %runtime_settings.pipeline.primary_region,
        secondary_region = %runtime_settings.pipeline.secondary_region,
        retention_days = runtime_settings.pipeline.retention_days,
        rto_seconds = runtime_settings.restore.rto.as_secs(),
        concurrency = runtime_settings.worker.concurrency,
        "Configuration loaded"
    );

    let services = match connect_services(&settings).await {
        Ok(services) => services,
        Err(e) => {
            error!(error = %format!("{:#}", e), "Failed to initialize services");
            std::process::exit(1);
        }
    };

    metrics::init_metrics();
    let runtime = Runtime::assemble(services, &settings.runtime);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let pool = runtime.pool.clone();
    let pool_task = tokio::spawn(async move { pool.run(shutdown_rx).await });
    runtime.scheduler.start();

    let app = router(AppState::from_runtime(&runtime))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .layer(RequestBodyLimitLayer::new(64 * 1024));

    let addr = format!("0.0.0.0:{}", settings.port);
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            error!(error = %e, address = %addr, "Failed to bind server");
            std::process::exit(1);
        }
    };

    info!(address = %addr, "Server listening");

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    runtime.scheduler.stop().await;
    shutdown_tx.send_replace(true);
    match pool_task.await {
        Ok(Ok(())) => info!("Worker pool drained"),
        Ok(Err(e)) => error!(error = %e, "Worker pool stopped with error"),
        Err(e) => error!(error = %e, "Worker pool task panicked"),
    }

    if let Err(e) = served {
        error!(error = %e, "Server error");
        std::process::exit(1);
    }

    info!("Worker shut down gracefully");
}

/// Waits for SIGTERM or Ctrl-C
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl-C, shutting down");
        }
        _ = terminate => {
            info!("Received SIGTERM, shutting down");
        }
    }
}
