//! Database migration support

use crate::Result;
use sqlx::PgPool;
use tracing::info;

/// Run all pending migrations
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    let migrator = sqlx::migrate!("./migrations");
    info!(
        available = migrator.iter().count(),
        "Applying metadata store migrations"
    );

    migrator
        .run(pool)
        .await
        .map_err(|e| crate::Error::Migration(e.to_string()))?;

    Ok(())
}
