//! Migrate command

use anyhow::Result;
use strata_storage::PostgresStorage;
use strata_worker::config::mask_password;

pub async fn execute(database_url: &str) -> Result<()> {
    tracing::info!("Running migrations on {}", mask_password(database_url));

    let storage = PostgresStorage::new(database_url).await?;
    strata_storage::migrations::run_migrations(storage.pool()).await?;
    tracing::info!("Migrations applied successfully");

    Ok(())
}
