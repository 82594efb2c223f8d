//! Backup command

use anyhow::Result;
use strata_storage::models::backup_type;

/// Create a PENDING backup record and queue its job
pub async fn execute(
    database_url: &str,
    database: Option<&str>,
    region: Option<&str>,
    incremental: bool,
) -> Result<()> {
    let runtime = super::runtime(database_url).await?;
    let config = runtime.pipeline.config();
    let database = database.unwrap_or(&config.primary_database);
    let region = region.unwrap_or(&config.primary_region);
    let kind = if incremental {
        backup_type::INCREMENTAL
    } else {
        backup_type::FULL
    };

    let backup_id = runtime
        .pipeline
        .enqueue_full_backup_with(kind, database, region)
        .await?;

    println!("Backup requested: {}", backup_id);
    println!("Type: {}", kind);
    println!("Database: {}", database);
    println!("Region: {}", region);

    Ok(())
}
