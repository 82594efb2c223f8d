//! List command

use anyhow::{bail, Result};
use strata_storage::models::{backup_status, BackupRecordModel};
use strata_storage::{BackupStore, PostgresStorage};

pub async fn execute(
    database_url: &str,
    status: Option<&str>,
    limit: i64,
    offset: i64,
) -> Result<()> {
    if let Some(status) = status {
        if !backup_status::ALL.contains(&status) {
            bail!(
                "Invalid status '{}', expected one of: {}",
                status,
                backup_status::ALL.join(", ")
            );
        }
    }

    let storage = PostgresStorage::new(database_url).await?;
    let records = storage.list_backup_records(status, limit, offset).await?;

    if records.is_empty() {
        println!("No backups found");
        return Ok(());
    }

    println!(
        "{:<36}  {:<11}  {:<11}  {:<10}  {:>12}  {:<8}  CREATED",
        "ID", "STATUS", "TYPE", "REGION", "SIZE", "VERIFIED"
    );
    for record in &records {
        println!("{}", format_row(record));
    }

    Ok(())
}

fn format_row(record: &BackupRecordModel) -> String {
    let size = record
        .backup_size_bytes
        .map(|b| b.to_string())
        .unwrap_or_else(|| "-".to_string());
    format!(
        "{:<36}  {:<11}  {:<11}  {:<10}  {:>12}  {:<8}  {}",
        record.id,
        record.status,
        record.backup_type,
        record.region,
        size,
        if record.integrity_verified { "yes" } else { "no" },
        record.created_at.format("%Y-%m-%d %H:%M:%S")
    )
}
