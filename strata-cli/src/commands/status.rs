//! Status command

use anyhow::Result;
use chrono::Utc;
use std::sync::Arc;
use strata_runtime::BackupHealth;
use strata_storage::{BackupStore, JobStore, PostgresStorage, RecoveryTestStore};

/// Print one backup record and the recovery tests run against it
pub async fn show_backup(database_url: &str, backup_id: &str) -> Result<()> {
    let storage = PostgresStorage::new(database_url).await?;
    let id = super::parse_id(backup_id)?;

    let record = storage.get_backup_record(id).await?;

    println!("Backup: {}", record.id);
    println!("Type: {}", record.backup_type);
    println!("Database: {}", record.database_name);
    println!("Region: {}", record.region);
    println!("Status: {}", record.status);
    println!("Verified: {}", record.integrity_verified);
    if let Some(key) = &record.encrypted_storage_key {
        println!("Object: {}", key);
    }
    if let Some(key) = &record.replicated_storage_key {
        println!("Replica: {}", key);
    }
    if let Some(size) = record.backup_size_bytes {
        println!("Size: {} bytes", size);
    }
    if let Some(sha256) = &record.checksum_sha256 {
        println!("SHA-256: {}", sha256);
    }
    println!("Created: {}", record.created_at);
    if let Some(completed) = record.completed_at {
        println!("Completed: {}", completed);
    }
    if let Some(verified) = record.verified_at {
        println!("Verified at: {}", verified);
    }
    println!("Expires: {}", record.expires_at);
    if let Some(err) = &record.error_message {
        println!("Error: {}", err);
    }

    let tests = storage.list_recovery_tests_for_backup(id).await?;
    if !tests.is_empty() {
        println!();
        println!("Recovery tests:");
        for test in tests {
            let finished = test
                .test_completed_at
                .map(|t| t.to_string())
                .unwrap_or_else(|| "-".to_string());
            println!("  {}  {:<8}  {}", test.id, test.status, finished);
        }
    }

    Ok(())
}

/// Print job queue depth and the backup health report
pub async fn show_overview(database_url: &str) -> Result<()> {
    let storage = Arc::new(PostgresStorage::new(database_url).await?);

    println!("Jobs:");
    let counts = storage.count_jobs_by_state().await?;
    if counts.is_empty() {
        println!("  (none)");
    }
    for (state, count) in counts {
        println!("  {:<10} {}", state, count);
    }

    let report = BackupHealth::new(storage).evaluate(Utc::now()).await?;
    println!();
    if report.healthy {
        println!("Backup health: healthy");
    } else {
        println!("Backup health: degraded");
        for issue in &report.issues {
            println!("  - {}", issue);
        }
    }

    Ok(())
}
