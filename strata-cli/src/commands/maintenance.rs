//! Sweep and sample commands
//!
//! One-off runs of the daily retention sweep and the integrity sampler,
//! for operators who do not want to wait for the scheduler.

use anyhow::Result;
use chrono::Utc;

/// Enqueue delete jobs for every expired backup
pub async fn sweep(database_url: &str) -> Result<()> {
    let runtime = super::runtime(database_url).await?;
    let enqueued = runtime.pipeline.cleanup_expired(Utc::now()).await?;

    if enqueued.is_empty() {
        println!("No expired backups");
    } else {
        println!("Deletion queued for {} expired backup(s):", enqueued.len());
        for id in enqueued {
            println!("  {}", id);
        }
    }
    Ok(())
}

/// Run one integrity sample; returns false when corruption remains
pub async fn sample(database_url: &str) -> Result<bool> {
    let runtime = super::runtime(database_url).await?;
    let report = runtime.sampler.run_sample().await?;

    println!("Sampled: {}", report.sampled.len());
    println!("Repaired: {}", report.repaired.len());
    for id in &report.repaired {
        println!("  {}", id);
    }
    println!("Corrupted: {}", report.corrupted.len());
    for id in &report.corrupted {
        println!("  {}", id);
    }
    if report.alert_fired {
        println!("Corruption alert sent");
    }

    Ok(report.corrupted.is_empty())
}
