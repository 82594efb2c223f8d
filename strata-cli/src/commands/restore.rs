//! Restore command

use anyhow::Result;
use strata_runtime::{JobSpec, RestoreReport};

/// Restore the primary database.
///
/// By default the restore is validated here and queued for a worker; with
/// `inline` it runs in this process and the report is printed.
pub async fn execute(database_url: &str, backup_id: Option<&str>, inline: bool) -> Result<()> {
    let backup_id = backup_id.map(super::parse_id).transpose()?;
    let runtime = super::runtime(database_url).await?;
    let recovery = &runtime.recovery;

    if inline {
        let report = match backup_id {
            Some(id) => recovery.execute_restore_of(id).await?,
            None => recovery.execute_restore().await?,
        };
        print_report(&report, recovery.config().rto);
        return Ok(());
    }

    if let Some(id) = backup_id {
        recovery.validate_restorable(id).await?;
    }
    let job_id = runtime
        .pipeline
        .queue()
        .enqueue(JobSpec::restore(backup_id))
        .await?;

    match backup_id {
        Some(id) => println!("Restore of backup {} queued as job {}", id, job_id),
        None => println!("Restore of latest verified backup queued as job {}", job_id),
    }
    Ok(())
}

fn print_report(report: &RestoreReport, rto: std::time::Duration) {
    println!("Restored backup: {}", report.backup_id);
    println!("Source: {}", report.source_key);
    println!("Elapsed: {:.1}s", report.elapsed.as_secs_f64());
    if report.rto_exceeded {
        println!("RTO of {}s exceeded", rto.as_secs());
    }
}
