//! Strata operator CLI

use clap::{Parser, Subcommand};

mod commands;
mod polling;

#[derive(Parser)]
#[command(name = "strata")]
#[command(author, version, about = "Strata backup and disaster-recovery CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Metadata database URL
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply metadata schema migrations
    Migrate,

    /// Request a backup now
    Backup {
        /// Database to back up (default: STRATA_PRIMARY_DATABASE)
        #[arg(long)]
        database: Option<String>,

        /// Region the backup is stored in (default: STRATA_PRIMARY_REGION)
        #[arg(long)]
        region: Option<String>,

        /// Record the backup as incremental
        #[arg(long)]
        incremental: bool,
    },

    /// List backups, newest first
    List {
        /// Filter by status (pending, in_progress, completed, failed)
        #[arg(long)]
        status: Option<String>,

        #[arg(long, default_value = "20")]
        limit: i64,

        #[arg(long, default_value = "0")]
        offset: i64,
    },

    /// Show one backup, or the queue and backup health when no id is given
    Status {
        /// Backup record ID
        backup_id: Option<String>,
    },

    /// Restore the primary database from a verified backup
    Restore {
        /// Backup to restore (default: latest verified backup)
        #[arg(long)]
        backup_id: Option<String>,

        /// Run the restore in this process instead of queueing it
        #[arg(long)]
        inline: bool,
    },

    /// Run a recovery test against a completed backup
    Test {
        /// Backup record ID
        backup_id: String,

        /// Run the test in this process instead of queueing it
        #[arg(long, conflicts_with = "wait")]
        inline: bool,

        /// Wait for the queued test to finish before returning
        #[arg(long)]
        wait: bool,

        /// Timeout in seconds when using --wait (default: 1800)
        #[arg(long, default_value = "1800")]
        timeout: u64,

        /// Poll interval in seconds when using --wait (default: 5)
        #[arg(long, default_value = "5")]
        poll_interval: u64,
    },

    /// Enqueue deletion of expired backups
    Sweep,

    /// Run one integrity sampling pass
    Sample,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt().with_env_filter(log_level).init();

    let database_url = cli
        .database_url
        .ok_or_else(|| anyhow::anyhow!("DATABASE_URL not set"))?;

    match cli.command {
        Commands::Migrate => {
            commands::migrate::execute(&database_url).await?;
        }
        Commands::Backup {
            database,
            region,
            incremental,
        } => {
            commands::backup::execute(
                &database_url,
                database.as_deref(),
                region.as_deref(),
                incremental,
            )
            .await?;
        }
        Commands::List {
            status,
            limit,
            offset,
        } => {
            commands::list::execute(&database_url, status.as_deref(), limit, offset).await?;
        }
        Commands::Status { backup_id } => match backup_id {
            Some(id) => commands::status::show_backup(&database_url, &id).await?,
            None => commands::status::show_overview(&database_url).await?,
        },
        Commands::Restore { backup_id, inline } => {
            commands::restore::execute(&database_url, backup_id.as_deref(), inline).await?;
        }
        Commands::Test {
            backup_id,
            inline,
            wait,
            timeout,
            poll_interval,
        } => {
            let outcome = commands::test::execute(
                &database_url,
                &backup_id,
                commands::test::TestMode::from_flags(inline, wait, timeout, poll_interval),
            )
            .await?;

            use commands::test::TestOutcome;
            match outcome {
                TestOutcome::Passed => std::process::exit(0),
                TestOutcome::Failed => std::process::exit(1),
                TestOutcome::Queued => {
                    // No exit - a worker will pick the test up
                }
            }
        }
        Commands::Sweep => {
            commands::maintenance::sweep(&database_url).await?;
        }
        Commands::Sample => {
            let clean = commands::maintenance::sample(&database_url).await?;
            if !clean {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
