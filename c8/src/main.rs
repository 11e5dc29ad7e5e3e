//! c8-jobs: async job maintenance for a C8 fabric.
//!
//! # Usage
//!
//! ```bash
//! # List finished jobs
//! c8-jobs list --status done --count 100
//!
//! # Inspect, cancel or remove one job
//! c8-jobs status 4711
//! c8-jobs cancel 4711
//! c8-jobs clear 4711
//!
//! # Remove every job record
//! c8-jobs clear-all
//! ```
//!
//! # Environment Variables
//!
//! - `C8_ENV`: Environment (test, development, production)
//! - `C8_PROTOCOL`, `C8_HOST`, `C8_PORT`: server (default: https://localhost:443)
//! - `C8_TENANT`, `C8_FABRIC`: tenant and fabric (default: _mm, _system)
//! - `C8_USERNAME`, `C8_PASSWORD`: credentials
//! - `C8_REQUEST_TIMEOUT_SECS`: per-request timeout (default: 30)

use c8::{C8Client, ClientConfig, JobStatus};
use chrono::{TimeZone, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Parser)]
#[command(name = "c8-jobs", version, about = "Manage async jobs on a C8 fabric")]
struct Cli {
    /// Fabric to operate on (overrides C8_FABRIC)
    #[arg(long)]
    fabric: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List job ids by status
    List {
        /// Job status to list
        #[arg(long, value_enum, default_value_t = ListStatus::Done)]
        status: ListStatus,
        /// Maximum number of ids
        #[arg(long, default_value_t = 100)]
        count: usize,
    },
    /// Show a job's status
    Status { id: String },
    /// Cancel a pending job
    Cancel { id: String },
    /// Remove a job record
    Clear { id: String },
    /// Remove every job record
    ClearAll,
    /// Remove job records created before a unix timestamp
    ClearExpired {
        /// Seconds since the epoch
        #[arg(long)]
        before: i64,
    },
}

/// Statuses the server keeps job listings for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ListStatus {
    Done,
    Pending,
}

impl From<ListStatus> for JobStatus {
    fn from(status: ListStatus) -> Self {
        match status {
            ListStatus::Done => JobStatus::Done,
            ListStatus::Pending => JobStatus::Pending,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("c8=info".parse()?))
        .init();

    let cli = Cli::parse();

    // Load configuration
    let mut config = ClientConfig::from_env()?;
    if let Some(fabric) = cli.fabric {
        config.fabric = fabric;
    }

    info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = %config.environment,
        url = %config.base_url(),
        fabric = %config.fabric,
        "c8-jobs"
    );

    let client = C8Client::connect(config).await?;
    let fabric = client.fabric();

    match cli.command {
        Command::List { status, count } => {
            for id in fabric.async_jobs(status.into(), count).await? {
                println!("{}", id);
            }
        },
        Command::Status { id } => {
            let status = fabric.async_job(&id).status().await?;
            println!("{} {}", id, status);
        },
        Command::Cancel { id } => {
            fabric.async_job(&id).cancel().await?;
            println!("{} cancelled", id);
        },
        Command::Clear { id } => {
            fabric.async_job(&id).clear().await?;
            println!("{} cleared", id);
        },
        Command::ClearAll => {
            fabric.clear_async_jobs().await?;
            println!("all jobs cleared");
        },
        Command::ClearExpired { before } => {
            let stamp = Utc
                .timestamp_opt(before, 0)
                .single()
                .ok_or_else(|| anyhow::anyhow!("invalid timestamp: {}", before))?;
            fabric.clear_async_jobs_before(stamp).await?;
            println!("jobs before {} cleared", stamp);
        },
    }

    Ok(())
}
