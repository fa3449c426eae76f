//! reminder-worker: keeps lesson reminder timers armed.
//!
//! On startup every student's reminders are re-derived from the weekly
//! schedule, so timers lost across a restart come back. Afterwards the
//! worker re-plans and reaps old reminder rows on a fixed interval until
//! Ctrl-C.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::sync::Notify;
use tracing::{info, warn};

use tutor_core::config::{load_dotenv, Config};
use tutor_scheduling::Services;

// ── CLI ─────────────────────────────────────────────────────────────

/// Lesson reminder worker.
#[derive(Parser, Debug)]
#[command(name = "reminder-worker", version, about)]
struct Cli {
    /// Plan and reap once, then exit without waiting for timers.
    #[arg(long)]
    once: bool,

    /// Maintenance interval in seconds (defaults to the configured value).
    #[arg(long, env = "REMINDER_WORKER_INTERVAL")]
    interval: Option<u64>,
}

// ── main ────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    load_dotenv();
    let config = Config::from_env();
    config.log_summary();

    let pool = tutor_storage::init_pool(&config.database).await?;
    let services = Services::from_config(&config, pool)?;

    if cli.once {
        let armed = services.reminders.plan_all().await?;
        let reaped = services.reminders.reap().await?;
        info!(armed, reaped, "reminder-worker single pass complete");
        return Ok(());
    }

    let interval = cli
        .interval
        .map(|secs| Duration::from_secs(secs.max(1)))
        .unwrap_or_else(|| config.reminders.maintenance_interval());

    let shutdown = Arc::new(Notify::new());
    let signal = Arc::clone(&shutdown);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Ctrl-C received"),
            Err(e) => warn!(error = %e, "failed to listen for Ctrl-C"),
        }
        signal.notify_one();
    });

    info!(interval_secs = interval.as_secs(), "reminder-worker starting");
    services.reminders.run_maintenance(interval, shutdown).await;
    info!("reminder-worker exited cleanly");
    Ok(())
}
