//! One-shot expiry sweep, meant to be run from cron every minute.

use chrono::Utc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bus_ticketing::{config::Config, db, services::cleanup, AppResult};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bus_ticketing=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = run().await {
        tracing::error!(error = %e, "Cleanup failed");
        std::process::exit(1);
    }
}

async fn run() -> AppResult<()> {
    let config = Config::from_env()?;
    let db = db::connect(&config).await?;

    let report = cleanup::reclaim_expired(&db, Utc::now(), config.booking_timeout()).await?;
    tracing::info!(
        scanned = report.scanned,
        cancelled = report.cancelled,
        skipped = report.skipped,
        failed = report.failed,
        "Cleanup run complete"
    );

    if report.failed > 0 {
        std::process::exit(2);
    }
    Ok(())
}
