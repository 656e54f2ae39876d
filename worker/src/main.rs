// Worker binary: periodically resends failed broadcast deliveries

use anyhow::{Context, Result};
use chrono::Utc;
use common::bootstrap::{
    init_broadcast_service, init_database_pool, init_mailer, init_retry_strategy,
    init_sms_sender, shutdown_signal,
};
use common::broadcast::BroadcastService;
use common::config::Settings;
use common::telemetry::{init_logging, shutdown_tracer};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::load().context("Failed to load configuration")?;
    init_logging(&settings.observability)?;
    settings
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;

    info!("Starting Clubhouse delivery retry worker");

    let db_pool = init_database_pool(&settings).await?;
    let service = init_broadcast_service(
        &settings,
        db_pool.clone(),
        init_sms_sender(&settings)?,
        init_mailer(&settings)?,
        init_retry_strategy(&settings),
    );

    let poll = Duration::from_secs(settings.broadcast.retry_poll_interval_seconds);
    run_retry_loop(service, poll, shutdown_signal()).await;

    db_pool.close().await;
    shutdown_tracer();
    info!("Worker stopped");
    Ok(())
}

/// Sweep due retries every `poll` until `shutdown` resolves. A sweep in
/// progress finishes before the loop exits.
async fn run_retry_loop(
    service: Arc<BroadcastService>,
    poll: Duration,
    shutdown: impl Future<Output = ()>,
) {
    info!(poll_interval_seconds = poll.as_secs(), "Starting retry loop");

    let mut ticker = interval(poll);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            biased;
            _ = &mut shutdown => {
                info!("Shutdown signal received, stopping retry loop");
                break;
            }
            _ = ticker.tick() => {
                match service.retry_due(Utc::now()).await {
                    Ok(report) if report.attempted > 0 => {
                        info!(
                            attempted = report.attempted,
                            succeeded = report.succeeded,
                            failed = report.failed,
                            broadcasts = report.broadcasts,
                            "Retry sweep finished"
                        );
                    }
                    Ok(_) => debug!("No deliveries due for retry"),
                    Err(e) => error!(error = %e, "Retry sweep failed"),
                }
            }
        }
    }
}
