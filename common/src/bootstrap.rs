// Bootstrap utilities shared by the api and worker binaries

use crate::broadcast::BroadcastService;
use crate::config::Settings;
use crate::db::repositories::BroadcastRepository;
use crate::db::DbPool;
use crate::mail::{Mailer, SmtpMailer};
use crate::retry::{ExponentialBackoff, RetryStrategy};
use crate::sms::{SmsSender, TwilioClient};
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

/// Connect the database pool, running migrations when configured
#[tracing::instrument(skip(settings))]
pub async fn init_database_pool(settings: &Settings) -> Result<DbPool> {
    info!("Initializing database pool");

    let db_pool = DbPool::new(&settings.database)
        .await
        .context("Failed to initialize database pool")?;

    if settings.database.run_migrations {
        db_pool
            .migrate()
            .await
            .context("Failed to run database migrations")?;
    }

    info!("Database pool initialized");
    Ok(db_pool)
}

/// Redis client backing the verification code rate limiter
#[tracing::instrument(skip(settings))]
pub fn init_redis_client(settings: &Settings) -> Result<redis::Client> {
    let client = redis::Client::open(settings.redis.url.as_str())
        .context("Failed to create Redis client")?;
    info!("Redis client initialized");
    Ok(client)
}

/// Twilio sender; when disabled every send fails without a retry
#[tracing::instrument(skip(settings))]
pub fn init_sms_sender(settings: &Settings) -> Result<Arc<dyn SmsSender>> {
    let client =
        TwilioClient::new(settings.twilio.clone()).context("Failed to create Twilio client")?;
    info!(enabled = settings.twilio.enabled, "SMS sender initialized");
    Ok(Arc::new(client))
}

#[tracing::instrument(skip(settings))]
pub fn init_mailer(settings: &Settings) -> Result<Arc<dyn Mailer>> {
    let mailer = SmtpMailer::new(&settings.smtp).context("Failed to create SMTP mailer")?;
    info!(
        enabled = settings.smtp.enabled,
        host = %settings.smtp.host,
        "Mailer initialized"
    );
    Ok(Arc::new(mailer))
}

pub fn init_retry_strategy(settings: &Settings) -> Arc<dyn RetryStrategy> {
    Arc::new(ExponentialBackoff::from_config(&settings.broadcast))
}

/// Broadcast service over the Postgres store and the configured senders
pub fn init_broadcast_service(
    settings: &Settings,
    db_pool: DbPool,
    sms: Arc<dyn SmsSender>,
    mailer: Arc<dyn Mailer>,
    retry: Arc<dyn RetryStrategy>,
) -> Arc<BroadcastService> {
    Arc::new(BroadcastService::new(
        Arc::new(BroadcastRepository::new(db_pool)),
        sms,
        mailer,
        retry,
        settings.broadcast.clone(),
        settings.event_tz(),
    ))
}

/// Resolves on Ctrl+C or SIGTERM
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM signal");
        },
    }

    tracing::info!("Initiating graceful shutdown");
}
