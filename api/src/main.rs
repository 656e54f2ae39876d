use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;

mod handlers;
mod middleware;
mod routes;
mod state;

use common::auth::JwtService;
use common::bootstrap::{
    init_broadcast_service, init_database_pool, init_mailer, init_redis_client,
    init_retry_strategy, init_sms_sender, shutdown_signal,
};
use common::config::Settings;
use common::db::repositories::{
    PersonRepository, PositionRepository, SmsRepository, TimesheetRepository,
};
use common::rate_limit::RateLimiter;
use common::signin::SignInService;
use common::sms::SmsService;
use common::telemetry::{init_logging, init_metrics, shutdown_tracer};
use state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Settings::load().context("Failed to load configuration")?;
    init_logging(&config.observability)?;
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;

    tracing::info!(
        host = %config.server.host,
        port = %config.server.port,
        "Starting API server"
    );

    let metrics = init_metrics()?;
    let db_pool = init_database_pool(&config).await?;
    let redis_client = init_redis_client(&config)?;
    let sms_sender = init_sms_sender(&config)?;
    let mailer = init_mailer(&config)?;
    let retry = init_retry_strategy(&config);

    let broadcasts = init_broadcast_service(
        &config,
        db_pool.clone(),
        sms_sender.clone(),
        mailer,
        retry.clone(),
    );
    let sms = Arc::new(SmsService::new(
        Arc::new(SmsRepository::new(db_pool.clone())),
        sms_sender,
        Arc::new(RateLimiter::new(redis_client, "sms_code")),
        retry,
        config.broadcast.clone(),
    ));
    let signin = SignInService::new(
        PersonRepository::new(db_pool.clone()),
        PositionRepository::new(db_pool.clone()),
        TimesheetRepository::new(db_pool.clone()),
        config.event_tz(),
    );

    let state = AppState {
        db_pool: db_pool.clone(),
        jwt: JwtService::new(&config.auth.jwt_secret),
        metrics,
        broadcasts,
        sms,
        signin,
        people: PersonRepository::new(db_pool.clone()),
        config: Arc::new(config.clone()),
    };

    let app = routes::create_router(state);

    let addr = SocketAddr::from((
        config.server.host.parse::<std::net::IpAddr>()?,
        config.server.port,
    ));
    tracing::info!(addr = %addr, "Starting HTTP server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    db_pool.close().await;
    shutdown_tracer();
    tracing::info!("API server stopped");
    Ok(())
}
