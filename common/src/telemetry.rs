// Telemetry module for structured logging, metrics, and tracing

use anyhow::Result;
use metrics::{counter, describe_counter};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use opentelemetry::trace::TracerProvider as _;
use opentelemetry::{global, KeyValue};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{
    trace::{RandomIdGenerator, Sampler, TracerProvider},
    Resource,
};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::config::ObservabilityConfig;

const SERVICE_NAME: &str = "clubhouse";

/// Initialize structured logging.
///
/// Sets up the tracing subscriber with:
/// - JSON formatting (or compact text when `log_json` is off)
/// - Log levels from `RUST_LOG`, falling back to the configured level
/// - Optional OpenTelemetry export when a tracing endpoint is configured
pub fn init_logging(config: &ObservabilityConfig) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .map_err(|e| anyhow::anyhow!("Failed to create env filter: {}", e))?;

    let fmt_layer = if config.log_json {
        fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .boxed()
    } else {
        fmt::layer().with_target(true).boxed()
    };

    let otel_layer = match config.tracing_endpoint.as_deref() {
        Some(endpoint) => Some(tracing_opentelemetry::layer().with_tracer(init_tracer(endpoint)?)),
        None => None,
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .with(otel_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize tracing subscriber: {}", e))?;

    tracing::info!(
        log_level = %config.log_level,
        json = config.log_json,
        tracing_endpoint = config.tracing_endpoint.as_deref(),
        "Structured logging initialized"
    );

    Ok(())
}

/// Initialize OpenTelemetry tracer with OTLP exporter
fn init_tracer(endpoint: &str) -> Result<opentelemetry_sdk::trace::Tracer> {
    use opentelemetry_sdk::runtime::Tokio;

    let exporter = opentelemetry_otlp::new_exporter()
        .tonic()
        .with_endpoint(endpoint)
        .build_span_exporter()
        .map_err(|e| anyhow::anyhow!("Failed to build span exporter: {}", e))?;

    let tracer_provider = TracerProvider::builder()
        .with_batch_exporter(exporter, Tokio)
        .with_config(
            opentelemetry_sdk::trace::Config::default()
                .with_sampler(Sampler::AlwaysOn)
                .with_id_generator(RandomIdGenerator::default())
                .with_resource(Resource::new(vec![
                    KeyValue::new("service.name", SERVICE_NAME),
                    KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
                ])),
        )
        .build();

    global::set_tracer_provider(tracer_provider.clone());

    let tracer = tracer_provider.tracer(SERVICE_NAME);

    tracing::info!(endpoint = endpoint, "OpenTelemetry tracer initialized");

    Ok(tracer)
}

/// Flush remaining spans on shutdown
pub fn shutdown_tracer() {
    global::shutdown_tracer_provider();
}

/// Install the Prometheus recorder and describe all metrics.
///
/// The returned handle renders the scrape output for `/metrics`.
pub fn init_metrics() -> Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("Failed to install Prometheus recorder: {}", e))?;

    describe_counter!(
        "broadcast_transmitted_total",
        "Total number of broadcasts transmitted"
    );
    describe_counter!(
        "broadcast_message_total",
        "Per-recipient deliveries by channel and resulting status"
    );
    describe_counter!(
        "broadcast_retry_total",
        "Delivery retries by channel and outcome"
    );
    describe_counter!("sms_inbound_total", "Inbound SMS messages by command");
    describe_counter!("signin_blocked_total", "Shift sign-ins refused by reason");

    Ok(handle)
}

#[inline]
pub fn record_broadcast(broadcast_type: &str) {
    counter!("broadcast_transmitted_total", "type" => broadcast_type.to_string()).increment(1);
}

#[inline]
pub fn record_delivery(channel: &str, status: &str) {
    counter!(
        "broadcast_message_total",
        "channel" => channel.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

#[inline]
pub fn record_retry(channel: &str, outcome: &str) {
    counter!(
        "broadcast_retry_total",
        "channel" => channel.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

#[inline]
pub fn record_inbound_sms(command: &str) {
    counter!("sms_inbound_total", "command" => command.to_string()).increment(1);
}

#[inline]
pub fn record_signin_blocked(reason: &str) {
    counter!("signin_blocked_total", "reason" => reason.to_string()).increment(1);
}
