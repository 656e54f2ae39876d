use axum::{
    routing::{get, post, put},
    Router,
};
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::middleware::{auth_middleware, rbac_middleware};
use crate::state::AppState;

/// Create the main application router with all routes and middleware
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Public routes; Twilio webhooks authenticate by request signature
    let public_routes = Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/metrics", get(handlers::metrics::metrics_handler))
        .route("/sms/inbound", post(handlers::sms::inbound))
        .route("/sms/status", post(handlers::sms::status_callback));

    let protected_routes = Router::new()
        // Broadcasts
        .route("/api/broadcast/types", get(handlers::broadcast::list_types))
        .route("/api/broadcast/preview", post(handlers::broadcast::preview))
        .route("/api/broadcast/transmit", post(handlers::broadcast::transmit))
        .route("/api/broadcast", get(handlers::broadcast::list_broadcasts))
        .route("/api/broadcast/:id", get(handlers::broadcast::get_broadcast))
        .route(
            "/api/broadcast/:id/messages",
            get(handlers::broadcast::list_messages),
        )
        .route(
            "/api/broadcast/:id/messages.csv",
            get(handlers::broadcast::export_messages),
        )
        .route(
            "/api/broadcast/:id/retry",
            post(handlers::broadcast::retry_broadcast),
        )
        // Person SMS numbers and alert preferences
        .route("/api/person/:id/sms", put(handlers::person::update_numbers))
        .route("/api/person/:id/sms/code", post(handlers::person::send_code))
        .route(
            "/api/person/:id/sms/confirm",
            post(handlers::person::confirm_code),
        )
        .route(
            "/api/person/:id/alerts",
            get(handlers::person::get_alerts).put(handlers::person::update_alerts),
        )
        // Timesheets
        .route(
            "/api/timesheet/signin-check",
            get(handlers::timesheet::signin_check),
        )
        .route("/api/timesheet/signin", post(handlers::timesheet::sign_in))
        .route(
            "/api/timesheet/:id/signout",
            post(handlers::timesheet::sign_out),
        )
        .layer(
            ServiceBuilder::new()
                .layer(axum::middleware::from_fn_with_state(
                    state.clone(),
                    auth_middleware,
                ))
                .layer(axum::middleware::from_fn(rbac_middleware)),
        );

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}
