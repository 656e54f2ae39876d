use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Form,
};
use std::collections::HashMap;

use crate::handlers::ErrorResponse;
use crate::state::AppState;
use common::sms::{twiml_response, validate_twilio_signature};

const SIGNATURE_HEADER: &str = "X-Twilio-Signature";

/// Reject webhook posts that Twilio did not sign. Signing is skipped when no
/// auth token is configured (local development).
fn verify_signature(
    state: &AppState,
    url: Option<&str>,
    headers: &HeaderMap,
    params: &HashMap<String, String>,
) -> Result<(), ErrorResponse> {
    let token = &state.config.twilio.auth_token;
    if token.is_empty() {
        tracing::debug!("Twilio auth token not configured, skipping signature check");
        return Ok(());
    }

    let url = url.ok_or_else(|| {
        tracing::error!("Webhook URL not configured, cannot validate Twilio signature");
        ErrorResponse::new("forbidden", "Webhook URL not configured")
    })?;
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ErrorResponse::new("forbidden", "Missing Twilio signature"))?;

    if !validate_twilio_signature(token, url, params, signature) {
        tracing::warn!(url = %url, "Invalid Twilio signature");
        return Err(ErrorResponse::new("forbidden", "Invalid Twilio signature"));
    }
    Ok(())
}

/// Twilio inbound message webhook; answers with TwiML
#[tracing::instrument(skip(state, headers, params))]
pub async fn inbound(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(params): Form<HashMap<String, String>>,
) -> Result<Response, ErrorResponse> {
    verify_signature(
        &state,
        state.config.twilio.inbound_url.as_deref(),
        &headers,
        &params,
    )?;

    let from = params
        .get("From")
        .ok_or_else(|| ErrorResponse::new("validation_error", "Missing From"))?;
    let body = params.get("Body").map(String::as_str).unwrap_or_default();

    let reply = state.sms.handle_inbound(from, body).await?;

    Ok((
        [(header::CONTENT_TYPE, "text/xml")],
        twiml_response(reply.as_deref()),
    )
        .into_response())
}

/// Twilio delivery status callback
#[tracing::instrument(skip(state, headers, params))]
pub async fn status_callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(params): Form<HashMap<String, String>>,
) -> Result<StatusCode, ErrorResponse> {
    verify_signature(
        &state,
        state.config.twilio.status_callback_url.as_deref(),
        &headers,
        &params,
    )?;

    let sid = params
        .get("MessageSid")
        .ok_or_else(|| ErrorResponse::new("validation_error", "Missing MessageSid"))?;
    let status = params
        .get("MessageStatus")
        .ok_or_else(|| ErrorResponse::new("validation_error", "Missing MessageStatus"))?;
    let error_code = params
        .get("ErrorCode")
        .and_then(|code| code.trim().parse::<i64>().ok());

    state.sms.handle_status(sid, status, error_code).await?;
    Ok(StatusCode::NO_CONTENT)
}
