pub mod broadcast;
pub mod health;
pub mod metrics;
pub mod person;
pub mod sms;
pub mod timesheet;

// Common response types
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use common::errors::{ApiError, BroadcastError, SignInError, SmsServiceError};
use serde::Serialize;

/// Standard API error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    pub trace_id: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            details: None,
            trace_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self.error.as_str() {
            "unauthorized" => StatusCode::UNAUTHORIZED,
            "forbidden" => StatusCode::FORBIDDEN,
            "not_found" => StatusCode::NOT_FOUND,
            "validation_error" => StatusCode::BAD_REQUEST,
            "conflict" | "signin_blocked" => StatusCode::CONFLICT,
            "no_recipients" => StatusCode::UNPROCESSABLE_ENTITY,
            "rate_limit_exceeded" => StatusCode::TOO_MANY_REQUESTS,
            "sms_error" => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<ApiError> for ErrorResponse {
    fn from(err: ApiError) -> Self {
        let mut response = ErrorResponse::new(err.code, err.message);
        response.details = err.details;
        response
    }
}

impl From<BroadcastError> for ErrorResponse {
    fn from(err: BroadcastError) -> Self {
        ApiError::from(err).into()
    }
}

impl From<SmsServiceError> for ErrorResponse {
    fn from(err: SmsServiceError) -> Self {
        ApiError::from(err).into()
    }
}

impl From<SignInError> for ErrorResponse {
    fn from(err: SignInError) -> Self {
        ApiError::from(err).into()
    }
}

impl From<common::errors::DatabaseError> for ErrorResponse {
    fn from(err: common::errors::DatabaseError) -> Self {
        ApiError::from(err).into()
    }
}

impl From<common::errors::ValidationError> for ErrorResponse {
    fn from(err: common::errors::ValidationError) -> Self {
        ApiError::from(err).into()
    }
}

impl IntoResponse for ErrorResponse {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self.error, message = %self.message, trace_id = %self.trace_id, "Request failed");
        }
        (status, Json(self)).into_response()
    }
}

/// Standard API success response
#[derive(Debug, Serialize)]
pub struct SuccessResponse<T: Serialize> {
    pub data: T,
}

impl<T: Serialize> SuccessResponse<T> {
    pub fn new(data: T) -> Self {
        Self { data }
    }
}

impl<T: Serialize> IntoResponse for SuccessResponse<T> {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}
