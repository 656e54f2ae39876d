use axum::{
    extract::{Path, Query, State},
    http::header,
    response::IntoResponse,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::handlers::{ErrorResponse, SuccessResponse};
use crate::state::AppState;
use common::broadcast::{
    all_attributes, BroadcastAttributes, BroadcastDetail, BroadcastPreview, BroadcastRequest,
    BroadcastSummary, RetryReport,
};
use common::models::{Broadcast, MessageFilter, MessageLogEntry, UserClaims};

#[derive(Debug, Deserialize)]
pub struct ListBroadcastsQuery {
    pub since: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
}

/// Broadcast type attribute table, for building the send form
#[tracing::instrument]
pub async fn list_types() -> Json<SuccessResponse<Vec<BroadcastAttributes>>> {
    Json(SuccessResponse::new(all_attributes()))
}

#[tracing::instrument(skip(state, claims, req))]
pub async fn preview(
    State(state): State<AppState>,
    Extension(claims): Extension<UserClaims>,
    Json(req): Json<BroadcastRequest>,
) -> Result<Json<SuccessResponse<BroadcastPreview>>, ErrorResponse> {
    let preview = state.broadcasts.preview(&claims, &req).await?;
    Ok(Json(SuccessResponse::new(preview)))
}

#[tracing::instrument(skip(state, claims, req))]
pub async fn transmit(
    State(state): State<AppState>,
    Extension(claims): Extension<UserClaims>,
    Json(req): Json<BroadcastRequest>,
) -> Result<Json<SuccessResponse<BroadcastSummary>>, ErrorResponse> {
    let summary = state.broadcasts.transmit(&claims, &req).await?;
    Ok(Json(SuccessResponse::new(summary)))
}

#[tracing::instrument(skip(state))]
pub async fn list_broadcasts(
    State(state): State<AppState>,
    Query(query): Query<ListBroadcastsQuery>,
) -> Result<Json<SuccessResponse<Vec<Broadcast>>>, ErrorResponse> {
    let broadcasts = state.broadcasts.list(query.since, query.limit).await?;
    Ok(Json(SuccessResponse::new(broadcasts)))
}

#[tracing::instrument(skip(state))]
pub async fn get_broadcast(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<SuccessResponse<BroadcastDetail>>, ErrorResponse> {
    let detail = state.broadcasts.detail(id).await?;
    Ok(Json(SuccessResponse::new(detail)))
}

#[tracing::instrument(skip(state))]
pub async fn list_messages(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(filter): Query<MessageFilter>,
) -> Result<Json<SuccessResponse<Vec<MessageLogEntry>>>, ErrorResponse> {
    let messages = state.broadcasts.messages(id, filter).await?;
    Ok(Json(SuccessResponse::new(messages)))
}

/// Message log as a CSV download
#[tracing::instrument(skip(state))]
pub async fn export_messages(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ErrorResponse> {
    let csv = state.broadcasts.export_csv(id).await?;
    let disposition = format!("attachment; filename=\"broadcast-{}.csv\"", id);

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        csv,
    ))
}

#[tracing::instrument(skip(state, claims), fields(actor = claims.sub))]
pub async fn retry_broadcast(
    State(state): State<AppState>,
    Extension(claims): Extension<UserClaims>,
    Path(id): Path<i64>,
) -> Result<Json<SuccessResponse<RetryReport>>, ErrorResponse> {
    let report = state.broadcasts.retry_broadcast(id).await?;
    Ok(Json(SuccessResponse::new(report)))
}
