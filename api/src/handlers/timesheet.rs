use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use serde::Deserialize;

use crate::handlers::{ErrorResponse, SuccessResponse};
use crate::state::AppState;
use common::models::{Timesheet, UserClaims};
use common::signin::{SignInCheck, SignInOutcome};

#[derive(Debug, Deserialize)]
pub struct SignInCheckQuery {
    pub person_id: i64,
    pub position_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct SignInRequest {
    pub person_id: i64,
    pub position_id: i64,
    pub slot_id: Option<i64>,
    #[serde(default)]
    pub force: bool,
}

/// Blockers and warnings for a prospective sign-in, without signing in
#[tracing::instrument(skip(state))]
pub async fn signin_check(
    State(state): State<AppState>,
    Query(query): Query<SignInCheckQuery>,
) -> Result<Json<SuccessResponse<SignInCheck>>, ErrorResponse> {
    let check = state.signin.check(query.person_id, query.position_id).await?;
    Ok(Json(SuccessResponse::new(check)))
}

#[tracing::instrument(skip(state, claims), fields(actor = claims.sub))]
pub async fn sign_in(
    State(state): State<AppState>,
    Extension(claims): Extension<UserClaims>,
    Json(req): Json<SignInRequest>,
) -> Result<Json<SuccessResponse<SignInOutcome>>, ErrorResponse> {
    let outcome = state
        .signin
        .sign_in(&claims, req.person_id, req.position_id, req.slot_id, req.force)
        .await?;
    Ok(Json(SuccessResponse::new(outcome)))
}

#[tracing::instrument(skip(state, claims), fields(actor = claims.sub))]
pub async fn sign_out(
    State(state): State<AppState>,
    Extension(claims): Extension<UserClaims>,
    Path(timesheet_id): Path<i64>,
) -> Result<Json<SuccessResponse<Timesheet>>, ErrorResponse> {
    let timesheet = state.signin.sign_out(&claims, timesheet_id).await?;
    Ok(Json(SuccessResponse::new(timesheet)))
}
