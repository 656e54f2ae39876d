use axum::{
    extract::{Path, State},
    Json,
};
use serde::Deserialize;

use crate::handlers::{ErrorResponse, SuccessResponse};
use crate::state::AppState;
use common::alerts::{alert_settings, preference_from_update, AlertSetting, AlertSettingUpdate};
use common::models::{Person, PhoneKind};

/// Both numbers are replaced; a missing or empty one is cleared
#[derive(Debug, Deserialize)]
pub struct UpdateNumbersRequest {
    pub on_playa: Option<String>,
    pub off_playa: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SendCodeRequest {
    pub kind: PhoneKind,
}

#[derive(Debug, Deserialize)]
pub struct ConfirmCodeRequest {
    pub kind: PhoneKind,
    pub code: String,
}

#[tracing::instrument(skip(state, req))]
pub async fn update_numbers(
    State(state): State<AppState>,
    Path(person_id): Path<i64>,
    Json(req): Json<UpdateNumbersRequest>,
) -> Result<Json<SuccessResponse<Person>>, ErrorResponse> {
    let person = state
        .sms
        .update_numbers(person_id, req.on_playa.as_deref(), req.off_playa.as_deref())
        .await?;
    Ok(Json(SuccessResponse::new(person)))
}

#[tracing::instrument(skip(state))]
pub async fn send_code(
    State(state): State<AppState>,
    Path(person_id): Path<i64>,
    Json(req): Json<SendCodeRequest>,
) -> Result<Json<SuccessResponse<&'static str>>, ErrorResponse> {
    state.sms.send_code(person_id, req.kind).await?;
    Ok(Json(SuccessResponse::new("sent")))
}

#[tracing::instrument(skip(state, req))]
pub async fn confirm_code(
    State(state): State<AppState>,
    Path(person_id): Path<i64>,
    Json(req): Json<ConfirmCodeRequest>,
) -> Result<Json<SuccessResponse<Person>>, ErrorResponse> {
    let person = state
        .sms
        .confirm_code(person_id, req.kind, req.code.trim())
        .await?;
    Ok(Json(SuccessResponse::new(person)))
}

#[tracing::instrument(skip(state))]
pub async fn get_alerts(
    State(state): State<AppState>,
    Path(person_id): Path<i64>,
) -> Result<Json<SuccessResponse<Vec<AlertSetting>>>, ErrorResponse> {
    let stored = state.people.alert_preferences(person_id).await?;
    Ok(Json(SuccessResponse::new(alert_settings(&stored))))
}

/// Store the given preferences, then answer with the full sheet
#[tracing::instrument(skip(state, updates))]
pub async fn update_alerts(
    State(state): State<AppState>,
    Path(person_id): Path<i64>,
    Json(updates): Json<Vec<AlertSettingUpdate>>,
) -> Result<Json<SuccessResponse<Vec<AlertSetting>>>, ErrorResponse> {
    if state.people.find_by_id(person_id).await?.is_none() {
        return Err(ErrorResponse::new(
            "not_found",
            format!("Person not found: {}", person_id),
        ));
    }

    let prefs = updates
        .iter()
        .map(|update| preference_from_update(person_id, update))
        .collect::<Result<Vec<_>, _>>()?;
    for pref in &prefs {
        state.people.set_alert_preference(pref).await?;
    }

    let stored = state.people.alert_preferences(person_id).await?;
    Ok(Json(SuccessResponse::new(alert_settings(&stored))))
}
