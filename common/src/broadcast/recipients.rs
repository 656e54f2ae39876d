// Recipient selection

use super::request::ValidatedBroadcast;
use crate::models::{
    AlertKind, PersonStatus, PhoneKind, SmsNumber, BASE_TRAINING_POSITION_ID,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use std::collections::HashSet;

/// A person the broadcast query returned, with everything needed to filter
/// and plan delivery
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Candidate {
    pub id: i64,
    pub callsign: String,
    #[sqlx(try_from = "String")]
    pub status: PersonStatus,
    pub email: Option<String>,
    pub on_site: bool,
    pub sms_on_playa: Option<String>,
    pub sms_off_playa: Option<String>,
    pub sms_on_playa_verified: bool,
    pub sms_off_playa_verified: bool,
    pub sms_on_playa_stopped: bool,
    pub sms_off_playa_stopped: bool,
    /// None when the person never saved a preference for the alert
    pub use_sms: Option<bool>,
    pub use_email: Option<bool>,
    pub on_duty: bool,
    pub signed_up: bool,
    pub trained: bool,
}

impl Candidate {
    pub fn sms_number(&self, kind: PhoneKind) -> SmsNumber<'_> {
        let (number, verified, stopped) = match kind {
            PhoneKind::OnPlaya => (
                &self.sms_on_playa,
                self.sms_on_playa_verified,
                self.sms_on_playa_stopped,
            ),
            PhoneKind::OffPlaya => (
                &self.sms_off_playa,
                self.sms_off_playa_verified,
                self.sms_off_playa_stopped,
            ),
        };
        SmsNumber {
            kind,
            number: number.as_deref().filter(|n| !n.is_empty()),
            verified,
            stopped,
            code: None,
        }
    }

    /// Missing preference rows count as opted in
    pub fn wants_sms(&self) -> bool {
        self.use_sms.unwrap_or(true)
    }

    pub fn wants_email(&self) -> bool {
        self.use_email.unwrap_or(true)
    }
}

/// Parameters for the candidate SQL query
#[derive(Debug, Clone)]
pub struct CandidateQuery {
    pub alert: AlertKind,
    /// Empty means any status
    pub statuses: Vec<PersonStatus>,
    pub position_id: Option<i64>,
    pub slot_id: Option<i64>,
    pub on_duty_only: bool,
    pub training_position_id: i64,
    pub year: i32,
    pub year_start: DateTime<Utc>,
    pub year_end: DateTime<Utc>,
}

impl CandidateQuery {
    pub fn for_broadcast(
        broadcast: &ValidatedBroadcast,
        year: i32,
        (year_start, year_end): (DateTime<Utc>, DateTime<Utc>),
    ) -> Self {
        Self {
            alert: broadcast.attrs.alert,
            statuses: broadcast.statuses.clone(),
            position_id: broadcast.position_id,
            slot_id: broadcast.slot_id,
            on_duty_only: broadcast.attrs.on_duty_only,
            training_position_id: BASE_TRAINING_POSITION_ID,
            year,
            year_start,
            year_end,
        }
    }
}

/// Restrictions applied after the query
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecipientFilter {
    pub on_site: Option<bool>,
    pub attending: bool,
    pub trained: bool,
}

impl RecipientFilter {
    pub fn for_broadcast(broadcast: &ValidatedBroadcast) -> Self {
        Self {
            on_site: broadcast.on_site,
            attending: broadcast.attending,
            trained: broadcast.trained,
        }
    }

    pub fn matches(&self, candidate: &Candidate) -> bool {
        // Anyone on duty is on site, whether or not they checked in
        let present = candidate.on_site || candidate.on_duty;
        match self.on_site {
            Some(true) if !present => return false,
            Some(false) if present => return false,
            _ => {}
        }
        if self.attending && !candidate.signed_up {
            return false;
        }
        if self.trained && !candidate.trained {
            return false;
        }
        true
    }
}

/// Drop repeated person ids, keeping the first row and the query order
pub fn dedupe(candidates: Vec<Candidate>) -> Vec<Candidate> {
    let mut seen = HashSet::with_capacity(candidates.len());
    candidates
        .into_iter()
        .filter(|c| seen.insert(c.id))
        .collect()
}

/// De-duplicate, then apply the filter
pub fn select_recipients(candidates: Vec<Candidate>, filter: &RecipientFilter) -> Vec<Candidate> {
    dedupe(candidates)
        .into_iter()
        .filter(|c| filter.matches(c))
        .collect()
}
