// Channel partition: who gets an SMS, an email and an in-app message

use super::recipients::Candidate;
use crate::models::{AddressType, AlertKind, PhoneKind};
use serde::Serialize;

/// Why a recipient did not get a message on a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    OptedOut,
    NoNumber,
    Unverified,
    Stopped,
    NoAddress,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::OptedOut => "opted_out",
            SkipReason::NoNumber => "no_number",
            SkipReason::Unverified => "unverified",
            SkipReason::Stopped => "stopped",
            SkipReason::NoAddress => "no_address",
        }
    }
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Channels the sender turned on
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Channels {
    pub sms: bool,
    pub email: bool,
    pub clubhouse: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Recipient {
    pub person_id: i64,
    pub callsign: String,
    pub address: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Skipped {
    pub person_id: i64,
    pub callsign: String,
    pub channel: AddressType,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DeliveryPlan {
    pub sms: Vec<Recipient>,
    pub email: Vec<Recipient>,
    pub clubhouse: Vec<i64>,
    pub skipped: Vec<Skipped>,
}

impl DeliveryPlan {
    pub fn is_empty(&self) -> bool {
        self.sms.is_empty() && self.email.is_empty() && self.clubhouse.is_empty()
    }
}

/// Pick the SMS address for an alert or say why there is none
pub fn sms_address(candidate: &Candidate, alert: AlertKind) -> Result<String, SkipReason> {
    if !alert.mandatory() && !candidate.wants_sms() {
        return Err(SkipReason::OptedOut);
    }

    let mut phone = if alert.on_playa() {
        candidate.sms_number(PhoneKind::OnPlaya)
    } else {
        candidate.sms_number(PhoneKind::OffPlaya)
    };
    if phone.number.is_none() && phone.kind == PhoneKind::OnPlaya {
        phone = candidate.sms_number(PhoneKind::OffPlaya);
    }

    let number = phone.number.ok_or(SkipReason::NoNumber)?;
    if !phone.verified {
        return Err(SkipReason::Unverified);
    }
    if phone.stopped {
        return Err(SkipReason::Stopped);
    }
    Ok(number.to_string())
}

pub fn email_address(candidate: &Candidate, alert: AlertKind) -> Result<String, SkipReason> {
    if !alert.mandatory() && !candidate.wants_email() {
        return Err(SkipReason::OptedOut);
    }
    candidate
        .email
        .as_deref()
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .map(str::to_string)
        .ok_or(SkipReason::NoAddress)
}

pub fn plan_delivery(candidates: &[Candidate], channels: Channels, alert: AlertKind) -> DeliveryPlan {
    let mut plan = DeliveryPlan::default();

    for candidate in candidates {
        if channels.sms {
            match sms_address(candidate, alert) {
                Ok(address) => plan.sms.push(Recipient {
                    person_id: candidate.id,
                    callsign: candidate.callsign.clone(),
                    address,
                }),
                Err(reason) => plan.skipped.push(Skipped {
                    person_id: candidate.id,
                    callsign: candidate.callsign.clone(),
                    channel: AddressType::Sms,
                    reason,
                }),
            }
        }

        if channels.email {
            match email_address(candidate, alert) {
                Ok(address) => plan.email.push(Recipient {
                    person_id: candidate.id,
                    callsign: candidate.callsign.clone(),
                    address,
                }),
                Err(reason) => plan.skipped.push(Skipped {
                    person_id: candidate.id,
                    callsign: candidate.callsign.clone(),
                    channel: AddressType::Email,
                    reason,
                }),
            }
        }

        if channels.clubhouse {
            plan.clubhouse.push(candidate.id);
        }
    }

    plan
}
