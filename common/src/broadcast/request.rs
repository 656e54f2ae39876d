// Broadcast request validation

use super::plan::Channels;
use super::types::BroadcastAttributes;
use crate::errors::{AuthError, BroadcastError, ValidationError};
use crate::models::{
    BroadcastType, PersonStatus, UserClaims, ROLE_MEGAPHONE, ROLE_MEGAPHONE_EMERGENCY,
};
use serde::{Deserialize, Serialize};

/// Longest SMS body accepted, leaving room in a single 160 character segment
pub const SMS_MAX_LENGTH: usize = 140;

/// What the sender asked for
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcastRequest {
    #[serde(rename = "type")]
    pub broadcast_type: BroadcastType,
    #[serde(default)]
    pub statuses: Vec<PersonStatus>,
    #[serde(default)]
    pub position_id: Option<i64>,
    #[serde(default)]
    pub slot_id: Option<i64>,
    /// Some(true): only people on site; Some(false): only people off site
    #[serde(default)]
    pub on_site: Option<bool>,
    /// Only people signed up for a shift this event
    #[serde(default)]
    pub attending: bool,
    /// Only people who passed training this event
    #[serde(default)]
    pub trained: bool,
    #[serde(default)]
    pub send_sms: bool,
    #[serde(default)]
    pub send_email: bool,
    #[serde(default)]
    pub send_clubhouse: bool,
    #[serde(default)]
    pub sms_message: Option<String>,
    #[serde(default)]
    pub email_subject: Option<String>,
    #[serde(default)]
    pub email_message: Option<String>,
    /// Shown as the message author; defaults to the sender's callsign
    #[serde(default)]
    pub sender_name: Option<String>,
}

impl BroadcastRequest {
    pub fn new(broadcast_type: BroadcastType) -> Self {
        Self {
            broadcast_type,
            statuses: Vec::new(),
            position_id: None,
            slot_id: None,
            on_site: None,
            attending: false,
            trained: false,
            send_sms: false,
            send_email: false,
            send_clubhouse: false,
            sms_message: None,
            email_subject: None,
            email_message: None,
            sender_name: None,
        }
    }
}

/// A request that passed validation, with defaults filled in
#[derive(Debug, Clone)]
pub struct ValidatedBroadcast {
    pub attrs: BroadcastAttributes,
    pub statuses: Vec<PersonStatus>,
    pub position_id: Option<i64>,
    pub slot_id: Option<i64>,
    pub on_site: Option<bool>,
    pub attending: bool,
    pub trained: bool,
    pub send_sms: bool,
    pub send_email: bool,
    pub send_clubhouse: bool,
    pub sms_message: Option<String>,
    pub email_subject: Option<String>,
    pub email_message: Option<String>,
    pub sender_id: i64,
    pub sender_name: String,
}

impl ValidatedBroadcast {
    pub fn channels(&self) -> Channels {
        Channels {
            sms: self.send_sms,
            email: self.send_email,
            clubhouse: self.send_clubhouse,
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Check permissions and the request against the type's attributes
pub fn validate(
    request: &BroadcastRequest,
    sender: &UserClaims,
) -> Result<ValidatedBroadcast, BroadcastError> {
    let attrs = request.broadcast_type.attributes();

    if !sender.has_role(ROLE_MEGAPHONE) {
        return Err(AuthError::InsufficientPermissions(ROLE_MEGAPHONE.to_string()).into());
    }
    if attrs.requires_emergency_role && !sender.has_role(ROLE_MEGAPHONE_EMERGENCY) {
        return Err(
            AuthError::InsufficientPermissions(ROLE_MEGAPHONE_EMERGENCY.to_string()).into(),
        );
    }

    let send_sms = request.send_sms;
    let send_email = request.send_email && !attrs.sms_only;
    let send_clubhouse = request.send_clubhouse && !attrs.sms_only;

    if !send_sms && !send_email && !send_clubhouse {
        return Err(ValidationError::invalid("channels", "select at least one delivery channel").into());
    }

    let sms_message = non_empty(&request.sms_message);
    if send_sms {
        match sms_message {
            None => return Err(ValidationError::MissingField("sms_message".to_string()).into()),
            Some(ref text) if text.chars().count() > SMS_MAX_LENGTH => {
                return Err(ValidationError::invalid(
                    "sms_message",
                    format!("must be at most {} characters", SMS_MAX_LENGTH),
                )
                .into());
            }
            Some(_) => {}
        }
    }

    let email_subject = non_empty(&request.email_subject);
    let email_message = non_empty(&request.email_message);
    if send_email || send_clubhouse {
        if email_subject.is_none() {
            return Err(ValidationError::MissingField("email_subject".to_string()).into());
        }
        if email_message.is_none() {
            return Err(ValidationError::MissingField("email_message".to_string()).into());
        }
    }

    if attrs.has_position && request.position_id.is_none() {
        return Err(ValidationError::MissingField("position_id".to_string()).into());
    }
    if attrs.has_slot && request.slot_id.is_none() {
        return Err(ValidationError::MissingField("slot_id".to_string()).into());
    }

    let statuses = if attrs.has_status {
        if let Some(bad) = request
            .statuses
            .iter()
            .find(|s| !attrs.default_statuses.contains(s))
        {
            return Err(ValidationError::invalid(
                "statuses",
                format!("{} cannot be targeted by a {} broadcast", bad, attrs.broadcast_type),
            )
            .into());
        }
        if request.statuses.is_empty() {
            attrs.default_statuses.to_vec()
        } else {
            request.statuses.clone()
        }
    } else {
        if !request.statuses.is_empty() {
            return Err(ValidationError::invalid(
                "statuses",
                format!("{} broadcasts do not take a status list", attrs.broadcast_type),
            )
            .into());
        }
        attrs.default_statuses.to_vec()
    };

    let restricted = request.on_site.is_some() || request.attending || request.trained;
    if restricted && !attrs.has_restrictions {
        return Err(ValidationError::invalid(
            "restrictions",
            format!("{} broadcasts do not take restrictions", attrs.broadcast_type),
        )
        .into());
    }
    let on_site = if attrs.forces_on_site {
        Some(true)
    } else {
        request.on_site
    };

    let sender_name = non_empty(&request.sender_name).unwrap_or_else(|| sender.callsign.clone());

    Ok(ValidatedBroadcast {
        position_id: if attrs.has_position { request.position_id } else { None },
        slot_id: if attrs.has_slot { request.slot_id } else { None },
        attrs,
        statuses,
        on_site,
        attending: request.attending,
        trained: request.trained,
        send_sms,
        send_email,
        send_clubhouse,
        sms_message: if send_sms { sms_message } else { None },
        email_subject,
        email_message,
        sender_id: sender.sub,
        sender_name,
    })
}
