use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::str::FromStr;

/// Declares a fieldless enum stored as snake_case TEXT, with Display,
/// FromStr and TryFrom<String> so it can be read through `#[sqlx(try_from)]`.
macro_rules! text_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident { $($variant:ident => $text:literal),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    _ => Err(format!("Invalid {}: {}", stringify!($name), s)),
                }
            }
        }

        impl TryFrom<String> for $name {
            type Error = String;

            fn try_from(s: String) -> Result<Self, Self::Error> {
                Self::from_str(&s)
            }
        }
    };
}

// ============================================================================
// Person Models
// ============================================================================

text_enum! {
    /// Membership status of a person
    pub enum PersonStatus {
        Active => "active",
        Alpha => "alpha",
        Auditor => "auditor",
        Bonked => "bonked",
        Deceased => "deceased",
        Dismissed => "dismissed",
        Inactive => "inactive",
        InactiveExtension => "inactive_extension",
        NonRanger => "non_ranger",
        PastProspective => "past_prospective",
        Prospective => "prospective",
        Resigned => "resigned",
        Retired => "retired",
        Suspended => "suspended",
        Uberbonked => "uberbonked",
    }
}

impl PersonStatus {
    /// Alpha cohort: people still going through onboarding
    pub fn is_alpha_cohort(&self) -> bool {
        matches!(self, PersonStatus::Alpha | PersonStatus::Prospective)
    }
}

text_enum! {
    /// Which of the two SMS numbers a person may register
    pub enum PhoneKind {
        OnPlaya => "on_playa",
        OffPlaya => "off_playa",
    }
}

/// Person represents a member record as far as broadcasts and sign-in care
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Person {
    pub id: i64,
    pub callsign: String,
    pub first_name: String,
    pub last_name: String,
    #[sqlx(try_from = "String")]
    pub status: PersonStatus,
    pub email: Option<String>,
    pub on_site: bool,
    pub user_authorized: bool,
    pub sms_on_playa: Option<String>,
    pub sms_off_playa: Option<String>,
    pub sms_on_playa_verified: bool,
    pub sms_off_playa_verified: bool,
    pub sms_on_playa_stopped: bool,
    pub sms_off_playa_stopped: bool,
    #[serde(skip_serializing)]
    pub sms_on_playa_code: Option<String>,
    #[serde(skip_serializing)]
    pub sms_off_playa_code: Option<String>,
}

/// Borrowed view of one of a person's SMS numbers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SmsNumber<'a> {
    pub kind: PhoneKind,
    pub number: Option<&'a str>,
    pub verified: bool,
    pub stopped: bool,
    pub code: Option<&'a str>,
}

impl Person {
    fn sms_fields_mut(
        &mut self,
        kind: PhoneKind,
    ) -> (&mut Option<String>, &mut bool, &mut bool, &mut Option<String>) {
        match kind {
            PhoneKind::OnPlaya => (
                &mut self.sms_on_playa,
                &mut self.sms_on_playa_verified,
                &mut self.sms_on_playa_stopped,
                &mut self.sms_on_playa_code,
            ),
            PhoneKind::OffPlaya => (
                &mut self.sms_off_playa,
                &mut self.sms_off_playa_verified,
                &mut self.sms_off_playa_stopped,
                &mut self.sms_off_playa_code,
            ),
        }
    }

    /// Replace a number; a different number starts unverified with no code
    /// and no stop flag. Returns whether anything changed.
    pub fn replace_sms_number(&mut self, kind: PhoneKind, number: Option<String>) -> bool {
        let (current, verified, stopped, code) = self.sms_fields_mut(kind);
        if *current == number {
            return false;
        }
        *current = number;
        *verified = false;
        *stopped = false;
        *code = None;
        true
    }

    pub fn set_sms_code(&mut self, kind: PhoneKind, new_code: Option<String>) {
        let (_, _, _, code) = self.sms_fields_mut(kind);
        *code = new_code;
    }

    /// Mark a number verified and clear its pending code
    pub fn verify_sms_number(&mut self, kind: PhoneKind) {
        let (_, verified, _, code) = self.sms_fields_mut(kind);
        *verified = true;
        *code = None;
    }

    pub fn sms_number(&self, kind: PhoneKind) -> SmsNumber<'_> {
        match kind {
            PhoneKind::OnPlaya => SmsNumber {
                kind,
                number: self.sms_on_playa.as_deref().filter(|n| !n.is_empty()),
                verified: self.sms_on_playa_verified,
                stopped: self.sms_on_playa_stopped,
                code: self.sms_on_playa_code.as_deref(),
            },
            PhoneKind::OffPlaya => SmsNumber {
                kind,
                number: self.sms_off_playa.as_deref().filter(|n| !n.is_empty()),
                verified: self.sms_off_playa_verified,
                stopped: self.sms_off_playa_stopped,
                code: self.sms_off_playa_code.as_deref(),
            },
        }
    }
}

// ============================================================================
// Position / Slot / Timesheet Models
// ============================================================================

pub const TRAINING_POSITION_TYPE: &str = "training";

/// In-person base training every volunteer must pass each event
pub const BASE_TRAINING_POSITION_ID: i64 = 13;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Position {
    pub id: i64,
    pub title: String,
    pub active: bool,
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub position_type: String,
    pub training_position_id: Option<i64>,
    pub alpha: bool,
    pub requires_sandman_affidavit: bool,
    pub requires_burn_perimeter: bool,
    pub requires_motor_pool_agreement: bool,
    pub counts_as_burn_perimeter: bool,
}

impl Position {
    pub fn is_training(&self) -> bool {
        self.position_type.eq_ignore_ascii_case(TRAINING_POSITION_TYPE)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Slot {
    pub id: i64,
    pub position_id: i64,
    pub description: String,
    pub begins: DateTime<Utc>,
    pub ends: DateTime<Utc>,
    pub active: bool,
    pub max: i32,
}

/// Timesheet is one on-duty entry; open while `off_duty` is None
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Timesheet {
    pub id: i64,
    pub person_id: i64,
    pub position_id: i64,
    pub slot_id: Option<i64>,
    pub on_duty: DateTime<Utc>,
    pub off_duty: Option<DateTime<Utc>>,
}

impl Timesheet {
    pub fn is_open(&self) -> bool {
        self.off_duty.is_none()
    }
}

// ============================================================================
// Alert Models
// ============================================================================

text_enum! {
    /// Alert categories a person can set SMS/email preferences for
    pub enum AlertKind {
        Emergency => "emergency",
        Announcements => "announcements",
        OnShift => "on_shift",
        ShiftChange => "shift_change",
        ShiftRecruitment => "shift_recruitment",
        Alpha => "alpha",
        PositionTeam => "position_team",
    }
}

impl AlertKind {
    pub fn id(&self) -> i64 {
        match self {
            AlertKind::Emergency => 1,
            AlertKind::Announcements => 2,
            AlertKind::OnShift => 3,
            AlertKind::ShiftChange => 4,
            AlertKind::ShiftRecruitment => 5,
            AlertKind::Alpha => 6,
            AlertKind::PositionTeam => 7,
        }
    }

    pub fn from_id(id: i64) -> Option<Self> {
        Self::ALL.iter().copied().find(|kind| kind.id() == id)
    }

    pub fn title(&self) -> &'static str {
        match self {
            AlertKind::Emergency => "Emergency Broadcasts",
            AlertKind::Announcements => "Ranger Announcements",
            AlertKind::OnShift => "On Shift Notifications",
            AlertKind::ShiftChange => "Shift Changes",
            AlertKind::ShiftRecruitment => "Shift Recruitment",
            AlertKind::Alpha => "Alpha Shift Notifications",
            AlertKind::PositionTeam => "Team Announcements",
        }
    }

    /// On-playa alerts go to the on-playa number
    pub fn on_playa(&self) -> bool {
        matches!(
            self,
            AlertKind::Emergency | AlertKind::OnShift | AlertKind::Alpha
        )
    }

    /// Mandatory alerts ignore SMS/email opt-outs
    pub fn mandatory(&self) -> bool {
        matches!(self, AlertKind::Emergency)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AlertPreference {
    pub person_id: i64,
    pub alert_id: i64,
    pub use_sms: bool,
    pub use_email: bool,
}

// ============================================================================
// Broadcast Models
// ============================================================================

text_enum! {
    /// Kinds of broadcast the RBS can send
    pub enum BroadcastType {
        Announce => "announce",
        Alpha => "alpha",
        Emergency => "emergency",
        Onshift => "onshift",
        Position => "position",
        Recruit => "recruit",
        Slot => "slot",
        SlotEdit => "slot_edit",
    }
}

text_enum! {
    pub enum AddressType {
        Sms => "sms",
        Email => "email",
    }
}

text_enum! {
    pub enum Direction {
        Outbound => "outbound",
        Inbound => "inbound",
    }
}

text_enum! {
    /// Per-recipient delivery status
    pub enum MessageStatus {
        Queued => "queued",
        Sending => "sending",
        Sent => "sent",
        Delivered => "delivered",
        Undelivered => "undelivered",
        Failed => "failed",
        Bounced => "bounced",
        Blocked => "blocked",
        Received => "received",
        Stopped => "stopped",
        Invalid => "invalid",
    }
}

impl MessageStatus {
    /// Map a Twilio message status onto ours
    pub fn from_twilio(status: &str) -> Self {
        match status.to_ascii_lowercase().as_str() {
            "accepted" | "scheduled" | "queued" => MessageStatus::Queued,
            "sending" => MessageStatus::Sending,
            "sent" => MessageStatus::Sent,
            "delivered" | "read" => MessageStatus::Delivered,
            "undelivered" => MessageStatus::Undelivered,
            "receiving" | "received" => MessageStatus::Received,
            _ => MessageStatus::Failed,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, MessageStatus::Failed | MessageStatus::Undelivered)
    }

    /// Failures that will never succeed on retry
    pub fn is_final_failure(&self) -> bool {
        matches!(
            self,
            MessageStatus::Stopped
                | MessageStatus::Invalid
                | MessageStatus::Blocked
                | MessageStatus::Bounced
        )
    }
}

/// Broadcast is one RBS transmission
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Broadcast {
    pub id: i64,
    pub sender_id: i64,
    #[sqlx(rename = "type", try_from = "String")]
    #[serde(rename = "type")]
    pub broadcast_type: BroadcastType,
    pub alert_id: i64,
    pub position_id: Option<i64>,
    pub slot_id: Option<i64>,
    pub statuses: Vec<String>,
    pub sender_name: String,
    pub sms_message: Option<String>,
    pub email_subject: Option<String>,
    pub email_message: Option<String>,
    pub recipient_count: i32,
    pub sms_count: i32,
    pub email_count: i32,
    pub clubhouse_count: i32,
    pub sms_failed: i32,
    pub email_failed: i32,
    pub retry_count: i32,
    pub created_at: DateTime<Utc>,
}

/// Broadcast row before insert; counts are the planned deliveries
#[derive(Debug, Clone)]
pub struct NewBroadcast {
    pub sender_id: i64,
    pub broadcast_type: BroadcastType,
    pub alert_id: i64,
    pub position_id: Option<i64>,
    pub slot_id: Option<i64>,
    pub statuses: Vec<String>,
    pub sender_name: String,
    pub sms_message: Option<String>,
    pub email_subject: Option<String>,
    pub email_message: Option<String>,
    pub recipient_count: i32,
    pub sms_count: i32,
    pub email_count: i32,
    pub clubhouse_count: i32,
}

/// Per-recipient delivery log entry, also used for inbound SMS
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct BroadcastMessage {
    pub id: i64,
    pub broadcast_id: Option<i64>,
    pub person_id: Option<i64>,
    #[sqlx(try_from = "String")]
    pub direction: Direction,
    #[sqlx(try_from = "String")]
    pub address_type: AddressType,
    pub address: String,
    #[sqlx(try_from = "String")]
    pub status: MessageStatus,
    pub message: Option<String>,
    pub provider_sid: Option<String>,
    pub error: Option<String>,
    pub attempts: i32,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// New delivery log entry, before it has an id
#[derive(Debug, Clone)]
pub struct NewBroadcastMessage {
    pub broadcast_id: Option<i64>,
    pub person_id: Option<i64>,
    pub direction: Direction,
    pub address_type: AddressType,
    pub address: String,
    pub status: MessageStatus,
    pub message: Option<String>,
    pub provider_sid: Option<String>,
    pub error: Option<String>,
    pub next_retry_at: Option<DateTime<Utc>>,
}

/// Result of one delivery attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryUpdate {
    pub status: MessageStatus,
    pub provider_sid: Option<String>,
    pub error: Option<String>,
    pub next_retry_at: Option<DateTime<Utc>>,
}

/// Delivery log row joined with the recipient's callsign
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct MessageLogEntry {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub message: BroadcastMessage,
    pub callsign: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct MessageFilter {
    pub status: Option<MessageStatus>,
    pub channel: Option<AddressType>,
}

/// Message count per channel and status for one broadcast
#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct StatusCount {
    pub address_type: String,
    pub status: String,
    pub count: i64,
}

/// In-app ("Clubhouse") message
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PersonMessage {
    pub id: i64,
    pub person_id: i64,
    pub creator_person_id: i64,
    pub message_from: String,
    pub subject: String,
    pub body: String,
    pub broadcast_id: Option<i64>,
    pub delivered: bool,
    pub created_at: DateTime<Utc>,
}

/// In-app message content fanned out to many people
#[derive(Debug, Clone)]
pub struct NewPersonMessage {
    pub creator_person_id: i64,
    pub message_from: String,
    pub subject: String,
    pub body: String,
    pub broadcast_id: Option<i64>,
}

// ============================================================================
// Auth Models
// ============================================================================

pub const ROLE_ADMIN: &str = "admin";
pub const ROLE_MEGAPHONE: &str = "megaphone";
pub const ROLE_MEGAPHONE_EMERGENCY: &str = "megaphone_emergency";
pub const ROLE_TIMESHEET_MANAGEMENT: &str = "timesheet_management";

/// UserClaims represents JWT token claims
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserClaims {
    pub sub: i64,           // Person ID
    pub callsign: String,   // Callsign shown as message sender
    pub roles: Vec<String>, // Granted roles
    pub exp: i64,           // Expiration time (Unix timestamp)
    pub iat: i64,           // Issued at (Unix timestamp)
}

impl UserClaims {
    /// Admins implicitly hold every role
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role || r == ROLE_ADMIN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_person_status_round_trip_all() {
        for status in PersonStatus::ALL {
            let parsed: PersonStatus = status.to_string().parse().unwrap();
            assert_eq!(&parsed, status);
        }
        assert!("bogus".parse::<PersonStatus>().is_err());
    }

    #[test]
    fn test_twilio_status_mapping() {
        assert_eq!(MessageStatus::from_twilio("accepted"), MessageStatus::Queued);
        assert_eq!(MessageStatus::from_twilio("Delivered"), MessageStatus::Delivered);
        assert_eq!(MessageStatus::from_twilio("undelivered"), MessageStatus::Undelivered);
        assert_eq!(MessageStatus::from_twilio("canceled"), MessageStatus::Failed);
        assert_eq!(MessageStatus::from_twilio("whatever"), MessageStatus::Failed);
    }

    #[test]
    fn test_retryable_statuses() {
        assert!(MessageStatus::Failed.is_retryable());
        assert!(MessageStatus::Undelivered.is_retryable());
        assert!(!MessageStatus::Stopped.is_retryable());
        assert!(MessageStatus::Stopped.is_final_failure());
        assert!(!MessageStatus::Delivered.is_final_failure());
    }

    #[test]
    fn test_alert_ids_are_unique() {
        for kind in AlertKind::ALL {
            assert_eq!(AlertKind::from_id(kind.id()), Some(*kind));
        }
        assert_eq!(AlertKind::from_id(99), None);
        assert!(AlertKind::Emergency.mandatory());
        assert!(!AlertKind::Announcements.on_playa());
    }

    #[test]
    fn test_admin_implies_roles() {
        let claims = UserClaims {
            sub: 1,
            callsign: "Hubcap".to_string(),
            roles: vec![ROLE_ADMIN.to_string()],
            exp: 0,
            iat: 0,
        };
        assert!(claims.has_role(ROLE_MEGAPHONE_EMERGENCY));

        let claims = UserClaims {
            roles: vec![ROLE_MEGAPHONE.to_string()],
            ..claims
        };
        assert!(claims.has_role(ROLE_MEGAPHONE));
        assert!(!claims.has_role(ROLE_MEGAPHONE_EMERGENCY));
    }

    #[test]
    fn test_empty_number_is_absent() {
        let person = Person {
            id: 1,
            callsign: "Tumbleweed".to_string(),
            first_name: "T".to_string(),
            last_name: "W".to_string(),
            status: PersonStatus::Active,
            email: None,
            on_site: false,
            user_authorized: true,
            sms_on_playa: Some(String::new()),
            sms_off_playa: Some("+17755550100".to_string()),
            sms_on_playa_verified: false,
            sms_off_playa_verified: true,
            sms_on_playa_stopped: false,
            sms_off_playa_stopped: false,
            sms_on_playa_code: None,
            sms_off_playa_code: None,
        };
        assert_eq!(person.sms_number(PhoneKind::OnPlaya).number, None);
        assert_eq!(
            person.sms_number(PhoneKind::OffPlaya).number,
            Some("+17755550100")
        );
    }
}
