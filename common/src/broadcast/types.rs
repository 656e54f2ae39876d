// Broadcast type attribute table

use crate::models::{AlertKind, BroadcastType, PersonStatus};
use serde::Serialize;

/// How a broadcast type selects recipients and which knobs the sender gets
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BroadcastAttributes {
    pub broadcast_type: BroadcastType,
    pub alert: AlertKind,
    /// Sender may narrow the status list
    pub has_status: bool,
    /// Status list used when the sender does not pick one. Empty means the
    /// type does not filter on status at all.
    pub default_statuses: &'static [PersonStatus],
    pub has_position: bool,
    pub has_slot: bool,
    /// on-site / attending / trained filters are available
    pub has_restrictions: bool,
    /// Recipients are restricted to people on site, whatever the sender asks
    pub forces_on_site: bool,
    /// Only people currently on duty
    pub on_duty_only: bool,
    pub sms_only: bool,
    pub requires_emergency_role: bool,
}

const ANNOUNCE_STATUSES: &[PersonStatus] = &[
    PersonStatus::Active,
    PersonStatus::Inactive,
    PersonStatus::InactiveExtension,
    PersonStatus::Retired,
    PersonStatus::Alpha,
    PersonStatus::Prospective,
    PersonStatus::NonRanger,
];

const ALPHA_STATUSES: &[PersonStatus] = &[PersonStatus::Alpha, PersonStatus::Prospective];

const EMERGENCY_STATUSES: &[PersonStatus] = &[
    PersonStatus::Active,
    PersonStatus::Alpha,
    PersonStatus::Prospective,
    PersonStatus::NonRanger,
    PersonStatus::Inactive,
    PersonStatus::InactiveExtension,
    PersonStatus::Retired,
];

const POSITION_STATUSES: &[PersonStatus] = &[
    PersonStatus::Active,
    PersonStatus::Inactive,
    PersonStatus::InactiveExtension,
    PersonStatus::Retired,
    PersonStatus::NonRanger,
];

const RECRUIT_STATUSES: &[PersonStatus] = &[
    PersonStatus::Active,
    PersonStatus::InactiveExtension,
    PersonStatus::NonRanger,
];

impl BroadcastType {
    pub fn attributes(&self) -> BroadcastAttributes {
        let base = BroadcastAttributes {
            broadcast_type: *self,
            alert: AlertKind::Announcements,
            has_status: false,
            default_statuses: &[],
            has_position: false,
            has_slot: false,
            has_restrictions: false,
            forces_on_site: false,
            on_duty_only: false,
            sms_only: false,
            requires_emergency_role: false,
        };

        match self {
            BroadcastType::Announce => BroadcastAttributes {
                has_status: true,
                default_statuses: ANNOUNCE_STATUSES,
                has_restrictions: true,
                ..base
            },
            BroadcastType::Alpha => BroadcastAttributes {
                alert: AlertKind::Alpha,
                default_statuses: ALPHA_STATUSES,
                has_restrictions: true,
                ..base
            },
            BroadcastType::Emergency => BroadcastAttributes {
                alert: AlertKind::Emergency,
                default_statuses: EMERGENCY_STATUSES,
                forces_on_site: true,
                requires_emergency_role: true,
                ..base
            },
            BroadcastType::Onshift => BroadcastAttributes {
                alert: AlertKind::OnShift,
                on_duty_only: true,
                sms_only: true,
                ..base
            },
            BroadcastType::Position => BroadcastAttributes {
                alert: AlertKind::PositionTeam,
                has_status: true,
                default_statuses: POSITION_STATUSES,
                has_position: true,
                has_restrictions: true,
                ..base
            },
            BroadcastType::Recruit => BroadcastAttributes {
                alert: AlertKind::ShiftRecruitment,
                has_status: true,
                default_statuses: RECRUIT_STATUSES,
                has_position: true,
                has_restrictions: true,
                ..base
            },
            BroadcastType::Slot | BroadcastType::SlotEdit => BroadcastAttributes {
                alert: AlertKind::ShiftChange,
                has_slot: true,
                ..base
            },
        }
    }
}

/// Attribute rows for every broadcast type, in declaration order
pub fn all_attributes() -> Vec<BroadcastAttributes> {
    BroadcastType::ALL.iter().map(|t| t.attributes()).collect()
}
