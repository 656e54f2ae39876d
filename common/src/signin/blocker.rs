// Shift sign-in eligibility rules

use crate::db::repositories::OpenTimesheet;
use crate::models::{Person, PersonStatus, Position};
use serde::Serialize;

/// Statuses which may work a shift at all
pub const ALLOWED_STATUSES: &[PersonStatus] = &[
    PersonStatus::Active,
    PersonStatus::Alpha,
    PersonStatus::Inactive,
    PersonStatus::InactiveExtension,
    PersonStatus::Retired,
    PersonStatus::NonRanger,
    PersonStatus::Prospective,
];

/// Reasons a sign-in is refused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Blocker {
    StatusNotAllowed,
    PositionInactive,
    NotGranted,
    AlphaOnly,
    NotAlpha,
    Untrained,
    SandmanAffidavitUnsigned,
    NoBurnPerimeterExperience,
    MotorPoolAgreementUnsigned,
    AlreadyOnDuty,
}

impl Blocker {
    pub fn as_str(&self) -> &'static str {
        match self {
            Blocker::StatusNotAllowed => "status_not_allowed",
            Blocker::PositionInactive => "position_inactive",
            Blocker::NotGranted => "not_granted",
            Blocker::AlphaOnly => "alpha_only",
            Blocker::NotAlpha => "not_alpha",
            Blocker::Untrained => "untrained",
            Blocker::SandmanAffidavitUnsigned => "sandman_affidavit_unsigned",
            Blocker::NoBurnPerimeterExperience => "no_burn_perimeter_experience",
            Blocker::MotorPoolAgreementUnsigned => "motor_pool_agreement_unsigned",
            Blocker::AlreadyOnDuty => "already_on_duty",
        }
    }

    /// Whether a timesheet manager may override it
    pub fn can_force(&self) -> bool {
        !matches!(self, Blocker::StatusNotAllowed | Blocker::AlreadyOnDuty)
    }
}

impl std::fmt::Display for Blocker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Warning {
    /// No sign-up for a slot of the position around now
    NotSignedUp,
}

/// Everything the rules look at, loaded up front
#[derive(Debug, Clone)]
pub struct SignInContext {
    pub person: Person,
    pub position: Position,
    pub holds_position: bool,
    /// Passed the position's training this event, or none is required
    pub trained: bool,
    pub open_timesheet: Option<OpenTimesheet>,
    pub sandman_affidavit: bool,
    pub burn_perimeter_experience: bool,
    pub motor_pool_agreement: bool,
    pub signed_up: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct OnDuty {
    pub timesheet_id: i64,
    pub position_id: i64,
    pub position_title: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SignInCheck {
    pub blockers: Vec<Blocker>,
    pub warnings: Vec<Warning>,
    pub on_duty: Option<OnDuty>,
}

impl SignInCheck {
    pub fn allowed(&self) -> bool {
        self.blockers.is_empty()
    }

    pub fn blocker_names(&self) -> Vec<String> {
        self.blockers.iter().map(|b| b.to_string()).collect()
    }
}

pub struct SignInBlocker;

impl SignInBlocker {
    pub fn check(ctx: &SignInContext) -> SignInCheck {
        let person = &ctx.person;
        let position = &ctx.position;
        let mut blockers = Vec::new();

        if !ALLOWED_STATUSES.contains(&person.status) {
            blockers.push(Blocker::StatusNotAllowed);
        }
        if !position.active {
            blockers.push(Blocker::PositionInactive);
        }
        if !ctx.holds_position {
            blockers.push(Blocker::NotGranted);
        }

        let alpha_cohort = person.status.is_alpha_cohort();
        if alpha_cohort && !position.alpha {
            blockers.push(Blocker::AlphaOnly);
        } else if !alpha_cohort && position.alpha {
            blockers.push(Blocker::NotAlpha);
        }

        if !position.is_training() && !ctx.trained {
            blockers.push(Blocker::Untrained);
        }
        if position.requires_sandman_affidavit && !ctx.sandman_affidavit {
            blockers.push(Blocker::SandmanAffidavitUnsigned);
        }
        if position.requires_burn_perimeter && !ctx.burn_perimeter_experience {
            blockers.push(Blocker::NoBurnPerimeterExperience);
        }
        if position.requires_motor_pool_agreement && !ctx.motor_pool_agreement {
            blockers.push(Blocker::MotorPoolAgreementUnsigned);
        }
        if ctx.open_timesheet.is_some() {
            blockers.push(Blocker::AlreadyOnDuty);
        }

        let mut warnings = Vec::new();
        if !ctx.signed_up {
            warnings.push(Warning::NotSignedUp);
        }

        SignInCheck {
            blockers,
            warnings,
            on_duty: ctx.open_timesheet.as_ref().map(|open| OnDuty {
                timesheet_id: open.timesheet.id,
                position_id: open.timesheet.position_id,
                position_title: open.position_title.clone(),
            }),
        }
    }
}
