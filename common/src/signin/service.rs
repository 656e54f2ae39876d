// Sign-in service: loads the rule context and opens / closes timesheets

use super::blocker::{SignInBlocker, SignInCheck, SignInContext};
use crate::db::repositories::{PersonRepository, PositionRepository, TimesheetRepository};
use crate::errors::{AuthError, DatabaseError, SignInError};
use crate::event::event_year;
use crate::models::{Timesheet, UserClaims, ROLE_TIMESHEET_MANAGEMENT};
use crate::telemetry::record_signin_blocked;
use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use tracing::instrument;

/// How far around now a slot sign-up counts as being for this shift
pub const SIGNUP_WINDOW_MINUTES: i64 = 60;

#[derive(Debug, Clone, Serialize)]
pub struct SignInOutcome {
    pub timesheet: Timesheet,
    pub check: SignInCheck,
    /// Blockers were overridden
    pub forced: bool,
}

/// Decide whether a checked sign-in may go ahead. Returns whether it was
/// forced past blockers.
pub fn authorize_sign_in(
    check: &SignInCheck,
    actor: &UserClaims,
    force: bool,
) -> Result<bool, SignInError> {
    if check.allowed() {
        return Ok(false);
    }
    if !force {
        return Err(SignInError::Blocked(check.blocker_names()));
    }
    if !actor.has_role(ROLE_TIMESHEET_MANAGEMENT) {
        return Err(AuthError::InsufficientPermissions(ROLE_TIMESHEET_MANAGEMENT.to_string()).into());
    }

    let hard: Vec<String> = check
        .blockers
        .iter()
        .filter(|b| !b.can_force())
        .map(|b| b.to_string())
        .collect();
    if !hard.is_empty() {
        return Err(SignInError::Blocked(hard));
    }
    Ok(true)
}

/// People may act on their own timesheet; anyone else needs timesheet management
pub fn ensure_can_act_for(actor: &UserClaims, person_id: i64) -> Result<(), SignInError> {
    if actor.sub == person_id || actor.has_role(ROLE_TIMESHEET_MANAGEMENT) {
        Ok(())
    } else {
        Err(AuthError::InsufficientPermissions(ROLE_TIMESHEET_MANAGEMENT.to_string()).into())
    }
}

#[derive(Clone)]
pub struct SignInService {
    people: PersonRepository,
    positions: PositionRepository,
    timesheets: TimesheetRepository,
    tz: Tz,
}

impl SignInService {
    pub fn new(
        people: PersonRepository,
        positions: PositionRepository,
        timesheets: TimesheetRepository,
        tz: Tz,
    ) -> Self {
        Self {
            people,
            positions,
            timesheets,
            tz,
        }
    }

    #[instrument(skip(self))]
    pub async fn load_context(
        &self,
        person_id: i64,
        position_id: i64,
        now: DateTime<Utc>,
    ) -> Result<SignInContext, SignInError> {
        let person = self
            .people
            .find_by_id(person_id)
            .await?
            .ok_or(SignInError::PersonNotFound(person_id))?;
        let position = self
            .positions
            .find_by_id(position_id)
            .await?
            .ok_or(SignInError::PositionNotFound(position_id))?;

        let year = event_year(now, self.tz);
        let holds_position = self.positions.holds_position(person_id, position_id).await?;
        let trained = match position.training_position_id {
            Some(training_id) if !position.is_training() => {
                self.positions
                    .passed_training(person_id, training_id, year)
                    .await?
            }
            _ => true,
        };
        let open_timesheet = self.timesheets.find_open(person_id).await?;
        let (sandman_affidavit, motor_pool_agreement) =
            self.positions.event_agreements(person_id, year).await?;
        let burn_perimeter_experience = if position.requires_burn_perimeter {
            self.positions
                .has_burn_perimeter_experience(person_id)
                .await?
        } else {
            false
        };
        let signed_up = self
            .positions
            .signed_up_near(
                person_id,
                position_id,
                now,
                Duration::minutes(SIGNUP_WINDOW_MINUTES),
            )
            .await?;

        Ok(SignInContext {
            person,
            position,
            holds_position,
            trained,
            open_timesheet,
            sandman_affidavit,
            burn_perimeter_experience,
            motor_pool_agreement,
            signed_up,
        })
    }

    pub async fn check(&self, person_id: i64, position_id: i64) -> Result<SignInCheck, SignInError> {
        let ctx = self.load_context(person_id, position_id, Utc::now()).await?;
        Ok(SignInBlocker::check(&ctx))
    }

    #[instrument(skip(self, actor), fields(actor = actor.sub))]
    pub async fn sign_in(
        &self,
        actor: &UserClaims,
        person_id: i64,
        position_id: i64,
        slot_id: Option<i64>,
        force: bool,
    ) -> Result<SignInOutcome, SignInError> {
        ensure_can_act_for(actor, person_id)?;

        let now = Utc::now();
        let ctx = self.load_context(person_id, position_id, now).await?;
        let check = SignInBlocker::check(&ctx);

        let forced = match authorize_sign_in(&check, actor, force) {
            Ok(forced) => forced,
            Err(err) => {
                for blocker in &check.blockers {
                    record_signin_blocked(blocker.as_str());
                }
                tracing::info!(
                    person_id = person_id,
                    position_id = position_id,
                    blockers = ?check.blocker_names(),
                    "Sign in refused"
                );
                return Err(err);
            }
        };
        if forced {
            tracing::warn!(
                person_id = person_id,
                position_id = position_id,
                blockers = ?check.blocker_names(),
                "Sign in forced past blockers"
            );
        }

        let timesheet = match self
            .timesheets
            .create(person_id, position_id, slot_id, now, actor.sub)
            .await
        {
            Ok(timesheet) => timesheet,
            Err(DatabaseError::DuplicateKey(_)) => {
                record_signin_blocked("already_on_duty");
                return Err(SignInError::Blocked(vec!["already_on_duty".to_string()]));
            }
            Err(e) => return Err(e.into()),
        };

        Ok(SignInOutcome {
            timesheet,
            check,
            forced,
        })
    }

    #[instrument(skip(self, actor), fields(actor = actor.sub))]
    pub async fn sign_out(
        &self,
        actor: &UserClaims,
        timesheet_id: i64,
    ) -> Result<Timesheet, SignInError> {
        let existing = self
            .timesheets
            .find_by_id(timesheet_id)
            .await?
            .ok_or(SignInError::TimesheetNotFound(timesheet_id))?;
        ensure_can_act_for(actor, existing.person_id)?;

        if !existing.is_open() {
            return Err(SignInError::AlreadySignedOut(timesheet_id));
        }

        self.timesheets
            .sign_out(timesheet_id, Utc::now())
            .await?
            .ok_or(SignInError::AlreadySignedOut(timesheet_id))
    }
}
