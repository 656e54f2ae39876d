// Shift sign-in: eligibility checks and timesheet entries

pub mod blocker;
pub mod service;

pub use blocker::{Blocker, SignInBlocker, SignInCheck, SignInContext, Warning, ALLOWED_STATUSES};
pub use service::{SignInOutcome, SignInService};
