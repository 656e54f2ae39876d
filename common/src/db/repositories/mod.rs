// Repository layer for database operations

pub mod broadcast;
pub mod person;
pub mod position;
pub mod queries;
pub mod sms;
pub mod timesheet;

pub use broadcast::BroadcastRepository;
pub use person::PersonRepository;
pub use position::PositionRepository;
pub use sms::SmsRepository;
pub use timesheet::{OpenTimesheet, TimesheetRepository};
