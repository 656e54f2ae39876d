// Ranger Broadcasting Service: targeted SMS, email and in-app messages

pub mod log;
pub mod plan;
pub mod recipients;
pub mod request;
pub mod service;
pub mod store;
pub mod types;

pub use plan::{plan_delivery, Channels, DeliveryPlan, Recipient, SkipReason, Skipped};
pub use recipients::{Candidate, CandidateQuery, RecipientFilter};
pub use request::{validate, BroadcastRequest, ValidatedBroadcast, SMS_MAX_LENGTH};
pub use service::{
    BroadcastDetail, BroadcastPreview, BroadcastService, BroadcastSummary, RetryReport,
};
pub use store::BroadcastStore;
pub use types::{all_attributes, BroadcastAttributes};
