// SMS delivery, Twilio webhooks and number verification

pub mod inbound;
pub mod service;
pub mod store;
pub mod twilio;

pub use inbound::{generate_verification_code, parse_inbound, twiml_response, InboundCommand};
pub use service::SmsService;
pub use store::SmsStore;
pub use twilio::{twilio_signature, validate_twilio_signature, TwilioClient};

use crate::errors::{SmsError, TWILIO_UNSUBSCRIBED};
use crate::models::MessageStatus;
use async_trait::async_trait;

/// Provider acknowledgement for an accepted message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmsReceipt {
    pub sid: String,
    pub status: MessageStatus,
}

/// Anything that can deliver a text message
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SmsSender: Send + Sync {
    async fn send(&self, to: &str, body: &str) -> Result<SmsReceipt, SmsError>;
}

/// Final status for a provider error code that will never succeed
pub fn permanent_status(code: i64) -> Option<MessageStatus> {
    let provider_error = SmsError::Provider {
        code,
        message: String::new(),
    };
    if !provider_error.is_permanent() {
        return None;
    }
    if code == TWILIO_UNSUBSCRIBED {
        Some(MessageStatus::Stopped)
    } else {
        Some(MessageStatus::Invalid)
    }
}
