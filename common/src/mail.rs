// Outbound email over SMTP

use crate::config::SmtpConfig;
use crate::errors::MailError;
use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::instrument;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub body: String,
    pub reply_to: Option<String>,
}

/// Anything that can deliver an email
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), MailError>;
}

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    enabled: bool,
}

impl SmtpMailer {
    pub fn new(config: &SmtpConfig) -> Result<Self, MailError> {
        let from_address = config
            .from_address
            .parse()
            .map_err(|_| MailError::InvalidAddress(config.from_address.clone()))?;
        let from = Mailbox::new(Some(config.from_name.clone()), from_address);

        let builder = if config.starttls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
                .map_err(|e| MailError::Transport(e.to_string()))?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
        };
        let mut builder = builder.port(config.port);
        if let Some(ref username) = config.username {
            builder = builder.credentials(Credentials::new(
                username.clone(),
                config.password.clone().unwrap_or_default(),
            ));
        }

        Ok(Self {
            transport: builder.build(),
            from,
            enabled: config.enabled,
        })
    }

    fn build_message(&self, email: &OutgoingEmail) -> Result<Message, MailError> {
        let to: Mailbox = email
            .to
            .trim()
            .parse()
            .map_err(|_| MailError::InvalidAddress(email.to.clone()))?;

        let mut builder = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(email.subject.as_str())
            .header(ContentType::TEXT_PLAIN);
        if let Some(ref reply_to) = email.reply_to {
            let reply_to: Mailbox = reply_to
                .parse()
                .map_err(|_| MailError::InvalidAddress(reply_to.clone()))?;
            builder = builder.reply_to(reply_to);
        }

        builder
            .body(email.body.clone())
            .map_err(|e| MailError::BuildFailed(e.to_string()))
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    #[instrument(skip(self, email), fields(subject = %email.subject))]
    async fn send(&self, email: &OutgoingEmail) -> Result<(), MailError> {
        if !self.enabled {
            return Err(MailError::Disabled);
        }

        let message = self.build_message(email)?;
        match self.transport.send(message).await {
            Ok(_) => Ok(()),
            Err(e) if e.is_permanent() => Err(MailError::Rejected(e.to_string())),
            Err(e) => Err(MailError::Transport(e.to_string())),
        }
    }
}

/// Email text for a broadcast: the message followed by a footer naming the
/// sender and the alert it was sent under
pub fn broadcast_email_body(message: &str, sender_name: &str, alert_title: &str) -> String {
    format!(
        "{}\n\n--\nSent by {} via the Ranger Broadcasting Service.\n\
You received this because you subscribed to \"{}\" alerts. \
Change your alert preferences in the Clubhouse.\n",
        message.trim_end(),
        sender_name,
        alert_title
    )
}
