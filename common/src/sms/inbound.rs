// Inbound SMS parsing and TwiML replies

use rand::Rng;

/// What an inbound text asks for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundCommand {
    Stop,
    Start,
    Help,
    /// A 4 digit verification code
    Code(String),
    /// Anything else, kept verbatim
    Reply(String),
}

impl InboundCommand {
    /// Metric label
    pub fn label(&self) -> &'static str {
        match self {
            InboundCommand::Stop => "stop",
            InboundCommand::Start => "start",
            InboundCommand::Help => "help",
            InboundCommand::Code(_) => "code",
            InboundCommand::Reply(_) => "reply",
        }
    }
}

const STOP_WORDS: &[&str] = &["STOP", "STOPALL", "UNSUBSCRIBE", "CANCEL", "END", "QUIT"];
const START_WORDS: &[&str] = &["START", "YES", "UNSTOP"];
const HELP_WORDS: &[&str] = &["HELP", "INFO"];

pub const HELP_TEXT: &str = "Ranger Broadcasting Service: alerts from the Black Rock Rangers. \
Reply STOP to unsubscribe, START to resubscribe. Manage alerts in the Clubhouse.";

pub const CODE_ACCEPTED_TEXT: &str = "Thank you, your number has been verified.";

pub const CODE_REJECTED_TEXT: &str =
    "Sorry, that verification code was not recognized. Request a new code in the Clubhouse.";

pub fn parse_inbound(body: &str) -> InboundCommand {
    let trimmed = body.trim();
    let upper = trimmed.to_ascii_uppercase();

    if STOP_WORDS.contains(&upper.as_str()) {
        InboundCommand::Stop
    } else if START_WORDS.contains(&upper.as_str()) {
        InboundCommand::Start
    } else if HELP_WORDS.contains(&upper.as_str()) {
        InboundCommand::Help
    } else if trimmed.len() == 4 && trimmed.bytes().all(|b| b.is_ascii_digit()) {
        InboundCommand::Code(trimmed.to_string())
    } else {
        InboundCommand::Reply(trimmed.to_string())
    }
}

/// Random zero padded 4 digit code
pub fn generate_verification_code() -> String {
    let code: u32 = rand::thread_rng().gen_range(0..10_000);
    format!("{:04}", code)
}

fn escape_xml(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// TwiML document answering an inbound message; None sends no reply
pub fn twiml_response(message: Option<&str>) -> String {
    match message {
        Some(text) => format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?><Response><Message>{}</Message></Response>",
            escape_xml(text)
        ),
        None => "<?xml version=\"1.0\" encoding=\"UTF-8\"?><Response></Response>".to_string(),
    }
}
