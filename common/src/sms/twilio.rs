// Twilio REST client and webhook signature validation

use super::{SmsReceipt, SmsSender};
use crate::config::TwilioConfig;
use crate::errors::SmsError;
use crate::models::MessageStatus;
use crate::phone::{normalize_phone, redact};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::Deserialize;
use sha1::Sha1;
use std::collections::HashMap;
use std::time::Duration;
use tracing::instrument;

type HmacSha1 = Hmac<Sha1>;

#[derive(Debug, Deserialize)]
struct MessageResource {
    sid: String,
    status: String,
}

#[derive(Debug, Deserialize)]
struct ErrorResource {
    code: Option<i64>,
    message: String,
}

/// TwilioClient sends messages through the Twilio Messages API
pub struct TwilioClient {
    client: Client,
    config: TwilioConfig,
}

impl TwilioClient {
    pub fn new(config: TwilioConfig) -> Result<Self, SmsError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| SmsError::RequestFailed(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    fn messages_url(&self) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.config.api_base_url.trim_end_matches('/'),
            self.config.account_sid
        )
    }
}

#[async_trait]
impl SmsSender for TwilioClient {
    #[instrument(skip(self, body), fields(to = %redact(to)))]
    async fn send(&self, to: &str, body: &str) -> Result<SmsReceipt, SmsError> {
        if !self.config.enabled {
            return Err(SmsError::Disabled);
        }

        let to = normalize_phone(to).ok_or_else(|| SmsError::InvalidNumber(redact(to)))?;

        let mut form: Vec<(&str, &str)> = vec![("To", to.as_str()), ("Body", body)];
        if let Some(ref service_sid) = self.config.messaging_service_sid {
            form.push(("MessagingServiceSid", service_sid));
        } else if let Some(ref from) = self.config.from_number {
            form.push(("From", from));
        }
        if let Some(ref callback) = self.config.status_callback_url {
            form.push(("StatusCallback", callback));
        }

        let response = self
            .client
            .post(self.messages_url())
            .basic_auth(&self.config.account_sid, Some(&self.config.auth_token))
            .form(&form)
            .send()
            .await
            .map_err(|e| SmsError::RequestFailed(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| SmsError::RequestFailed(e.to_string()))?;

        if status.is_success() {
            let message: MessageResource = serde_json::from_str(&text)
                .map_err(|e| SmsError::InvalidResponse(e.to_string()))?;
            tracing::debug!(sid = %message.sid, status = %message.status, "Twilio accepted message");
            return Ok(SmsReceipt {
                sid: message.sid,
                status: MessageStatus::from_twilio(&message.status),
            });
        }

        match serde_json::from_str::<ErrorResource>(&text) {
            Ok(error) => {
                let code = error.code.unwrap_or_else(|| i64::from(status.as_u16()));
                tracing::warn!(code = code, message = %error.message, "Twilio rejected message");
                Err(SmsError::Provider {
                    code,
                    message: error.message,
                })
            }
            Err(_) => Err(SmsError::RequestFailed(format!("HTTP {}: {}", status, text))),
        }
    }
}

fn signed_mac(auth_token: &str, url: &str, params: &HashMap<String, String>) -> Option<HmacSha1> {
    let mut keys: Vec<&String> = params.keys().collect();
    keys.sort();

    let mut mac = HmacSha1::new_from_slice(auth_token.as_bytes()).ok()?;
    mac.update(url.as_bytes());
    for key in keys {
        mac.update(key.as_bytes());
        mac.update(params[key].as_bytes());
    }
    Some(mac)
}

/// Expected X-Twilio-Signature for a form POST to `url`
pub fn twilio_signature(auth_token: &str, url: &str, params: &HashMap<String, String>) -> String {
    signed_mac(auth_token, url, params)
        .map(|mac| BASE64.encode(mac.finalize().into_bytes()))
        .unwrap_or_default()
}

/// Constant time check of an X-Twilio-Signature header
pub fn validate_twilio_signature(
    auth_token: &str,
    url: &str,
    params: &HashMap<String, String>,
    signature: &str,
) -> bool {
    let Ok(provided) = BASE64.decode(signature.trim()) else {
        return false;
    };
    match signed_mac(auth_token, url, params) {
        Some(mac) => mac.verify_slice(&provided).is_ok(),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> HashMap<String, String> {
        HashMap::from([
            ("CallSid".to_string(), "CA1234567890ABCDE".to_string()),
            ("Caller".to_string(), "+12349013030".to_string()),
            ("Digits".to_string(), "1234".to_string()),
            ("From".to_string(), "+12349013030".to_string()),
            ("To".to_string(), "+18005551212".to_string()),
        ])
    }

    #[test]
    fn test_signature_matches_known_value() {
        let url = "https://example.com/myapp.php?foo=1&bar=2";
        let signature = twilio_signature("12345", url, &params());
        assert_eq!(signature, "vNe7KK2kJwCsxc9K3OLkkKB3qqI=");
        assert!(validate_twilio_signature("12345", url, &params(), &signature));
    }

    #[test]
    fn test_signature_rejects_tampering() {
        let url = "https://example.com/sms/inbound";
        let signature = twilio_signature("secret", url, &params());

        let mut tampered = params();
        tampered.insert("Digits".to_string(), "9999".to_string());
        assert!(!validate_twilio_signature("secret", url, &tampered, &signature));
        assert!(!validate_twilio_signature("other", url, &params(), &signature));
        assert!(!validate_twilio_signature("secret", url, &params(), "not base64!"));
    }

    #[tokio::test]
    async fn test_disabled_client_refuses_to_send() {
        let client = TwilioClient::new(crate::config::Settings::default().twilio).unwrap();
        let err = client.send("+17755550100", "hi").await.unwrap_err();
        assert!(matches!(err, SmsError::Disabled));
    }
}
