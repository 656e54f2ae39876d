// Twilio client behaviour against a mock Messages API

use common::config::TwilioConfig;
use common::errors::SmsError;
use common::models::MessageStatus;
use common::sms::{SmsSender, TwilioClient};
use wiremock::matchers::{body_string_contains, header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const ACCOUNT_SID: &str = "AC00000000000000000000000000000001";
const MESSAGES_PATH: &str = "/2010-04-01/Accounts/AC00000000000000000000000000000001/Messages.json";

fn config(server: &MockServer) -> TwilioConfig {
    TwilioConfig {
        enabled: true,
        account_sid: ACCOUNT_SID.to_string(),
        auth_token: "secret".to_string(),
        messaging_service_sid: Some("MG0001".to_string()),
        from_number: None,
        api_base_url: server.uri(),
        status_callback_url: Some("https://ranger.example.org/sms/status".to_string()),
        inbound_url: None,
        timeout_seconds: 5,
    }
}

#[tokio::test]
async fn test_send_posts_form_and_returns_sid() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(MESSAGES_PATH))
        .and(header_exists("authorization"))
        .and(body_string_contains("To=%2B17755550100"))
        .and(body_string_contains("MessagingServiceSid=MG0001"))
        .and(body_string_contains("StatusCallback="))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
            "sid": "SM123",
            "status": "queued"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = TwilioClient::new(config(&server)).unwrap();
    let receipt = client.send("(775) 555-0100", "Gate opens at 9").await.unwrap();

    assert_eq!(receipt.sid, "SM123");
    assert_eq!(receipt.status, MessageStatus::Queued);
    server.verify().await;
}

#[tokio::test]
async fn test_from_number_used_without_messaging_service() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(MESSAGES_PATH))
        .and(body_string_contains("From=%2B17755550199"))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
            "sid": "SM124",
            "status": "sent"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = config(&server);
    config.messaging_service_sid = None;
    config.from_number = Some("+17755550199".to_string());

    let receipt = TwilioClient::new(config)
        .unwrap()
        .send("+17755550100", "hello")
        .await
        .unwrap();
    assert_eq!(receipt.status, MessageStatus::Sent);
}

#[tokio::test]
async fn test_unsubscribed_recipient_is_permanent_failure() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(MESSAGES_PATH))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "code": 21610,
            "message": "Attempt to send to unsubscribed recipient",
            "status": 400
        })))
        .mount(&server)
        .await;

    let client = TwilioClient::new(config(&server)).unwrap();
    let err = client.send("+17755550100", "hello").await.unwrap_err();

    assert!(matches!(err, SmsError::Provider { code: 21610, .. }));
    assert!(err.is_permanent());
}

#[tokio::test]
async fn test_server_error_is_retryable() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(MESSAGES_PATH))
        .respond_with(ResponseTemplate::new(503).set_body_string("upstream unavailable"))
        .mount(&server)
        .await;

    let client = TwilioClient::new(config(&server)).unwrap();
    let err = client.send("+17755550100", "hello").await.unwrap_err();

    assert!(matches!(err, SmsError::RequestFailed(_)));
    assert!(!err.is_permanent());
}

#[tokio::test]
async fn test_invalid_number_never_reaches_twilio() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&server)
        .await;

    let client = TwilioClient::new(config(&server)).unwrap();
    let err = client.send("555-0100", "hello").await.unwrap_err();

    assert!(matches!(err, SmsError::InvalidNumber(_)));
    assert!(err.is_permanent());
    server.verify().await;
}

#[tokio::test]
async fn test_disabled_client_does_not_call_out() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&server)
        .await;

    let mut config = config(&server);
    config.enabled = false;

    let err = TwilioClient::new(config)
        .unwrap()
        .send("+17755550100", "hello")
        .await
        .unwrap_err();
    assert!(matches!(err, SmsError::Disabled));
    server.verify().await;
}
