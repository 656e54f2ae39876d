// Property-based tests for request payloads accepted by the API

use chrono::Duration;
use common::auth::{bearer_token, JwtService};
use common::broadcast::{validate, BroadcastRequest, SMS_MAX_LENGTH};
use common::errors::{AuthError, BroadcastError, ValidationError};
use common::models::{UserClaims, ROLE_MEGAPHONE};
use common::signin::Blocker;
use proptest::prelude::*;
use serde_json::json;

fn sender(roles: &[&str]) -> UserClaims {
    UserClaims {
        sub: 7,
        callsign: "Hubcap".to_string(),
        roles: roles.iter().map(|r| r.to_string()).collect(),
        exp: 0,
        iat: 0,
    }
}

fn transmit_body(message: &str) -> BroadcastRequest {
    serde_json::from_value(json!({
        "type": "announce",
        "send_sms": true,
        "sms_message": message,
    }))
    .unwrap()
}

proptest! {
    /// Announcements up to the SMS limit are accepted
    #[test]
    fn property_sms_within_limit_accepted(message in "[A-Za-z0-9 .,!]{1,140}") {
        prop_assume!(!message.trim().is_empty());
        let validated = validate(&transmit_body(&message), &sender(&[ROLE_MEGAPHONE]));
        prop_assert!(validated.is_ok());
        prop_assert_eq!(validated.unwrap().sms_message, Some(message.trim().to_string()));
    }

    /// Anything longer than the SMS limit is rejected before a broadcast is created
    #[test]
    fn property_sms_over_limit_rejected(extra in 1usize..200) {
        let message = "x".repeat(SMS_MAX_LENGTH + extra);
        let result = validate(&transmit_body(&message), &sender(&[ROLE_MEGAPHONE]));
        let rejected = matches!(
            result,
            Err(BroadcastError::Validation(ValidationError::InvalidFieldValue { .. }))
        );
        prop_assert!(rejected);
    }

    /// Senders without the megaphone role never get past validation
    #[test]
    fn property_megaphone_required(
        roles in prop::collection::vec(
            prop::sample::select(vec!["timesheet_management", "vc", "mentor", "trainer"]),
            0..4,
        ),
        message in "[a-z ]{1,40}",
    ) {
        let result = validate(&transmit_body(&message), &sender(&roles));
        prop_assert!(matches!(
            result,
            Err(BroadcastError::Auth(AuthError::InsufficientPermissions(_)))
        ));
    }

    /// A token issued for a person decodes to the same identity from an
    /// Authorization header
    #[test]
    fn property_bearer_token_identity(
        person_id in 1i64..1_000_000,
        callsign in "[A-Z][a-z]{2,12}",
        megaphone in any::<bool>(),
    ) {
        let jwt = JwtService::new("api-test-secret");
        let roles = if megaphone { vec![ROLE_MEGAPHONE.to_string()] } else { Vec::new() };
        let token = jwt
            .encode_token(person_id, &callsign, roles.clone(), Duration::minutes(30))
            .unwrap();
        let header = format!("Bearer {}", token);

        let claims = jwt.decode_token(bearer_token(&header).unwrap()).unwrap();
        prop_assert_eq!(claims.sub, person_id);
        prop_assert_eq!(claims.callsign, callsign);
        prop_assert_eq!(claims.roles, roles);
    }
}

#[test]
fn test_unknown_broadcast_type_rejected_at_parse() {
    let parsed = serde_json::from_value::<BroadcastRequest>(json!({
        "type": "carrier_pigeon",
        "send_sms": true,
        "sms_message": "coo"
    }));
    assert!(parsed.is_err());
}

#[test]
fn test_blockers_serialize_as_snake_case_names() {
    let body = serde_json::to_value(vec![Blocker::Untrained, Blocker::AlreadyOnDuty]).unwrap();
    assert_eq!(body, json!(["untrained", "already_on_duty"]));
}
