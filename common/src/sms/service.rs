// SMS service: inbound commands, delivery callbacks and number verification

use super::inbound::{
    generate_verification_code, parse_inbound, InboundCommand, CODE_ACCEPTED_TEXT,
    CODE_REJECTED_TEXT, HELP_TEXT,
};
use super::store::SmsStore;
use super::{permanent_status, SmsSender};
use crate::config::BroadcastConfig;
use crate::errors::{SmsServiceError, ValidationError, TWILIO_UNSUBSCRIBED};
use crate::models::{
    AddressType, DeliveryUpdate, Direction, MessageStatus, NewBroadcastMessage, Person, PhoneKind,
};
use crate::phone::{normalize_phone, redact};
use crate::rate_limit::SendLimiter;
use crate::retry::RetryStrategy;
use crate::telemetry::record_inbound_sms;
use chrono::Utc;
use std::sync::Arc;
use tracing::instrument;

const BOTH_KINDS: [PhoneKind; 2] = [PhoneKind::OnPlaya, PhoneKind::OffPlaya];

fn other_kind(kind: PhoneKind) -> PhoneKind {
    match kind {
        PhoneKind::OnPlaya => PhoneKind::OffPlaya,
        PhoneKind::OffPlaya => PhoneKind::OnPlaya,
    }
}

/// The other number when it is the same phone as `kind`'s
fn shared_kind(person: &Person, kind: PhoneKind) -> Option<PhoneKind> {
    let other = other_kind(kind);
    match (person.sms_number(kind).number, person.sms_number(other).number) {
        (Some(a), Some(b)) if a == b => Some(other),
        _ => None,
    }
}

/// Verify every number equal to `number` whose pending code matches.
/// Returns whether anything was verified.
pub fn apply_inbound_code(person: &mut Person, number: &str, code: &str) -> bool {
    let matched: Vec<PhoneKind> = BOTH_KINDS
        .into_iter()
        .filter(|kind| {
            let phone = person.sms_number(*kind);
            phone.number == Some(number) && phone.code == Some(code)
        })
        .collect();

    for kind in &matched {
        person.verify_sms_number(*kind);
        if let Some(other) = shared_kind(person, *kind) {
            person.verify_sms_number(other);
        }
    }
    !matched.is_empty()
}

/// Check a code typed into the Clubhouse against the pending one
pub fn confirm_person_code(person: &mut Person, kind: PhoneKind, code: &str) -> bool {
    let code = code.trim();
    if code.is_empty() || person.sms_number(kind).code != Some(code) {
        return false;
    }
    person.verify_sms_number(kind);
    if let Some(other) = shared_kind(person, kind) {
        person.verify_sms_number(other);
    }
    true
}

/// Blank clears the number; anything else must normalize
pub fn parse_number_field(field: &str, value: Option<&str>) -> Result<Option<String>, ValidationError> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(raw) => normalize_phone(raw)
            .map(Some)
            .ok_or_else(|| ValidationError::invalid(field, "not a valid phone number")),
    }
}

pub struct SmsService {
    store: Arc<dyn SmsStore>,
    sender: Arc<dyn SmsSender>,
    limiter: Arc<dyn SendLimiter>,
    retry: Arc<dyn RetryStrategy>,
    config: BroadcastConfig,
}

impl SmsService {
    pub fn new(
        store: Arc<dyn SmsStore>,
        sender: Arc<dyn SmsSender>,
        limiter: Arc<dyn SendLimiter>,
        retry: Arc<dyn RetryStrategy>,
        config: BroadcastConfig,
    ) -> Self {
        Self {
            store,
            sender,
            limiter,
            retry,
            config,
        }
    }

    /// Handle an inbound text; returns the reply to send back, if any
    #[instrument(skip(self, body), fields(from = %redact(from)))]
    pub async fn handle_inbound(
        &self,
        from: &str,
        body: &str,
    ) -> Result<Option<String>, SmsServiceError> {
        let number = normalize_phone(from).unwrap_or_else(|| from.trim().to_string());
        let people = self.store.find_people_by_number(&number).await?;
        let command = parse_inbound(body);
        record_inbound_sms(command.label());

        let log_for = |person_id: Option<i64>| NewBroadcastMessage {
            broadcast_id: None,
            person_id,
            direction: Direction::Inbound,
            address_type: AddressType::Sms,
            address: number.clone(),
            status: MessageStatus::Received,
            message: Some(body.to_string()),
            provider_sid: None,
            error: None,
            next_retry_at: None,
        };
        if people.is_empty() {
            self.store.insert_message(&log_for(None)).await?;
        }
        for person in &people {
            self.store.insert_message(&log_for(Some(person.id))).await?;
        }

        tracing::info!(
            command = command.label(),
            people = people.len(),
            "Received inbound SMS"
        );

        match command {
            InboundCommand::Stop => {
                self.store.set_stopped_by_number(&number, true).await?;
                Ok(None)
            }
            InboundCommand::Start => {
                self.store.set_stopped_by_number(&number, false).await?;
                Ok(None)
            }
            InboundCommand::Help => Ok(Some(HELP_TEXT.to_string())),
            InboundCommand::Code(code) => {
                if people.is_empty() {
                    return Ok(None);
                }
                let mut verified = false;
                for mut person in people {
                    if apply_inbound_code(&mut person, &number, &code) {
                        self.store.save_sms_state(&person).await?;
                        tracing::info!(person_id = person.id, "Verified SMS number by reply");
                        verified = true;
                    }
                }
                let reply = if verified {
                    CODE_ACCEPTED_TEXT
                } else {
                    CODE_REJECTED_TEXT
                };
                Ok(Some(reply.to_string()))
            }
            InboundCommand::Reply(_) => Ok(None),
        }
    }

    /// Apply a Twilio delivery status callback
    #[instrument(skip(self))]
    pub async fn handle_status(
        &self,
        provider_sid: &str,
        status: &str,
        error_code: Option<i64>,
    ) -> Result<(), SmsServiceError> {
        let Some(message) = self.store.find_message_by_sid(provider_sid).await? else {
            tracing::warn!(sid = %provider_sid, "Status callback for unknown message");
            return Ok(());
        };

        let mut status = MessageStatus::from_twilio(status);
        let mut next_retry_at = None;
        if status.is_retryable() {
            match error_code.and_then(permanent_status) {
                Some(final_status) => status = final_status,
                None => {
                    next_retry_at = self
                        .retry
                        .next_retry_at(message.attempts.max(0) as u32, Utc::now())
                }
            }
        }

        let update = DeliveryUpdate {
            status,
            provider_sid: None,
            error: error_code.map(|code| format!("Twilio error {}", code)),
            next_retry_at,
        };
        self.store.update_status(message.id, &update).await?;

        if error_code == Some(TWILIO_UNSUBSCRIBED) {
            self.store
                .set_stopped_by_number(&message.address, true)
                .await?;
        }
        if let Some(broadcast_id) = message.broadcast_id {
            self.store.refresh_counts(broadcast_id).await?;
        }

        tracing::debug!(message_id = message.id, status = %status, "Applied status callback");
        Ok(())
    }

    async fn load(&self, person_id: i64) -> Result<Person, SmsServiceError> {
        self.store
            .find_person(person_id)
            .await?
            .ok_or(SmsServiceError::PersonNotFound(person_id))
    }

    /// Text a fresh verification code to one of the person's numbers
    #[instrument(skip(self))]
    pub async fn send_code(&self, person_id: i64, kind: PhoneKind) -> Result<(), SmsServiceError> {
        let mut person = self.load(person_id).await?;
        let number = person
            .sms_number(kind)
            .number
            .map(str::to_string)
            .ok_or_else(|| ValidationError::MissingField(format!("sms_{}", kind)))?;

        let allowed = self
            .limiter
            .check_rate_limit(
                &person_id.to_string(),
                self.config.verification_code_max_sends,
                self.config.verification_code_window_seconds,
            )
            .await?;
        if !allowed {
            return Err(SmsServiceError::RateLimited);
        }

        let code = generate_verification_code();
        person.set_sms_code(kind, Some(code.clone()));
        if let Some(other) = shared_kind(&person, kind) {
            person.set_sms_code(other, Some(code.clone()));
        }
        self.store.save_sms_state(&person).await?;

        let body = format!(
            "Your Ranger verification code is {}. Reply with it or enter it in the Clubhouse.",
            code
        );
        self.sender.send(&number, &body).await?;

        tracing::info!(person_id = person_id, kind = %kind, "Sent verification code");
        Ok(())
    }

    #[instrument(skip(self, code))]
    pub async fn confirm_code(
        &self,
        person_id: i64,
        kind: PhoneKind,
        code: &str,
    ) -> Result<Person, SmsServiceError> {
        let mut person = self.load(person_id).await?;
        if !confirm_person_code(&mut person, kind, code) {
            return Err(SmsServiceError::CodeMismatch);
        }
        self.store.save_sms_state(&person).await?;

        // A verified person may request codes again right away for the other number
        if let Err(e) = self.limiter.reset(&person_id.to_string()).await {
            tracing::warn!(person_id = person_id, error = %e, "Failed to reset code send limit");
        }

        tracing::info!(person_id = person_id, kind = %kind, "Verified SMS number");
        Ok(person)
    }

    /// Replace both numbers; each changed number restarts verification
    #[instrument(skip(self, on_playa, off_playa))]
    pub async fn update_numbers(
        &self,
        person_id: i64,
        on_playa: Option<&str>,
        off_playa: Option<&str>,
    ) -> Result<Person, SmsServiceError> {
        let on_playa = parse_number_field("sms_on_playa", on_playa)?;
        let off_playa = parse_number_field("sms_off_playa", off_playa)?;

        let mut person = self.load(person_id).await?;
        let changed_on = person.replace_sms_number(PhoneKind::OnPlaya, on_playa);
        let changed_off = person.replace_sms_number(PhoneKind::OffPlaya, off_playa);

        if changed_on || changed_off {
            self.store.save_sms_state(&person).await?;
            tracing::info!(
                person_id = person_id,
                on_playa_changed = changed_on,
                off_playa_changed = changed_off,
                "Updated SMS numbers"
            );
        }
        Ok(person)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::DatabaseError;
    use crate::models::{BroadcastMessage, PersonStatus};
    use crate::rate_limit::MockSendLimiter;
    use crate::retry::FixedDelay;
    use crate::sms::{MockSmsSender, SmsReceipt};
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeSmsStore {
        people: Mutex<Vec<Person>>,
        sent: Vec<BroadcastMessage>,
        logged: Mutex<Vec<NewBroadcastMessage>>,
        saved: Mutex<Vec<Person>>,
        stopped: Mutex<Vec<(String, bool)>>,
        updates: Mutex<Vec<(i64, DeliveryUpdate)>>,
        refreshed: Mutex<Vec<i64>>,
    }

    impl FakeSmsStore {
        fn with_person(person: Person) -> Self {
            Self {
                people: Mutex::new(vec![person]),
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl SmsStore for FakeSmsStore {
        async fn find_person(&self, id: i64) -> Result<Option<Person>, DatabaseError> {
            Ok(self.people.lock().unwrap().iter().find(|p| p.id == id).cloned())
        }

        async fn find_people_by_number(&self, number: &str) -> Result<Vec<Person>, DatabaseError> {
            Ok(self
                .people
                .lock()
                .unwrap()
                .iter()
                .filter(|p| {
                    p.sms_on_playa.as_deref() == Some(number)
                        || p.sms_off_playa.as_deref() == Some(number)
                })
                .cloned()
                .collect())
        }

        async fn save_sms_state(&self, person: &Person) -> Result<(), DatabaseError> {
            self.saved.lock().unwrap().push(person.clone());
            Ok(())
        }

        async fn set_stopped_by_number(
            &self,
            number: &str,
            stopped: bool,
        ) -> Result<u64, DatabaseError> {
            self.stopped
                .lock()
                .unwrap()
                .push((number.to_string(), stopped));
            Ok(1)
        }

        async fn insert_message(
            &self,
            message: &NewBroadcastMessage,
        ) -> Result<i64, DatabaseError> {
            let mut logged = self.logged.lock().unwrap();
            logged.push(message.clone());
            Ok(logged.len() as i64)
        }

        async fn find_message_by_sid(
            &self,
            provider_sid: &str,
        ) -> Result<Option<BroadcastMessage>, DatabaseError> {
            Ok(self
                .sent
                .iter()
                .find(|m| m.provider_sid.as_deref() == Some(provider_sid))
                .cloned())
        }

        async fn update_status(
            &self,
            message_id: i64,
            update: &DeliveryUpdate,
        ) -> Result<(), DatabaseError> {
            self.updates
                .lock()
                .unwrap()
                .push((message_id, update.clone()));
            Ok(())
        }

        async fn refresh_counts(&self, broadcast_id: i64) -> Result<(), DatabaseError> {
            self.refreshed.lock().unwrap().push(broadcast_id);
            Ok(())
        }
    }

    fn service(
        store: Arc<FakeSmsStore>,
        sender: MockSmsSender,
        limiter: MockSendLimiter,
    ) -> SmsService {
        SmsService::new(
            store,
            Arc::new(sender),
            Arc::new(limiter),
            Arc::new(FixedDelay::new(std::time::Duration::from_secs(60), 3)),
            crate::config::Settings::default().broadcast,
        )
    }

    fn sent_message(sid: &str) -> BroadcastMessage {
        let now = Utc::now();
        BroadcastMessage {
            id: 5,
            broadcast_id: Some(9),
            person_id: Some(1),
            direction: Direction::Outbound,
            address_type: AddressType::Sms,
            address: "+17755550100".to_string(),
            status: MessageStatus::Sent,
            message: Some("Gate opens at 9".to_string()),
            provider_sid: Some(sid.to_string()),
            error: None,
            attempts: 1,
            next_retry_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn person() -> Person {
        Person {
            id: 1,
            callsign: "Tumbleweed".to_string(),
            first_name: "T".to_string(),
            last_name: "W".to_string(),
            status: PersonStatus::Active,
            email: None,
            on_site: false,
            user_authorized: true,
            sms_on_playa: Some("+17755550100".to_string()),
            sms_off_playa: Some("+14155550199".to_string()),
            sms_on_playa_verified: false,
            sms_off_playa_verified: false,
            sms_on_playa_stopped: false,
            sms_off_playa_stopped: false,
            sms_on_playa_code: Some("1234".to_string()),
            sms_off_playa_code: Some("9876".to_string()),
        }
    }

    #[test]
    fn test_inbound_code_verifies_matching_number_only() {
        let mut p = person();
        assert!(apply_inbound_code(&mut p, "+17755550100", "1234"));
        assert!(p.sms_on_playa_verified);
        assert!(p.sms_on_playa_code.is_none());
        assert!(!p.sms_off_playa_verified);
    }

    #[test]
    fn test_inbound_code_from_other_number_rejected() {
        let mut p = person();
        assert!(!apply_inbound_code(&mut p, "+14155550199", "1234"));
        assert!(!p.sms_on_playa_verified);
    }

    #[test]
    fn test_shared_number_verifies_both() {
        let mut p = person();
        p.sms_off_playa = p.sms_on_playa.clone();
        p.sms_off_playa_code = None;
        assert!(confirm_person_code(&mut p, PhoneKind::OnPlaya, " 1234 "));
        assert!(p.sms_on_playa_verified);
        assert!(p.sms_off_playa_verified);
    }

    #[test]
    fn test_confirm_rejects_wrong_code() {
        let mut p = person();
        assert!(!confirm_person_code(&mut p, PhoneKind::OffPlaya, "1234"));
        assert!(!confirm_person_code(&mut p, PhoneKind::OffPlaya, ""));
        assert!(confirm_person_code(&mut p, PhoneKind::OffPlaya, "9876"));
    }

    #[test]
    fn test_changed_number_resets_state() {
        let mut p = person();
        p.sms_off_playa_verified = true;
        p.sms_off_playa_stopped = true;

        assert!(!p.replace_sms_number(PhoneKind::OffPlaya, Some("+14155550199".to_string())));
        assert!(p.sms_off_playa_verified);

        assert!(p.replace_sms_number(PhoneKind::OffPlaya, Some("+14155550000".to_string())));
        assert!(!p.sms_off_playa_verified);
        assert!(!p.sms_off_playa_stopped);
        assert!(p.sms_off_playa_code.is_none());
    }

    #[test]
    fn test_parse_number_field() {
        assert_eq!(parse_number_field("sms_on_playa", None).unwrap(), None);
        assert_eq!(parse_number_field("sms_on_playa", Some("  ")).unwrap(), None);
        assert_eq!(
            parse_number_field("sms_on_playa", Some("(775) 555-0100")).unwrap(),
            Some("+17755550100".to_string())
        );
        assert!(parse_number_field("sms_on_playa", Some("555-0100")).is_err());
    }

    #[tokio::test]
    async fn test_stop_and_start_toggle_number() {
        let store = Arc::new(FakeSmsStore::with_person(person()));
        let svc = service(store.clone(), MockSmsSender::new(), MockSendLimiter::new());

        let reply = svc.handle_inbound("(775) 555-0100", " stop ").await.unwrap();
        assert_eq!(reply, None);
        let reply = svc.handle_inbound("+17755550100", "START").await.unwrap();
        assert_eq!(reply, None);

        assert_eq!(
            *store.stopped.lock().unwrap(),
            vec![
                ("+17755550100".to_string(), true),
                ("+17755550100".to_string(), false),
            ]
        );
        let logged = store.logged.lock().unwrap();
        assert_eq!(logged.len(), 2);
        assert!(logged.iter().all(|m| m.person_id == Some(1)
            && m.direction == Direction::Inbound
            && m.status == MessageStatus::Received
            && m.address == "+17755550100"));
        assert_eq!(logged[0].message.as_deref(), Some(" stop "));
    }

    #[tokio::test]
    async fn test_unknown_sender_logged_without_person() {
        let store = Arc::new(FakeSmsStore::default());
        let svc = service(store.clone(), MockSmsSender::new(), MockSendLimiter::new());

        assert_eq!(svc.handle_inbound("+17755550999", "1234").await.unwrap(), None);
        assert_eq!(
            svc.handle_inbound("+17755550999", "help").await.unwrap(),
            Some(HELP_TEXT.to_string())
        );

        let logged = store.logged.lock().unwrap();
        assert_eq!(logged.len(), 2);
        assert!(logged.iter().all(|m| m.person_id.is_none()));
        assert!(store.saved.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_inbound_code_reply() {
        let store = Arc::new(FakeSmsStore::with_person(person()));
        let svc = service(store.clone(), MockSmsSender::new(), MockSendLimiter::new());

        assert_eq!(
            svc.handle_inbound("+17755550100", "0000").await.unwrap(),
            Some(CODE_REJECTED_TEXT.to_string())
        );
        assert!(store.saved.lock().unwrap().is_empty());

        assert_eq!(
            svc.handle_inbound("+17755550100", "1234").await.unwrap(),
            Some(CODE_ACCEPTED_TEXT.to_string())
        );
        let saved = store.saved.lock().unwrap();
        assert_eq!(saved.len(), 1);
        assert!(saved[0].sms_on_playa_verified);
        assert!(!saved[0].sms_off_playa_verified);
    }

    #[tokio::test]
    async fn test_retryable_status_schedules_retry() {
        let store = Arc::new(FakeSmsStore {
            sent: vec![sent_message("SM5")],
            ..Default::default()
        });
        let svc = service(store.clone(), MockSmsSender::new(), MockSendLimiter::new());

        svc.handle_status("SM5", "undelivered", Some(30003)).await.unwrap();

        let updates = store.updates.lock().unwrap();
        assert_eq!(updates.len(), 1);
        let (id, update) = &updates[0];
        assert_eq!(*id, 5);
        assert_eq!(update.status, MessageStatus::Undelivered);
        assert!(update.next_retry_at.is_some());
        assert_eq!(update.error.as_deref(), Some("Twilio error 30003"));
        assert_eq!(*store.refreshed.lock().unwrap(), vec![9]);
        assert!(store.stopped.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unsubscribed_status_stops_number() {
        let store = Arc::new(FakeSmsStore {
            sent: vec![sent_message("SM5")],
            ..Default::default()
        });
        let svc = service(store.clone(), MockSmsSender::new(), MockSendLimiter::new());

        svc.handle_status("SM5", "failed", Some(TWILIO_UNSUBSCRIBED)).await.unwrap();

        let updates = store.updates.lock().unwrap();
        assert_eq!(updates[0].1.status, MessageStatus::Stopped);
        assert!(updates[0].1.next_retry_at.is_none());
        assert_eq!(
            *store.stopped.lock().unwrap(),
            vec![("+17755550100".to_string(), true)]
        );
        assert_eq!(*store.refreshed.lock().unwrap(), vec![9]);
    }

    #[tokio::test]
    async fn test_status_for_unknown_sid_ignored() {
        let store = Arc::new(FakeSmsStore {
            sent: vec![sent_message("SM5")],
            ..Default::default()
        });
        let svc = service(store.clone(), MockSmsSender::new(), MockSendLimiter::new());

        svc.handle_status("SM404", "delivered", None).await.unwrap();

        assert!(store.updates.lock().unwrap().is_empty());
        assert!(store.refreshed.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_send_code_stores_and_texts_code() {
        let store = Arc::new(FakeSmsStore::with_person(person()));
        let body = Arc::new(Mutex::new(String::new()));

        let mut limiter = MockSendLimiter::new();
        limiter
            .expect_check_rate_limit()
            .withf(|subject, max, window| subject == "1" && *max == 3 && *window == 900)
            .times(1)
            .returning(|_, _, _| Ok(true));
        let mut sender = MockSmsSender::new();
        let captured = body.clone();
        sender
            .expect_send()
            .withf(|to, _| to == "+14155550199")
            .times(1)
            .returning(move |_, text| {
                *captured.lock().unwrap() = text.to_string();
                Ok(SmsReceipt {
                    sid: "SM9".to_string(),
                    status: MessageStatus::Queued,
                })
            });

        let svc = service(store.clone(), sender, limiter);
        svc.send_code(1, PhoneKind::OffPlaya).await.unwrap();

        let saved = store.saved.lock().unwrap();
        assert_eq!(saved.len(), 1);
        let code = saved[0].sms_off_playa_code.clone().unwrap();
        assert_eq!(code.len(), 4);
        assert_ne!(saved[0].sms_on_playa_code.as_deref(), Some(code.as_str()));
        assert!(body.lock().unwrap().contains(&code));
    }

    #[tokio::test]
    async fn test_send_code_rate_limited() {
        let store = Arc::new(FakeSmsStore::with_person(person()));
        let mut limiter = MockSendLimiter::new();
        limiter
            .expect_check_rate_limit()
            .returning(|_, _, _| Ok(false));
        let mut sender = MockSmsSender::new();
        sender.expect_send().times(0);

        let svc = service(store.clone(), sender, limiter);
        let err = svc.send_code(1, PhoneKind::OnPlaya).await.unwrap_err();

        assert!(matches!(err, SmsServiceError::RateLimited));
        assert!(store.saved.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_send_code_unknown_person() {
        let store = Arc::new(FakeSmsStore::default());
        let svc = service(store, MockSmsSender::new(), MockSendLimiter::new());
        let err = svc.send_code(42, PhoneKind::OnPlaya).await.unwrap_err();
        assert!(matches!(err, SmsServiceError::PersonNotFound(42)));
    }

    #[tokio::test]
    async fn test_confirm_code_resets_limit() {
        let store = Arc::new(FakeSmsStore::with_person(person()));
        let mut limiter = MockSendLimiter::new();
        limiter
            .expect_reset()
            .withf(|subject| subject == "1")
            .times(1)
            .returning(|_| Ok(()));

        let svc = service(store.clone(), MockSmsSender::new(), limiter);
        let verified = svc.confirm_code(1, PhoneKind::OnPlaya, "1234").await.unwrap();

        assert!(verified.sms_on_playa_verified);
        assert_eq!(store.saved.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_confirm_code_mismatch_keeps_limit() {
        let store = Arc::new(FakeSmsStore::with_person(person()));
        let mut limiter = MockSendLimiter::new();
        limiter.expect_reset().times(0);

        let svc = service(store.clone(), MockSmsSender::new(), limiter);
        let err = svc.confirm_code(1, PhoneKind::OnPlaya, "9876").await.unwrap_err();

        assert!(matches!(err, SmsServiceError::CodeMismatch));
        assert!(store.saved.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_numbers() {
        let mut verified = person();
        verified.sms_on_playa_verified = true;
        let store = Arc::new(FakeSmsStore::with_person(verified));
        let svc = service(store.clone(), MockSmsSender::new(), MockSendLimiter::new());

        let err = svc
            .update_numbers(1, Some("555-0100"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, SmsServiceError::Validation(_)));
        assert!(store.saved.lock().unwrap().is_empty());

        let unchanged = svc
            .update_numbers(1, Some("(775) 555-0100"), Some("+14155550199"))
            .await
            .unwrap();
        assert!(unchanged.sms_on_playa_verified);
        assert!(store.saved.lock().unwrap().is_empty());

        let updated = svc
            .update_numbers(1, Some("+17755550100"), Some("415 555 0000"))
            .await
            .unwrap();
        assert!(updated.sms_on_playa_verified);
        assert_eq!(updated.sms_off_playa.as_deref(), Some("+14155550000"));
        assert!(updated.sms_off_playa_code.is_none());
        assert_eq!(store.saved.lock().unwrap().len(), 1);
    }
}
