// Broadcast service: preview, transmit, retry and log queries

use super::log::{describe_slot, messages_csv};
use super::plan::{plan_delivery, DeliveryPlan, Recipient, Skipped};
use super::recipients::{select_recipients, Candidate, CandidateQuery, RecipientFilter};
use super::request::{validate, BroadcastRequest, ValidatedBroadcast};
use super::store::BroadcastStore;
use crate::config::BroadcastConfig;
use crate::errors::{BroadcastError, MailError, SmsError};
use crate::event::{event_year, year_bounds};
use crate::mail::{broadcast_email_body, Mailer, OutgoingEmail};
use crate::models::{
    AddressType, AlertKind, Broadcast, BroadcastMessage, BroadcastType, DeliveryUpdate, Direction,
    MessageFilter, MessageLogEntry, MessageStatus, NewBroadcast, NewBroadcastMessage,
    NewPersonMessage, StatusCount, UserClaims,
};
use crate::retry::RetryStrategy;
use crate::sms::{permanent_status, SmsReceipt, SmsSender};
use crate::telemetry::{record_broadcast, record_delivery, record_retry};
use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::instrument;

pub const DEFAULT_LIST_LIMIT: i64 = 100;
pub const MAX_LIST_LIMIT: i64 = 500;

/// What a broadcast would do, without doing it
#[derive(Debug, Clone, Serialize)]
pub struct BroadcastPreview {
    #[serde(rename = "type")]
    pub broadcast_type: BroadcastType,
    pub alert: AlertKind,
    pub recipient_count: usize,
    pub sms_count: usize,
    pub email_count: usize,
    pub clubhouse_count: usize,
    pub skipped: Vec<Skipped>,
    /// Callsigns of everyone selected
    pub recipients: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BroadcastSummary {
    pub broadcast: Broadcast,
    pub sms_sent: usize,
    pub sms_failed: usize,
    pub email_sent: usize,
    pub email_failed: usize,
    pub clubhouse_count: usize,
    pub skipped: Vec<Skipped>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BroadcastDetail {
    pub broadcast: Broadcast,
    pub stats: Vec<StatusCount>,
    pub slot_description: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RetryReport {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub broadcasts: usize,
}

/// Failure statuses that count against a delivery
fn is_failure(status: MessageStatus) -> bool {
    status.is_retryable() || status.is_final_failure()
}

/// Map the result of an SMS send onto the delivery log
pub fn sms_outcome(
    result: Result<SmsReceipt, SmsError>,
    attempts: u32,
    now: DateTime<Utc>,
    retry: &dyn RetryStrategy,
) -> DeliveryUpdate {
    match result {
        Ok(receipt) => DeliveryUpdate {
            status: receipt.status,
            provider_sid: Some(receipt.sid),
            error: None,
            next_retry_at: None,
        },
        Err(err) => {
            let status = match (&err, err.provider_code().and_then(permanent_status)) {
                (_, Some(status)) => Some(status),
                (SmsError::InvalidNumber(_), _) => Some(MessageStatus::Invalid),
                _ => None,
            };
            let next_retry_at = match (status, &err) {
                (Some(_), _) | (None, SmsError::Disabled) => None,
                _ => retry.next_retry_at(attempts, now),
            };
            DeliveryUpdate {
                status: status.unwrap_or(MessageStatus::Failed),
                provider_sid: None,
                error: Some(err.to_string()),
                next_retry_at,
            }
        }
    }
}

/// Map the result of an email send onto the delivery log
pub fn email_outcome(
    result: Result<(), MailError>,
    attempts: u32,
    now: DateTime<Utc>,
    retry: &dyn RetryStrategy,
) -> DeliveryUpdate {
    match result {
        Ok(()) => DeliveryUpdate {
            status: MessageStatus::Sent,
            provider_sid: None,
            error: None,
            next_retry_at: None,
        },
        Err(err) => {
            let (status, next_retry_at) = match err {
                MailError::InvalidAddress(_) | MailError::BuildFailed(_) => {
                    (MessageStatus::Invalid, None)
                }
                MailError::Rejected(_) => (MessageStatus::Bounced, None),
                MailError::Disabled => (MessageStatus::Failed, None),
                MailError::Transport(_) => {
                    (MessageStatus::Failed, retry.next_retry_at(attempts, now))
                }
            };
            DeliveryUpdate {
                status,
                provider_sid: None,
                error: Some(err.to_string()),
                next_retry_at,
            }
        }
    }
}

/// Log one delivery; a failed insert is reported and the fan-out carries on
async fn log_delivery(
    store: &dyn BroadcastStore,
    broadcast_id: i64,
    recipient: &Recipient,
    address_type: AddressType,
    body: &str,
    update: &DeliveryUpdate,
) {
    if let Some(ref error) = update.error {
        tracing::warn!(
            broadcast_id = broadcast_id,
            person_id = recipient.person_id,
            channel = %address_type,
            status = %update.status,
            error = %error,
            "Delivery failed"
        );
    }

    let logged = store
        .insert_message(&NewBroadcastMessage {
            broadcast_id: Some(broadcast_id),
            person_id: Some(recipient.person_id),
            direction: Direction::Outbound,
            address_type,
            address: recipient.address.clone(),
            status: update.status,
            message: Some(body.to_string()),
            provider_sid: update.provider_sid.clone(),
            error: update.error.clone(),
            next_retry_at: update.next_retry_at,
        })
        .await;
    if let Err(e) = logged {
        tracing::error!(
            broadcast_id = broadcast_id,
            person_id = recipient.person_id,
            channel = %address_type,
            status = %update.status,
            error = %e,
            "Failed to log delivery"
        );
    }

    if update.status == MessageStatus::Stopped {
        stop_number(store, &recipient.address).await;
    }
}

/// Flag a number the recipient unsubscribed with STOP
async fn stop_number(store: &dyn BroadcastStore, number: &str) {
    match store.stop_number(number).await {
        Ok(people) => tracing::info!(people = people, "Marked unsubscribed number stopped"),
        Err(e) => tracing::error!(error = %e, "Failed to mark number stopped"),
    }
}

struct Prepared {
    validated: ValidatedBroadcast,
    recipients: Vec<Candidate>,
    plan: DeliveryPlan,
}

pub struct BroadcastService {
    store: Arc<dyn BroadcastStore>,
    sms: Arc<dyn SmsSender>,
    mailer: Arc<dyn Mailer>,
    retry: Arc<dyn RetryStrategy>,
    config: BroadcastConfig,
    tz: Tz,
}

impl BroadcastService {
    pub fn new(
        store: Arc<dyn BroadcastStore>,
        sms: Arc<dyn SmsSender>,
        mailer: Arc<dyn Mailer>,
        retry: Arc<dyn RetryStrategy>,
        config: BroadcastConfig,
        tz: Tz,
    ) -> Self {
        Self {
            store,
            sms,
            mailer,
            retry,
            config,
            tz,
        }
    }

    fn concurrency(&self) -> usize {
        self.config.dispatch_concurrency.max(1)
    }

    async fn prepare(
        &self,
        sender: &UserClaims,
        request: &BroadcastRequest,
        now: DateTime<Utc>,
    ) -> Result<Prepared, BroadcastError> {
        let validated = validate(request, sender)?;

        let year = event_year(now, self.tz);
        let query = CandidateQuery::for_broadcast(&validated, year, year_bounds(year, self.tz));
        let candidates = self.store.candidates(&query).await?;

        let recipients = select_recipients(candidates, &RecipientFilter::for_broadcast(&validated));
        let plan = plan_delivery(&recipients, validated.channels(), validated.attrs.alert);

        Ok(Prepared {
            validated,
            recipients,
            plan,
        })
    }

    #[instrument(skip(self, sender, request), fields(sender = sender.sub, broadcast_type = %request.broadcast_type))]
    pub async fn preview(
        &self,
        sender: &UserClaims,
        request: &BroadcastRequest,
    ) -> Result<BroadcastPreview, BroadcastError> {
        let prepared = self.prepare(sender, request, Utc::now()).await?;

        Ok(BroadcastPreview {
            broadcast_type: prepared.validated.attrs.broadcast_type,
            alert: prepared.validated.attrs.alert,
            recipient_count: prepared.recipients.len(),
            sms_count: prepared.plan.sms.len(),
            email_count: prepared.plan.email.len(),
            clubhouse_count: prepared.plan.clubhouse.len(),
            skipped: prepared.plan.skipped,
            recipients: prepared.recipients.into_iter().map(|c| c.callsign).collect(),
        })
    }

    #[instrument(skip(self, sender, request), fields(sender = sender.sub, broadcast_type = %request.broadcast_type))]
    pub async fn transmit(
        &self,
        sender: &UserClaims,
        request: &BroadcastRequest,
    ) -> Result<BroadcastSummary, BroadcastError> {
        let now = Utc::now();
        let Prepared {
            validated,
            recipients,
            plan,
        } = self.prepare(sender, request, now).await?;

        if recipients.is_empty() || plan.is_empty() {
            return Err(BroadcastError::NoRecipients);
        }

        let alert = validated.attrs.alert;
        let created = self
            .store
            .create_broadcast(&NewBroadcast {
                sender_id: validated.sender_id,
                broadcast_type: validated.attrs.broadcast_type,
                alert_id: alert.id(),
                position_id: validated.position_id,
                slot_id: validated.slot_id,
                statuses: validated.statuses.iter().map(|s| s.to_string()).collect(),
                sender_name: validated.sender_name.clone(),
                sms_message: validated.sms_message.clone(),
                email_subject: validated.email_subject.clone(),
                email_message: validated.email_message.clone(),
                recipient_count: recipients.len() as i32,
                sms_count: plan.sms.len() as i32,
                email_count: plan.email.len() as i32,
                clubhouse_count: plan.clubhouse.len() as i32,
            })
            .await?;
        record_broadcast(validated.attrs.broadcast_type.as_str());

        if !plan.clubhouse.is_empty() {
            let message = NewPersonMessage {
                creator_person_id: validated.sender_id,
                message_from: validated.sender_name.clone(),
                subject: validated.email_subject.clone().unwrap_or_default(),
                body: validated.email_message.clone().unwrap_or_default(),
                broadcast_id: Some(created.id),
            };
            self.store
                .insert_person_messages(&message, &plan.clubhouse)
                .await?;
        }

        let sms_body = validated.sms_message.clone().unwrap_or_default();
        let sms_statuses = self
            .dispatch_sms(created.id, &plan.sms, &sms_body, now)
            .await;

        let email = validated.email_message.as_deref().map(|message| {
            (
                validated.email_subject.clone().unwrap_or_default(),
                broadcast_email_body(message, &validated.sender_name, alert.title()),
            )
        });
        let email_statuses = match email {
            Some((subject, body)) if validated.send_email => {
                self.dispatch_email(created.id, &plan.email, &subject, &body, now)
                    .await
            }
            _ => Vec::new(),
        };

        self.store.refresh_counts(created.id, false).await?;
        let broadcast = self
            .store
            .find_broadcast(created.id)
            .await?
            .unwrap_or(created);

        let sms_failed = sms_statuses.iter().filter(|s| is_failure(**s)).count();
        let email_failed = email_statuses.iter().filter(|s| is_failure(**s)).count();

        tracing::info!(
            broadcast_id = broadcast.id,
            recipients = broadcast.recipient_count,
            sms_failed = sms_failed,
            email_failed = email_failed,
            "Broadcast transmitted"
        );

        Ok(BroadcastSummary {
            broadcast,
            sms_sent: sms_statuses.len() - sms_failed,
            sms_failed,
            email_sent: email_statuses.len() - email_failed,
            email_failed,
            clubhouse_count: plan.clubhouse.len(),
            skipped: plan.skipped,
        })
    }

    async fn dispatch_sms(
        &self,
        broadcast_id: i64,
        recipients: &[Recipient],
        body: &str,
        now: DateTime<Utc>,
    ) -> Vec<MessageStatus> {
        let sends: Vec<_> = recipients
            .iter()
            .cloned()
            .map(|recipient| {
                let store = Arc::clone(&self.store);
                let sms = Arc::clone(&self.sms);
                let retry = Arc::clone(&self.retry);
                let body = body.to_string();
                async move {
                    let result = sms.send(&recipient.address, &body).await;
                    let update = sms_outcome(result, 1, now, retry.as_ref());
                    record_delivery(AddressType::Sms.as_str(), update.status.as_str());
                    log_delivery(
                        store.as_ref(),
                        broadcast_id,
                        &recipient,
                        AddressType::Sms,
                        &body,
                        &update,
                    )
                    .await;
                    update.status
                }
            })
            .collect();

        stream::iter(sends)
            .buffer_unordered(self.concurrency())
            .collect()
            .await
    }

    async fn dispatch_email(
        &self,
        broadcast_id: i64,
        recipients: &[Recipient],
        subject: &str,
        body: &str,
        now: DateTime<Utc>,
    ) -> Vec<MessageStatus> {
        let sends: Vec<_> = recipients
            .iter()
            .cloned()
            .map(|recipient| {
                let store = Arc::clone(&self.store);
                let mailer = Arc::clone(&self.mailer);
                let retry = Arc::clone(&self.retry);
                let email = OutgoingEmail {
                    to: recipient.address.clone(),
                    subject: subject.to_string(),
                    body: body.to_string(),
                    reply_to: None,
                };
                async move {
                    let result = mailer.send(&email).await;
                    let update = email_outcome(result, 1, now, retry.as_ref());
                    record_delivery(AddressType::Email.as_str(), update.status.as_str());
                    log_delivery(
                        store.as_ref(),
                        broadcast_id,
                        &recipient,
                        AddressType::Email,
                        &email.body,
                        &update,
                    )
                    .await;
                    update.status
                }
            })
            .collect();

        stream::iter(sends)
            .buffer_unordered(self.concurrency())
            .collect()
            .await
    }

    /// Resend every failed message of one broadcast that has attempts left
    #[instrument(skip(self))]
    pub async fn retry_broadcast(&self, broadcast_id: i64) -> Result<RetryReport, BroadcastError> {
        if self.store.find_broadcast(broadcast_id).await?.is_none() {
            return Err(BroadcastError::NotFound(broadcast_id));
        }

        let messages = self
            .store
            .retryable_messages(broadcast_id, self.retry.max_attempts())
            .await?;
        self.resend(messages, Utc::now()).await
    }

    /// Resend failed messages whose backoff has elapsed
    #[instrument(skip(self))]
    pub async fn retry_due(&self, now: DateTime<Utc>) -> Result<RetryReport, BroadcastError> {
        let since = now - Duration::hours(self.config.retry_window_hours);
        let messages = self
            .store
            .due_messages(now, since, self.retry.max_attempts())
            .await?;
        self.resend(messages, now).await
    }

    async fn resend(
        &self,
        messages: Vec<BroadcastMessage>,
        now: DateTime<Utc>,
    ) -> Result<RetryReport, BroadcastError> {
        if messages.is_empty() {
            return Ok(RetryReport::default());
        }

        let broadcast_ids: BTreeSet<i64> = messages.iter().filter_map(|m| m.broadcast_id).collect();
        let mut broadcasts: HashMap<i64, Broadcast> = HashMap::new();
        for id in &broadcast_ids {
            if let Some(broadcast) = self.store.find_broadcast(*id).await? {
                broadcasts.insert(*id, broadcast);
            }
        }

        let sends: Vec<_> = messages
            .into_iter()
            .filter_map(|message| {
                let broadcast = message.broadcast_id.and_then(|id| broadcasts.get(&id))?;
                let sms_body = message
                    .message
                    .clone()
                    .or_else(|| broadcast.sms_message.clone())
                    .unwrap_or_default();
                let email_subject = broadcast.email_subject.clone().unwrap_or_default();
                let store = Arc::clone(&self.store);
                let sms = Arc::clone(&self.sms);
                let mailer = Arc::clone(&self.mailer);
                let retry = Arc::clone(&self.retry);

                Some(async move {
                    let attempts = (message.attempts.max(0) as u32) + 1;
                    let update = match message.address_type {
                        AddressType::Sms => {
                            let result = sms.send(&message.address, &sms_body).await;
                            sms_outcome(result, attempts, now, retry.as_ref())
                        }
                        AddressType::Email => {
                            let email = OutgoingEmail {
                                to: message.address.clone(),
                                subject: email_subject,
                                body: message.message.clone().unwrap_or_default(),
                                reply_to: None,
                            };
                            let result = mailer.send(&email).await;
                            email_outcome(result, attempts, now, retry.as_ref())
                        }
                    };

                    let succeeded = !is_failure(update.status);
                    record_retry(
                        message.address_type.as_str(),
                        if succeeded { "success" } else { "failure" },
                    );
                    if let Err(e) = store.record_attempt(message.id, &update).await {
                        tracing::error!(
                            message_id = message.id,
                            error = %e,
                            "Failed to record delivery attempt"
                        );
                    }
                    if update.status == MessageStatus::Stopped {
                        stop_number(store.as_ref(), &message.address).await;
                    }
                    succeeded
                })
            })
            .collect();

        let outcomes: Vec<bool> = stream::iter(sends)
            .buffer_unordered(self.concurrency())
            .collect()
            .await;

        let succeeded = outcomes.iter().filter(|ok| **ok).count();
        let report = RetryReport {
            attempted: outcomes.len(),
            succeeded,
            failed: outcomes.len() - succeeded,
            broadcasts: broadcasts.len(),
        };

        for id in broadcasts.keys() {
            self.store.refresh_counts(*id, true).await?;
        }

        tracing::info!(
            attempted = report.attempted,
            succeeded = report.succeeded,
            failed = report.failed,
            "Retried failed deliveries"
        );
        Ok(report)
    }

    pub async fn list(
        &self,
        since: Option<DateTime<Utc>>,
        limit: Option<i64>,
    ) -> Result<Vec<Broadcast>, BroadcastError> {
        let limit = limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT);
        Ok(self.store.list_broadcasts(since, limit).await?)
    }

    pub async fn detail(&self, broadcast_id: i64) -> Result<BroadcastDetail, BroadcastError> {
        let broadcast = self
            .store
            .find_broadcast(broadcast_id)
            .await?
            .ok_or(BroadcastError::NotFound(broadcast_id))?;
        let stats = self.store.status_counts(broadcast_id).await?;

        let slot_description = match broadcast.slot_id {
            Some(slot_id) => self
                .store
                .find_slot(slot_id)
                .await?
                .map(|(slot, title)| describe_slot(&slot, &title, self.tz)),
            None => None,
        };

        Ok(BroadcastDetail {
            broadcast,
            stats,
            slot_description,
        })
    }

    pub async fn messages(
        &self,
        broadcast_id: i64,
        filter: MessageFilter,
    ) -> Result<Vec<MessageLogEntry>, BroadcastError> {
        if self.store.find_broadcast(broadcast_id).await?.is_none() {
            return Err(BroadcastError::NotFound(broadcast_id));
        }
        Ok(self.store.messages(broadcast_id, filter).await?)
    }

    pub async fn export_csv(&self, broadcast_id: i64) -> Result<String, BroadcastError> {
        let entries = self.messages(broadcast_id, MessageFilter::default()).await?;
        messages_csv(&entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::recipients::tests::candidate;
    use crate::errors::DatabaseError;
    use crate::mail::MockMailer;
    use crate::models::{PersonStatus, Slot, ROLE_MEGAPHONE};
    use crate::retry::FixedDelay;
    use crate::sms::MockSmsSender;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// In-memory store recording everything the service writes
    #[derive(Default)]
    struct FakeStore {
        candidates: Vec<Candidate>,
        broadcasts: Mutex<Vec<Broadcast>>,
        messages: Mutex<Vec<BroadcastMessage>>,
        person_messages: Mutex<Vec<(i64, String)>>,
        queries: Mutex<Vec<CandidateQuery>>,
        refreshed: Mutex<Vec<(i64, bool)>>,
        stopped_numbers: Mutex<Vec<String>>,
        /// Logging a delivery to this address fails
        unloggable: Option<String>,
    }

    fn broadcast_from(id: i64, new: &NewBroadcast) -> Broadcast {
        Broadcast {
            id,
            sender_id: new.sender_id,
            broadcast_type: new.broadcast_type,
            alert_id: new.alert_id,
            position_id: new.position_id,
            slot_id: new.slot_id,
            statuses: new.statuses.clone(),
            sender_name: new.sender_name.clone(),
            sms_message: new.sms_message.clone(),
            email_subject: new.email_subject.clone(),
            email_message: new.email_message.clone(),
            recipient_count: new.recipient_count,
            sms_count: new.sms_count,
            email_count: new.email_count,
            clubhouse_count: new.clubhouse_count,
            sms_failed: 0,
            email_failed: 0,
            retry_count: 0,
            created_at: Utc::now(),
        }
    }

    #[async_trait]
    impl BroadcastStore for FakeStore {
        async fn candidates(&self, query: &CandidateQuery) -> Result<Vec<Candidate>, DatabaseError> {
            self.queries.lock().unwrap().push(query.clone());
            Ok(self.candidates.clone())
        }

        async fn create_broadcast(&self, new: &NewBroadcast) -> Result<Broadcast, DatabaseError> {
            let mut broadcasts = self.broadcasts.lock().unwrap();
            let broadcast = broadcast_from(broadcasts.len() as i64 + 1, new);
            broadcasts.push(broadcast.clone());
            Ok(broadcast)
        }

        async fn find_broadcast(&self, id: i64) -> Result<Option<Broadcast>, DatabaseError> {
            Ok(self
                .broadcasts
                .lock()
                .unwrap()
                .iter()
                .find(|b| b.id == id)
                .cloned())
        }

        async fn list_broadcasts(
            &self,
            _since: Option<DateTime<Utc>>,
            limit: i64,
        ) -> Result<Vec<Broadcast>, DatabaseError> {
            let broadcasts = self.broadcasts.lock().unwrap();
            Ok(broadcasts.iter().rev().take(limit as usize).cloned().collect())
        }

        async fn insert_person_messages(
            &self,
            message: &NewPersonMessage,
            person_ids: &[i64],
        ) -> Result<u64, DatabaseError> {
            let mut stored = self.person_messages.lock().unwrap();
            for id in person_ids {
                stored.push((*id, message.subject.clone()));
            }
            Ok(person_ids.len() as u64)
        }

        async fn insert_message(&self, new: &NewBroadcastMessage) -> Result<i64, DatabaseError> {
            if self.unloggable.as_deref() == Some(new.address.as_str()) {
                return Err(DatabaseError::QueryFailed("connection reset".to_string()));
            }
            let mut messages = self.messages.lock().unwrap();
            let id = messages.len() as i64 + 1;
            messages.push(BroadcastMessage {
                id,
                broadcast_id: new.broadcast_id,
                person_id: new.person_id,
                direction: new.direction,
                address_type: new.address_type,
                address: new.address.clone(),
                status: new.status,
                message: new.message.clone(),
                provider_sid: new.provider_sid.clone(),
                error: new.error.clone(),
                attempts: 1,
                next_retry_at: new.next_retry_at,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            });
            Ok(id)
        }

        async fn record_attempt(
            &self,
            message_id: i64,
            update: &DeliveryUpdate,
        ) -> Result<(), DatabaseError> {
            let mut messages = self.messages.lock().unwrap();
            let message = messages
                .iter_mut()
                .find(|m| m.id == message_id)
                .ok_or_else(|| DatabaseError::NotFound(message_id.to_string()))?;
            message.status = update.status;
            message.error = update.error.clone();
            message.next_retry_at = update.next_retry_at;
            message.attempts += 1;
            Ok(())
        }

        async fn retryable_messages(
            &self,
            broadcast_id: i64,
            max_attempts: u32,
        ) -> Result<Vec<BroadcastMessage>, DatabaseError> {
            Ok(self
                .messages
                .lock()
                .unwrap()
                .iter()
                .filter(|m| {
                    m.broadcast_id == Some(broadcast_id)
                        && m.status.is_retryable()
                        && (m.attempts as u32) < max_attempts
                })
                .cloned()
                .collect())
        }

        async fn due_messages(
            &self,
            now: DateTime<Utc>,
            created_since: DateTime<Utc>,
            max_attempts: u32,
        ) -> Result<Vec<BroadcastMessage>, DatabaseError> {
            Ok(self
                .messages
                .lock()
                .unwrap()
                .iter()
                .filter(|m| {
                    m.status.is_retryable()
                        && m.next_retry_at.map_or(false, |at| at <= now)
                        && m.created_at >= created_since
                        && (m.attempts as u32) < max_attempts
                })
                .cloned()
                .collect())
        }

        async fn refresh_counts(&self, broadcast_id: i64, retried: bool) -> Result<(), DatabaseError> {
            self.refreshed.lock().unwrap().push((broadcast_id, retried));
            Ok(())
        }

        async fn messages(
            &self,
            broadcast_id: i64,
            filter: MessageFilter,
        ) -> Result<Vec<MessageLogEntry>, DatabaseError> {
            Ok(self
                .messages
                .lock()
                .unwrap()
                .iter()
                .filter(|m| m.broadcast_id == Some(broadcast_id))
                .filter(|m| filter.status.map_or(true, |s| m.status == s))
                .filter(|m| filter.channel.map_or(true, |c| m.address_type == c))
                .map(|m| MessageLogEntry {
                    message: m.clone(),
                    callsign: None,
                })
                .collect())
        }

        async fn status_counts(&self, _broadcast_id: i64) -> Result<Vec<StatusCount>, DatabaseError> {
            Ok(Vec::new())
        }

        async fn find_slot(&self, _slot_id: i64) -> Result<Option<(Slot, String)>, DatabaseError> {
            Ok(None)
        }

        async fn stop_number(&self, number: &str) -> Result<u64, DatabaseError> {
            self.stopped_numbers.lock().unwrap().push(number.to_string());
            Ok(1)
        }
    }

    fn sender() -> UserClaims {
        UserClaims {
            sub: 7,
            callsign: "Hubcap".to_string(),
            roles: vec![ROLE_MEGAPHONE.to_string()],
            exp: 0,
            iat: 0,
        }
    }

    fn announce() -> BroadcastRequest {
        BroadcastRequest {
            send_sms: true,
            send_email: true,
            send_clubhouse: true,
            sms_message: Some("Dust storm, shelter in place".to_string()),
            email_subject: Some("Weather".to_string()),
            email_message: Some("A dust storm is coming.".to_string()),
            ..BroadcastRequest::new(BroadcastType::Announce)
        }
    }

    fn service(
        store: Arc<FakeStore>,
        sms: MockSmsSender,
        mailer: MockMailer,
    ) -> BroadcastService {
        BroadcastService::new(
            store,
            Arc::new(sms),
            Arc::new(mailer),
            Arc::new(FixedDelay::new(std::time::Duration::from_secs(60), 3)),
            crate::config::Settings::default().broadcast,
            chrono_tz::America::Los_Angeles,
        )
    }

    fn receipt(sid: &str) -> Result<SmsReceipt, SmsError> {
        Ok(SmsReceipt {
            sid: sid.to_string(),
            status: MessageStatus::Queued,
        })
    }

    #[tokio::test]
    async fn test_transmit_fans_out_and_logs() {
        let mut stopped = candidate(2, "Bramble");
        stopped.sms_off_playa_stopped = true;
        let store = Arc::new(FakeStore {
            candidates: vec![candidate(1, "Sparkle"), stopped, candidate(1, "Sparkle")],
            ..Default::default()
        });

        let mut sms = MockSmsSender::new();
        sms.expect_send().times(1).returning(|_, _| receipt("SM1"));
        let mut mailer = MockMailer::new();
        mailer.expect_send().times(2).returning(|_| Ok(()));

        let svc = service(store.clone(), sms, mailer);
        let summary = svc.transmit(&sender(), &announce()).await.unwrap();

        assert_eq!(summary.broadcast.recipient_count, 2);
        assert_eq!(summary.sms_sent, 1);
        assert_eq!(summary.email_sent, 2);
        assert_eq!(summary.clubhouse_count, 2);
        assert_eq!(summary.skipped.len(), 1);
        assert_eq!(store.messages.lock().unwrap().len(), 3);
        assert_eq!(store.person_messages.lock().unwrap().len(), 2);
        assert_eq!(*store.refreshed.lock().unwrap(), vec![(1, false)]);

        let query = store.queries.lock().unwrap()[0].clone();
        assert_eq!(query.alert, AlertKind::Announcements);
        assert!(query.statuses.contains(&PersonStatus::Active));
    }

    #[tokio::test]
    async fn test_transmit_without_recipients_fails() {
        let store = Arc::new(FakeStore::default());
        let svc = service(store.clone(), MockSmsSender::new(), MockMailer::new());
        let err = svc.transmit(&sender(), &announce()).await.unwrap_err();
        assert!(matches!(err, BroadcastError::NoRecipients));
        assert!(store.broadcasts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_preview_has_no_side_effects() {
        let store = Arc::new(FakeStore {
            candidates: vec![candidate(1, "Sparkle"), candidate(2, "Bramble")],
            ..Default::default()
        });
        let svc = service(store.clone(), MockSmsSender::new(), MockMailer::new());
        let preview = svc.preview(&sender(), &announce()).await.unwrap();

        assert_eq!(preview.recipients, vec!["Sparkle", "Bramble"]);
        assert_eq!(preview.sms_count, 2);
        assert!(store.broadcasts.lock().unwrap().is_empty());
        assert!(store.messages.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_transient_failure_is_retried() {
        let store = Arc::new(FakeStore {
            candidates: vec![candidate(1, "Sparkle")],
            ..Default::default()
        });

        let mut sms = MockSmsSender::new();
        let mut seq = mockall::Sequence::new();
        sms.expect_send()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Err(SmsError::RequestFailed("timeout".to_string())));
        sms.expect_send()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| receipt("SM2"));

        let request = BroadcastRequest {
            send_email: false,
            send_clubhouse: false,
            ..announce()
        };
        let svc = service(store.clone(), sms, MockMailer::new());
        let summary = svc.transmit(&sender(), &request).await.unwrap();
        assert_eq!(summary.sms_failed, 1);

        let logged = store.messages.lock().unwrap()[0].clone();
        assert_eq!(logged.status, MessageStatus::Failed);
        assert!(logged.next_retry_at.is_some());

        let report = svc.retry_broadcast(summary.broadcast.id).await.unwrap();
        assert_eq!(
            report,
            RetryReport {
                attempted: 1,
                succeeded: 1,
                failed: 0,
                broadcasts: 1
            }
        );
        let retried = store.messages.lock().unwrap()[0].clone();
        assert_eq!(retried.status, MessageStatus::Queued);
        assert_eq!(retried.attempts, 2);
        assert!(store.refreshed.lock().unwrap().contains(&(1, true)));
    }

    #[tokio::test]
    async fn test_retry_due_picks_elapsed_messages_only() {
        let store = Arc::new(FakeStore {
            candidates: vec![candidate(1, "Sparkle")],
            ..Default::default()
        });
        let mut sms = MockSmsSender::new();
        sms.expect_send()
            .times(1)
            .returning(|_, _| Err(SmsError::RequestFailed("timeout".to_string())));
        let request = BroadcastRequest {
            send_email: false,
            send_clubhouse: false,
            ..announce()
        };
        let svc = service(store.clone(), sms, MockMailer::new());
        svc.transmit(&sender(), &request).await.unwrap();

        // Backoff is 60s; nothing is due yet
        let report = svc.retry_due(Utc::now()).await.unwrap();
        assert_eq!(report.attempted, 0);
    }

    #[tokio::test]
    async fn test_retry_unknown_broadcast() {
        let store = Arc::new(FakeStore::default());
        let svc = service(store, MockSmsSender::new(), MockMailer::new());
        assert!(matches!(
            svc.retry_broadcast(99).await,
            Err(BroadcastError::NotFound(99))
        ));
    }

    fn assert_send<T: Send>(_: &T) {}

    #[tokio::test]
    async fn test_service_futures_are_send() {
        let store = Arc::new(FakeStore::default());
        let svc = service(store, MockSmsSender::new(), MockMailer::new());
        let claims = sender();
        let request = announce();

        let transmit = svc.transmit(&claims, &request);
        assert_send(&transmit);
        let retry_due = svc.retry_due(Utc::now());
        assert_send(&retry_due);
        let retry = svc.retry_broadcast(1);
        assert_send(&retry);
    }

    #[tokio::test]
    async fn test_unsubscribed_number_flagged_on_send() {
        let store = Arc::new(FakeStore {
            candidates: vec![candidate(1, "Sparkle"), candidate(2, "Bramble")],
            ..Default::default()
        });
        let mut sms = MockSmsSender::new();
        sms.expect_send().times(2).returning(|to, _| {
            if to == "+17755550002" {
                Err(SmsError::Provider {
                    code: 21610,
                    message: "Attempt to send to unsubscribed recipient".to_string(),
                })
            } else {
                receipt("SM1")
            }
        });
        let request = BroadcastRequest {
            send_email: false,
            send_clubhouse: false,
            ..announce()
        };

        let svc = service(store.clone(), sms, MockMailer::new());
        let summary = svc.transmit(&sender(), &request).await.unwrap();

        assert_eq!(summary.sms_failed, 1);
        assert_eq!(
            *store.stopped_numbers.lock().unwrap(),
            vec!["+17755550002".to_string()]
        );
        let messages = store.messages.lock().unwrap();
        let stopped = messages.iter().find(|m| m.person_id == Some(2)).unwrap();
        assert_eq!(stopped.status, MessageStatus::Stopped);
        assert!(stopped.next_retry_at.is_none());
    }

    #[tokio::test]
    async fn test_unsubscribed_number_flagged_on_resend() {
        let store = Arc::new(FakeStore {
            candidates: vec![candidate(1, "Sparkle")],
            ..Default::default()
        });
        let mut sms = MockSmsSender::new();
        let mut seq = mockall::Sequence::new();
        sms.expect_send()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Err(SmsError::RequestFailed("timeout".to_string())));
        sms.expect_send()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| {
                Err(SmsError::Provider {
                    code: 21610,
                    message: "unsubscribed".to_string(),
                })
            });
        let request = BroadcastRequest {
            send_email: false,
            send_clubhouse: false,
            ..announce()
        };

        let svc = service(store.clone(), sms, MockMailer::new());
        let summary = svc.transmit(&sender(), &request).await.unwrap();
        assert!(store.stopped_numbers.lock().unwrap().is_empty());

        let report = svc.retry_broadcast(summary.broadcast.id).await.unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(
            *store.stopped_numbers.lock().unwrap(),
            vec!["+17755550001".to_string()]
        );
        assert_eq!(store.messages.lock().unwrap()[0].status, MessageStatus::Stopped);
    }

    #[tokio::test]
    async fn test_failed_log_insert_keeps_fanning_out() {
        let store = Arc::new(FakeStore {
            candidates: vec![
                candidate(1, "Sparkle"),
                candidate(2, "Bramble"),
                candidate(3, "Cinder"),
            ],
            unloggable: Some("+17755550002".to_string()),
            ..Default::default()
        });
        let mut sms = MockSmsSender::new();
        sms.expect_send().times(3).returning(|_, _| receipt("SM1"));
        let request = BroadcastRequest {
            send_email: false,
            send_clubhouse: false,
            ..announce()
        };

        let svc = service(store.clone(), sms, MockMailer::new());
        let summary = svc.transmit(&sender(), &request).await.unwrap();

        assert_eq!(summary.sms_sent, 3);
        let logged: Vec<Option<i64>> = store
            .messages
            .lock()
            .unwrap()
            .iter()
            .map(|m| m.person_id)
            .collect();
        assert_eq!(logged.len(), 2);
        assert!(!logged.contains(&Some(2)));
        assert_eq!(*store.refreshed.lock().unwrap(), vec![(1, false)]);
    }

    #[test]
    fn test_sms_outcome_classification() {
        let retry = FixedDelay::new(std::time::Duration::from_secs(60), 3);
        let now = Utc::now();

        let stopped = sms_outcome(
            Err(SmsError::Provider {
                code: 21610,
                message: "unsubscribed".to_string(),
            }),
            1,
            now,
            &retry,
        );
        assert_eq!(stopped.status, MessageStatus::Stopped);
        assert!(stopped.next_retry_at.is_none());

        let invalid = sms_outcome(Err(SmsError::InvalidNumber("***0100".into())), 1, now, &retry);
        assert_eq!(invalid.status, MessageStatus::Invalid);

        let disabled = sms_outcome(Err(SmsError::Disabled), 1, now, &retry);
        assert_eq!(disabled.status, MessageStatus::Failed);
        assert!(disabled.next_retry_at.is_none());

        let exhausted = sms_outcome(Err(SmsError::RequestFailed("x".into())), 3, now, &retry);
        assert_eq!(exhausted.status, MessageStatus::Failed);
        assert!(exhausted.next_retry_at.is_none());
    }

    #[test]
    fn test_email_outcome_classification() {
        let retry = FixedDelay::new(std::time::Duration::from_secs(60), 3);
        let now = Utc::now();

        assert_eq!(
            email_outcome(Ok(()), 1, now, &retry).status,
            MessageStatus::Sent
        );
        assert_eq!(
            email_outcome(Err(MailError::Rejected("550".into())), 1, now, &retry).status,
            MessageStatus::Bounced
        );
        let transient = email_outcome(Err(MailError::Transport("reset".into())), 1, now, &retry);
        assert_eq!(transient.status, MessageStatus::Failed);
        assert!(transient.next_retry_at.is_some());
    }
}
