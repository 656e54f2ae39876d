// Persistence seam for the broadcast service

use super::recipients::{Candidate, CandidateQuery};
use crate::errors::DatabaseError;
use crate::models::{
    Broadcast, BroadcastMessage, DeliveryUpdate, MessageFilter, MessageLogEntry, NewBroadcast,
    NewBroadcastMessage, NewPersonMessage, Slot, StatusCount,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Storage used by `BroadcastService`; implemented over Postgres by
/// `BroadcastRepository`
#[async_trait]
pub trait BroadcastStore: Send + Sync {
    async fn candidates(&self, query: &CandidateQuery) -> Result<Vec<Candidate>, DatabaseError>;

    async fn create_broadcast(&self, broadcast: &NewBroadcast) -> Result<Broadcast, DatabaseError>;

    async fn find_broadcast(&self, id: i64) -> Result<Option<Broadcast>, DatabaseError>;

    async fn list_broadcasts(
        &self,
        since: Option<DateTime<Utc>>,
        limit: i64,
    ) -> Result<Vec<Broadcast>, DatabaseError>;

    /// Fan one in-app message out to many people; returns rows inserted
    async fn insert_person_messages(
        &self,
        message: &NewPersonMessage,
        person_ids: &[i64],
    ) -> Result<u64, DatabaseError>;

    async fn insert_message(&self, message: &NewBroadcastMessage) -> Result<i64, DatabaseError>;

    /// Store the outcome of a resend, counting it as another attempt
    async fn record_attempt(&self, message_id: i64, update: &DeliveryUpdate)
        -> Result<(), DatabaseError>;

    /// Outbound messages of a broadcast which failed transiently and have
    /// attempts left
    async fn retryable_messages(
        &self,
        broadcast_id: i64,
        max_attempts: u32,
    ) -> Result<Vec<BroadcastMessage>, DatabaseError>;

    /// Retryable messages whose `next_retry_at` has passed
    async fn due_messages(
        &self,
        now: DateTime<Utc>,
        created_since: DateTime<Utc>,
        max_attempts: u32,
    ) -> Result<Vec<BroadcastMessage>, DatabaseError>;

    /// Recompute failure counts, bumping `retry_count` when `retried`
    async fn refresh_counts(&self, broadcast_id: i64, retried: bool) -> Result<(), DatabaseError>;

    async fn messages(
        &self,
        broadcast_id: i64,
        filter: MessageFilter,
    ) -> Result<Vec<MessageLogEntry>, DatabaseError>;

    async fn status_counts(&self, broadcast_id: i64) -> Result<Vec<StatusCount>, DatabaseError>;

    /// Slot with the title of its position
    async fn find_slot(&self, slot_id: i64) -> Result<Option<(Slot, String)>, DatabaseError>;

    /// Flag `number` stopped on everyone who registered it; returns people touched
    async fn stop_number(&self, number: &str) -> Result<u64, DatabaseError>;
}
