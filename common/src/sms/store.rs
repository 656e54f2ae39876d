// Persistence seam for the SMS service

use crate::errors::DatabaseError;
use crate::models::{BroadcastMessage, DeliveryUpdate, NewBroadcastMessage, Person};
use async_trait::async_trait;

/// Storage used by `SmsService`; implemented over Postgres by `SmsRepository`
#[async_trait]
pub trait SmsStore: Send + Sync {
    async fn find_person(&self, id: i64) -> Result<Option<Person>, DatabaseError>;

    /// Everyone who registered `number` as either of their numbers
    async fn find_people_by_number(&self, number: &str) -> Result<Vec<Person>, DatabaseError>;

    async fn save_sms_state(&self, person: &Person) -> Result<(), DatabaseError>;

    async fn set_stopped_by_number(&self, number: &str, stopped: bool)
        -> Result<u64, DatabaseError>;

    async fn insert_message(&self, message: &NewBroadcastMessage) -> Result<i64, DatabaseError>;

    async fn find_message_by_sid(
        &self,
        provider_sid: &str,
    ) -> Result<Option<BroadcastMessage>, DatabaseError>;

    async fn update_status(&self, message_id: i64, update: &DeliveryUpdate)
        -> Result<(), DatabaseError>;

    async fn refresh_counts(&self, broadcast_id: i64) -> Result<(), DatabaseError>;
}
