// SMS store over the person and broadcast repositories

use super::{BroadcastRepository, PersonRepository};
use crate::broadcast::store::BroadcastStore;
use crate::db::DbPool;
use crate::errors::DatabaseError;
use crate::models::{BroadcastMessage, DeliveryUpdate, NewBroadcastMessage, Person};
use crate::sms::SmsStore;
use async_trait::async_trait;

#[derive(Clone)]
pub struct SmsRepository {
    people: PersonRepository,
    messages: BroadcastRepository,
}

impl SmsRepository {
    pub fn new(pool: DbPool) -> Self {
        Self {
            people: PersonRepository::new(pool.clone()),
            messages: BroadcastRepository::new(pool),
        }
    }
}

#[async_trait]
impl SmsStore for SmsRepository {
    async fn find_person(&self, id: i64) -> Result<Option<Person>, DatabaseError> {
        self.people.find_by_id(id).await
    }

    async fn find_people_by_number(&self, number: &str) -> Result<Vec<Person>, DatabaseError> {
        self.people.find_by_sms_number(number).await
    }

    async fn save_sms_state(&self, person: &Person) -> Result<(), DatabaseError> {
        self.people.save_sms_state(person).await
    }

    async fn set_stopped_by_number(
        &self,
        number: &str,
        stopped: bool,
    ) -> Result<u64, DatabaseError> {
        self.people.set_stopped_by_number(number, stopped).await
    }

    async fn insert_message(&self, message: &NewBroadcastMessage) -> Result<i64, DatabaseError> {
        BroadcastStore::insert_message(&self.messages, message).await
    }

    async fn find_message_by_sid(
        &self,
        provider_sid: &str,
    ) -> Result<Option<BroadcastMessage>, DatabaseError> {
        self.messages.find_message_by_sid(provider_sid).await
    }

    async fn update_status(
        &self,
        message_id: i64,
        update: &DeliveryUpdate,
    ) -> Result<(), DatabaseError> {
        self.messages.update_status(message_id, update).await
    }

    async fn refresh_counts(&self, broadcast_id: i64) -> Result<(), DatabaseError> {
        BroadcastStore::refresh_counts(&self.messages, broadcast_id, false).await
    }
}
