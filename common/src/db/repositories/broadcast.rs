// Broadcast repository: recipients, broadcasts, delivery log and in-app messages

use super::person::PersonRepository;
use super::queries::broadcast_queries;
use crate::broadcast::recipients::{Candidate, CandidateQuery};
use crate::broadcast::store::BroadcastStore;
use crate::db::DbPool;
use crate::errors::DatabaseError;
use crate::models::{
    Broadcast, BroadcastMessage, DeliveryUpdate, MessageFilter, MessageLogEntry, MessageStatus,
    NewBroadcast, NewBroadcastMessage, NewPersonMessage, Slot, StatusCount,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Postgres, QueryBuilder};
use tracing::instrument;

/// Upper bound on messages picked up by one retry sweep
const DUE_BATCH_SIZE: i64 = 500;

#[derive(sqlx::FromRow)]
struct SlotWithTitle {
    #[sqlx(flatten)]
    slot: Slot,
    position_title: String,
}

fn retryable_statuses() -> Vec<String> {
    MessageStatus::ALL
        .iter()
        .filter(|s| s.is_retryable())
        .map(|s| s.to_string())
        .collect()
}

fn failed_statuses() -> Vec<String> {
    MessageStatus::ALL
        .iter()
        .filter(|s| s.is_retryable() || s.is_final_failure())
        .map(|s| s.to_string())
        .collect()
}

#[derive(Clone)]
pub struct BroadcastRepository {
    pool: DbPool,
}

impl BroadcastRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    #[instrument(skip(self))]
    pub async fn find_message_by_sid(
        &self,
        provider_sid: &str,
    ) -> Result<Option<BroadcastMessage>, DatabaseError> {
        let query = format!(
            "SELECT {} FROM broadcast_message WHERE provider_sid = $1",
            broadcast_queries::SELECT_MESSAGE_COLUMNS
        );
        let message = sqlx::query_as::<_, BroadcastMessage>(&query)
            .bind(provider_sid)
            .fetch_optional(self.pool.pool())
            .await?;

        Ok(message)
    }

    /// Apply a provider status callback without counting a new attempt
    #[instrument(skip(self, update), fields(status = %update.status))]
    pub async fn update_status(
        &self,
        message_id: i64,
        update: &DeliveryUpdate,
    ) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            UPDATE broadcast_message
            SET status = $2,
                provider_sid = COALESCE($3, provider_sid),
                error = COALESCE($4, error),
                next_retry_at = $5,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(message_id)
        .bind(update.status.as_str())
        .bind(&update.provider_sid)
        .bind(&update.error)
        .bind(update.next_retry_at)
        .execute(self.pool.pool())
        .await?;

        Ok(())
    }
}

#[async_trait]
impl BroadcastStore for BroadcastRepository {
    #[instrument(skip(self, query), fields(alert = %query.alert))]
    async fn candidates(&self, query: &CandidateQuery) -> Result<Vec<Candidate>, DatabaseError> {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
            r#"
            SELECT p.id, p.callsign, p.status, p.email, p.on_site,
                   p.sms_on_playa, p.sms_off_playa,
                   p.sms_on_playa_verified, p.sms_off_playa_verified,
                   p.sms_on_playa_stopped, p.sms_off_playa_stopped,
                   ap.use_sms, ap.use_email,
                   EXISTS (
                       SELECT 1 FROM timesheet t
                       WHERE t.person_id = p.id AND t.off_duty IS NULL
                   ) AS on_duty,
                   EXISTS (
                       SELECT 1 FROM person_slot ps
                       JOIN slot s ON s.id = ps.slot_id
                       WHERE ps.person_id = p.id AND s.begins >= "#,
        );
        builder.push_bind(query.year_start);
        builder.push(" AND s.begins < ");
        builder.push_bind(query.year_end);
        builder.push(
            r#"
                   ) AS signed_up,
                   EXISTS (
                       SELECT 1 FROM trainee_status ts
                       WHERE ts.person_id = p.id AND ts.passed AND ts.position_id = "#,
        );
        builder.push_bind(query.training_position_id);
        builder.push(" AND ts.year = ");
        builder.push_bind(query.year);
        builder.push(
            r#"
                   ) AS trained
            FROM person p
            LEFT JOIN alert_person ap ON ap.person_id = p.id AND ap.alert_id = "#,
        );
        builder.push_bind(query.alert.id());
        builder.push(" WHERE p.user_authorized");

        if !query.statuses.is_empty() {
            let statuses: Vec<String> = query.statuses.iter().map(|s| s.to_string()).collect();
            builder.push(" AND p.status = ANY(");
            builder.push_bind(statuses);
            builder.push(")");
        }
        if let Some(position_id) = query.position_id {
            builder.push(
                " AND EXISTS (SELECT 1 FROM person_position pp WHERE pp.person_id = p.id AND pp.position_id = ",
            );
            builder.push_bind(position_id);
            builder.push(")");
        }
        if let Some(slot_id) = query.slot_id {
            builder.push(
                " AND EXISTS (SELECT 1 FROM person_slot sp WHERE sp.person_id = p.id AND sp.slot_id = ",
            );
            builder.push_bind(slot_id);
            builder.push(")");
        }
        if query.on_duty_only {
            builder.push(
                " AND EXISTS (SELECT 1 FROM timesheet ot WHERE ot.person_id = p.id AND ot.off_duty IS NULL)",
            );
        }
        builder.push(" ORDER BY p.callsign");

        let candidates = builder
            .build_query_as::<Candidate>()
            .fetch_all(self.pool.pool())
            .await?;

        tracing::debug!(count = candidates.len(), "Loaded broadcast candidates");
        Ok(candidates)
    }

    #[instrument(skip(self, broadcast), fields(broadcast_type = %broadcast.broadcast_type))]
    async fn create_broadcast(&self, broadcast: &NewBroadcast) -> Result<Broadcast, DatabaseError> {
        let query = format!(
            r#"
            INSERT INTO broadcast (
                sender_id, type, alert_id, position_id, slot_id, statuses, sender_name,
                sms_message, email_subject, email_message,
                recipient_count, sms_count, email_count, clubhouse_count
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            RETURNING {}
            "#,
            broadcast_queries::SELECT_BROADCAST_COLUMNS
        );
        let created = sqlx::query_as::<_, Broadcast>(&query)
            .bind(broadcast.sender_id)
            .bind(broadcast.broadcast_type.as_str())
            .bind(broadcast.alert_id)
            .bind(broadcast.position_id)
            .bind(broadcast.slot_id)
            .bind(&broadcast.statuses)
            .bind(&broadcast.sender_name)
            .bind(&broadcast.sms_message)
            .bind(&broadcast.email_subject)
            .bind(&broadcast.email_message)
            .bind(broadcast.recipient_count)
            .bind(broadcast.sms_count)
            .bind(broadcast.email_count)
            .bind(broadcast.clubhouse_count)
            .fetch_one(self.pool.pool())
            .await?;

        tracing::info!(
            broadcast_id = created.id,
            recipients = created.recipient_count,
            "Created broadcast"
        );
        Ok(created)
    }

    #[instrument(skip(self))]
    async fn find_broadcast(&self, id: i64) -> Result<Option<Broadcast>, DatabaseError> {
        let query = format!(
            "SELECT {} FROM broadcast WHERE id = $1",
            broadcast_queries::SELECT_BROADCAST_COLUMNS
        );
        let broadcast = sqlx::query_as::<_, Broadcast>(&query)
            .bind(id)
            .fetch_optional(self.pool.pool())
            .await?;

        Ok(broadcast)
    }

    #[instrument(skip(self))]
    async fn list_broadcasts(
        &self,
        since: Option<DateTime<Utc>>,
        limit: i64,
    ) -> Result<Vec<Broadcast>, DatabaseError> {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(format!(
            "SELECT {} FROM broadcast",
            broadcast_queries::SELECT_BROADCAST_COLUMNS
        ));
        if let Some(since) = since {
            builder.push(" WHERE created_at >= ");
            builder.push_bind(since);
        }
        builder.push(" ORDER BY created_at DESC, id DESC LIMIT ");
        builder.push_bind(limit);

        let broadcasts = builder
            .build_query_as::<Broadcast>()
            .fetch_all(self.pool.pool())
            .await?;

        Ok(broadcasts)
    }

    #[instrument(skip(self, message, person_ids), fields(recipients = person_ids.len()))]
    async fn insert_person_messages(
        &self,
        message: &NewPersonMessage,
        person_ids: &[i64],
    ) -> Result<u64, DatabaseError> {
        if person_ids.is_empty() {
            return Ok(0);
        }

        let result = sqlx::query(
            r#"
            INSERT INTO person_message
                (person_id, creator_person_id, message_from, subject, body, broadcast_id)
            SELECT recipient, $2, $3, $4, $5, $6
            FROM UNNEST($1::BIGINT[]) AS recipient
            "#,
        )
        .bind(person_ids)
        .bind(message.creator_person_id)
        .bind(&message.message_from)
        .bind(&message.subject)
        .bind(&message.body)
        .bind(message.broadcast_id)
        .execute(self.pool.pool())
        .await?;

        Ok(result.rows_affected())
    }

    #[instrument(skip(self, message), fields(direction = %message.direction, status = %message.status))]
    async fn insert_message(&self, message: &NewBroadcastMessage) -> Result<i64, DatabaseError> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO broadcast_message (
                broadcast_id, person_id, direction, address_type, address,
                status, message, provider_sid, error, next_retry_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING id
            "#,
        )
        .bind(message.broadcast_id)
        .bind(message.person_id)
        .bind(message.direction.as_str())
        .bind(message.address_type.as_str())
        .bind(&message.address)
        .bind(message.status.as_str())
        .bind(&message.message)
        .bind(&message.provider_sid)
        .bind(&message.error)
        .bind(message.next_retry_at)
        .fetch_one(self.pool.pool())
        .await?;

        Ok(id)
    }

    #[instrument(skip(self, update), fields(status = %update.status))]
    async fn record_attempt(
        &self,
        message_id: i64,
        update: &DeliveryUpdate,
    ) -> Result<(), DatabaseError> {
        let result = sqlx::query(
            r#"
            UPDATE broadcast_message
            SET status = $2,
                provider_sid = COALESCE($3, provider_sid),
                error = $4,
                next_retry_at = $5,
                attempts = attempts + 1,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(message_id)
        .bind(update.status.as_str())
        .bind(&update.provider_sid)
        .bind(&update.error)
        .bind(update.next_retry_at)
        .execute(self.pool.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!(
                "Broadcast message {} not found",
                message_id
            )));
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn retryable_messages(
        &self,
        broadcast_id: i64,
        max_attempts: u32,
    ) -> Result<Vec<BroadcastMessage>, DatabaseError> {
        let query = format!(
            r#"
            SELECT {} FROM broadcast_message
            WHERE broadcast_id = $1
              AND direction = 'outbound'
              AND status = ANY($2)
              AND attempts < $3
            ORDER BY id
            "#,
            broadcast_queries::SELECT_MESSAGE_COLUMNS
        );
        let messages = sqlx::query_as::<_, BroadcastMessage>(&query)
            .bind(broadcast_id)
            .bind(retryable_statuses())
            .bind(max_attempts as i32)
            .fetch_all(self.pool.pool())
            .await?;

        Ok(messages)
    }

    #[instrument(skip(self))]
    async fn due_messages(
        &self,
        now: DateTime<Utc>,
        created_since: DateTime<Utc>,
        max_attempts: u32,
    ) -> Result<Vec<BroadcastMessage>, DatabaseError> {
        let query = format!(
            r#"
            SELECT {} FROM broadcast_message
            WHERE direction = 'outbound'
              AND status = ANY($1)
              AND next_retry_at IS NOT NULL
              AND next_retry_at <= $2
              AND created_at >= $3
              AND attempts < $4
            ORDER BY next_retry_at
            LIMIT $5
            "#,
            broadcast_queries::SELECT_MESSAGE_COLUMNS
        );
        let messages = sqlx::query_as::<_, BroadcastMessage>(&query)
            .bind(retryable_statuses())
            .bind(now)
            .bind(created_since)
            .bind(max_attempts as i32)
            .bind(DUE_BATCH_SIZE)
            .fetch_all(self.pool.pool())
            .await?;

        Ok(messages)
    }

    #[instrument(skip(self))]
    async fn refresh_counts(&self, broadcast_id: i64, retried: bool) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            UPDATE broadcast b
            SET sms_failed = (
                    SELECT COUNT(*) FROM broadcast_message m
                    WHERE m.broadcast_id = b.id AND m.direction = 'outbound'
                      AND m.address_type = 'sms' AND m.status = ANY($2)
                ),
                email_failed = (
                    SELECT COUNT(*) FROM broadcast_message m
                    WHERE m.broadcast_id = b.id AND m.direction = 'outbound'
                      AND m.address_type = 'email' AND m.status = ANY($2)
                ),
                retry_count = retry_count + CASE WHEN $3 THEN 1 ELSE 0 END
            WHERE b.id = $1
            "#,
        )
        .bind(broadcast_id)
        .bind(failed_statuses())
        .bind(retried)
        .execute(self.pool.pool())
        .await?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn messages(
        &self,
        broadcast_id: i64,
        filter: MessageFilter,
    ) -> Result<Vec<MessageLogEntry>, DatabaseError> {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
            r#"
            SELECT m.id, m.broadcast_id, m.person_id, m.direction, m.address_type,
                   m.address, m.status, m.message, m.provider_sid, m.error, m.attempts,
                   m.next_retry_at, m.created_at, m.updated_at, p.callsign
            FROM broadcast_message m
            LEFT JOIN person p ON p.id = m.person_id
            WHERE m.broadcast_id = "#,
        );
        builder.push_bind(broadcast_id);
        if let Some(status) = filter.status {
            builder.push(" AND m.status = ");
            builder.push_bind(status.as_str());
        }
        if let Some(channel) = filter.channel {
            builder.push(" AND m.address_type = ");
            builder.push_bind(channel.as_str());
        }
        builder.push(" ORDER BY p.callsign NULLS LAST, m.id");

        let entries = builder
            .build_query_as::<MessageLogEntry>()
            .fetch_all(self.pool.pool())
            .await?;

        Ok(entries)
    }

    #[instrument(skip(self))]
    async fn status_counts(&self, broadcast_id: i64) -> Result<Vec<StatusCount>, DatabaseError> {
        let counts = sqlx::query_as::<_, StatusCount>(
            r#"
            SELECT address_type, status, COUNT(*) AS count
            FROM broadcast_message
            WHERE broadcast_id = $1
            GROUP BY address_type, status
            ORDER BY address_type, status
            "#,
        )
        .bind(broadcast_id)
        .fetch_all(self.pool.pool())
        .await?;

        Ok(counts)
    }

    #[instrument(skip(self))]
    async fn find_slot(&self, slot_id: i64) -> Result<Option<(Slot, String)>, DatabaseError> {
        let row = sqlx::query_as::<_, SlotWithTitle>(
            r#"
            SELECT s.id, s.position_id, s.description, s.begins, s.ends, s.active, s.max,
                   p.title AS position_title
            FROM slot s
            JOIN position p ON p.id = s.position_id
            WHERE s.id = $1
            "#,
        )
        .bind(slot_id)
        .fetch_optional(self.pool.pool())
        .await?;

        Ok(row.map(|r| (r.slot, r.position_title)))
    }

    async fn stop_number(&self, number: &str) -> Result<u64, DatabaseError> {
        PersonRepository::new(self.pool.clone())
            .set_stopped_by_number(number, true)
            .await
    }
}
