// Position repository: positions, slots, grants, training results and agreements

use super::queries::position_queries;
use crate::db::DbPool;
use crate::errors::DatabaseError;
use crate::models::Position;
use chrono::{DateTime, Duration, Utc};
use tracing::instrument;

#[derive(Clone)]
pub struct PositionRepository {
    pool: DbPool,
}

impl PositionRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    #[instrument(skip(self))]
    pub async fn find_by_id(&self, id: i64) -> Result<Option<Position>, DatabaseError> {
        let query = format!(
            "SELECT {} FROM position WHERE id = $1",
            position_queries::SELECT_COLUMNS
        );
        let position = sqlx::query_as::<_, Position>(&query)
            .bind(id)
            .fetch_optional(self.pool.pool())
            .await?;

        Ok(position)
    }

    /// Whether the person has been granted the position
    #[instrument(skip(self))]
    pub async fn holds_position(
        &self,
        person_id: i64,
        position_id: i64,
    ) -> Result<bool, DatabaseError> {
        let held: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM person_position
                WHERE person_id = $1 AND position_id = $2
            )
            "#,
        )
        .bind(person_id)
        .bind(position_id)
        .fetch_one(self.pool.pool())
        .await?;

        Ok(held)
    }

    /// Whether the person passed the given training position in `year`
    #[instrument(skip(self))]
    pub async fn passed_training(
        &self,
        person_id: i64,
        training_position_id: i64,
        year: i32,
    ) -> Result<bool, DatabaseError> {
        let passed: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM trainee_status
                WHERE person_id = $1 AND position_id = $2 AND year = $3 AND passed
            )
            "#,
        )
        .bind(person_id)
        .bind(training_position_id)
        .bind(year)
        .fetch_one(self.pool.pool())
        .await?;

        Ok(passed)
    }

    /// Per-event agreements: (sandman affidavit, motor pool agreement)
    #[instrument(skip(self))]
    pub async fn event_agreements(
        &self,
        person_id: i64,
        year: i32,
    ) -> Result<(bool, bool), DatabaseError> {
        let row: Option<(bool, bool)> = sqlx::query_as(
            r#"
            SELECT sandman_affidavit, signed_motorpool_agreement
            FROM person_event
            WHERE person_id = $1 AND year = $2
            "#,
        )
        .bind(person_id)
        .bind(year)
        .fetch_optional(self.pool.pool())
        .await?;

        Ok(row.unwrap_or((false, false)))
    }

    /// Has the person ever worked a position counting as burn perimeter
    #[instrument(skip(self))]
    pub async fn has_burn_perimeter_experience(
        &self,
        person_id: i64,
    ) -> Result<bool, DatabaseError> {
        let worked: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM timesheet t
                JOIN position p ON p.id = t.position_id
                WHERE t.person_id = $1 AND p.counts_as_burn_perimeter AND t.off_duty IS NOT NULL
            )
            "#,
        )
        .bind(person_id)
        .fetch_one(self.pool.pool())
        .await?;

        Ok(worked)
    }

    /// Signed up for a slot of the position overlapping `now ± window`
    #[instrument(skip(self))]
    pub async fn signed_up_near(
        &self,
        person_id: i64,
        position_id: i64,
        now: DateTime<Utc>,
        window: Duration,
    ) -> Result<bool, DatabaseError> {
        let signed_up: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM person_slot ps
                JOIN slot s ON s.id = ps.slot_id
                WHERE ps.person_id = $1
                  AND s.position_id = $2
                  AND s.begins <= $4
                  AND s.ends >= $3
            )
            "#,
        )
        .bind(person_id)
        .bind(position_id)
        .bind(now - window)
        .bind(now + window)
        .fetch_one(self.pool.pool())
        .await?;

        Ok(signed_up)
    }
}
