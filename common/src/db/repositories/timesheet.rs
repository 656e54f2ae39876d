// Timesheet repository: on-duty entries

use crate::db::DbPool;
use crate::errors::DatabaseError;
use crate::models::Timesheet;
use chrono::{DateTime, Utc};
use tracing::instrument;

/// An open timesheet together with the title of the position being worked
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct OpenTimesheet {
    #[sqlx(flatten)]
    pub timesheet: Timesheet,
    pub position_title: String,
}

#[derive(Clone)]
pub struct TimesheetRepository {
    pool: DbPool,
}

impl TimesheetRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    #[instrument(skip(self))]
    pub async fn find_by_id(&self, id: i64) -> Result<Option<Timesheet>, DatabaseError> {
        let timesheet = sqlx::query_as::<_, Timesheet>(
            r#"
            SELECT id, person_id, position_id, slot_id, on_duty, off_duty
            FROM timesheet
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(self.pool.pool())
        .await?;

        Ok(timesheet)
    }

    #[instrument(skip(self))]
    pub async fn find_open(&self, person_id: i64) -> Result<Option<OpenTimesheet>, DatabaseError> {
        let open = sqlx::query_as::<_, OpenTimesheet>(
            r#"
            SELECT t.id, t.person_id, t.position_id, t.slot_id, t.on_duty, t.off_duty,
                   p.title AS position_title
            FROM timesheet t
            JOIN position p ON p.id = t.position_id
            WHERE t.person_id = $1 AND t.off_duty IS NULL
            "#,
        )
        .bind(person_id)
        .fetch_optional(self.pool.pool())
        .await?;

        Ok(open)
    }

    /// Start a shift. The partial unique index on open entries rejects a
    /// second concurrent sign-in with a duplicate key error.
    #[instrument(skip(self))]
    pub async fn create(
        &self,
        person_id: i64,
        position_id: i64,
        slot_id: Option<i64>,
        on_duty: DateTime<Utc>,
        created_by: i64,
    ) -> Result<Timesheet, DatabaseError> {
        let timesheet = sqlx::query_as::<_, Timesheet>(
            r#"
            INSERT INTO timesheet (person_id, position_id, slot_id, on_duty, created_by)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, person_id, position_id, slot_id, on_duty, off_duty
            "#,
        )
        .bind(person_id)
        .bind(position_id)
        .bind(slot_id)
        .bind(on_duty)
        .bind(created_by)
        .fetch_one(self.pool.pool())
        .await?;

        tracing::info!(
            timesheet_id = timesheet.id,
            person_id = person_id,
            position_id = position_id,
            "Signed in"
        );
        Ok(timesheet)
    }

    /// End a shift; returns None when the entry was already closed
    #[instrument(skip(self))]
    pub async fn sign_out(
        &self,
        id: i64,
        off_duty: DateTime<Utc>,
    ) -> Result<Option<Timesheet>, DatabaseError> {
        let timesheet = sqlx::query_as::<_, Timesheet>(
            r#"
            UPDATE timesheet
            SET off_duty = $2
            WHERE id = $1 AND off_duty IS NULL
            RETURNING id, person_id, position_id, slot_id, on_duty, off_duty
            "#,
        )
        .bind(id)
        .bind(off_duty)
        .fetch_optional(self.pool.pool())
        .await?;

        if let Some(ref ts) = timesheet {
            tracing::info!(timesheet_id = ts.id, person_id = ts.person_id, "Signed out");
        }
        Ok(timesheet)
    }
}
