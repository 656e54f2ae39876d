// Person repository: roster lookups, SMS number state and alert preferences

use super::queries::person_queries;
use crate::db::DbPool;
use crate::errors::DatabaseError;
use crate::models::{AlertPreference, Person};
use tracing::instrument;

/// Repository for person-related database operations
#[derive(Clone)]
pub struct PersonRepository {
    pool: DbPool,
}

impl PersonRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    #[instrument(skip(self))]
    pub async fn find_by_id(&self, id: i64) -> Result<Option<Person>, DatabaseError> {
        let query = format!(
            "SELECT {} FROM person WHERE id = $1",
            person_queries::SELECT_COLUMNS
        );
        let person = sqlx::query_as::<_, Person>(&query)
            .bind(id)
            .fetch_optional(self.pool.pool())
            .await?;

        Ok(person)
    }

    /// Everyone who registered `number` as either their on- or off-playa number
    #[instrument(skip(self, number))]
    pub async fn find_by_sms_number(&self, number: &str) -> Result<Vec<Person>, DatabaseError> {
        let query = format!(
            "SELECT {} FROM person WHERE sms_on_playa = $1 OR sms_off_playa = $1 ORDER BY id",
            person_queries::SELECT_COLUMNS
        );
        let people = sqlx::query_as::<_, Person>(&query)
            .bind(number)
            .fetch_all(self.pool.pool())
            .await?;

        Ok(people)
    }

    /// Persist every SMS column of `person`
    #[instrument(skip(self, person), fields(person_id = person.id))]
    pub async fn save_sms_state(&self, person: &Person) -> Result<(), DatabaseError> {
        let result = sqlx::query(
            r#"
            UPDATE person
            SET sms_on_playa = $2,
                sms_off_playa = $3,
                sms_on_playa_verified = $4,
                sms_off_playa_verified = $5,
                sms_on_playa_stopped = $6,
                sms_off_playa_stopped = $7,
                sms_on_playa_code = $8,
                sms_off_playa_code = $9,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(person.id)
        .bind(&person.sms_on_playa)
        .bind(&person.sms_off_playa)
        .bind(person.sms_on_playa_verified)
        .bind(person.sms_off_playa_verified)
        .bind(person.sms_on_playa_stopped)
        .bind(person.sms_off_playa_stopped)
        .bind(&person.sms_on_playa_code)
        .bind(&person.sms_off_playa_code)
        .execute(self.pool.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!("Person {} not found", person.id)));
        }

        tracing::debug!(person_id = person.id, "Saved SMS state");
        Ok(())
    }

    /// Set or clear the stopped flag on every column holding `number`.
    /// Returns the number of people touched.
    #[instrument(skip(self, number))]
    pub async fn set_stopped_by_number(
        &self,
        number: &str,
        stopped: bool,
    ) -> Result<u64, DatabaseError> {
        let result = sqlx::query(
            r#"
            UPDATE person
            SET sms_on_playa_stopped = CASE WHEN sms_on_playa = $1 THEN $2 ELSE sms_on_playa_stopped END,
                sms_off_playa_stopped = CASE WHEN sms_off_playa = $1 THEN $2 ELSE sms_off_playa_stopped END,
                updated_at = NOW()
            WHERE sms_on_playa = $1 OR sms_off_playa = $1
            "#,
        )
        .bind(number)
        .bind(stopped)
        .execute(self.pool.pool())
        .await?;

        tracing::info!(
            stopped = stopped,
            people = result.rows_affected(),
            "Updated SMS stop flag"
        );
        Ok(result.rows_affected())
    }

    #[instrument(skip(self))]
    pub async fn alert_preferences(
        &self,
        person_id: i64,
    ) -> Result<Vec<AlertPreference>, DatabaseError> {
        let prefs = sqlx::query_as::<_, AlertPreference>(
            r#"
            SELECT person_id, alert_id, use_sms, use_email
            FROM alert_person
            WHERE person_id = $1
            ORDER BY alert_id
            "#,
        )
        .bind(person_id)
        .fetch_all(self.pool.pool())
        .await?;

        Ok(prefs)
    }

    #[instrument(skip(self))]
    pub async fn set_alert_preference(&self, pref: &AlertPreference) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            INSERT INTO alert_person (person_id, alert_id, use_sms, use_email)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (person_id, alert_id)
            DO UPDATE SET use_sms = EXCLUDED.use_sms, use_email = EXCLUDED.use_email
            "#,
        )
        .bind(pref.person_id)
        .bind(pref.alert_id)
        .bind(pref.use_sms)
        .bind(pref.use_email)
        .execute(self.pool.pool())
        .await?;

        Ok(())
    }
}
