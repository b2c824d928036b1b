use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row};

use leadline_core::domain::attempt::{
    AttemptId, AttemptStatus, AttemptTransition, EngagementAttempt, TransitionId,
};
use leadline_core::domain::event::ContactId;

use super::{AttemptRepository, RepositoryError};
use crate::DbPool;

pub struct SqlAttemptRepository {
    pool: DbPool,
}

impl SqlAttemptRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl AttemptRepository for SqlAttemptRepository {
    async fn find_by_id(
        &self,
        id: &AttemptId,
    ) -> Result<Option<EngagementAttempt>, RepositoryError> {
        let row = sqlx::query(
            "SELECT
                id,
                contact_id,
                lead_source,
                status,
                call_id,
                window_key,
                cancel_requested,
                failure_reason,
                sms_fallback_sent,
                sms_fallback_date,
                sms_fallback_reason,
                state_version,
                created_at,
                outcome_at,
                updated_at
             FROM engagement_attempt
             WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(attempt_from_row).transpose()
    }

    async fn save(&self, attempt: EngagementAttempt) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO engagement_attempt (
                id,
                contact_id,
                lead_source,
                status,
                call_id,
                window_key,
                cancel_requested,
                failure_reason,
                sms_fallback_sent,
                sms_fallback_date,
                sms_fallback_reason,
                state_version,
                created_at,
                outcome_at,
                updated_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                contact_id = excluded.contact_id,
                lead_source = excluded.lead_source,
                status = excluded.status,
                call_id = excluded.call_id,
                window_key = excluded.window_key,
                cancel_requested = excluded.cancel_requested,
                failure_reason = excluded.failure_reason,
                sms_fallback_sent = excluded.sms_fallback_sent,
                sms_fallback_date = excluded.sms_fallback_date,
                sms_fallback_reason = excluded.sms_fallback_reason,
                state_version = excluded.state_version,
                outcome_at = excluded.outcome_at,
                updated_at = excluded.updated_at",
        )
        .bind(&attempt.id.0)
        .bind(&attempt.contact_id.0)
        .bind(attempt.lead_source.as_deref())
        .bind(attempt.status.as_str())
        .bind(attempt.call_id.as_deref())
        .bind(&attempt.window_key)
        .bind(i64::from(attempt.cancel_requested))
        .bind(attempt.failure_reason.as_deref())
        .bind(i64::from(attempt.sms_fallback_sent))
        .bind(attempt.sms_fallback_date.map(|value| value.to_rfc3339()))
        .bind(attempt.sms_fallback_reason.as_deref())
        .bind(i64::from(attempt.state_version))
        .bind(attempt.created_at.to_rfc3339())
        .bind(attempt.outcome_at.map(|value| value.to_rfc3339()))
        .bind(attempt.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn append_transition(
        &self,
        transition: AttemptTransition,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO attempt_transition_audit (
                id,
                attempt_id,
                contact_id,
                from_status,
                to_status,
                reason,
                correlation_id,
                state_version,
                occurred_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&transition.id.0)
        .bind(&transition.attempt_id.0)
        .bind(&transition.contact_id.0)
        .bind(transition.from_status.as_ref().map(AttemptStatus::as_str))
        .bind(transition.to_status.as_str())
        .bind(&transition.reason)
        .bind(&transition.correlation_id)
        .bind(i64::from(transition.state_version))
        .bind(transition.occurred_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_transitions(
        &self,
        attempt_id: &AttemptId,
    ) -> Result<Vec<AttemptTransition>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT
                id,
                attempt_id,
                contact_id,
                from_status,
                to_status,
                reason,
                correlation_id,
                state_version,
                occurred_at
             FROM attempt_transition_audit
             WHERE attempt_id = ?
             ORDER BY occurred_at ASC, state_version ASC",
        )
        .bind(&attempt_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(transition_from_row).collect()
    }

    async fn request_cancel(&self, contact_id: &ContactId) -> Result<u64, RepositoryError> {
        let result = sqlx::query(
            "UPDATE engagement_attempt
             SET cancel_requested = 1
             WHERE contact_id = ? AND status NOT IN ('completed', 'cancelled')",
        )
        .bind(&contact_id.0)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn cancel_requested(&self, attempt_id: &AttemptId) -> Result<bool, RepositoryError> {
        let row = sqlx::query("SELECT cancel_requested FROM engagement_attempt WHERE id = ?")
            .bind(&attempt_id.0)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|row| row.get::<i64, _>("cancel_requested") != 0).unwrap_or(false))
    }
}

fn attempt_from_row(row: SqliteRow) -> Result<EngagementAttempt, RepositoryError> {
    let status_raw = row.try_get::<String, _>("status")?;
    let status = AttemptStatus::parse(&status_raw).ok_or_else(|| {
        RepositoryError::Decode(format!("unknown attempt status `{status_raw}`"))
    })?;

    Ok(EngagementAttempt {
        id: AttemptId(row.try_get("id")?),
        contact_id: ContactId(row.try_get("contact_id")?),
        lead_source: row.try_get("lead_source")?,
        status,
        call_id: row.try_get("call_id")?,
        window_key: row.try_get("window_key")?,
        cancel_requested: row.try_get::<i64, _>("cancel_requested")? != 0,
        failure_reason: row.try_get("failure_reason")?,
        sms_fallback_sent: row.try_get::<i64, _>("sms_fallback_sent")? != 0,
        sms_fallback_date: parse_optional_timestamp(
            "sms_fallback_date",
            row.try_get("sms_fallback_date")?,
        )?,
        sms_fallback_reason: row.try_get("sms_fallback_reason")?,
        state_version: parse_u32("state_version", row.try_get("state_version")?)?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        outcome_at: parse_optional_timestamp("outcome_at", row.try_get("outcome_at")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
    })
}

fn transition_from_row(row: SqliteRow) -> Result<AttemptTransition, RepositoryError> {
    let from_status = row
        .try_get::<Option<String>, _>("from_status")?
        .map(|value| {
            AttemptStatus::parse(&value)
                .ok_or_else(|| RepositoryError::Decode(format!("unknown from_status `{value}`")))
        })
        .transpose()?;

    let to_status_raw = row.try_get::<String, _>("to_status")?;
    let to_status = AttemptStatus::parse(&to_status_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown to_status `{to_status_raw}`")))?;

    Ok(AttemptTransition {
        id: TransitionId(row.try_get("id")?),
        attempt_id: AttemptId(row.try_get("attempt_id")?),
        contact_id: ContactId(row.try_get("contact_id")?),
        from_status,
        to_status,
        reason: row.try_get("reason")?,
        correlation_id: row.try_get("correlation_id")?,
        state_version: parse_u32("state_version", row.try_get("state_version")?)?,
        occurred_at: parse_timestamp("occurred_at", row.try_get("occurred_at")?)?,
    })
}

fn parse_u32(column: &str, value: i64) -> Result<u32, RepositoryError> {
    u32::try_from(value).map_err(|_| {
        RepositoryError::Decode(format!(
            "invalid value for `{column}` (expected non-negative u32): {value}"
        ))
    })
}

fn parse_timestamp(column: &str, value: String) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(&value).map(|timestamp| timestamp.with_timezone(&Utc)).map_err(
        |error| {
            RepositoryError::Decode(format!("invalid timestamp in `{column}`: `{value}` ({error})"))
        },
    )
}

fn parse_optional_timestamp(
    column: &str,
    value: Option<String>,
) -> Result<Option<DateTime<Utc>>, RepositoryError> {
    value.map(|timestamp| parse_timestamp(column, timestamp)).transpose()
}
