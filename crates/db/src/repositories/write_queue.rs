use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row};

use leadline_core::domain::attempt::AttemptId;
use leadline_core::domain::event::ContactId;
use leadline_core::write_queue::{WriteTask, WriteTaskId, WriteTaskState};

use super::{RepositoryError, WriteQueueRepository};
use crate::DbPool;

pub struct SqlWriteQueueRepository {
    pool: DbPool,
}

impl SqlWriteQueueRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl WriteQueueRepository for SqlWriteQueueRepository {
    async fn find_task_by_id(
        &self,
        id: &WriteTaskId,
    ) -> Result<Option<WriteTask>, RepositoryError> {
        let row = sqlx::query(
            "SELECT
                id,
                attempt_id,
                contact_id,
                operation_kind,
                payload_json,
                idempotency_key,
                state,
                retry_count,
                max_retries,
                available_at,
                claimed_by,
                claimed_at,
                last_error,
                result_fingerprint,
                correlation_id,
                state_version,
                created_at,
                updated_at
             FROM crm_write_task
             WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(task_from_row).transpose()
    }

    async fn save_task(&self, task: WriteTask) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO crm_write_task (
                id,
                attempt_id,
                contact_id,
                operation_kind,
                payload_json,
                idempotency_key,
                state,
                retry_count,
                max_retries,
                available_at,
                claimed_by,
                claimed_at,
                last_error,
                result_fingerprint,
                correlation_id,
                state_version,
                created_at,
                updated_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                attempt_id = excluded.attempt_id,
                contact_id = excluded.contact_id,
                operation_kind = excluded.operation_kind,
                payload_json = excluded.payload_json,
                idempotency_key = excluded.idempotency_key,
                state = excluded.state,
                retry_count = excluded.retry_count,
                max_retries = excluded.max_retries,
                available_at = excluded.available_at,
                claimed_by = excluded.claimed_by,
                claimed_at = excluded.claimed_at,
                last_error = excluded.last_error,
                result_fingerprint = excluded.result_fingerprint,
                correlation_id = excluded.correlation_id,
                state_version = excluded.state_version,
                updated_at = excluded.updated_at",
        )
        .bind(&task.id.0)
        .bind(&task.attempt_id.0)
        .bind(&task.contact_id.0)
        .bind(&task.operation_kind)
        .bind(&task.payload_json)
        .bind(&task.idempotency_key)
        .bind(task.state.as_str())
        .bind(i64::from(task.retry_count))
        .bind(i64::from(task.max_retries))
        .bind(task.available_at.to_rfc3339())
        .bind(task.claimed_by.as_deref())
        .bind(task.claimed_at.map(|value| value.to_rfc3339()))
        .bind(task.last_error.as_deref())
        .bind(task.result_fingerprint.as_deref())
        .bind(&task.correlation_id)
        .bind(i64::from(task.state_version))
        .bind(task.created_at.to_rfc3339())
        .bind(task.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_due_tasks(
        &self,
        now: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<WriteTask>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT
                id,
                attempt_id,
                contact_id,
                operation_kind,
                payload_json,
                idempotency_key,
                state,
                retry_count,
                max_retries,
                available_at,
                claimed_by,
                claimed_at,
                last_error,
                result_fingerprint,
                correlation_id,
                state_version,
                created_at,
                updated_at
             FROM crm_write_task
             WHERE state IN ('queued', 'retryable_failed') AND available_at <= ?
             ORDER BY available_at ASC, created_at ASC
             LIMIT ?",
        )
        .bind(now.to_rfc3339())
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(task_from_row).collect()
    }

    async fn list_running_tasks(&self, limit: u32) -> Result<Vec<WriteTask>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT
                id,
                attempt_id,
                contact_id,
                operation_kind,
                payload_json,
                idempotency_key,
                state,
                retry_count,
                max_retries,
                available_at,
                claimed_by,
                claimed_at,
                last_error,
                result_fingerprint,
                correlation_id,
                state_version,
                created_at,
                updated_at
             FROM crm_write_task
             WHERE state = 'running'
             ORDER BY claimed_at ASC
             LIMIT ?",
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(task_from_row).collect()
    }
}

fn task_from_row(row: SqliteRow) -> Result<WriteTask, RepositoryError> {
    let state_raw = row.try_get::<String, _>("state")?;
    let state = WriteTaskState::parse(&state_raw).ok_or_else(|| {
        RepositoryError::Decode(format!("unknown write task state `{state_raw}`"))
    })?;

    Ok(WriteTask {
        id: WriteTaskId(row.try_get("id")?),
        attempt_id: AttemptId(row.try_get("attempt_id")?),
        contact_id: ContactId(row.try_get("contact_id")?),
        operation_kind: row.try_get("operation_kind")?,
        payload_json: row.try_get("payload_json")?,
        idempotency_key: row.try_get("idempotency_key")?,
        state,
        retry_count: parse_u32("retry_count", row.try_get("retry_count")?)?,
        max_retries: parse_u32("max_retries", row.try_get("max_retries")?)?,
        available_at: parse_timestamp("available_at", row.try_get("available_at")?)?,
        claimed_by: row.try_get("claimed_by")?,
        claimed_at: parse_optional_timestamp("claimed_at", row.try_get("claimed_at")?)?,
        last_error: row.try_get("last_error")?,
        result_fingerprint: row.try_get("result_fingerprint")?,
        correlation_id: row.try_get("correlation_id")?,
        state_version: parse_u32("state_version", row.try_get("state_version")?)?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
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

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, Utc};

    use leadline_core::domain::attempt::{AttemptId, EngagementAttempt};
    use leadline_core::domain::event::ContactId;
    use leadline_core::write_queue::{WriteQueueConfig, WriteQueueEngine, WriteTaskState};

    use super::SqlWriteQueueRepository;
    use crate::migrations;
    use crate::repositories::{AttemptRepository, SqlAttemptRepository, WriteQueueRepository};
    use crate::{connect_with_settings, DbPool};

    #[tokio::test]
    async fn write_task_round_trips_through_sqlite() {
        let pool = setup_pool().await;
        insert_attempt(&pool, "attempt-1", "c-1").await;

        let repo = SqlWriteQueueRepository::new(pool.clone());
        let engine = WriteQueueEngine::new();
        let task = engine.create_task(
            AttemptId("attempt-1".to_string()),
            ContactId("c-1".to_string()),
            "crm_field_write",
            "{\"customFields\":[]}",
            "corr-1",
        );

        repo.save_task(task.clone()).await.expect("save task");

        let found = repo.find_task_by_id(&task.id).await.expect("find task");
        assert_eq!(found, Some(task));

        pool.close().await;
    }

    #[tokio::test]
    async fn due_listing_respects_backoff_availability() {
        let pool = setup_pool().await;
        insert_attempt(&pool, "attempt-1", "c-1").await;

        let repo = SqlWriteQueueRepository::new(pool.clone());
        let engine = WriteQueueEngine::with_config(WriteQueueConfig {
            retry_base_delay_seconds: 3600,
            ..Default::default()
        });

        let ready = engine.create_task(
            AttemptId("attempt-1".to_string()),
            ContactId("c-1".to_string()),
            "crm_field_write",
            "{}",
            "corr-1",
        );
        repo.save_task(ready.clone()).await.expect("save ready task");

        // A failed task backs off an hour; it must not show up as due now.
        let claimed = engine
            .claim_task(
                engine.create_task(
                    AttemptId("attempt-1".to_string()),
                    ContactId("c-1".to_string()),
                    "fallback_note",
                    "{}",
                    "corr-2",
                ),
                "worker-1",
            )
            .expect("claim");
        let backing_off = engine
            .fail_task(claimed, "http 502", leadline_core::write_queue::RetryPolicy::Retry)
            .expect("fail");
        repo.save_task(backing_off.clone()).await.expect("save backing off task");

        let due = repo.list_due_tasks(Utc::now(), 10).await.expect("list due");
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].id, ready.id);

        let later = Utc::now() + Duration::seconds(3700);
        let due_later = repo.list_due_tasks(later, 10).await.expect("list due later");
        assert_eq!(due_later.len(), 2);
        assert_eq!(backing_off.state, WriteTaskState::RetryableFailed);

        pool.close().await;
    }

    #[tokio::test]
    async fn running_listing_surfaces_claimed_tasks() {
        let pool = setup_pool().await;
        insert_attempt(&pool, "attempt-1", "c-1").await;

        let repo = SqlWriteQueueRepository::new(pool.clone());
        let engine = WriteQueueEngine::new();

        let queued = engine.create_task(
            AttemptId("attempt-1".to_string()),
            ContactId("c-1".to_string()),
            "crm_field_write",
            "{}",
            "corr-1",
        );
        repo.save_task(queued.clone()).await.expect("save queued task");

        let claimed = engine
            .claim_task(
                engine.create_task(
                    AttemptId("attempt-1".to_string()),
                    ContactId("c-1".to_string()),
                    "fallback_note",
                    "{}",
                    "corr-2",
                ),
                "worker-1",
            )
            .expect("claim");
        repo.save_task(claimed.clone()).await.expect("save claimed task");

        let running = repo.list_running_tasks(10).await.expect("list running");
        assert_eq!(running.len(), 1);
        assert_eq!(running[0].id, claimed.id);
        assert_eq!(running[0].state, WriteTaskState::Running);

        pool.close().await;
    }

    async fn setup_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:?cache=shared", 1, 30)
            .await
            .expect("connect test pool");
        migrations::run_pending(&pool).await.expect("run migrations");
        pool
    }

    async fn insert_attempt(pool: &DbPool, attempt_id: &str, contact_id: &str) {
        let repo = SqlAttemptRepository::new(pool.clone());
        let attempt = EngagementAttempt::new(
            AttemptId(attempt_id.to_string()),
            ContactId(contact_id.to_string()),
            None,
            "w100".to_string(),
            parse_ts("2026-03-01T10:00:00Z"),
        );
        repo.save(attempt).await.expect("insert attempt");
    }

    fn parse_ts(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value).expect("valid rfc3339").with_timezone(&Utc)
    }
}
