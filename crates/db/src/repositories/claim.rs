use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row};

use leadline_core::domain::attempt::{AttemptId, ContactClaim};
use leadline_core::domain::event::ContactId;

use super::{ContactClaimRepository, RepositoryError};
use crate::DbPool;

pub struct SqlContactClaimRepository {
    pool: DbPool,
}

impl SqlContactClaimRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl ContactClaimRepository for SqlContactClaimRepository {
    async fn try_claim(&self, claim: &ContactClaim) -> Result<bool, RepositoryError> {
        // The (contact_id, window_key) primary key makes this the atomic
        // compare-and-set for exactly-once dispatch.
        let result = sqlx::query(
            "INSERT OR IGNORE INTO contact_claim (
                contact_id,
                window_key,
                attempt_id,
                claimed_at
             ) VALUES (?, ?, ?, ?)",
        )
        .bind(&claim.contact_id.0)
        .bind(&claim.window_key)
        .bind(&claim.attempt_id.0)
        .bind(claim.claimed_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn release(
        &self,
        contact_id: &ContactId,
        window_key: &str,
    ) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM contact_claim WHERE contact_id = ? AND window_key = ?")
            .bind(&contact_id.0)
            .bind(window_key)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn find(
        &self,
        contact_id: &ContactId,
        window_key: &str,
    ) -> Result<Option<ContactClaim>, RepositoryError> {
        let row = sqlx::query(
            "SELECT contact_id, window_key, attempt_id, claimed_at
             FROM contact_claim
             WHERE contact_id = ? AND window_key = ?",
        )
        .bind(&contact_id.0)
        .bind(window_key)
        .fetch_optional(&self.pool)
        .await?;

        row.map(claim_from_row).transpose()
    }
}

fn claim_from_row(row: SqliteRow) -> Result<ContactClaim, RepositoryError> {
    Ok(ContactClaim {
        contact_id: ContactId(row.try_get("contact_id")?),
        window_key: row.try_get("window_key")?,
        attempt_id: AttemptId(row.try_get("attempt_id")?),
        claimed_at: parse_timestamp("claimed_at", row.try_get("claimed_at")?)?,
    })
}

fn parse_timestamp(column: &str, value: String) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(&value).map(|timestamp| timestamp.with_timezone(&Utc)).map_err(
        |error| {
            RepositoryError::Decode(format!("invalid timestamp in `{column}`: `{value}` ({error})"))
        },
    )
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Utc};

    use leadline_core::domain::attempt::{AttemptId, ContactClaim};
    use leadline_core::domain::event::ContactId;

    use super::SqlContactClaimRepository;
    use crate::migrations;
    use crate::repositories::ContactClaimRepository;
    use crate::{connect_with_settings, DbPool};

    #[tokio::test]
    async fn only_the_first_claim_in_a_window_wins() {
        let pool = setup_pool().await;
        let repo = SqlContactClaimRepository::new(pool.clone());

        let claim = sample_claim("c-1", "w100", "attempt-1");
        assert!(repo.try_claim(&claim).await.expect("first claim"));

        let rival = sample_claim("c-1", "w100", "attempt-2");
        assert!(!repo.try_claim(&rival).await.expect("rival claim"));

        let found = repo.find(&claim.contact_id, "w100").await.expect("find claim");
        assert_eq!(found.map(|c| c.attempt_id), Some(AttemptId("attempt-1".to_string())));

        pool.close().await;
    }

    #[tokio::test]
    async fn new_window_allows_a_fresh_claim() {
        let pool = setup_pool().await;
        let repo = SqlContactClaimRepository::new(pool.clone());

        assert!(repo.try_claim(&sample_claim("c-1", "w100", "attempt-1")).await.expect("claim"));
        assert!(repo
            .try_claim(&sample_claim("c-1", "w101", "attempt-2"))
            .await
            .expect("next window claim"));

        pool.close().await;
    }

    #[tokio::test]
    async fn released_claim_can_be_retaken() {
        let pool = setup_pool().await;
        let repo = SqlContactClaimRepository::new(pool.clone());
        let contact_id = ContactId("c-1".to_string());

        assert!(repo.try_claim(&sample_claim("c-1", "w100", "attempt-1")).await.expect("claim"));
        repo.release(&contact_id, "w100").await.expect("release");

        assert!(repo.try_claim(&sample_claim("c-1", "w100", "attempt-2")).await.expect("reclaim"));

        pool.close().await;
    }

    async fn setup_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:?cache=shared", 1, 30)
            .await
            .expect("connect test pool");
        migrations::run_pending(&pool).await.expect("run migrations");
        pool
    }

    fn sample_claim(contact_id: &str, window_key: &str, attempt_id: &str) -> ContactClaim {
        ContactClaim {
            contact_id: ContactId(contact_id.to_string()),
            window_key: window_key.to_string(),
            attempt_id: AttemptId(attempt_id.to_string()),
            claimed_at: parse_ts("2026-03-01T10:00:00Z"),
        }
    }

    fn parse_ts(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value).expect("valid rfc3339").with_timezone(&Utc)
    }
}
