use chrono::{DateTime, Utc};

use leadline_core::domain::event::LeadEvent;

use super::{EventLedgerRepository, RepositoryError};
use crate::DbPool;

pub struct SqlEventLedgerRepository {
    pool: DbPool,
}

impl SqlEventLedgerRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl EventLedgerRepository for SqlEventLedgerRepository {
    async fn record_if_new(
        &self,
        event: &LeadEvent,
        expires_at: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        // INSERT OR IGNORE makes the dedup check and the record atomic; a
        // duplicate delivery touches zero rows.
        let result = sqlx::query(
            "INSERT OR IGNORE INTO lead_event_ledger (
                event_id,
                event_type,
                location_id,
                contact_id,
                received_at,
                expires_at
             ) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&event.event_id.0)
        .bind(event.event_type.as_str())
        .bind(&event.location_id)
        .bind(event.contact_id.as_ref().map(|id| id.0.as_str()))
        .bind(event.received_at.to_rfc3339())
        .bind(expires_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let result = sqlx::query("DELETE FROM lead_event_ledger WHERE expires_at <= ?")
            .bind(now.to_rfc3339())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}
