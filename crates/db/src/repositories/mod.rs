use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use leadline_core::domain::attempt::{
    AttemptId, AttemptTransition, ContactClaim, EngagementAttempt,
};
use leadline_core::domain::event::{ContactId, LeadEvent};
use leadline_core::write_queue::{WriteTask, WriteTaskId};

pub mod attempt;
pub mod claim;
pub mod event_ledger;
pub mod memory;
pub mod write_queue;

pub use attempt::SqlAttemptRepository;
pub use claim::SqlContactClaimRepository;
pub use event_ledger::SqlEventLedgerRepository;
pub use memory::{
    InMemoryAttemptRepository, InMemoryContactClaimRepository, InMemoryEventLedgerRepository,
    InMemoryWriteQueueRepository,
};
pub use write_queue::SqlWriteQueueRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

/// Duplicate-delivery guard for webhook events.
#[async_trait]
pub trait EventLedgerRepository: Send + Sync {
    /// Records the event id atomically. Returns true when this delivery is
    /// the first one seen, false for a duplicate.
    async fn record_if_new(
        &self,
        event: &LeadEvent,
        expires_at: DateTime<Utc>,
    ) -> Result<bool, RepositoryError>;

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, RepositoryError>;
}

/// Atomic per-contact claim for one campaign window.
#[async_trait]
pub trait ContactClaimRepository: Send + Sync {
    /// Attempts to take the claim. Returns true when this caller won the
    /// insert race, false when the contact is already claimed.
    async fn try_claim(&self, claim: &ContactClaim) -> Result<bool, RepositoryError>;

    async fn release(
        &self,
        contact_id: &ContactId,
        window_key: &str,
    ) -> Result<(), RepositoryError>;

    async fn find(
        &self,
        contact_id: &ContactId,
        window_key: &str,
    ) -> Result<Option<ContactClaim>, RepositoryError>;
}

#[async_trait]
pub trait AttemptRepository: Send + Sync {
    async fn find_by_id(&self, id: &AttemptId)
        -> Result<Option<EngagementAttempt>, RepositoryError>;

    async fn save(&self, attempt: EngagementAttempt) -> Result<(), RepositoryError>;

    async fn append_transition(
        &self,
        transition: AttemptTransition,
    ) -> Result<(), RepositoryError>;

    async fn list_transitions(
        &self,
        attempt_id: &AttemptId,
    ) -> Result<Vec<AttemptTransition>, RepositoryError>;

    /// Sets the cancellation flag on every non-terminal attempt for the
    /// contact. Returns the number of attempts flagged.
    async fn request_cancel(&self, contact_id: &ContactId) -> Result<u64, RepositoryError>;

    async fn cancel_requested(&self, attempt_id: &AttemptId) -> Result<bool, RepositoryError>;
}

#[async_trait]
pub trait WriteQueueRepository: Send + Sync {
    async fn find_task_by_id(
        &self,
        id: &WriteTaskId,
    ) -> Result<Option<WriteTask>, RepositoryError>;

    async fn save_task(&self, task: WriteTask) -> Result<(), RepositoryError>;

    /// Tasks ready to run: queued or retryable with available_at in the past.
    async fn list_due_tasks(
        &self,
        now: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<WriteTask>, RepositoryError>;

    /// Running tasks, oldest claim first. The queue worker filters these
    /// for stale claims left behind by a crashed process.
    async fn list_running_tasks(&self, limit: u32) -> Result<Vec<WriteTask>, RepositoryError>;
}
