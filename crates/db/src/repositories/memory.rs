use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use leadline_core::domain::attempt::{
    AttemptId, AttemptTransition, ContactClaim, EngagementAttempt,
};
use leadline_core::domain::event::{ContactId, LeadEvent};
use leadline_core::write_queue::{WriteTask, WriteTaskId, WriteTaskState};

use super::{
    AttemptRepository, ContactClaimRepository, EventLedgerRepository, RepositoryError,
    WriteQueueRepository,
};

#[derive(Default)]
pub struct InMemoryEventLedgerRepository {
    entries: RwLock<HashMap<String, DateTime<Utc>>>,
}

#[async_trait::async_trait]
impl EventLedgerRepository for InMemoryEventLedgerRepository {
    async fn record_if_new(
        &self,
        event: &LeadEvent,
        expires_at: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let mut entries = self.entries.write().await;
        if entries.contains_key(&event.event_id.0) {
            return Ok(false);
        }
        entries.insert(event.event_id.0.clone(), expires_at);
        Ok(true)
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, expires_at| *expires_at > now);
        Ok((before - entries.len()) as u64)
    }
}

#[derive(Default)]
pub struct InMemoryContactClaimRepository {
    claims: RwLock<HashMap<(String, String), ContactClaim>>,
}

#[async_trait::async_trait]
impl ContactClaimRepository for InMemoryContactClaimRepository {
    async fn try_claim(&self, claim: &ContactClaim) -> Result<bool, RepositoryError> {
        let mut claims = self.claims.write().await;
        let key = (claim.contact_id.0.clone(), claim.window_key.clone());
        if claims.contains_key(&key) {
            return Ok(false);
        }
        claims.insert(key, claim.clone());
        Ok(true)
    }

    async fn release(
        &self,
        contact_id: &ContactId,
        window_key: &str,
    ) -> Result<(), RepositoryError> {
        let mut claims = self.claims.write().await;
        claims.remove(&(contact_id.0.clone(), window_key.to_string()));
        Ok(())
    }

    async fn find(
        &self,
        contact_id: &ContactId,
        window_key: &str,
    ) -> Result<Option<ContactClaim>, RepositoryError> {
        let claims = self.claims.read().await;
        Ok(claims.get(&(contact_id.0.clone(), window_key.to_string())).cloned())
    }
}

#[derive(Default)]
pub struct InMemoryAttemptRepository {
    attempts: RwLock<HashMap<String, EngagementAttempt>>,
    transitions: RwLock<Vec<AttemptTransition>>,
    cancel_flags: RwLock<HashSet<String>>,
}

#[async_trait::async_trait]
impl AttemptRepository for InMemoryAttemptRepository {
    async fn find_by_id(
        &self,
        id: &AttemptId,
    ) -> Result<Option<EngagementAttempt>, RepositoryError> {
        let attempts = self.attempts.read().await;
        Ok(attempts.get(&id.0).cloned())
    }

    async fn save(&self, attempt: EngagementAttempt) -> Result<(), RepositoryError> {
        let mut attempts = self.attempts.write().await;
        attempts.insert(attempt.id.0.clone(), attempt);
        Ok(())
    }

    async fn append_transition(
        &self,
        transition: AttemptTransition,
    ) -> Result<(), RepositoryError> {
        let mut transitions = self.transitions.write().await;
        transitions.push(transition);
        Ok(())
    }

    async fn list_transitions(
        &self,
        attempt_id: &AttemptId,
    ) -> Result<Vec<AttemptTransition>, RepositoryError> {
        let transitions = self.transitions.read().await;
        Ok(transitions
            .iter()
            .filter(|transition| transition.attempt_id == *attempt_id)
            .cloned()
            .collect())
    }

    async fn request_cancel(&self, contact_id: &ContactId) -> Result<u64, RepositoryError> {
        let mut attempts = self.attempts.write().await;
        let mut cancel_flags = self.cancel_flags.write().await;
        let mut flagged = 0;
        for attempt in attempts.values_mut() {
            if attempt.contact_id == *contact_id && !attempt.status.is_terminal() {
                attempt.cancel_requested = true;
                cancel_flags.insert(attempt.id.0.clone());
                flagged += 1;
            }
        }
        Ok(flagged)
    }

    async fn cancel_requested(&self, attempt_id: &AttemptId) -> Result<bool, RepositoryError> {
        let cancel_flags = self.cancel_flags.read().await;
        Ok(cancel_flags.contains(&attempt_id.0))
    }
}

#[derive(Default)]
pub struct InMemoryWriteQueueRepository {
    tasks: RwLock<HashMap<String, WriteTask>>,
}

#[async_trait::async_trait]
impl WriteQueueRepository for InMemoryWriteQueueRepository {
    async fn find_task_by_id(
        &self,
        id: &WriteTaskId,
    ) -> Result<Option<WriteTask>, RepositoryError> {
        let tasks = self.tasks.read().await;
        Ok(tasks.get(&id.0).cloned())
    }

    async fn save_task(&self, task: WriteTask) -> Result<(), RepositoryError> {
        let mut tasks = self.tasks.write().await;
        tasks.insert(task.id.0.clone(), task);
        Ok(())
    }

    async fn list_due_tasks(
        &self,
        now: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<WriteTask>, RepositoryError> {
        let tasks = self.tasks.read().await;
        let mut due: Vec<WriteTask> = tasks
            .values()
            .filter(|task| {
                matches!(task.state, WriteTaskState::Queued | WriteTaskState::RetryableFailed)
                    && task.available_at <= now
            })
            .cloned()
            .collect();
        due.sort_by(|a, b| {
            a.available_at.cmp(&b.available_at).then(a.created_at.cmp(&b.created_at))
        });
        due.truncate(limit as usize);
        Ok(due)
    }

    async fn list_running_tasks(&self, limit: u32) -> Result<Vec<WriteTask>, RepositoryError> {
        let tasks = self.tasks.read().await;
        let mut running: Vec<WriteTask> = tasks
            .values()
            .filter(|task| task.state == WriteTaskState::Running)
            .cloned()
            .collect();
        running.sort_by(|a, b| a.claimed_at.cmp(&b.claimed_at));
        running.truncate(limit as usize);
        Ok(running)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use serde_json::json;

    use leadline_core::domain::attempt::{AttemptId, AttemptStatus, EngagementAttempt};
    use leadline_core::domain::event::{ContactId, EventId, LeadEvent, LeadEventType};
    use leadline_core::write_queue::WriteQueueEngine;

    use crate::repositories::{
        AttemptRepository, EventLedgerRepository, InMemoryAttemptRepository,
        InMemoryEventLedgerRepository, InMemoryWriteQueueRepository, WriteQueueRepository,
    };

    #[tokio::test]
    async fn in_memory_ledger_deduplicates() {
        let repo = InMemoryEventLedgerRepository::default();
        let event = LeadEvent {
            event_id: EventId("evt-1".to_string()),
            event_type: LeadEventType::ContactCreated,
            location_id: "loc-1".to_string(),
            contact_id: Some(ContactId("c-1".to_string())),
            lead_source: None,
            raw_payload: json!({}),
            received_at: Utc::now(),
        };
        let expires_at = Utc::now() + Duration::hours(72);

        assert!(repo.record_if_new(&event, expires_at).await.expect("first"));
        assert!(!repo.record_if_new(&event, expires_at).await.expect("duplicate"));
    }

    #[tokio::test]
    async fn in_memory_attempt_repo_cancels_non_terminal_only() {
        let repo = InMemoryAttemptRepository::default();
        let contact_id = ContactId("c-1".to_string());

        let live = EngagementAttempt::new(
            AttemptId("a-live".to_string()),
            contact_id.clone(),
            None,
            "w1".to_string(),
            Utc::now(),
        );
        let mut done = EngagementAttempt::new(
            AttemptId("a-done".to_string()),
            contact_id.clone(),
            None,
            "w1".to_string(),
            Utc::now(),
        );
        done.status = AttemptStatus::Completed;

        repo.save(live.clone()).await.expect("save live");
        repo.save(done.clone()).await.expect("save done");

        let flagged = repo.request_cancel(&contact_id).await.expect("cancel");
        assert_eq!(flagged, 1);
        assert!(repo.cancel_requested(&live.id).await.expect("live flag"));
        assert!(!repo.cancel_requested(&done.id).await.expect("done flag"));
    }

    #[tokio::test]
    async fn in_memory_write_queue_lists_due_in_order() {
        let repo = InMemoryWriteQueueRepository::default();
        let engine = WriteQueueEngine::new();

        let task = engine.create_task(
            AttemptId("a-1".to_string()),
            ContactId("c-1".to_string()),
            "crm_field_write",
            "{}",
            "corr-1",
        );
        repo.save_task(task.clone()).await.expect("save");

        let due = repo.list_due_tasks(Utc::now(), 10).await.expect("due");
        assert_eq!(due, vec![task]);
    }
}
