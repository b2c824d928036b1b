//! Deterministic CRM write queue.
//!
//! State machine for asynchronous CRM field writes. Every transition is
//! pure and auditable so a crashed worker can replay from persisted task
//! rows without double-applying a write. The idempotency key is unique per
//! attempt and operation kind; the store enforces it at insert time.

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::attempt::AttemptId;
use crate::domain::event::ContactId;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct WriteTaskId(pub String);

impl std::fmt::Display for WriteTaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WriteTaskState {
    Queued,
    Running,
    RetryableFailed,
    FailedTerminal,
    Completed,
}

impl WriteTaskState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::RetryableFailed => "retryable_failed",
            Self::FailedTerminal => "failed_terminal",
            Self::Completed => "completed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "queued" => Some(Self::Queued),
            "running" => Some(Self::Running),
            "retryable_failed" => Some(Self::RetryableFailed),
            "failed_terminal" => Some(Self::FailedTerminal),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }
}

/// One queued CRM write with its retry bookkeeping.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WriteTask {
    pub id: WriteTaskId,
    pub attempt_id: AttemptId,
    pub contact_id: ContactId,
    pub operation_kind: String,
    pub payload_json: String,
    pub idempotency_key: String,
    pub state: WriteTaskState,
    pub retry_count: u32,
    pub max_retries: u32,
    pub available_at: DateTime<Utc>,
    pub claimed_by: Option<String>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub result_fingerprint: Option<String>,
    pub correlation_id: String,
    pub state_version: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug)]
pub struct WriteQueueConfig {
    /// How long before a claimed task is considered stale.
    pub claim_timeout_seconds: i64,
    pub default_max_retries: u32,
    pub retry_backoff_multiplier: u32,
    pub retry_base_delay_seconds: i64,
}

impl Default for WriteQueueConfig {
    fn default() -> Self {
        Self {
            claim_timeout_seconds: 300,
            default_max_retries: 3,
            retry_backoff_multiplier: 2,
            retry_base_delay_seconds: 30,
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum WriteQueueError {
    #[error("invalid state transition from {from:?} to {to:?}: {reason}")]
    InvalidTransition { from: WriteTaskState, to: WriteTaskState, reason: String },
    #[error("claim conflict: task {0} already claimed by {1}")]
    ClaimConflict(WriteTaskId, String),
    #[error("task not yet available: {0}")]
    TaskNotYetAvailable(WriteTaskId),
}

/// Policy for handling a failed write.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RetryPolicy {
    Retry,
    FailTerminal,
}

#[derive(Clone, Debug)]
pub struct WriteQueueEngine {
    config: WriteQueueConfig,
}

impl WriteQueueEngine {
    pub fn new() -> Self {
        Self::with_config(WriteQueueConfig::default())
    }

    pub fn with_config(config: WriteQueueConfig) -> Self {
        Self { config }
    }

    pub fn create_task(
        &self,
        attempt_id: AttemptId,
        contact_id: ContactId,
        operation_kind: impl Into<String>,
        payload_json: impl Into<String>,
        correlation_id: impl Into<String>,
    ) -> WriteTask {
        let now = Utc::now();
        let operation_kind = operation_kind.into();
        WriteTask {
            id: WriteTaskId(Uuid::new_v4().to_string()),
            idempotency_key: format!("{}:{operation_kind}", attempt_id.0),
            attempt_id,
            contact_id,
            operation_kind,
            payload_json: payload_json.into(),
            state: WriteTaskState::Queued,
            retry_count: 0,
            max_retries: self.config.default_max_retries,
            available_at: now,
            claimed_by: None,
            claimed_at: None,
            last_error: None,
            result_fingerprint: None,
            correlation_id: correlation_id.into(),
            state_version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    /// Transitions Queued|RetryableFailed -> Running. A Running task whose
    /// claim has gone stale may be taken over by another worker.
    pub fn claim_task(
        &self,
        mut task: WriteTask,
        worker_id: impl Into<String>,
    ) -> Result<WriteTask, WriteQueueError> {
        let now = Utc::now();

        match &task.state {
            WriteTaskState::Queued | WriteTaskState::RetryableFailed => {}
            WriteTaskState::Running => {
                if let Some(claimed_at) = task.claimed_at {
                    let stale_threshold =
                        claimed_at + Duration::seconds(self.config.claim_timeout_seconds);
                    if now < stale_threshold {
                        return Err(WriteQueueError::ClaimConflict(
                            task.id.clone(),
                            task.claimed_by.clone().unwrap_or_default(),
                        ));
                    }
                }
            }
            WriteTaskState::Completed | WriteTaskState::FailedTerminal => {
                return Err(WriteQueueError::InvalidTransition {
                    from: task.state.clone(),
                    to: WriteTaskState::Running,
                    reason: "task already in terminal state".to_string(),
                });
            }
        }

        if now < task.available_at {
            return Err(WriteQueueError::TaskNotYetAvailable(task.id.clone()));
        }

        task.state = WriteTaskState::Running;
        task.claimed_by = Some(worker_id.into());
        task.claimed_at = Some(now);
        task.state_version += 1;
        task.updated_at = now;
        Ok(task)
    }

    pub fn complete_task(
        &self,
        mut task: WriteTask,
        result_fingerprint: impl Into<String>,
    ) -> Result<WriteTask, WriteQueueError> {
        self.validate_transition(&task, &WriteTaskState::Completed)?;

        let now = Utc::now();
        task.state = WriteTaskState::Completed;
        task.result_fingerprint = Some(result_fingerprint.into());
        task.state_version += 1;
        task.updated_at = now;
        task.claimed_by = None;
        task.claimed_at = None;
        Ok(task)
    }

    /// Depending on policy and remaining budget, transitions Running to
    /// RetryableFailed with exponential backoff or to FailedTerminal.
    pub fn fail_task(
        &self,
        mut task: WriteTask,
        error: impl Into<String>,
        retry_policy: RetryPolicy,
    ) -> Result<WriteTask, WriteQueueError> {
        self.validate_transition(&task, &WriteTaskState::RetryableFailed)?;

        let now = Utc::now();
        let should_retry =
            matches!(retry_policy, RetryPolicy::Retry) && task.retry_count < task.max_retries;

        if should_retry {
            let backoff_seconds = self.config.retry_base_delay_seconds
                * i64::from(self.config.retry_backoff_multiplier.pow(task.retry_count));
            task.state = WriteTaskState::RetryableFailed;
            task.retry_count += 1;
            task.available_at = now + Duration::seconds(backoff_seconds);
        } else {
            task.state = WriteTaskState::FailedTerminal;
        }

        task.last_error = Some(error.into());
        task.state_version += 1;
        task.updated_at = now;
        task.claimed_by = None;
        task.claimed_at = None;
        Ok(task)
    }

    /// Returns the tasks whose claim outlived the timeout and should be
    /// made available for reprocessing.
    pub fn recover_stale_tasks(
        &self,
        tasks: Vec<WriteTask>,
        reference_time: DateTime<Utc>,
    ) -> Vec<WriteTask> {
        let stale_threshold = reference_time - Duration::seconds(self.config.claim_timeout_seconds);
        tasks
            .into_iter()
            .filter(|task| {
                matches!(task.state, WriteTaskState::Running)
                    && task.claimed_at.is_some_and(|claimed_at| claimed_at < stale_threshold)
            })
            .collect()
    }

    fn validate_transition(
        &self,
        task: &WriteTask,
        to_state: &WriteTaskState,
    ) -> Result<(), WriteQueueError> {
        let valid = match (&task.state, to_state) {
            (WriteTaskState::Running, WriteTaskState::Completed) => true,
            (WriteTaskState::Running, WriteTaskState::RetryableFailed) => true,
            (WriteTaskState::Running, WriteTaskState::FailedTerminal) => true,
            (WriteTaskState::Queued, WriteTaskState::Running) => true,
            (WriteTaskState::RetryableFailed, WriteTaskState::Running) => true,
            (from, to) if from == to => true,
            _ => false,
        };

        if valid {
            Ok(())
        } else {
            Err(WriteQueueError::InvalidTransition {
                from: task.state.clone(),
                to: to_state.clone(),
                reason: format!("cannot transition from {:?} to {:?}", task.state, to_state),
            })
        }
    }
}

impl Default for WriteQueueEngine {
    fn default() -> Self {
        Self::new()
    }
}
