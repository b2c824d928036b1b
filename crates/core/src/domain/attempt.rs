use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::event::ContactId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AttemptId(pub String);

impl std::fmt::Display for AttemptId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransitionId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    Pending,
    InProgress,
    Answered,
    NoAnswer,
    Busy,
    Failed,
    FallbackSent,
    Cancelled,
    Completed,
}

impl AttemptStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Answered => "answered",
            Self::NoAnswer => "no_answer",
            Self::Busy => "busy",
            Self::Failed => "failed",
            Self::FallbackSent => "fallback_sent",
            Self::Cancelled => "cancelled",
            Self::Completed => "completed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "in_progress" => Some(Self::InProgress),
            "answered" => Some(Self::Answered),
            "no_answer" => Some(Self::NoAnswer),
            "busy" => Some(Self::Busy),
            "failed" => Some(Self::Failed),
            "fallback_sent" => Some(Self::FallbackSent),
            "cancelled" => Some(Self::Cancelled),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }

    /// Terminal statuses receive no further pipeline work.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

/// One outbound-call lifecycle for one contact within one campaign window.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngagementAttempt {
    pub id: AttemptId,
    pub contact_id: ContactId,
    pub lead_source: Option<String>,
    pub status: AttemptStatus,
    pub call_id: Option<String>,
    pub window_key: String,
    pub cancel_requested: bool,
    pub failure_reason: Option<String>,
    pub sms_fallback_sent: bool,
    pub sms_fallback_date: Option<DateTime<Utc>>,
    pub sms_fallback_reason: Option<String>,
    pub state_version: u32,
    pub created_at: DateTime<Utc>,
    pub outcome_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl EngagementAttempt {
    pub fn new(
        id: AttemptId,
        contact_id: ContactId,
        lead_source: Option<String>,
        window_key: String,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            contact_id,
            lead_source,
            status: AttemptStatus::Pending,
            call_id: None,
            window_key,
            cancel_requested: false,
            failure_reason: None,
            sms_fallback_sent: false,
            sms_fallback_date: None,
            sms_fallback_reason: None,
            state_version: 1,
            created_at: now,
            outcome_at: None,
            updated_at: now,
        }
    }
}

/// Append-only audit record for one attempt status change.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptTransition {
    pub id: TransitionId,
    pub attempt_id: AttemptId,
    pub contact_id: ContactId,
    pub from_status: Option<AttemptStatus>,
    pub to_status: AttemptStatus,
    pub reason: String,
    pub correlation_id: String,
    pub state_version: u32,
    pub occurred_at: DateTime<Utc>,
}

/// Per-contact engagement claim, the atomic duplicate-call guard.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactClaim {
    pub contact_id: ContactId,
    pub window_key: String,
    pub attempt_id: AttemptId,
    pub claimed_at: DateTime<Utc>,
}

/// Buckets a timestamp into the campaign window it falls in. A contact is
/// eligible for exactly one outreach attempt per bucket; when the bucket
/// rolls over, re-engagement rules apply again.
pub fn campaign_window_key(at: DateTime<Utc>, window_hours: u32) -> String {
    let window_secs = i64::from(window_hours.max(1)) * 3600;
    format!("w{}", at.timestamp().div_euclid(window_secs))
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Utc};

    use super::{campaign_window_key, AttemptStatus};

    #[test]
    fn attempt_status_round_trips_from_storage_encoding() {
        let cases = [
            AttemptStatus::Pending,
            AttemptStatus::InProgress,
            AttemptStatus::Answered,
            AttemptStatus::NoAnswer,
            AttemptStatus::Busy,
            AttemptStatus::Failed,
            AttemptStatus::FallbackSent,
            AttemptStatus::Cancelled,
            AttemptStatus::Completed,
        ];

        for status in cases {
            assert_eq!(AttemptStatus::parse(status.as_str()), Some(status));
        }
    }

    #[test]
    fn completed_and_cancelled_are_terminal() {
        assert!(AttemptStatus::Completed.is_terminal());
        assert!(AttemptStatus::Cancelled.is_terminal());
        assert!(!AttemptStatus::Failed.is_terminal());
        assert!(!AttemptStatus::FallbackSent.is_terminal());
    }

    #[test]
    fn window_key_is_stable_within_a_window_and_rolls_after() {
        let base = parse_ts("2026-03-01T00:30:00Z");
        let same_window = parse_ts("2026-03-01T23:00:00Z");
        let next_window = parse_ts("2026-03-02T01:00:00Z");

        assert_eq!(campaign_window_key(base, 24), campaign_window_key(same_window, 24));
        assert_ne!(campaign_window_key(base, 24), campaign_window_key(next_window, 24));
    }

    fn parse_ts(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value).expect("valid rfc3339").with_timezone(&Utc)
    }
}
