use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(pub String);

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContactId(pub String);

impl std::fmt::Display for ContactId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Normalized CRM webhook event type.
///
/// CRM deliveries spell these several ways (`contact.created`,
/// `contact_created`, legacy `event` field values); `parse` folds them into
/// one internal vocabulary. Types we do not recognize are preserved as
/// `Unknown` so the gateway can acknowledge them without failing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadEventType {
    ContactCreated,
    FormSubmitted,
    WebchatConverted,
    AdLead,
    ContactUpdated,
    Unknown(String),
}

impl LeadEventType {
    pub fn parse(raw: &str) -> Self {
        let normalized = raw.trim().to_ascii_lowercase().replace('.', "_");
        match normalized.as_str() {
            "contact_created" => Self::ContactCreated,
            "form_submitted" => Self::FormSubmitted,
            "conversation_created" | "chat_converted" | "webchat_converted" => {
                Self::WebchatConverted
            }
            "lead_created" | "ad_lead" | "ad_submission" | "google_lead" | "meta_lead"
            | "facebook_lead" => Self::AdLead,
            "contact_updated" => Self::ContactUpdated,
            _ => Self::Unknown(raw.trim().to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::ContactCreated => "contact_created",
            Self::FormSubmitted => "form_submitted",
            Self::WebchatConverted => "webchat_converted",
            Self::AdLead => "ad_lead",
            Self::ContactUpdated => "contact_updated",
            Self::Unknown(raw) => raw.as_str(),
        }
    }

    /// Whether this event type qualifies a contact for outbound engagement.
    /// `contact_updated` never does; it is only inspected for cancellation
    /// signals.
    pub fn triggers_outreach(&self) -> bool {
        matches!(
            self,
            Self::ContactCreated | Self::FormSubmitted | Self::WebchatConverted | Self::AdLead
        )
    }
}

/// One normalized webhook delivery, ready for dispatch.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadEvent {
    pub event_id: EventId,
    pub event_type: LeadEventType,
    pub location_id: String,
    pub contact_id: Option<ContactId>,
    pub lead_source: Option<String>,
    pub raw_payload: Value,
    pub received_at: DateTime<Utc>,
}
