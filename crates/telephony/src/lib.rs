//! Outbound provider clients: voice calling, SMS delivery, and CRM reads
//! and writes.
//!
//! Each provider is behind a trait so the pipeline and its tests can swap
//! the HTTP implementation for an in-process fake.

use thiserror::Error;

pub mod crm;
pub mod sms;
pub mod voice;

pub use crm::{CrmClient, FieldWriteReport, HttpCrmClient, InMemoryCrmClient};
pub use sms::{HttpSmsClient, RecordingSmsClient, SmsClient, SmsDelivery};
pub use voice::{
    CallStatusReport, HttpVoiceClient, PlaceCallRequest, PlacedCall, ScriptedVoiceClient,
    VoiceClient,
};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("{endpoint} returned status {status}: {body}")]
    Status { endpoint: &'static str, status: u16, body: String },

    #[error("unexpected response from {endpoint}: {reason}")]
    Decode { endpoint: &'static str, reason: String },
}

impl ClientError {
    pub fn status(endpoint: &'static str, status: u16, body: impl Into<String>) -> Self {
        Self::Status { endpoint, status, body: body.into() }
    }

    pub fn decode(endpoint: &'static str, reason: impl Into<String>) -> Self {
        Self::Decode { endpoint, reason: reason.into() }
    }

    /// Transport faults and server-side statuses are worth another attempt;
    /// 4xx responses are not going to change on retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::Decode { .. } => false,
        }
    }
}
