pub mod config;
pub mod domain;
pub mod engagement;
pub mod errors;
pub mod fallback;
pub mod fields;
pub mod ingest;
pub mod phone;
pub mod scoring;
pub mod write_queue;

pub use config::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};
pub use domain::attempt::{
    campaign_window_key, AttemptId, AttemptStatus, AttemptTransition, ContactClaim,
    EngagementAttempt, TransitionId,
};
pub use domain::contact::ContactProfile;
pub use domain::event::{ContactId, EventId, LeadEvent, LeadEventType};
pub use domain::outcome::{BookingResult, CallOutcome, Disposition};
pub use domain::score::{LeadScore, ScoreBand, ScoreBreakdown};
pub use engagement::{
    transition, AttemptAction, AttemptEvent, AttemptTransitionError, TransitionOutcome,
};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use fallback::FallbackDecision;
pub use fields::{build_custom_fields, normalize_field_key, read_custom_fields, CustomFieldWrite};
pub use ingest::{derive_event_id, normalize_event, verify_signature, SignatureError};
pub use scoring::{completeness_points, is_in_service_area, score_lead, ScoreInput};
pub use write_queue::{
    RetryPolicy, WriteQueueConfig, WriteQueueEngine, WriteQueueError, WriteTask, WriteTaskId,
    WriteTaskState,
};
