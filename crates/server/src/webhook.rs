//! Webhook ingestion gateway.
//!
//! The CRM retries deliveries aggressively, so every recognized request is
//! acknowledged with 200 whether or not it triggers work. Only requests
//! that fail authentication (401) or carry unparseable bodies (400) are
//! rejected; the caller learns what happened from the ack body, never from
//! the status code alone.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use chrono::{Duration, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use leadline_core::domain::event::{EventId, LeadEventType};
use leadline_core::errors::{ApplicationError, InterfaceError};
use leadline_core::ingest::{normalize_event, verify_signature};
use leadline_db::repositories::EventLedgerRepository;

use crate::pipeline::EngagementPipeline;

const SIGNATURE_HEADER: &str = "x-leadline-signature";
const DELIVERY_ID_HEADER: &str = "x-delivery-id";

#[derive(Clone)]
pub struct WebhookState {
    pub pipeline: Arc<EngagementPipeline>,
    pub ledger: Arc<dyn EventLedgerRepository>,
    pub webhook_secret: Option<SecretString>,
    pub location_id: String,
    pub dedup_retention_hours: u32,
}

#[derive(Debug, Serialize)]
pub struct IngestAck {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
}

impl IngestAck {
    fn accepted(event_id: String) -> Self {
        Self { status: "accepted", reason: None, event_id: Some(event_id) }
    }

    fn duplicate(event_id: String) -> Self {
        Self { status: "duplicate", reason: None, event_id: Some(event_id) }
    }

    fn ignored(reason: impl Into<String>) -> Self {
        Self { status: "ignored", reason: Some(reason.into()), event_id: None }
    }

    fn rejected(reason: impl Into<String>) -> Self {
        Self { status: "rejected", reason: Some(reason.into()), event_id: None }
    }
}

pub fn router(state: WebhookState) -> Router {
    Router::new().route("/webhooks/crm", post(receive_crm_event)).with_state(state)
}

async fn receive_crm_event(
    State(state): State<WebhookState>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, Json<IngestAck>) {
    let delivery_header = header_value(&headers, DELIVERY_ID_HEADER);
    let correlation_id =
        delivery_header.clone().unwrap_or_else(|| Uuid::new_v4().to_string());

    if let Some(secret) = &state.webhook_secret {
        let signature = header_value(&headers, SIGNATURE_HEADER);
        if let Err(error) = verify_signature(
            secret.expose_secret().as_bytes(),
            &body,
            signature.as_deref(),
        ) {
            let interface = InterfaceError::unauthorized(error, correlation_id);
            warn!(
                event_name = "ingest.gateway.unauthorized",
                correlation_id = interface.correlation_id(),
                error = %interface,
                "webhook signature verification failed"
            );
            return (
                StatusCode::UNAUTHORIZED,
                Json(IngestAck::rejected(interface.user_message())),
            );
        }
    }

    let payload: serde_json::Value = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(error) => {
            let interface = InterfaceError::BadRequest {
                message: error.to_string(),
                correlation_id,
            };
            warn!(
                event_name = "ingest.gateway.malformed",
                correlation_id = interface.correlation_id(),
                error = %interface,
                "webhook body is not valid json"
            );
            return (
                StatusCode::BAD_REQUEST,
                Json(IngestAck::rejected(interface.user_message())),
            );
        }
    };

    let mut event = match normalize_event(&payload, &body, Utc::now()) {
        Ok(event) => event,
        Err(error) => {
            debug!(
                event_name = "ingest.gateway.unnormalizable",
                correlation_id,
                error = %error,
                "payload could not be normalized"
            );
            return (StatusCode::OK, Json(IngestAck::ignored(error.to_string())));
        }
    };

    // The transport delivery id wins over anything derived from the body.
    if let Some(delivery_id) = delivery_header {
        event.event_id = EventId(delivery_id);
    }

    if event.location_id != state.location_id {
        // Dropped silently; the ack is indistinguishable from an accepted
        // delivery so callers cannot enumerate configured locations.
        debug!(
            event_name = "ingest.gateway.location_mismatch",
            correlation_id,
            location_id = %event.location_id,
            "delivery addressed to another location"
        );
        return (StatusCode::OK, Json(IngestAck::accepted(event.event_id.0)));
    }

    let expires_at = Utc::now() + Duration::hours(i64::from(state.dedup_retention_hours));
    match state.ledger.record_if_new(&event, expires_at).await {
        Ok(true) => {}
        Ok(false) => {
            debug!(
                event_name = "ingest.gateway.duplicate",
                correlation_id,
                event_id = %event.event_id,
                "duplicate delivery suppressed"
            );
            return (StatusCode::OK, Json(IngestAck::duplicate(event.event_id.0)));
        }
        Err(error) => {
            let interface = ApplicationError::Persistence(error.to_string())
                .into_interface(correlation_id);
            warn!(
                event_name = "ingest.gateway.ledger_unavailable",
                correlation_id = interface.correlation_id(),
                error = %interface,
                "dedup ledger write failed"
            );
            return (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(IngestAck::rejected(interface.user_message())),
            );
        }
    }

    if let LeadEventType::Unknown(raw) = &event.event_type {
        debug!(
            event_name = "ingest.gateway.unknown_type",
            correlation_id,
            event_type = %raw,
            "unrecognized event type acknowledged"
        );
        return (StatusCode::OK, Json(IngestAck::ignored("unknown_event_type")));
    }

    info!(
        event_name = "ingest.gateway.accepted",
        correlation_id,
        event_id = %event.event_id,
        event_type = event.event_type.as_str(),
        "event accepted for processing"
    );

    let pipeline = state.pipeline.clone();
    let event_id = event.event_id.0.clone();
    tokio::spawn(async move {
        if let Err(error) = pipeline.handle_event(&event).await {
            let application = ApplicationError::from(error);
            warn!(
                event_name = "ingest.gateway.processing_failed",
                correlation_id = %event.event_id,
                error = %application,
                "event processing failed"
            );
        }
    });

    (StatusCode::OK, Json(IngestAck::accepted(event_id)))
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}
