//! Webhook payload verification and normalization.
//!
//! The CRM signs each delivery with HMAC-SHA256 over the raw body. Payload
//! shapes vary by event source, so normalization checks the handful of
//! locations the CRM is known to use rather than deserializing into one
//! rigid struct.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::domain::event::{ContactId, EventId, LeadEvent, LeadEventType};

type HmacSha256 = Hmac<Sha256>;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("signature header is missing")]
    MissingSignature,
    #[error("signature is not valid hex")]
    MalformedSignature,
    #[error("signature does not match payload")]
    Mismatch,
}

/// Constant-time verification of a webhook signature against the raw body.
/// Accepts the bare hex digest or the `sha256=` prefixed form.
pub fn verify_signature(
    secret: &[u8],
    body: &[u8],
    signature: Option<&str>,
) -> Result<(), SignatureError> {
    let provided = signature.ok_or(SignatureError::MissingSignature)?;
    let provided = provided.trim().strip_prefix("sha256=").unwrap_or(provided.trim());
    let provided_bytes = decode_hex(provided).ok_or(SignatureError::MalformedSignature)?;

    let mut mac =
        HmacSha256::new_from_slice(secret).map_err(|_| SignatureError::MalformedSignature)?;
    mac.update(body);
    mac.verify_slice(&provided_bytes).map_err(|_| SignatureError::Mismatch)
}

/// Stable identity for one delivery. Prefers the CRM's delivery id; falls
/// back to a content hash so replayed bodies still deduplicate.
pub fn derive_event_id(payload: &Value, body: &[u8]) -> EventId {
    for key in ["deliveryId", "webhookId", "eventId", "id"] {
        if let Some(id) = payload.get(key).and_then(Value::as_str) {
            if !id.trim().is_empty() {
                return EventId(id.trim().to_string());
            }
        }
    }
    let digest = Sha256::digest(body);
    EventId(format!("sha256:{}", encode_hex(digest.as_slice())))
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum NormalizeError {
    #[error("payload has no event type field")]
    MissingEventType,
    #[error("payload has no location id")]
    MissingLocationId,
}

/// Folds one raw delivery into a [`LeadEvent`].
///
/// The contact id is accepted at any of the three locations the CRM emits
/// it; its absence is not an error here because update events for other
/// entities legitimately lack one.
pub fn normalize_event(
    payload: &Value,
    body: &[u8],
    received_at: DateTime<Utc>,
) -> Result<LeadEvent, NormalizeError> {
    let raw_type = payload
        .get("type")
        .and_then(Value::as_str)
        .or_else(|| payload.get("event").and_then(Value::as_str))
        .ok_or(NormalizeError::MissingEventType)?;

    let location_id = payload
        .get("locationId")
        .and_then(Value::as_str)
        .or_else(|| {
            payload.get("data").and_then(|data| data.get("locationId")).and_then(Value::as_str)
        })
        .ok_or(NormalizeError::MissingLocationId)?;

    Ok(LeadEvent {
        event_id: derive_event_id(payload, body),
        event_type: LeadEventType::parse(raw_type),
        location_id: location_id.to_string(),
        contact_id: extract_contact_id(payload),
        lead_source: extract_lead_source(payload),
        raw_payload: payload.clone(),
        received_at,
    })
}

fn extract_contact_id(payload: &Value) -> Option<ContactId> {
    let candidates = [
        payload.get("contactId"),
        payload.get("contact").and_then(|contact| contact.get("id")),
        payload
            .get("data")
            .and_then(|data| data.get("contact"))
            .and_then(|contact| contact.get("id")),
    ];
    candidates
        .into_iter()
        .flatten()
        .filter_map(Value::as_str)
        .find(|id| !id.trim().is_empty())
        .map(|id| ContactId(id.trim().to_string()))
}

fn extract_lead_source(payload: &Value) -> Option<String> {
    let candidates = [
        payload.get("source"),
        payload.get("leadSource"),
        payload.get("contact").and_then(|contact| contact.get("source")),
        payload
            .get("data")
            .and_then(|data| data.get("contact"))
            .and_then(|contact| contact.get("source")),
    ];
    candidates
        .into_iter()
        .flatten()
        .filter_map(Value::as_str)
        .find(|source| !source.trim().is_empty())
        .map(|source| source.trim().to_string())
}

fn encode_hex(bytes: &[u8]) -> String {
    let mut output = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        output.push_str(&format!("{byte:02x}"));
    }
    output
}

fn decode_hex(value: &str) -> Option<Vec<u8>> {
    if value.is_empty() || value.len() % 2 != 0 {
        return None;
    }
    let bytes = value.as_bytes();
    let mut output = Vec::with_capacity(bytes.len() / 2);
    for pair in bytes.chunks_exact(2) {
        let high = hex_nibble(pair[0])?;
        let low = hex_nibble(pair[1])?;
        output.push((high << 4) | low);
    }
    Some(output)
}

fn hex_nibble(value: u8) -> Option<u8> {
    match value {
        b'0'..=b'9' => Some(value - b'0'),
        b'a'..=b'f' => Some(value - b'a' + 10),
        b'A'..=b'F' => Some(value - b'A' + 10),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use hmac::{Hmac, Mac};
    use serde_json::json;
    use sha2::Sha256;

    use super::{
        derive_event_id, normalize_event, verify_signature, NormalizeError, SignatureError,
    };
    use crate::domain::event::{ContactId, LeadEventType};

    fn sign(secret: &[u8], body: &[u8]) -> String {
        let mut mac = Hmac::<Sha256>::new_from_slice(secret).expect("any key length works");
        mac.update(body);
        mac.finalize().into_bytes().iter().map(|byte| format!("{byte:02x}")).collect()
    }

    #[test]
    fn valid_signature_passes_with_and_without_prefix() {
        let secret = b"wh-secret";
        let body = br#"{"type":"contact.created"}"#;
        let digest = sign(secret, body);

        assert_eq!(verify_signature(secret, body, Some(&digest)), Ok(()));
        assert_eq!(verify_signature(secret, body, Some(&format!("sha256={digest}"))), Ok(()));
    }

    #[test]
    fn tampered_body_fails_verification() {
        let secret = b"wh-secret";
        let digest = sign(secret, b"original");

        assert_eq!(
            verify_signature(secret, b"tampered", Some(&digest)),
            Err(SignatureError::Mismatch)
        );
        assert_eq!(
            verify_signature(secret, b"original", None),
            Err(SignatureError::MissingSignature)
        );
        assert_eq!(
            verify_signature(secret, b"original", Some("not-hex")),
            Err(SignatureError::MalformedSignature)
        );
    }

    #[test]
    fn event_id_prefers_delivery_id_over_content_hash() {
        let payload = json!({"webhookId": "wh-123", "type": "contact.created"});
        assert_eq!(derive_event_id(&payload, b"body").0, "wh-123");

        let anonymous = json!({"type": "contact.created"});
        let first = derive_event_id(&anonymous, b"body");
        let second = derive_event_id(&anonymous, b"body");
        assert!(first.0.starts_with("sha256:"));
        assert_eq!(first, second);
    }

    #[test]
    fn contact_id_is_found_at_any_known_location() {
        let top = json!({"type": "contact.created", "locationId": "loc-1", "contactId": "c-1"});
        let nested = json!({
            "type": "contact.created",
            "locationId": "loc-1",
            "contact": {"id": "c-2"},
        });
        let data_nested = json!({
            "type": "contact.created",
            "locationId": "loc-1",
            "data": {"contact": {"id": "c-3"}},
        });

        let now = Utc::now();
        for (payload, expected) in [(top, "c-1"), (nested, "c-2"), (data_nested, "c-3")] {
            let event = normalize_event(&payload, b"{}", now).expect("normalizes");
            assert_eq!(event.contact_id, Some(ContactId(expected.to_string())));
        }
    }

    #[test]
    fn legacy_event_field_and_nested_location_are_accepted() {
        let payload = json!({
            "event": "form_submitted",
            "data": {"locationId": "loc-9", "contact": {"id": "c-9", "source": "website form"}},
        });
        let event = normalize_event(&payload, b"{}", Utc::now()).expect("normalizes");

        assert_eq!(event.event_type, LeadEventType::FormSubmitted);
        assert_eq!(event.location_id, "loc-9");
        assert_eq!(event.lead_source.as_deref(), Some("website form"));
    }

    #[test]
    fn missing_type_or_location_is_rejected() {
        let no_type = json!({"locationId": "loc-1"});
        assert_eq!(
            normalize_event(&no_type, b"{}", Utc::now()),
            Err(NormalizeError::MissingEventType)
        );

        let no_location = json!({"type": "contact.created"});
        assert_eq!(
            normalize_event(&no_location, b"{}", Utc::now()),
            Err(NormalizeError::MissingLocationId)
        );
    }
}
