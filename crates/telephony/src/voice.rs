//! Voice provider client.
//!
//! Places outbound assistant calls and polls call status until the provider
//! reports a terminal state. The status payload carries the assistant's
//! post-call analysis, which this module folds into a [`CallOutcome`].

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use reqwest::Client;
use secrecy::ExposeSecret;
use serde_json::{json, Value};
use tracing::debug;

use leadline_core::config::VoiceConfig;
use leadline_core::domain::outcome::{BookingResult, CallOutcome, Disposition};

use crate::ClientError;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlaceCallRequest {
    pub phone: String,
    pub contact_name: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlacedCall {
    pub call_id: String,
}

/// One poll of a call's status: either still in flight or finished with a
/// classified outcome.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CallStatusReport {
    Pending { status: String },
    Ended(CallOutcome),
}

#[async_trait::async_trait]
pub trait VoiceClient: Send + Sync {
    async fn place_call(&self, request: &PlaceCallRequest) -> Result<PlacedCall, ClientError>;
    async fn call_status(&self, call_id: &str) -> Result<CallStatusReport, ClientError>;
}

pub struct HttpVoiceClient {
    config: VoiceConfig,
    client: Client,
}

impl HttpVoiceClient {
    pub fn new(config: VoiceConfig) -> Self {
        Self { config, client: Client::new() }
    }

    fn bearer(&self) -> String {
        format!("Bearer {}", self.config.api_key.expose_secret())
    }
}

#[async_trait::async_trait]
impl VoiceClient for HttpVoiceClient {
    async fn place_call(&self, request: &PlaceCallRequest) -> Result<PlacedCall, ClientError> {
        let mut body = json!({
            "assistantId": self.config.assistant_id,
            "customer": { "number": request.phone },
        });
        if let Some(name) = &request.contact_name {
            body["customer"]["name"] = json!(name);
        }
        if let Some(phone_number_id) = &self.config.phone_number_id {
            body["phoneNumberId"] = json!(phone_number_id);
        }

        let response = self
            .client
            .post(format!("{}/call", self.config.base_url))
            .header("Authorization", self.bearer())
            .timeout(std::time::Duration::from_secs(self.config.timeout_secs))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let payload: Value = if status.is_success() {
            response.json().await?
        } else {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::status("voice.place_call", status.as_u16(), body));
        };

        let call_id = payload
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| ClientError::decode("voice.place_call", "response missing call id"))?;
        debug!(call_id, "outbound call placed");

        Ok(PlacedCall { call_id: call_id.to_string() })
    }

    async fn call_status(&self, call_id: &str) -> Result<CallStatusReport, ClientError> {
        let response = self
            .client
            .get(format!("{}/call/{call_id}", self.config.base_url))
            .header("Authorization", self.bearer())
            .timeout(std::time::Duration::from_secs(self.config.timeout_secs))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::status("voice.call_status", status.as_u16(), body));
        }

        let payload: Value = response.json().await?;
        parse_status_payload(call_id, &payload)
    }
}

/// Folds a provider status payload into a report. Terminal statuses other
/// than `ended` carry their own disposition; `ended` defers to the ended
/// reason and the assistant analysis.
pub fn parse_status_payload(
    call_id: &str,
    payload: &Value,
) -> Result<CallStatusReport, ClientError> {
    let status = payload
        .get("status")
        .and_then(Value::as_str)
        .ok_or_else(|| ClientError::decode("voice.call_status", "response missing status"))?;

    let disposition = match status {
        "queued" | "ringing" | "in-progress" | "forwarding" => {
            return Ok(CallStatusReport::Pending { status: status.to_string() });
        }
        "ended" => {
            let reason = payload.get("endedReason").and_then(Value::as_str).unwrap_or("");
            disposition_from_ended_reason(reason)
        }
        "failed" | "canceled" => Disposition::Failed,
        "no-answer" => Disposition::NoAnswer,
        "busy" => Disposition::Busy,
        other => {
            return Err(ClientError::decode(
                "voice.call_status",
                format!("unknown call status `{other}`"),
            ));
        }
    };

    Ok(CallStatusReport::Ended(outcome_from_payload(call_id, disposition, payload)))
}

fn disposition_from_ended_reason(reason: &str) -> Disposition {
    let reason = reason.to_ascii_lowercase();
    if reason.contains("voicemail") {
        Disposition::Voicemail
    } else if reason.contains("did-not-answer") || reason.contains("no-answer") {
        Disposition::NoAnswer
    } else if reason.contains("busy") {
        Disposition::Busy
    } else if reason.contains("customer-ended-call")
        || reason.contains("assistant-ended-call")
        || reason.contains("forward")
    {
        Disposition::Answered
    } else {
        Disposition::Failed
    }
}

fn outcome_from_payload(call_id: &str, disposition: Disposition, payload: &Value) -> CallOutcome {
    let analysis = payload.get("analysis");
    let structured = analysis.and_then(|value| value.get("structuredData"));
    let reason = payload.get("endedReason").and_then(Value::as_str).unwrap_or("");

    CallOutcome {
        call_id: call_id.to_string(),
        duration_seconds: duration_seconds(payload),
        disposition,
        transcript_ref: payload
            .get("recordingUrl")
            .or_else(|| payload.get("artifact").and_then(|value| value.get("recordingUrl")))
            .and_then(Value::as_str)
            .map(str::to_string),
        summary_text: analysis
            .and_then(|value| value.get("summary"))
            .and_then(Value::as_str)
            .map(str::to_string),
        booking_result: booking_result(structured, reason),
        urgency_signal: urgency_signal(structured),
    }
}

fn duration_seconds(payload: &Value) -> u32 {
    if let Some(seconds) = payload.get("durationSeconds").and_then(Value::as_u64) {
        return u32::try_from(seconds).unwrap_or(u32::MAX);
    }

    let started = payload.get("startedAt").and_then(Value::as_str).and_then(parse_timestamp);
    let ended = payload.get("endedAt").and_then(Value::as_str).and_then(parse_timestamp);
    match (started, ended) {
        (Some(started), Some(ended)) if ended >= started => {
            u32::try_from((ended - started).num_seconds()).unwrap_or(0)
        }
        _ => 0,
    }
}

fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value).ok().map(|timestamp| timestamp.with_timezone(&Utc))
}

fn booking_result(structured: Option<&Value>, ended_reason: &str) -> BookingResult {
    if let Some(raw) =
        structured.and_then(|value| value.get("booking_result")).and_then(Value::as_str)
    {
        if let Some(parsed) = BookingResult::parse(raw) {
            return parsed;
        }
    }
    if structured
        .and_then(|value| value.get("appointment_booked"))
        .and_then(Value::as_bool)
        .unwrap_or(false)
    {
        return BookingResult::Booked;
    }
    if ended_reason.to_ascii_lowercase().contains("forward") {
        return BookingResult::Transferred;
    }
    BookingResult::NotBooked
}

fn urgency_signal(structured: Option<&Value>) -> bool {
    match structured.and_then(|value| value.get("urgency")) {
        Some(Value::Bool(flag)) => *flag,
        Some(Value::String(text)) => {
            text.eq_ignore_ascii_case("true") || text.eq_ignore_ascii_case("emergency")
        }
        _ => false,
    }
}

/// Test double that replays a scripted sequence of status reports.
#[derive(Default)]
pub struct ScriptedVoiceClient {
    call_id: String,
    reports: Mutex<VecDeque<CallStatusReport>>,
    placed: Mutex<Vec<PlaceCallRequest>>,
    placement_failures: AtomicU32,
}

impl ScriptedVoiceClient {
    pub fn new(call_id: impl Into<String>) -> Self {
        Self { call_id: call_id.into(), ..Self::default() }
    }

    pub fn push_report(&self, report: CallStatusReport) {
        let mut reports = self.reports.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        reports.push_back(report);
    }

    pub fn fail_placements(&self, count: u32) {
        self.placement_failures.store(count, Ordering::SeqCst);
    }

    pub fn placed_calls(&self) -> Vec<PlaceCallRequest> {
        let placed = self.placed.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        placed.clone()
    }
}

#[async_trait::async_trait]
impl VoiceClient for ScriptedVoiceClient {
    async fn place_call(&self, request: &PlaceCallRequest) -> Result<PlacedCall, ClientError> {
        if self.placement_failures.load(Ordering::SeqCst) > 0 {
            self.placement_failures.fetch_sub(1, Ordering::SeqCst);
            return Err(ClientError::status("voice.place_call", 502, "scripted failure"));
        }
        let mut placed = self.placed.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        placed.push(request.clone());
        Ok(PlacedCall { call_id: self.call_id.clone() })
    }

    async fn call_status(&self, _call_id: &str) -> Result<CallStatusReport, ClientError> {
        let mut reports = self.reports.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        // An exhausted script keeps reporting in-progress, which lets
        // deadline tests poll past the end without special casing.
        Ok(reports
            .pop_front()
            .unwrap_or(CallStatusReport::Pending { status: "in-progress".to_string() }))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use leadline_core::domain::outcome::{BookingResult, Disposition};

    use super::{parse_status_payload, CallStatusReport};

    #[test]
    fn transient_statuses_report_pending() {
        for status in ["queued", "ringing", "in-progress", "forwarding"] {
            let report = parse_status_payload("call-1", &json!({"status": status}))
                .expect("parse transient");
            assert_eq!(report, CallStatusReport::Pending { status: status.to_string() });
        }
    }

    #[test]
    fn ended_reason_drives_the_disposition() {
        let cases = [
            ("customer-did-not-answer", Disposition::NoAnswer),
            ("customer-busy", Disposition::Busy),
            ("voicemail", Disposition::Voicemail),
            ("customer-ended-call", Disposition::Answered),
            ("assistant-ended-call", Disposition::Answered),
            ("assistant-forwarded-call", Disposition::Answered),
            ("pipeline-error-openai-llm-failed", Disposition::Failed),
        ];
        for (reason, expected) in cases {
            let payload = json!({"status": "ended", "endedReason": reason});
            match parse_status_payload("call-1", &payload).expect("parse ended") {
                CallStatusReport::Ended(outcome) => {
                    assert_eq!(outcome.disposition, expected, "reason {reason}")
                }
                other => panic!("expected ended report, got {other:?}"),
            }
        }
    }

    #[test]
    fn terminal_provider_statuses_map_directly() {
        let cases = [
            ("failed", Disposition::Failed),
            ("canceled", Disposition::Failed),
            ("no-answer", Disposition::NoAnswer),
            ("busy", Disposition::Busy),
        ];
        for (status, expected) in cases {
            match parse_status_payload("call-1", &json!({"status": status})).expect("parse") {
                CallStatusReport::Ended(outcome) => assert_eq!(outcome.disposition, expected),
                other => panic!("expected ended report, got {other:?}"),
            }
        }
    }

    #[test]
    fn analysis_feeds_booking_urgency_and_summary() {
        let payload = json!({
            "status": "ended",
            "endedReason": "customer-ended-call",
            "startedAt": "2026-03-01T10:00:00Z",
            "endedAt": "2026-03-01T10:02:30Z",
            "recordingUrl": "https://recordings.example/call-1.wav",
            "analysis": {
                "summary": "Customer booked a Tuesday visit.",
                "structuredData": {
                    "booking_result": "booked",
                    "urgency": true,
                },
            },
        });

        match parse_status_payload("call-1", &payload).expect("parse") {
            CallStatusReport::Ended(outcome) => {
                assert_eq!(outcome.duration_seconds, 150);
                assert_eq!(outcome.booking_result, BookingResult::Booked);
                assert!(outcome.urgency_signal);
                assert_eq!(
                    outcome.transcript_ref.as_deref(),
                    Some("https://recordings.example/call-1.wav")
                );
                assert_eq!(
                    outcome.summary_text.as_deref(),
                    Some("Customer booked a Tuesday visit.")
                );
            }
            other => panic!("expected ended report, got {other:?}"),
        }
    }

    #[test]
    fn forwarded_call_without_structured_booking_counts_as_transferred() {
        let payload = json!({"status": "ended", "endedReason": "assistant-forwarded-call"});
        match parse_status_payload("call-1", &payload).expect("parse") {
            CallStatusReport::Ended(outcome) => {
                assert_eq!(outcome.disposition, Disposition::Answered);
                assert_eq!(outcome.booking_result, BookingResult::Transferred);
            }
            other => panic!("expected ended report, got {other:?}"),
        }
    }

    #[test]
    fn unknown_status_is_a_decode_error() {
        assert!(parse_status_payload("call-1", &json!({"status": "mystery"})).is_err());
        assert!(parse_status_payload("call-1", &json!({})).is_err());
    }
}
