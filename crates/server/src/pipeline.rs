//! Engagement pipeline: dispatch, outcome watch, fallback, finalize.
//!
//! One pipeline run per qualifying lead event, strictly sequential for the
//! contact it serves. The claim store is the only cross-run coordination:
//! whoever wins the `(contact_id, window_key)` insert places the call, every
//! other run skips. No lock is held across a network await.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use leadline_core::config::{EngagementConfig, SmsConfig};
use leadline_core::domain::attempt::{
    campaign_window_key, AttemptId, AttemptTransition, ContactClaim, EngagementAttempt,
    TransitionId,
};
use leadline_core::domain::contact::ContactProfile;
use leadline_core::domain::event::{ContactId, LeadEvent, LeadEventType};
use leadline_core::domain::outcome::{CallOutcome, Disposition};
use leadline_core::engagement::{transition, AttemptEvent, AttemptTransitionError};
use leadline_core::errors::{ApplicationError, DomainError};
use leadline_core::fallback::{self, FallbackDecision};
use leadline_core::fields::{build_custom_fields, CustomFieldWrite};
use leadline_core::phone::normalize_e164;
use leadline_core::scoring::{completeness_points, is_in_service_area, score_lead, ScoreInput};
use leadline_core::write_queue::{
    RetryPolicy, WriteQueueConfig, WriteQueueEngine, WriteTask, WriteTaskState,
};
use leadline_db::repositories::{
    AttemptRepository, ContactClaimRepository, RepositoryError, WriteQueueRepository,
};
use leadline_telephony::{
    CallStatusReport, ClientError, CrmClient, PlaceCallRequest, SmsClient, VoiceClient,
};

const CRM_WRITE_OPERATION_KIND: &str = "crm.result_write";
const WRITE_WORKER_ID: &str = "crm-writer";

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Transition(#[from] AttemptTransitionError),
    #[error(transparent)]
    WriteQueue(#[from] leadline_core::write_queue::WriteQueueError),
    #[error("payload encoding failed: {0}")]
    Encode(String),
}

impl From<PipelineError> for ApplicationError {
    fn from(value: PipelineError) -> Self {
        match value {
            PipelineError::Repository(error) => ApplicationError::Persistence(error.to_string()),
            PipelineError::Transition(error) => {
                ApplicationError::Domain(DomainError::AttemptTransition(error))
            }
            PipelineError::WriteQueue(error) => {
                ApplicationError::Domain(DomainError::InvariantViolation(error.to_string()))
            }
            PipelineError::Encode(message) => ApplicationError::Integration(message),
        }
    }
}

/// What the dispatcher did with one normalized event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DispatchResult {
    /// An attempt ran to a terminal state.
    Engaged { attempt_id: AttemptId },
    /// An attempt was claimed but abandoned before or at call placement.
    Abandoned { attempt_id: AttemptId, reason: String },
    /// The event produced no attempt.
    Skipped { reason: &'static str },
    /// A `contact_updated` carried a do-not-call signal.
    CancellationNoted { flagged: u64 },
}

pub struct EngagementPipeline {
    attempts: Arc<dyn AttemptRepository>,
    claims: Arc<dyn ContactClaimRepository>,
    write_tasks: Arc<dyn WriteQueueRepository>,
    voice: Arc<dyn VoiceClient>,
    sms: Arc<dyn SmsClient>,
    crm: Arc<dyn CrmClient>,
    engagement: EngagementConfig,
    sms_config: SmsConfig,
}

impl EngagementPipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        attempts: Arc<dyn AttemptRepository>,
        claims: Arc<dyn ContactClaimRepository>,
        write_tasks: Arc<dyn WriteQueueRepository>,
        voice: Arc<dyn VoiceClient>,
        sms: Arc<dyn SmsClient>,
        crm: Arc<dyn CrmClient>,
        engagement: EngagementConfig,
        sms_config: SmsConfig,
    ) -> Self {
        Self { attempts, claims, write_tasks, voice, sms, crm, engagement, sms_config }
    }

    /// Routes one deduplicated event. Qualifying lead events run the full
    /// dispatch -> watch -> fallback -> finalize sequence; `contact_updated`
    /// is only inspected for a do-not-call signal.
    pub async fn handle_event(&self, event: &LeadEvent) -> Result<DispatchResult, PipelineError> {
        let correlation_id = event.event_id.0.as_str();

        if event.event_type == LeadEventType::ContactUpdated {
            return self.handle_contact_update(event).await;
        }

        if !event.event_type.triggers_outreach() {
            debug!(
                event_name = "engagement.dispatch.ignored",
                correlation_id,
                event_type = event.event_type.as_str(),
                "event type does not qualify for outreach"
            );
            return Ok(DispatchResult::Skipped { reason: "event_type_not_qualifying" });
        }

        let Some(contact_id) = event.contact_id.clone() else {
            warn!(
                event_name = "engagement.dispatch.missing_contact",
                correlation_id,
                event_type = event.event_type.as_str(),
                "qualifying event carried no contact id"
            );
            return Ok(DispatchResult::Skipped { reason: "missing_contact_id" });
        };

        self.engage(contact_id, event.lead_source.clone(), correlation_id).await
    }

    async fn handle_contact_update(
        &self,
        event: &LeadEvent,
    ) -> Result<DispatchResult, PipelineError> {
        let correlation_id = event.event_id.0.as_str();
        let Some(contact_id) = event.contact_id.as_ref() else {
            return Ok(DispatchResult::Skipped { reason: "missing_contact_id" });
        };

        if !do_not_call_signal(&event.raw_payload) {
            return Ok(DispatchResult::Skipped { reason: "no_cancel_signal" });
        }

        let flagged = self.attempts.request_cancel(contact_id).await?;
        info!(
            event_name = "engagement.dispatch.cancel_requested",
            correlation_id,
            contact_id = %contact_id,
            flagged,
            "do-not-call signal received; live attempts flagged for cancellation"
        );
        Ok(DispatchResult::CancellationNoted { flagged })
    }

    async fn engage(
        &self,
        contact_id: ContactId,
        lead_source: Option<String>,
        correlation_id: &str,
    ) -> Result<DispatchResult, PipelineError> {
        let now = Utc::now();
        let window_key = campaign_window_key(now, self.engagement.campaign_window_hours);
        let attempt_id = AttemptId(Uuid::new_v4().to_string());

        let claim = ContactClaim {
            contact_id: contact_id.clone(),
            window_key: window_key.clone(),
            attempt_id: attempt_id.clone(),
            claimed_at: now,
        };
        if !self.claims.try_claim(&claim).await? {
            info!(
                event_name = "engagement.dispatch.already_claimed",
                correlation_id,
                contact_id = %contact_id,
                window_key = %window_key,
                "contact already claimed in this campaign window"
            );
            return Ok(DispatchResult::Skipped { reason: "contact_already_claimed" });
        }

        let mut attempt = EngagementAttempt::new(
            attempt_id,
            contact_id.clone(),
            lead_source,
            window_key,
            now,
        );
        self.attempts.save(attempt.clone()).await?;
        self.record_transition(&attempt, None, "claim_acquired", correlation_id).await?;
        info!(
            event_name = "engagement.dispatch.claimed",
            correlation_id,
            contact_id = %contact_id,
            attempt_id = %attempt.id,
            "engagement claim acquired"
        );

        let profile = match self.crm.get_contact(&contact_id).await {
            Ok(Some(profile)) => profile,
            Ok(None) => {
                return self
                    .abandon(attempt, "contact_not_found", correlation_id)
                    .await;
            }
            Err(error) => {
                warn!(
                    event_name = "engagement.dispatch.contact_fetch_failed",
                    correlation_id,
                    contact_id = %contact_id,
                    error = %error,
                    "could not fetch contact before placement"
                );
                return self.abandon(attempt, "contact_fetch_failed", correlation_id).await;
            }
        };

        if profile.do_not_call {
            return self.abandon(attempt, "do_not_call", correlation_id).await;
        }

        let phone = match profile.phone.as_deref().map(normalize_e164) {
            Some(Ok(phone)) => phone,
            Some(Err(error)) => {
                warn!(
                    event_name = "engagement.dispatch.phone_rejected",
                    correlation_id,
                    contact_id = %contact_id,
                    error = %error,
                    "contact phone could not be normalized"
                );
                return self.abandon(attempt, "phone_unnormalizable", correlation_id).await;
            }
            None => {
                return self.abandon(attempt, "phone_missing", correlation_id).await;
            }
        };

        let request = PlaceCallRequest { phone, contact_name: profile.full_name() };
        let placed = match self.voice.place_call(&request).await {
            Ok(placed) => placed,
            Err(error) => {
                warn!(
                    event_name = "engagement.dispatch.placement_failed",
                    correlation_id,
                    contact_id = %contact_id,
                    attempt_id = %attempt.id,
                    error = %error,
                    "outbound call placement failed"
                );
                return self.abandon(attempt, "placement_failed", correlation_id).await;
            }
        };

        attempt.call_id = Some(placed.call_id.clone());
        self.apply(&mut attempt, AttemptEvent::CallPlaced, "call_placed", correlation_id).await?;
        info!(
            event_name = "engagement.watch.started",
            correlation_id,
            contact_id = %contact_id,
            attempt_id = %attempt.id,
            call_id = %placed.call_id,
            "call placed, watching for outcome"
        );

        let outcome = match self.watch(&attempt.id, &placed.call_id).await? {
            WatchVerdict::Outcome(outcome) => outcome,
            WatchVerdict::Cancelled => {
                self.apply(&mut attempt, AttemptEvent::CancelRequested, "cancelled", correlation_id)
                    .await?;
                info!(
                    event_name = "engagement.watch.cancelled",
                    correlation_id,
                    attempt_id = %attempt.id,
                    "attempt cancelled before outcome"
                );
                return Ok(DispatchResult::Engaged { attempt_id: attempt.id });
            }
        };

        self.settle_outcome(&mut attempt, &profile, &outcome, correlation_id).await?;
        self.finalize(&mut attempt, &profile, &outcome, correlation_id).await?;

        Ok(DispatchResult::Engaged { attempt_id: attempt.id })
    }

    /// Polls call status until a terminal report, cancellation, or the hard
    /// deadline. Past the deadline the outcome defaults to `no_answer`.
    async fn watch(
        &self,
        attempt_id: &AttemptId,
        call_id: &str,
    ) -> Result<WatchVerdict, PipelineError> {
        let deadline = tokio::time::Instant::now()
            + std::time::Duration::from_secs(self.engagement.max_outcome_wait_secs);

        tokio::time::sleep(std::time::Duration::from_secs(self.engagement.grace_period_secs))
            .await;

        let mut interval = self.engagement.poll_interval_secs.max(1);
        loop {
            if self.attempts.cancel_requested(attempt_id).await? {
                return Ok(WatchVerdict::Cancelled);
            }

            let now = tokio::time::Instant::now();
            if now >= deadline {
                warn!(
                    event_name = "engagement.watch.deadline",
                    attempt_id = %attempt_id,
                    call_id,
                    "outcome deadline passed with call still transient"
                );
                return Ok(WatchVerdict::Outcome(CallOutcome::timed_out(call_id)));
            }

            match self.voice.call_status(call_id).await {
                Ok(CallStatusReport::Ended(outcome)) => {
                    return Ok(WatchVerdict::Outcome(outcome));
                }
                Ok(CallStatusReport::Pending { status }) => {
                    debug!(attempt_id = %attempt_id, call_id, status, "call still in flight");
                }
                Err(error) => {
                    // Transient poll failures burn deadline budget, nothing more.
                    warn!(
                        event_name = "engagement.watch.poll_failed",
                        attempt_id = %attempt_id,
                        call_id,
                        error = %error,
                        "status poll failed"
                    );
                }
            }

            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            let wait = std::time::Duration::from_secs(interval).min(remaining);
            tokio::time::sleep(wait).await;
            interval = interval
                .saturating_mul(u64::from(self.engagement.poll_backoff_multiplier.max(1)));
        }
    }

    /// Applies the classified outcome to the attempt, consulting the
    /// fallback policy for unanswered dispositions.
    async fn settle_outcome(
        &self,
        attempt: &mut EngagementAttempt,
        profile: &ContactProfile,
        outcome: &CallOutcome,
        correlation_id: &str,
    ) -> Result<(), PipelineError> {
        attempt.outcome_at = Some(Utc::now());

        if outcome.disposition == Disposition::Answered {
            self.apply(attempt, AttemptEvent::CallAnswered, "call_answered", correlation_id)
                .await?;
            return Ok(());
        }

        self.apply(
            attempt,
            AttemptEvent::CallUnanswered(outcome.disposition),
            outcome.disposition.as_str(),
            correlation_id,
        )
        .await?;

        match fallback::decide(
            outcome.disposition,
            profile,
            &self.sms_config.business_name,
            &self.sms_config.callback_number,
        ) {
            FallbackDecision::Send { message } => {
                self.deliver_fallback(attempt, profile, outcome, &message, correlation_id).await?;
            }
            decision => {
                attempt.sms_fallback_reason =
                    decision.skip_reason().map(str::to_string);
                self.apply(
                    attempt,
                    AttemptEvent::FallbackSkipped,
                    decision.skip_reason().unwrap_or("skipped"),
                    correlation_id,
                )
                .await?;
                info!(
                    event_name = "engagement.fallback.skipped",
                    correlation_id,
                    attempt_id = %attempt.id,
                    reason = decision.skip_reason().unwrap_or("skipped"),
                    "sms fallback skipped"
                );
            }
        }

        Ok(())
    }

    /// Sends the fallback text with one retry. Both failing marks the
    /// attempt failed with reason `fallback_delivery_failed`.
    async fn deliver_fallback(
        &self,
        attempt: &mut EngagementAttempt,
        profile: &ContactProfile,
        outcome: &CallOutcome,
        message: &str,
        correlation_id: &str,
    ) -> Result<(), PipelineError> {
        let to = profile.phone.as_deref().map(normalize_e164);
        let Some(Ok(to)) = to else {
            attempt.failure_reason = Some("fallback_delivery_failed".to_string());
            self.apply(
                attempt,
                AttemptEvent::FallbackDeliveryFailed,
                "fallback_no_phone",
                correlation_id,
            )
            .await?;
            return Ok(());
        };

        match self.send_sms_with_retry(&to, message).await {
            Ok(()) => {
                attempt.sms_fallback_sent = true;
                attempt.sms_fallback_date = Some(Utc::now());
                attempt.sms_fallback_reason = Some(outcome.disposition.as_str().to_string());
                self.apply(
                    attempt,
                    AttemptEvent::FallbackDelivered,
                    "fallback_delivered",
                    correlation_id,
                )
                .await?;
                info!(
                    event_name = "engagement.fallback.sent",
                    correlation_id,
                    attempt_id = %attempt.id,
                    reason = outcome.disposition.as_str(),
                    "sms fallback delivered"
                );
            }
            Err(error) => {
                attempt.failure_reason = Some("fallback_delivery_failed".to_string());
                self.apply(
                    attempt,
                    AttemptEvent::FallbackDeliveryFailed,
                    "fallback_delivery_failed",
                    correlation_id,
                )
                .await?;
                warn!(
                    event_name = "engagement.fallback.failed",
                    correlation_id,
                    attempt_id = %attempt.id,
                    error = %error,
                    "sms fallback failed after retry"
                );
            }
        }

        Ok(())
    }

    async fn send_sms_with_retry(&self, to: &str, message: &str) -> Result<(), ClientError> {
        match self.sms.send_sms(to, message).await {
            Ok(_) => Ok(()),
            Err(first) => {
                warn!(
                    event_name = "engagement.fallback.retrying",
                    error = %first,
                    "sms send failed, retrying once"
                );
                self.sms.send_sms(to, message).await.map(|_| ())
            }
        }
    }

    /// Scores the lead, queues the batched CRM write, and completes the
    /// attempt. The write task survives this run; the queue worker retries
    /// it independently when the first execution fails.
    async fn finalize(
        &self,
        attempt: &mut EngagementAttempt,
        profile: &ContactProfile,
        outcome: &CallOutcome,
        correlation_id: &str,
    ) -> Result<(), PipelineError> {
        let in_area = is_in_service_area(
            &self.engagement.service_area_zip_codes,
            &self.engagement.service_area_cities,
            profile.zip.as_deref(),
            profile.city.as_deref(),
        );
        let score = score_lead(&ScoreInput {
            urgency_signal: outcome.urgency_signal,
            booking_result: outcome.booking_result,
            completeness_points: completeness_points(profile),
            in_service_area: in_area,
            contact_established: outcome.disposition == Disposition::Answered,
        });

        let fields = build_result_fields(attempt, profile, outcome, score.value);
        let writes = build_custom_fields(&fields);
        let payload_json = serde_json::to_string(&writes)
            .map_err(|error| PipelineError::Encode(error.to_string()))?;

        let engine = self.write_engine();
        let task = engine.create_task(
            attempt.id.clone(),
            attempt.contact_id.clone(),
            CRM_WRITE_OPERATION_KIND,
            payload_json,
            correlation_id,
        );
        self.write_tasks.save_task(task.clone()).await?;
        self.run_write_task(task).await?;

        self.apply(attempt, AttemptEvent::ResultsPersisted, "results_persisted", correlation_id)
            .await?;
        info!(
            event_name = "engagement.finalize.completed",
            correlation_id,
            attempt_id = %attempt.id,
            score = score.value,
            band = score.breakdown.band.as_str(),
            "attempt finalized"
        );
        Ok(())
    }

    /// Executes one queued CRM write. Failures re-queue with backoff until
    /// the retry budget runs out, then raise an operator alert; the payload
    /// stays in the queue table either way.
    async fn run_write_task(&self, task: WriteTask) -> Result<(), PipelineError> {
        let engine = self.write_engine();
        let task = match engine.claim_task(task, WRITE_WORKER_ID) {
            Ok(task) => task,
            Err(error) => {
                debug!(error = %error, "write task not claimable");
                return Ok(());
            }
        };
        self.write_tasks.save_task(task.clone()).await?;

        let writes: Vec<CustomFieldWrite> = serde_json::from_str(&task.payload_json)
            .map_err(|error| PipelineError::Encode(error.to_string()))?;

        match self.crm.update_contact_fields(&task.contact_id, &writes).await {
            Ok(report) => {
                for key in &report.missing_definitions {
                    warn!(
                        event_name = "engagement.write.missing_field",
                        correlation_id = %task.correlation_id,
                        attempt_id = %task.attempt_id,
                        field = %key,
                        "crm has no definition for field, skipped"
                    );
                }
                let fingerprint = report.written.join(",");
                let done = engine.complete_task(task, fingerprint)?;
                self.write_tasks.save_task(done).await?;
            }
            Err(error) => {
                let policy = if error.is_retryable() {
                    RetryPolicy::Retry
                } else {
                    RetryPolicy::FailTerminal
                };
                let failed = engine.fail_task(task, error.to_string(), policy)?;
                let terminal = failed.state == WriteTaskState::FailedTerminal;
                self.write_tasks.save_task(failed.clone()).await?;
                if terminal {
                    error!(
                        event_name = "operator.alert.crm_write_failed",
                        correlation_id = %failed.correlation_id,
                        attempt_id = %failed.attempt_id,
                        contact_id = %failed.contact_id,
                        task_id = %failed.id,
                        error = %error,
                        "crm write exhausted retries; manual intervention required"
                    );
                } else {
                    warn!(
                        event_name = "engagement.write.requeued",
                        correlation_id = %failed.correlation_id,
                        attempt_id = %failed.attempt_id,
                        retry_count = failed.retry_count,
                        error = %error,
                        "crm write failed, queued for retry"
                    );
                }
            }
        }
        Ok(())
    }

    /// Runs the write tasks whose backoff has elapsed, plus any task a
    /// crashed process left claimed past the stale-claim timeout. Called
    /// periodically by the queue worker loop.
    pub async fn drain_due_writes(&self, limit: u32) -> Result<u32, PipelineError> {
        let engine = self.write_engine();
        let now = Utc::now();

        let due = self.write_tasks.list_due_tasks(now, limit).await?;
        let running = self.write_tasks.list_running_tasks(limit).await?;
        let stale = engine.recover_stale_tasks(running, now);
        for task in &stale {
            warn!(
                event_name = "engagement.write.stale_claim_recovered",
                correlation_id = %task.correlation_id,
                attempt_id = %task.attempt_id,
                task_id = %task.id,
                claimed_by = task.claimed_by.as_deref().unwrap_or("unknown"),
                "taking over write task with a stale claim"
            );
        }

        let mut count = 0;
        for task in due.into_iter().chain(stale) {
            self.run_write_task(task).await?;
            count += 1;
        }
        Ok(count)
    }

    fn write_engine(&self) -> WriteQueueEngine {
        WriteQueueEngine::with_config(WriteQueueConfig {
            default_max_retries: self.engagement.write_max_retries,
            retry_base_delay_seconds: self.engagement.write_retry_base_delay_secs as i64,
            ..WriteQueueConfig::default()
        })
    }

    /// Abandons a claimed attempt before the call could start: the attempt
    /// fails with a reason and the claim is released so a later qualifying
    /// event may try again.
    async fn abandon(
        &self,
        mut attempt: EngagementAttempt,
        reason: &str,
        correlation_id: &str,
    ) -> Result<DispatchResult, PipelineError> {
        attempt.failure_reason = Some(reason.to_string());
        let outcome =
            self.apply(&mut attempt, AttemptEvent::PlacementFailed, reason, correlation_id).await?;
        if outcome.actions.contains(&leadline_core::engagement::AttemptAction::ReleaseClaim) {
            self.claims.release(&attempt.contact_id, &attempt.window_key).await?;
        }
        info!(
            event_name = "engagement.dispatch.abandoned",
            correlation_id,
            contact_id = %attempt.contact_id,
            attempt_id = %attempt.id,
            reason,
            "attempt abandoned before outcome"
        );
        Ok(DispatchResult::Abandoned { attempt_id: attempt.id, reason: reason.to_string() })
    }

    /// Applies a state machine event, persists the attempt, and appends the
    /// audit row.
    async fn apply(
        &self,
        attempt: &mut EngagementAttempt,
        event: AttemptEvent,
        reason: &str,
        correlation_id: &str,
    ) -> Result<leadline_core::engagement::TransitionOutcome, PipelineError> {
        let outcome = transition(&attempt.status, &event)?;
        attempt.status = outcome.to.clone();
        attempt.state_version += 1;
        attempt.updated_at = Utc::now();
        self.attempts.save(attempt.clone()).await?;
        self.record_transition(attempt, Some(outcome.from.clone()), reason, correlation_id)
            .await?;
        Ok(outcome)
    }

    async fn record_transition(
        &self,
        attempt: &EngagementAttempt,
        from: Option<leadline_core::domain::attempt::AttemptStatus>,
        reason: &str,
        correlation_id: &str,
    ) -> Result<(), PipelineError> {
        self.attempts
            .append_transition(AttemptTransition {
                id: TransitionId(Uuid::new_v4().to_string()),
                attempt_id: attempt.id.clone(),
                contact_id: attempt.contact_id.clone(),
                from_status: from,
                to_status: attempt.status.clone(),
                reason: reason.to_string(),
                correlation_id: correlation_id.to_string(),
                state_version: attempt.state_version,
                occurred_at: attempt.updated_at,
            })
            .await?;
        Ok(())
    }
}

enum WatchVerdict {
    Outcome(CallOutcome),
    Cancelled,
}

/// A `contact_updated` payload signals do-not-call via the `dnd` flag at
/// any of the locations the CRM nests the contact.
fn do_not_call_signal(payload: &serde_json::Value) -> bool {
    use serde_json::Value;
    [
        payload.get("dnd"),
        payload.get("contact").and_then(|contact| contact.get("dnd")),
        payload
            .get("data")
            .and_then(|data| data.get("contact"))
            .and_then(|contact| contact.get("dnd")),
    ]
    .into_iter()
    .flatten()
    .any(|value| value.as_bool() == Some(true))
}

/// The full result field set written back to the CRM in one batch. Empty
/// values are dropped at encoding time so partial facts never blank
/// existing CRM fields.
fn build_result_fields(
    attempt: &EngagementAttempt,
    profile: &ContactProfile,
    outcome: &CallOutcome,
    score: u8,
) -> BTreeMap<String, String> {
    let mut fields = BTreeMap::new();
    fields.insert("vapi_called".to_string(), "true".to_string());
    fields.insert("vapi_call_id".to_string(), outcome.call_id.clone());
    fields.insert("call_type".to_string(), "outbound_ai".to_string());
    fields.insert("call_outcome".to_string(), outcome.disposition.as_str().to_string());
    fields.insert("call_duration".to_string(), outcome.duration_seconds.to_string());
    fields.insert("lead_quality_score".to_string(), score.to_string());
    fields.insert(
        "ai_call_summary".to_string(),
        outcome.summary_text.clone().unwrap_or_default(),
    );
    fields.insert(
        "call_transcript_url".to_string(),
        outcome.transcript_ref.clone().unwrap_or_default(),
    );
    fields.insert(
        "sms_consent".to_string(),
        profile.sms_consent.map(|granted| granted.to_string()).unwrap_or_default(),
    );
    fields.insert("equipment_type_tags".to_string(), profile.tags.join(","));
    fields.insert(
        "lead_source".to_string(),
        attempt.lead_source.clone().unwrap_or_default(),
    );
    fields.insert("sms_fallback_sent".to_string(), attempt.sms_fallback_sent.to_string());
    fields.insert(
        "sms_fallback_date".to_string(),
        attempt.sms_fallback_date.map(|date| date.to_rfc3339()).unwrap_or_default(),
    );
    fields.insert(
        "sms_fallback_reason".to_string(),
        attempt.sms_fallback_reason.clone().unwrap_or_default(),
    );
    fields
}
