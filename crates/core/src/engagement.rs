//! Attempt lifecycle state machine.
//!
//! Every status change an attempt can undergo is expressed as one
//! `AttemptEvent` applied through [`transition`]. The function is pure;
//! callers persist the resulting status and execute the returned actions.

use thiserror::Error;

use crate::domain::attempt::AttemptStatus;
use crate::domain::outcome::Disposition;

/// External occurrences that drive an attempt forward.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AttemptEvent {
    CallPlaced,
    PlacementFailed,
    CallAnswered,
    CallUnanswered(Disposition),
    FallbackDelivered,
    FallbackSkipped,
    FallbackDeliveryFailed,
    ResultsPersisted,
    CancelRequested,
}

/// Work the caller must perform after committing a transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AttemptAction {
    WatchOutcome,
    EvaluateFallback,
    FinalizeResults,
    ReleaseClaim,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransitionOutcome {
    pub from: AttemptStatus,
    pub to: AttemptStatus,
    pub event: AttemptEvent,
    pub actions: Vec<AttemptAction>,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum AttemptTransitionError {
    #[error("invalid transition from {status:?} using event {event:?}")]
    InvalidTransition { status: AttemptStatus, event: AttemptEvent },
}

pub fn transition(
    current: &AttemptStatus,
    event: &AttemptEvent,
) -> Result<TransitionOutcome, AttemptTransitionError> {
    use AttemptAction::{EvaluateFallback, FinalizeResults, ReleaseClaim, WatchOutcome};
    use AttemptEvent::{
        CallAnswered, CallPlaced, CallUnanswered, CancelRequested, FallbackDelivered,
        FallbackDeliveryFailed, FallbackSkipped, PlacementFailed, ResultsPersisted,
    };
    use AttemptStatus::{
        Answered, Busy, Cancelled, Completed, Failed, FallbackSent, InProgress, NoAnswer, Pending,
    };

    let (to, actions) = match (current, event) {
        (Pending, CallPlaced) => (InProgress, vec![WatchOutcome]),
        (Pending, PlacementFailed) => (Failed, vec![ReleaseClaim]),
        (InProgress, CallAnswered) => (Answered, vec![FinalizeResults]),
        // Voicemail greets count as no-answer for fallback purposes.
        (InProgress, CallUnanswered(disposition)) => {
            let to = match disposition {
                Disposition::NoAnswer | Disposition::Voicemail => NoAnswer,
                Disposition::Busy => Busy,
                Disposition::Failed => Failed,
                Disposition::Answered => {
                    return Err(AttemptTransitionError::InvalidTransition {
                        status: current.clone(),
                        event: event.clone(),
                    });
                }
            };
            (to, vec![EvaluateFallback])
        }
        (NoAnswer | Busy | Failed, FallbackDelivered) => (FallbackSent, vec![FinalizeResults]),
        (NoAnswer | Busy | Failed, FallbackSkipped) => (current.clone(), vec![FinalizeResults]),
        (NoAnswer | Busy, FallbackDeliveryFailed) => (Failed, vec![FinalizeResults]),
        (Failed, FallbackDeliveryFailed) => (Failed, vec![FinalizeResults]),
        (Answered | NoAnswer | Busy | Failed | FallbackSent, ResultsPersisted) => {
            (Completed, Vec::new())
        }
        (Completed | Cancelled, CancelRequested) => {
            return Err(AttemptTransitionError::InvalidTransition {
                status: current.clone(),
                event: event.clone(),
            });
        }
        (_, CancelRequested) => (Cancelled, Vec::new()),
        _ => {
            return Err(AttemptTransitionError::InvalidTransition {
                status: current.clone(),
                event: event.clone(),
            });
        }
    };

    Ok(TransitionOutcome { from: current.clone(), to, event: event.clone(), actions })
}

#[cfg(test)]
mod tests {
    use crate::domain::attempt::AttemptStatus;
    use crate::domain::outcome::Disposition;
    use crate::engagement::{transition, AttemptAction, AttemptEvent, AttemptTransitionError};

    #[test]
    fn answered_call_path_finalizes_without_fallback() {
        let placed = transition(&AttemptStatus::Pending, &AttemptEvent::CallPlaced)
            .expect("pending -> in_progress");
        assert_eq!(placed.to, AttemptStatus::InProgress);
        assert_eq!(placed.actions, vec![AttemptAction::WatchOutcome]);

        let answered = transition(&placed.to, &AttemptEvent::CallAnswered)
            .expect("in_progress -> answered");
        assert_eq!(answered.to, AttemptStatus::Answered);
        assert_eq!(answered.actions, vec![AttemptAction::FinalizeResults]);

        let done = transition(&answered.to, &AttemptEvent::ResultsPersisted)
            .expect("answered -> completed");
        assert_eq!(done.to, AttemptStatus::Completed);
        assert!(done.actions.is_empty());
    }

    #[test]
    fn unanswered_call_routes_to_fallback_evaluation() {
        for (disposition, expected) in [
            (Disposition::NoAnswer, AttemptStatus::NoAnswer),
            (Disposition::Voicemail, AttemptStatus::NoAnswer),
            (Disposition::Busy, AttemptStatus::Busy),
            (Disposition::Failed, AttemptStatus::Failed),
        ] {
            let outcome = transition(
                &AttemptStatus::InProgress,
                &AttemptEvent::CallUnanswered(disposition),
            )
            .expect("in_progress -> outcome status");
            assert_eq!(outcome.to, expected);
            assert_eq!(outcome.actions, vec![AttemptAction::EvaluateFallback]);
        }
    }

    #[test]
    fn fallback_delivery_marks_fallback_sent() {
        let outcome = transition(&AttemptStatus::NoAnswer, &AttemptEvent::FallbackDelivered)
            .expect("no_answer -> fallback_sent");
        assert_eq!(outcome.to, AttemptStatus::FallbackSent);

        let done = transition(&outcome.to, &AttemptEvent::ResultsPersisted)
            .expect("fallback_sent -> completed");
        assert_eq!(done.to, AttemptStatus::Completed);
    }

    #[test]
    fn skipped_fallback_keeps_the_disposition_status() {
        let outcome = transition(&AttemptStatus::Busy, &AttemptEvent::FallbackSkipped)
            .expect("busy stays busy");
        assert_eq!(outcome.to, AttemptStatus::Busy);
        assert_eq!(outcome.actions, vec![AttemptAction::FinalizeResults]);
    }

    #[test]
    fn failed_placement_releases_the_claim() {
        let outcome = transition(&AttemptStatus::Pending, &AttemptEvent::PlacementFailed)
            .expect("pending -> failed");
        assert_eq!(outcome.to, AttemptStatus::Failed);
        assert_eq!(outcome.actions, vec![AttemptAction::ReleaseClaim]);
    }

    #[test]
    fn cancel_applies_to_any_non_terminal_status() {
        for status in [
            AttemptStatus::Pending,
            AttemptStatus::InProgress,
            AttemptStatus::NoAnswer,
            AttemptStatus::FallbackSent,
        ] {
            let outcome = transition(&status, &AttemptEvent::CancelRequested)
                .expect("cancellable status");
            assert_eq!(outcome.to, AttemptStatus::Cancelled);
        }

        let error = transition(&AttemptStatus::Completed, &AttemptEvent::CancelRequested)
            .expect_err("completed attempts cannot be cancelled");
        assert!(matches!(error, AttemptTransitionError::InvalidTransition { .. }));
    }

    #[test]
    fn out_of_order_events_are_rejected() {
        let error = transition(&AttemptStatus::Pending, &AttemptEvent::CallAnswered)
            .expect_err("no call was placed yet");
        assert!(matches!(
            error,
            AttemptTransitionError::InvalidTransition {
                status: AttemptStatus::Pending,
                event: AttemptEvent::CallAnswered,
            }
        ));

        transition(&AttemptStatus::InProgress, &AttemptEvent::CallUnanswered(Disposition::Answered))
            .expect_err("answered is not an unanswered disposition");
    }

    #[test]
    fn replay_of_the_same_event_sequence_is_deterministic() {
        let events = [
            AttemptEvent::CallPlaced,
            AttemptEvent::CallUnanswered(Disposition::NoAnswer),
            AttemptEvent::FallbackDelivered,
            AttemptEvent::ResultsPersisted,
        ];

        let run = || {
            let mut status = AttemptStatus::Pending;
            let mut actions = Vec::new();
            for event in &events {
                let outcome = transition(&status, event).expect("deterministic run");
                actions.push(outcome.actions);
                status = outcome.to;
            }
            (status, actions)
        };

        assert_eq!(run(), run());
    }
}
