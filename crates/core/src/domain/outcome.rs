use serde::{Deserialize, Serialize};

/// Classified result of one placed call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    Answered,
    NoAnswer,
    Busy,
    Failed,
    Voicemail,
}

impl Disposition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Answered => "answered",
            Self::NoAnswer => "no_answer",
            Self::Busy => "busy",
            Self::Failed => "failed",
            Self::Voicemail => "voicemail",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "answered" => Some(Self::Answered),
            "no_answer" => Some(Self::NoAnswer),
            "busy" => Some(Self::Busy),
            "failed" => Some(Self::Failed),
            "voicemail" => Some(Self::Voicemail),
            _ => None,
        }
    }

    /// Dispositions where no live conversation happened and the fallback
    /// engine should be consulted.
    pub fn needs_fallback(&self) -> bool {
        matches!(self, Self::NoAnswer | Self::Busy | Self::Failed | Self::Voicemail)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingResult {
    Booked,
    NotBooked,
    Transferred,
}

impl BookingResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Booked => "booked",
            Self::NotBooked => "not_booked",
            Self::Transferred => "transferred",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "booked" => Some(Self::Booked),
            "not_booked" => Some(Self::NotBooked),
            "transferred" => Some(Self::Transferred),
            _ => None,
        }
    }
}

/// Append-only record of one call attempt's result. Owned by the outcome
/// watcher until handed to the finalizer; never mutated afterward.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallOutcome {
    pub call_id: String,
    pub duration_seconds: u32,
    pub disposition: Disposition,
    pub transcript_ref: Option<String>,
    pub summary_text: Option<String>,
    pub booking_result: BookingResult,
    pub urgency_signal: bool,
}

impl CallOutcome {
    /// The outcome synthesized when the watcher's hard deadline passes with
    /// the call still in a transient state.
    pub fn timed_out(call_id: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            duration_seconds: 0,
            disposition: Disposition::NoAnswer,
            transcript_ref: None,
            summary_text: None,
            booking_result: BookingResult::NotBooked,
            urgency_signal: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{BookingResult, CallOutcome, Disposition};

    #[test]
    fn disposition_round_trips_and_accepts_hyphenated_provider_spelling() {
        for disposition in [
            Disposition::Answered,
            Disposition::NoAnswer,
            Disposition::Busy,
            Disposition::Failed,
            Disposition::Voicemail,
        ] {
            assert_eq!(Disposition::parse(disposition.as_str()), Some(disposition));
        }
        assert_eq!(Disposition::parse("no-answer"), Some(Disposition::NoAnswer));
    }

    #[test]
    fn only_answered_skips_fallback() {
        assert!(!Disposition::Answered.needs_fallback());
        assert!(Disposition::NoAnswer.needs_fallback());
        assert!(Disposition::Busy.needs_fallback());
        assert!(Disposition::Failed.needs_fallback());
        assert!(Disposition::Voicemail.needs_fallback());
    }

    #[test]
    fn timed_out_outcome_defaults_to_no_answer() {
        let outcome = CallOutcome::timed_out("call-1");
        assert_eq!(outcome.disposition, Disposition::NoAnswer);
        assert_eq!(outcome.booking_result, BookingResult::NotBooked);
        assert!(!outcome.urgency_signal);
    }
}
