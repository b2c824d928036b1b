//! SMS fallback policy.
//!
//! Default-deny: a text goes out only when the call disposition warrants
//! one AND the contact has an explicit consent grant on file. Every skip
//! carries its reason so the attempt record explains why no SMS was sent.

use crate::domain::contact::ContactProfile;
use crate::domain::outcome::Disposition;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FallbackDecision {
    Send { message: String },
    SkipConsent,
    SkipDisposition,
}

impl FallbackDecision {
    pub fn skip_reason(&self) -> Option<&'static str> {
        match self {
            Self::Send { .. } => None,
            Self::SkipConsent => Some("no_sms_consent"),
            Self::SkipDisposition => Some("disposition_not_eligible"),
        }
    }
}

pub fn decide(
    disposition: Disposition,
    profile: &ContactProfile,
    business_name: &str,
    callback_number: &str,
) -> FallbackDecision {
    if !disposition.needs_fallback() {
        return FallbackDecision::SkipDisposition;
    }
    if !profile.consents_to_sms() {
        return FallbackDecision::SkipConsent;
    }
    FallbackDecision::Send {
        message: render_message(profile.first_name.as_deref(), business_name, callback_number),
    }
}

/// The fallback text body. Always includes the opt-out instruction.
pub fn render_message(first_name: Option<&str>, business_name: &str, callback_number: &str) -> String {
    let greeting = match first_name {
        Some(name) if !name.trim().is_empty() => format!("Hi {}", name.trim()),
        _ => "Hi".to_string(),
    };
    format!(
        "{greeting}, this is {business_name}. We just tried to reach you about your request \
         but couldn't connect. Call us back at {callback_number} and we'll get you scheduled. \
         Reply STOP to opt out."
    )
}

#[cfg(test)]
mod tests {
    use crate::domain::contact::ContactProfile;
    use crate::domain::outcome::Disposition;
    use crate::fallback::{decide, render_message, FallbackDecision};

    fn consenting_contact() -> ContactProfile {
        ContactProfile {
            first_name: Some("Ada".to_string()),
            sms_consent: Some(true),
            ..ContactProfile::default()
        }
    }

    #[test]
    fn answered_calls_never_trigger_sms() {
        let decision =
            decide(Disposition::Answered, &consenting_contact(), "Acme Plumbing", "+15035550100");
        assert_eq!(decision, FallbackDecision::SkipDisposition);
        assert_eq!(decision.skip_reason(), Some("disposition_not_eligible"));
    }

    #[test]
    fn missing_consent_denies_by_default() {
        let no_flag = ContactProfile::default();
        let decision = decide(Disposition::NoAnswer, &no_flag, "Acme Plumbing", "+15035550100");
        assert_eq!(decision, FallbackDecision::SkipConsent);

        let denied =
            ContactProfile { sms_consent: Some(false), ..ContactProfile::default() };
        assert_eq!(
            decide(Disposition::Busy, &denied, "Acme Plumbing", "+15035550100"),
            FallbackDecision::SkipConsent
        );
    }

    #[test]
    fn eligible_disposition_with_consent_sends() {
        for disposition in [
            Disposition::NoAnswer,
            Disposition::Busy,
            Disposition::Failed,
            Disposition::Voicemail,
        ] {
            let decision =
                decide(disposition, &consenting_contact(), "Acme Plumbing", "+15035550100");
            match decision {
                FallbackDecision::Send { message } => {
                    assert!(message.contains("Hi Ada"));
                    assert!(message.contains("Acme Plumbing"));
                    assert!(message.contains("+15035550100"));
                    assert!(message.contains("Reply STOP"));
                }
                other => panic!("expected send, got {other:?}"),
            }
        }
    }

    #[test]
    fn message_handles_a_missing_first_name() {
        let message = render_message(None, "Acme Plumbing", "+15035550100");
        assert!(message.starts_with("Hi,"));
        assert!(message.contains("Reply STOP"));
    }
}
