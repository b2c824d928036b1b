use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::event::ContactId;

/// CRM contact snapshot as read at dispatch time.
///
/// `sms_consent` is tri-state on purpose: the CRM field may be absent, and
/// absence must read as "no consent" everywhere downstream (default-deny).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactProfile {
    pub contact_id: Option<ContactId>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
    pub zip: Option<String>,
    pub city: Option<String>,
    pub tags: Vec<String>,
    pub custom_fields: BTreeMap<String, String>,
    pub sms_consent: Option<bool>,
    pub do_not_call: bool,
}

impl ContactProfile {
    pub fn full_name(&self) -> Option<String> {
        match (&self.first_name, &self.last_name) {
            (Some(first), Some(last)) => Some(format!("{first} {last}")),
            (Some(first), None) => Some(first.clone()),
            (None, Some(last)) => Some(last.clone()),
            (None, None) => None,
        }
    }

    /// How many of the four core contact fields (name, phone, email,
    /// address) are present. Feeds the completeness scoring factor.
    pub fn filled_core_fields(&self) -> u8 {
        let mut filled = 0;
        if self.first_name.is_some() || self.last_name.is_some() {
            filled += 1;
        }
        if self.phone.as_deref().is_some_and(|value| !value.trim().is_empty()) {
            filled += 1;
        }
        if self.email.as_deref().is_some_and(|value| !value.trim().is_empty()) {
            filled += 1;
        }
        if self.address.as_deref().is_some_and(|value| !value.trim().is_empty()) {
            filled += 1;
        }
        filled
    }

    pub fn consents_to_sms(&self) -> bool {
        self.sms_consent == Some(true)
    }
}
