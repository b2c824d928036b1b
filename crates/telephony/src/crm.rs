//! CRM client: contact reads and batched custom-field writes.
//!
//! Writes are validated against the location's custom-field definitions
//! first. Keys without a definition are dropped from the batch and reported
//! back so the write itself still lands for the rest.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use reqwest::Client;
use secrecy::ExposeSecret;
use serde_json::{json, Value};
use tracing::debug;

use leadline_core::config::CrmConfig;
use leadline_core::domain::contact::ContactProfile;
use leadline_core::domain::event::ContactId;
use leadline_core::fields::{
    normalize_field_key, parse_bool_field, read_custom_fields, CustomFieldWrite,
};

use crate::ClientError;

const API_VERSION_HEADER: &str = "2021-07-28";

/// Result of one batched field write: which keys landed and which had no
/// definition in the CRM.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FieldWriteReport {
    pub written: Vec<String>,
    pub missing_definitions: Vec<String>,
}

#[async_trait::async_trait]
pub trait CrmClient: Send + Sync {
    async fn get_contact(
        &self,
        contact_id: &ContactId,
    ) -> Result<Option<ContactProfile>, ClientError>;

    async fn update_contact_fields(
        &self,
        contact_id: &ContactId,
        fields: &[CustomFieldWrite],
    ) -> Result<FieldWriteReport, ClientError>;
}

pub struct HttpCrmClient {
    config: CrmConfig,
    client: Client,
    // The location's field definitions change rarely; fetched once per
    // process and reused for every batch.
    definitions: Mutex<Option<HashSet<String>>>,
}

impl HttpCrmClient {
    pub fn new(config: CrmConfig) -> Self {
        Self { config, client: Client::new(), definitions: Mutex::new(None) }
    }

    fn bearer(&self) -> String {
        format!("Bearer {}", self.config.api_key.expose_secret())
    }

    async fn field_definitions(&self) -> Result<HashSet<String>, ClientError> {
        {
            let cached = self.definitions.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            if let Some(definitions) = cached.as_ref() {
                return Ok(definitions.clone());
            }
        }

        let response = self
            .client
            .get(format!(
                "{}/locations/{}/customFields",
                self.config.base_url, self.config.location_id
            ))
            .header("Authorization", self.bearer())
            .header("Version", API_VERSION_HEADER)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::status("crm.field_definitions", status.as_u16(), body));
        }

        let payload: Value = response.json().await?;
        let definitions = definitions_from_payload(&payload);

        let mut cached = self.definitions.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *cached = Some(definitions.clone());
        Ok(definitions)
    }
}

#[async_trait::async_trait]
impl CrmClient for HttpCrmClient {
    async fn get_contact(
        &self,
        contact_id: &ContactId,
    ) -> Result<Option<ContactProfile>, ClientError> {
        let response = self
            .client
            .get(format!("{}/contacts/{}", self.config.base_url, contact_id.0))
            .header("Authorization", self.bearer())
            .header("Version", API_VERSION_HEADER)
            .send()
            .await?;

        let status = response.status();
        if status.as_u16() == 404 {
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::status("crm.get_contact", status.as_u16(), body));
        }

        let payload: Value = response.json().await?;
        Ok(Some(profile_from_payload(&payload)))
    }

    async fn update_contact_fields(
        &self,
        contact_id: &ContactId,
        fields: &[CustomFieldWrite],
    ) -> Result<FieldWriteReport, ClientError> {
        let definitions = self.field_definitions().await?;
        let (known, missing) = partition_by_definitions(fields, &definitions);

        if known.is_empty() {
            return Ok(FieldWriteReport { written: Vec::new(), missing_definitions: missing });
        }

        let response = self
            .client
            .put(format!("{}/contacts/{}", self.config.base_url, contact_id.0))
            .header("Authorization", self.bearer())
            .header("Version", API_VERSION_HEADER)
            .json(&json!({ "customFields": known }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::status("crm.update_contact", status.as_u16(), body));
        }
        debug!(contact_id = %contact_id.0, written = known.len(), "contact fields updated");

        Ok(FieldWriteReport {
            written: known.into_iter().map(|write| write.key).collect(),
            missing_definitions: missing,
        })
    }
}

/// Splits a write batch into fields the CRM has a definition for and fields
/// it does not. Key comparison is namespace-insensitive.
pub fn partition_by_definitions(
    fields: &[CustomFieldWrite],
    definitions: &HashSet<String>,
) -> (Vec<CustomFieldWrite>, Vec<String>) {
    let mut known = Vec::new();
    let mut missing = Vec::new();
    for field in fields {
        if definitions.contains(&normalize_field_key(&field.key)) {
            known.push(field.clone());
        } else {
            missing.push(field.key.clone());
        }
    }
    (known, missing)
}

fn definitions_from_payload(payload: &Value) -> HashSet<String> {
    payload
        .get("customFields")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|entry| entry.get("fieldKey").and_then(Value::as_str))
        .map(normalize_field_key)
        .collect()
}

/// Builds a contact snapshot from the CRM's contact payload. The contact
/// object may arrive bare or nested under a `contact` key.
pub fn profile_from_payload(payload: &Value) -> ContactProfile {
    let contact = payload.get("contact").unwrap_or(payload);

    let custom_fields = contact
        .get("customFields")
        .or_else(|| contact.get("customField"))
        .map(read_custom_fields)
        .unwrap_or_default();
    let sms_consent =
        parse_bool_field(custom_fields.get("sms_consent").map(String::as_str));

    ContactProfile {
        contact_id: string_field(contact, "id").map(ContactId),
        first_name: string_field(contact, "firstName"),
        last_name: string_field(contact, "lastName"),
        phone: string_field(contact, "phone"),
        email: string_field(contact, "email"),
        address: string_field(contact, "address1"),
        zip: string_field(contact, "postalCode"),
        city: string_field(contact, "city"),
        tags: contact
            .get("tags")
            .and_then(Value::as_array)
            .map(|tags| {
                tags.iter().filter_map(Value::as_str).map(str::to_string).collect()
            })
            .unwrap_or_default(),
        custom_fields,
        sms_consent,
        do_not_call: contact.get("dnd").and_then(Value::as_bool).unwrap_or(false),
    }
}

fn string_field(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_string)
}

/// Test double over an in-process contact store with scriptable field
/// definitions and write failures.
#[derive(Default)]
pub struct InMemoryCrmClient {
    contacts: Mutex<HashMap<String, ContactProfile>>,
    definitions: Mutex<HashSet<String>>,
    updates: Mutex<Vec<(String, Vec<CustomFieldWrite>)>>,
    write_failures: AtomicU32,
}

impl InMemoryCrmClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_contact(&self, contact_id: &str, profile: ContactProfile) {
        let mut contacts =
            self.contacts.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        contacts.insert(contact_id.to_string(), profile);
    }

    pub fn define_fields(&self, keys: &[&str]) {
        let mut definitions =
            self.definitions.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        for key in keys {
            definitions.insert(normalize_field_key(key));
        }
    }

    pub fn fail_writes(&self, count: u32) {
        self.write_failures.store(count, Ordering::SeqCst);
    }

    pub fn recorded_updates(&self) -> Vec<(String, Vec<CustomFieldWrite>)> {
        let updates = self.updates.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        updates.clone()
    }
}

#[async_trait::async_trait]
impl CrmClient for InMemoryCrmClient {
    async fn get_contact(
        &self,
        contact_id: &ContactId,
    ) -> Result<Option<ContactProfile>, ClientError> {
        let contacts = self.contacts.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        Ok(contacts.get(&contact_id.0).cloned())
    }

    async fn update_contact_fields(
        &self,
        contact_id: &ContactId,
        fields: &[CustomFieldWrite],
    ) -> Result<FieldWriteReport, ClientError> {
        if self.write_failures.load(Ordering::SeqCst) > 0 {
            self.write_failures.fetch_sub(1, Ordering::SeqCst);
            return Err(ClientError::status("crm.update_contact", 502, "scripted failure"));
        }

        let definitions =
            self.definitions.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).clone();
        let (known, missing) = partition_by_definitions(fields, &definitions);

        if !known.is_empty() {
            let mut contacts =
                self.contacts.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            if let Some(profile) = contacts.get_mut(&contact_id.0) {
                for write in &known {
                    let bare = write
                        .key
                        .strip_prefix("contact.")
                        .unwrap_or(write.key.as_str())
                        .to_string();
                    profile.custom_fields.insert(bare, write.field_value.clone());
                }
            }
            let mut updates =
                self.updates.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            updates.push((contact_id.0.clone(), known.clone()));
        }

        Ok(FieldWriteReport {
            written: known.into_iter().map(|write| write.key).collect(),
            missing_definitions: missing,
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use leadline_core::domain::event::ContactId;
    use leadline_core::fields::CustomFieldWrite;

    use super::{profile_from_payload, CrmClient, InMemoryCrmClient};

    #[test]
    fn profile_parses_nested_contact_with_consent_field() {
        let payload = json!({
            "contact": {
                "id": "c-1",
                "firstName": "Ada",
                "lastName": "Byron",
                "phone": "+15035550100",
                "email": "ada@example.com",
                "address1": "12 Elm St",
                "postalCode": "97205",
                "city": "Portland",
                "dnd": false,
                "tags": ["webchat"],
                "customFields": [
                    {"key": "contact.sms_consent", "value": "true"},
                    {"key": "contact.lead_source", "value": "webchat"},
                ],
            }
        });

        let profile = profile_from_payload(&payload);
        assert_eq!(profile.contact_id, Some(ContactId("c-1".to_string())));
        assert_eq!(profile.full_name().as_deref(), Some("Ada Byron"));
        assert_eq!(profile.zip.as_deref(), Some("97205"));
        assert_eq!(profile.sms_consent, Some(true));
        assert!(!profile.do_not_call);
        assert_eq!(profile.filled_core_fields(), 4);
    }

    #[test]
    fn missing_consent_field_stays_unset() {
        let payload = json!({"id": "c-2", "firstName": "Sam"});
        let profile = profile_from_payload(&payload);
        assert_eq!(profile.sms_consent, None);
        assert!(!profile.consents_to_sms());
    }

    #[tokio::test]
    async fn undefined_fields_are_reported_and_the_rest_land() {
        let crm = InMemoryCrmClient::new();
        crm.insert_contact("c-1", Default::default());
        crm.define_fields(&["lead_quality_score", "vapi_called"]);

        let fields = vec![
            CustomFieldWrite {
                key: "contact.lead_quality_score".to_string(),
                field_value: "87".to_string(),
            },
            CustomFieldWrite {
                key: "contact.call_transcript_url".to_string(),
                field_value: "https://recordings.example/c.wav".to_string(),
            },
        ];

        let report = crm
            .update_contact_fields(&ContactId("c-1".to_string()), &fields)
            .await
            .expect("update");
        assert_eq!(report.written, vec!["contact.lead_quality_score".to_string()]);
        assert_eq!(
            report.missing_definitions,
            vec!["contact.call_transcript_url".to_string()]
        );

        let profile = crm
            .get_contact(&ContactId("c-1".to_string()))
            .await
            .expect("get")
            .expect("present");
        assert_eq!(
            profile.custom_fields.get("lead_quality_score").map(String::as_str),
            Some("87")
        );
    }
}
