//! CRM custom-field key handling.
//!
//! The CRM addresses custom fields by a `contact.<key>` path on writes and
//! returns them as either a list of `{key, value}` objects or a flat map on
//! reads. These helpers keep the rest of the pipeline on bare keys.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const CUSTOM_FIELD_PREFIX: &str = "contact.";

/// One entry in a batched custom-field write.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomFieldWrite {
    pub key: String,
    #[serde(rename = "field_value")]
    pub field_value: String,
}

/// Prefixes a bare key with the CRM's custom-field namespace. Keys that
/// already carry the prefix pass through unchanged.
pub fn normalize_field_key(key: &str) -> String {
    let key = key.trim();
    if key.starts_with(CUSTOM_FIELD_PREFIX) {
        key.to_string()
    } else {
        format!("{CUSTOM_FIELD_PREFIX}{key}")
    }
}

/// Builds the write array for a batched update, skipping empty values so a
/// partial result never blanks an existing CRM field.
pub fn build_custom_fields(values: &BTreeMap<String, String>) -> Vec<CustomFieldWrite> {
    values
        .iter()
        .filter(|(_, value)| !value.trim().is_empty())
        .map(|(key, value)| CustomFieldWrite {
            key: normalize_field_key(key),
            field_value: value.trim().to_string(),
        })
        .collect()
}

/// Reads a contact's custom fields from either representation the CRM
/// returns, stripping the namespace prefix from keys.
pub fn read_custom_fields(raw: &Value) -> BTreeMap<String, String> {
    let mut fields = BTreeMap::new();
    match raw {
        Value::Array(entries) => {
            for entry in entries {
                let key = entry
                    .get("key")
                    .and_then(Value::as_str)
                    .or_else(|| entry.get("id").and_then(Value::as_str));
                let value = entry
                    .get("value")
                    .or_else(|| entry.get("field_value"))
                    .or_else(|| entry.get("fieldValue"));
                if let (Some(key), Some(value)) = (key, value) {
                    if let Some(text) = value_as_text(value) {
                        fields.insert(strip_prefix(key), text);
                    }
                }
            }
        }
        Value::Object(map) => {
            for (key, value) in map {
                if let Some(text) = value_as_text(value) {
                    fields.insert(strip_prefix(key), text);
                }
            }
        }
        _ => {}
    }
    fields
}

/// CRM boolean fields arrive as strings. Only the literal "true" grants.
pub fn parse_bool_field(value: Option<&str>) -> Option<bool> {
    value.map(|value| value.trim().eq_ignore_ascii_case("true"))
}

fn strip_prefix(key: &str) -> String {
    key.trim().strip_prefix(CUSTOM_FIELD_PREFIX).unwrap_or(key.trim()).to_string()
}

fn value_as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use serde_json::json;

    use super::{
        build_custom_fields, normalize_field_key, parse_bool_field, read_custom_fields,
    };

    #[test]
    fn bare_keys_gain_the_namespace_once() {
        assert_eq!(normalize_field_key("sms_consent"), "contact.sms_consent");
        assert_eq!(normalize_field_key("contact.sms_consent"), "contact.sms_consent");
    }

    #[test]
    fn empty_values_are_dropped_from_writes() {
        let mut values = BTreeMap::new();
        values.insert("lead_quality_score".to_string(), "87".to_string());
        values.insert("call_transcript_url".to_string(), "  ".to_string());

        let writes = build_custom_fields(&values);
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].key, "contact.lead_quality_score");
        assert_eq!(writes[0].field_value, "87");
    }

    #[test]
    fn reads_accept_both_list_and_map_shapes() {
        let list = json!([
            {"key": "contact.sms_consent", "value": "true"},
            {"id": "vapi_called", "fieldValue": "yes"},
            {"key": "call_duration", "value": 42},
        ]);
        let from_list = read_custom_fields(&list);
        assert_eq!(from_list.get("sms_consent").map(String::as_str), Some("true"));
        assert_eq!(from_list.get("vapi_called").map(String::as_str), Some("yes"));
        assert_eq!(from_list.get("call_duration").map(String::as_str), Some("42"));

        let map = json!({"contact.sms_consent": "false", "lead_source": "webchat"});
        let from_map = read_custom_fields(&map);
        assert_eq!(from_map.get("sms_consent").map(String::as_str), Some("false"));
        assert_eq!(from_map.get("lead_source").map(String::as_str), Some("webchat"));
    }

    #[test]
    fn only_the_literal_true_string_grants_consent() {
        assert_eq!(parse_bool_field(Some("true")), Some(true));
        assert_eq!(parse_bool_field(Some("TRUE")), Some(true));
        assert_eq!(parse_bool_field(Some("yes")), Some(false));
        assert_eq!(parse_bool_field(Some("1")), Some(false));
        assert_eq!(parse_bool_field(None), None);
    }
}
