// Shared helpers for registry normalizers.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};

use crate::{NormalizeError, Registry, Result};

/// Keys that commonly carry a record's identity, checked in order when
/// labelling a record in an error message.
const LABEL_KEYS: [&str; 5] = ["name", "formula", "package", "project", "id"];

/// Best-effort label for a raw record, for error messages only.
pub(crate) fn record_label(record: &serde_json::Value) -> String {
    LABEL_KEYS
        .iter()
        .find_map(|key| match record.get(key)? {
            serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .unwrap_or_else(|| "<unknown>".to_string())
}

/// Decode a raw record into the registry's typed shape.
pub(crate) fn decode<T: DeserializeOwned>(
    registry: Registry,
    record: &serde_json::Value,
) -> Result<T> {
    serde_json::from_value(record.clone()).map_err(|e| NormalizeError::MalformedRecord {
        registry,
        record: record_label(record),
        reason: e.to_string(),
    })
}

/// Non-blank string field of a raw record.
pub(crate) fn string_field<'a>(record: &'a serde_json::Value, key: &str) -> Option<&'a str> {
    record
        .get(key)?
        .as_str()
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Deserialize an explicit `null` as the empty value.
pub(crate) fn null_as_empty<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

pub(crate) fn missing_field(
    registry: Registry,
    record: &serde_json::Value,
    field: &str,
) -> NormalizeError {
    NormalizeError::MalformedRecord {
        registry,
        record: record_label(record),
        reason: format!("missing required field `{field}`"),
    }
}

/// Require a non-blank identity field.
pub(crate) fn require<'a>(
    registry: Registry,
    record: &serde_json::Value,
    field: &str,
    value: Option<&'a str>,
) -> Result<&'a str> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| missing_field(registry, record, field))
}

pub(crate) fn is_github_url(url: Option<&str>) -> bool {
    url.is_some_and(|u| {
        let lower = u.to_ascii_lowercase();
        lower.contains("://github.com/") || lower.starts_with("github.com/")
    })
}
