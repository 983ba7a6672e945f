//! Recovery and validation of structured backend payloads.
//!
//! Backends are asked for a bare JSON object but may wrap it in prose or code
//! fences. The outermost `{ ... }` pair is taken as the payload, validated
//! against a JSON Schema, then deserialized.

use std::sync::LazyLock;

use jsonschema::Draft;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

/// Greedy match from the first `{` to the last `}`.
static OUTERMOST_OBJECT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\{.*\}").expect("outermost object regex is valid"));

/// Why a payload could not be turned into a typed value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PayloadError {
    #[error("response contains no JSON object")]
    NoJsonObject,
    #[error("invalid JSON: {0}")]
    InvalidJson(String),
    #[error("schema validation failed: {}", .0.join("; "))]
    Schema(Vec<String>),
}

/// Locate the JSON object in raw backend text.
///
/// Returns the whole (trimmed) text when it already parses as a JSON object,
/// otherwise the span between the first `{` and the last `}`.
pub fn recover_json_object(text: &str) -> Option<&str> {
    let trimmed = text.trim();
    if matches!(serde_json::from_str::<Value>(trimmed), Ok(Value::Object(_))) {
        return Some(trimmed);
    }
    OUTERMOST_OBJECT_RE.find(trimmed).map(|m| m.as_str())
}

/// Recover, validate against `schema`, and deserialize a payload.
pub fn parse_payload<T: DeserializeOwned>(text: &str, schema: &Value) -> Result<T, PayloadError> {
    let raw = recover_json_object(text).ok_or(PayloadError::NoJsonObject)?;
    let instance: Value =
        serde_json::from_str(raw).map_err(|err| PayloadError::InvalidJson(err.to_string()))?;
    validate_schema(&instance, schema)?;
    serde_json::from_value(instance).map_err(|err| PayloadError::InvalidJson(err.to_string()))
}

/// Validate a JSON instance against a JSON Schema (Draft 2020-12).
pub fn validate_schema(instance: &Value, schema: &Value) -> Result<(), PayloadError> {
    let compiled = jsonschema::options()
        .with_draft(Draft::Draft202012)
        .build(schema)
        .map_err(|err| PayloadError::Schema(vec![format!("compile schema: {err}")]))?;
    let messages: Vec<String> = compiled
        .iter_errors(instance)
        .map(|err| err.to_string())
        .collect();
    if !messages.is_empty() {
        return Err(PayloadError::Schema(messages));
    }
    Ok(())
}
