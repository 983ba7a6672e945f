//! Agents that turn prompts and backend replies into thoughts and evaluations.
//!
//! Both agents convert every backend or payload failure into data at their own
//! boundary: the generator into a [`GenerationFailure`], the evaluator into a
//! degraded zero-score [`Evaluation`].
//!
//! [`GenerationFailure`]: crate::core::types::GenerationFailure
//! [`Evaluation`]: crate::core::types::Evaluation

use serde_json::Value;

use crate::core::payload::PayloadError;

pub mod evaluator;
pub mod generator;

/// Parse an embedded JSON Schema.
fn embedded_schema(raw: &str) -> Result<Value, PayloadError> {
    serde_json::from_str(raw).map_err(|err| PayloadError::Schema(vec![format!("parse schema: {err}")]))
}
