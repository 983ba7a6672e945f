//! Evaluator agent scoring a single thought.

use std::time::Duration;

use serde::Deserialize;
use serde_json::Number;
use tracing::{debug, instrument, warn};

use crate::core::payload::parse_payload;
use crate::core::types::{Evaluation, EvaluationFailure, MAX_SCORE, MIN_SCORE};
use crate::io::backend::{Backend, CompletionRequest, RequestKind};
use crate::io::prompt::PromptEngine;

use super::embedded_schema;

const EVALUATION_SCHEMA: &str = include_str!("../../schemas/evaluation.schema.json");

/// Reason recorded when the backend scores a thought without justification.
const MISSING_REASON: &str = "N/A";

#[derive(Debug, Deserialize)]
struct ScorePayload {
    /// Kept as a raw number: JSON Schema accepts `8.0` as an integer.
    score: Number,
    #[serde(default)]
    reason: Option<String>,
}

/// Evaluator wrapper that owns sampling settings.
#[derive(Debug)]
pub struct ThoughtEvaluator {
    temperature: f32,
    json_output: bool,
    prompts: PromptEngine,
}

impl ThoughtEvaluator {
    pub fn new(temperature: f32, json_output: bool) -> Self {
        Self {
            temperature,
            json_output,
            prompts: PromptEngine::new(),
        }
    }

    /// Score `thought`, degrading to a zero-score evaluation on any failure.
    #[instrument(skip_all, fields(timeout_ms = timeout.as_millis() as u64))]
    pub fn evaluate<B: Backend + ?Sized>(
        &self,
        backend: &B,
        problem: &str,
        thought: &str,
        timeout: Duration,
    ) -> Evaluation {
        match self.try_evaluate(backend, problem, thought, timeout) {
            Ok(evaluation) => {
                debug!(score = evaluation.score, "thought scored");
                evaluation
            }
            Err(failure) => {
                warn!(%failure, "degrading evaluation to zero score");
                Evaluation::degraded(thought, &failure)
            }
        }
    }

    /// Score `thought`, returning the failure instead of degrading.
    pub fn try_evaluate<B: Backend + ?Sized>(
        &self,
        backend: &B,
        problem: &str,
        thought: &str,
        timeout: Duration,
    ) -> Result<Evaluation, EvaluationFailure> {
        let prompt = self
            .prompts
            .render_evaluator(problem, thought)
            .map_err(|err| EvaluationFailure::new(format!("{err:#}")))?;

        let request = CompletionRequest {
            kind: RequestKind::Evaluate,
            system: prompt.system,
            user: prompt.user,
            temperature: self.temperature,
            json_output: self.json_output,
            timeout,
        };
        let reply = backend
            .complete(&request)
            .map_err(|err| EvaluationFailure::new(err.to_string()))?;

        let schema = embedded_schema(EVALUATION_SCHEMA)
            .map_err(|err| EvaluationFailure::new(err.to_string()))?;
        let payload: ScorePayload =
            parse_payload(&reply, &schema).map_err(|err| EvaluationFailure::new(err.to_string()))?;

        let reason = payload
            .reason
            .map(|reason| reason.trim().to_string())
            .filter(|reason| !reason.is_empty())
            .unwrap_or_else(|| MISSING_REASON.to_string());
        Ok(Evaluation {
            thought: thought.to_string(),
            score: whole_score(&payload.score)?,
            reason,
        })
    }
}

/// Convert an integral score within `MIN_SCORE..=MAX_SCORE` to `u8`.
fn whole_score(number: &Number) -> Result<u8, EvaluationFailure> {
    if let Some(score) = number.as_u64() {
        return u8::try_from(score)
            .ok()
            .filter(|score| (MIN_SCORE..=MAX_SCORE).contains(score))
            .ok_or_else(|| EvaluationFailure::new(format!("score {number} out of range")));
    }
    let value = number
        .as_f64()
        .ok_or_else(|| EvaluationFailure::new(format!("score {number} is not a number")))?;
    if value.fract() != 0.0 || !(f64::from(MIN_SCORE)..=f64::from(MAX_SCORE)).contains(&value) {
        return Err(EvaluationFailure::new(format!(
            "score {number} is not a whole number within {MIN_SCORE}..={MAX_SCORE}"
        )));
    }
    Ok(value as u8)
}
