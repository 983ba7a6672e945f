//! Shared deterministic types for the thought loop.
//!
//! These types define stable contracts between the generator, evaluator,
//! quality gate, and selector. They must not depend on external state or I/O.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Lowest score an evaluation can carry. Degraded evaluations use it.
pub const MIN_SCORE: u8 = 0;
/// Highest score an evaluation can carry.
pub const MAX_SCORE: u8 = 10;

/// A scored candidate reasoning step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evaluation {
    /// The thought this evaluation refers to (always from the same batch).
    pub thought: String,
    /// Quality score in `MIN_SCORE..=MAX_SCORE`.
    pub score: u8,
    /// Justification returned by the scoring service, or the failure description.
    pub reason: String,
}

impl Evaluation {
    /// Zero-score placeholder used when scoring a thought failed.
    pub fn degraded(thought: &str, failure: &EvaluationFailure) -> Self {
        Self {
            thought: thought.to_string(),
            score: MIN_SCORE,
            reason: failure.to_string(),
        }
    }
}

/// Outcome of the quality gate for one batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", content = "reason", rename_all = "snake_case")]
pub enum Decision {
    /// Discard the batch and generate a fresh one.
    Retry,
    /// Move on to selection.
    Proceed(ProceedReason),
}

/// Why the gate let the loop proceed to selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProceedReason {
    /// The best score of the batch reached the quality threshold.
    QualityMet,
    /// The retry ceiling was reached; the batch is used regardless of score.
    RetryCeilingReached,
    /// The batch was empty (generation failed), so there is nothing to select.
    NoCandidates,
}

/// Generation produced no usable thoughts.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("generation failed: {message}")]
pub struct GenerationFailure {
    pub message: String,
}

impl GenerationFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Scoring a single thought failed.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("evaluation failed: {message}")]
pub struct EvaluationFailure {
    pub message: String,
}

impl EvaluationFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Summary of one generate → evaluate → decide pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptRecord {
    /// Generation attempt number (1-indexed, equals the retry counter after generation).
    pub attempt: u32,
    pub thoughts: Vec<String>,
    pub evaluations: Vec<Evaluation>,
    pub generation_failure: Option<GenerationFailure>,
    pub decision: Decision,
    pub duration_ms: u64,
}

impl AttemptRecord {
    pub fn best_score(&self) -> Option<u8> {
        self.evaluations.iter().map(|e| e.score).max()
    }
}

/// Terminal result of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunOutcome {
    /// Generation attempts performed.
    pub attempts: u32,
    /// Why the final batch went to selection.
    pub stop: ProceedReason,
    /// Winning evaluation, `None` when no candidates were available.
    pub best: Option<Evaluation>,
}
