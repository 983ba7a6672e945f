//! Run state threaded through the thought loop, and the updates merged into it.
//!
//! Components never hold the state. They return a [`StateUpdate`] and the loop
//! controller merges it with [`RunState::apply`], which is the only place the
//! state changes.

use serde::Serialize;

use crate::core::types::{Evaluation, GenerationFailure};

/// Record owned by the loop controller for one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunState {
    pub problem: String,
    /// Thoughts of the current batch.
    pub thoughts: Vec<String>,
    /// Evaluations of the current batch, in thought order.
    pub evaluations: Vec<Evaluation>,
    /// Why the current batch is empty, if generation failed.
    pub generation_failure: Option<GenerationFailure>,
    /// Winning evaluation, set only once the run terminates.
    pub best: Option<Evaluation>,
    /// Completed generation attempts.
    pub retries: u32,
}

/// Partial update returned by a loop phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateUpdate {
    /// A new batch replaced the previous one. Counts as a generation attempt.
    Generated {
        thoughts: Vec<String>,
        failure: Option<GenerationFailure>,
    },
    /// Evaluations for the current batch.
    Evaluated(Vec<Evaluation>),
    /// The current batch was rejected by the quality gate.
    Discarded,
    /// Terminal selection (possibly empty).
    Selected(Option<Evaluation>),
}

impl RunState {
    pub fn new(problem: impl Into<String>) -> Self {
        Self {
            problem: problem.into(),
            thoughts: Vec::new(),
            evaluations: Vec::new(),
            generation_failure: None,
            best: None,
            retries: 0,
        }
    }

    /// Merge a phase result into the state.
    pub fn apply(&mut self, update: StateUpdate) {
        match update {
            StateUpdate::Generated { thoughts, failure } => {
                self.thoughts = thoughts;
                self.evaluations.clear();
                self.generation_failure = failure;
                self.retries = self.retries.saturating_add(1);
            }
            StateUpdate::Evaluated(evaluations) => {
                debug_assert_eq!(evaluations.len(), self.thoughts.len());
                self.evaluations = evaluations;
            }
            StateUpdate::Discarded => {
                self.thoughts.clear();
                self.evaluations.clear();
                self.generation_failure = None;
            }
            StateUpdate::Selected(best) => {
                self.best = best;
            }
        }
    }
}
