//! Deterministic selection of the winning evaluation.

use crate::core::types::Evaluation;

/// Return the evaluation with the highest score, first one wins on ties.
///
/// Returns `None` for an empty batch.
pub fn select_best(evaluations: &[Evaluation]) -> Option<&Evaluation> {
    // `Iterator::max_by_key` keeps the last maximum, so fold explicitly.
    evaluations.iter().fold(None, |best, candidate| match best {
        Some(current) if current.score >= candidate.score => Some(current),
        _ => Some(candidate),
    })
}
