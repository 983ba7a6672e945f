//! Quality gate deciding between regenerating and selecting.

use crate::core::types::{Decision, Evaluation, ProceedReason};

/// Minimum best-of-batch score accepted without regenerating.
pub const MIN_QUALITY_SCORE: u8 = 7;
/// Number of generation attempts after which the loop proceeds regardless of score.
pub const MAX_RETRIES: u32 = 3;

/// Threshold and retry ceiling for the decision step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QualityGate {
    pub min_quality_score: u8,
    pub max_retries: u32,
}

impl Default for QualityGate {
    fn default() -> Self {
        Self {
            min_quality_score: MIN_QUALITY_SCORE,
            max_retries: MAX_RETRIES,
        }
    }
}

impl QualityGate {
    /// Decide the next transition for a scored batch.
    ///
    /// `retries` counts completed generation attempts, including the one that
    /// produced `evaluations`. With the `<` comparison this allows exactly
    /// `max_retries` generation attempts.
    ///
    /// An empty batch proceeds with [`ProceedReason::NoCandidates`]; it is not
    /// treated as a low-quality batch.
    pub fn decide(&self, evaluations: &[Evaluation], retries: u32) -> Decision {
        let Some(best_score) = evaluations.iter().map(|e| e.score).max() else {
            return Decision::Proceed(ProceedReason::NoCandidates);
        };

        if best_score >= self.min_quality_score {
            return Decision::Proceed(ProceedReason::QualityMet);
        }
        if retries < self.max_retries {
            return Decision::Retry;
        }
        Decision::Proceed(ProceedReason::RetryCeilingReached)
    }
}
