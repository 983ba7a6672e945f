//! Wall-clock budget shared by every backend call of a run.

use std::time::{Duration, Instant};

use anyhow::{Result, bail};

/// Point in time after which a run must not start another backend call.
///
/// `None` means the budget lies beyond what `Instant` can represent, so the
/// run is effectively unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunDeadline {
    at: Option<Instant>,
}

impl RunDeadline {
    /// Deadline `budget` from now.
    pub fn after(budget: Duration) -> Self {
        Self {
            at: Instant::now().checked_add(budget),
        }
    }

    /// Time left before the deadline. Errors once it has passed.
    pub fn remaining(&self) -> Result<Duration> {
        let Some(at) = self.at else {
            return Ok(Duration::MAX);
        };
        match at.checked_duration_since(Instant::now()) {
            Some(remaining) if !remaining.is_zero() => Ok(remaining),
            _ => bail!("run timed out"),
        }
    }

    /// Timeout for a single backend call: `per_call`, capped by the deadline.
    pub fn call_budget(&self, per_call: Duration) -> Result<Duration> {
        Ok(self.remaining()?.min(per_call))
    }
}
