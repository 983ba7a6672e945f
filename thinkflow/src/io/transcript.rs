//! Run transcript files written under a caller-chosen directory.
//!
//! Layout:
//! ```text
//! <dir>/attempts/<n>/attempt.json
//! <dir>/result.json
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::debug;

use crate::core::types::{AttemptRecord, RunOutcome};

#[derive(Debug, Clone)]
pub struct TranscriptPaths {
    pub dir: PathBuf,
    pub result_path: PathBuf,
}

impl TranscriptPaths {
    pub fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
            result_path: dir.join("result.json"),
        }
    }

    pub fn attempt_path(&self, attempt: u32) -> PathBuf {
        self.dir
            .join("attempts")
            .join(attempt.to_string())
            .join("attempt.json")
    }
}

/// Write one attempt record. Returns the written path.
pub fn write_attempt(paths: &TranscriptPaths, record: &AttemptRecord) -> Result<PathBuf> {
    let path = paths.attempt_path(record.attempt);
    write_json(&path, record)?;
    debug!(path = %path.display(), "attempt recorded");
    Ok(path)
}

/// Write the final outcome. Returns the written path.
pub fn write_result(paths: &TranscriptPaths, outcome: &RunOutcome) -> Result<PathBuf> {
    write_json(&paths.result_path, outcome)?;
    Ok(paths.result_path.clone())
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create transcript dir {}", parent.display()))?;
    }
    let mut buf = serde_json::to_string_pretty(value).context("serialize transcript json")?;
    buf.push('\n');
    fs::write(path, buf).with_context(|| format!("write {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{Decision, Evaluation, GenerationFailure, ProceedReason};

    #[test]
    fn transcript_paths_are_stable() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = TranscriptPaths::new(temp.path());
        assert!(paths.result_path.ends_with("result.json"));
        assert!(paths.attempt_path(3).ends_with(Path::new("attempts/3/attempt.json")));
    }

    #[test]
    fn writes_attempt_and_result() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = TranscriptPaths::new(&temp.path().join("run"));
        let best = Evaluation {
            thought: "step B".to_string(),
            score: 8,
            reason: "good".to_string(),
        };
        let record = AttemptRecord {
            attempt: 1,
            thoughts: vec!["step A".to_string(), "step B".to_string()],
            evaluations: vec![
                Evaluation {
                    thought: "step A".to_string(),
                    score: 4,
                    reason: "meh".to_string(),
                },
                best.clone(),
            ],
            generation_failure: None,
            decision: Decision::Proceed(ProceedReason::QualityMet),
            duration_ms: 12,
        };

        let attempt_path = write_attempt(&paths, &record).expect("write attempt");
        let result_path = write_result(
            &paths,
            &RunOutcome {
                attempts: 1,
                stop: ProceedReason::QualityMet,
                best: Some(best),
            },
        )
        .expect("write result");

        let contents = fs::read_to_string(&attempt_path).expect("read attempt");
        assert!(contents.ends_with("}\n"));
        let loaded: AttemptRecord = serde_json::from_str(&contents).expect("parse attempt");
        assert_eq!(loaded, record);
        let result: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(result_path).expect("read result"))
                .expect("parse result");
        assert_eq!(result["best"]["thought"], "step B");
        assert_eq!(result["stop"], "quality_met");
    }

    #[test]
    fn failed_generation_is_recorded() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = TranscriptPaths::new(temp.path());
        let record = AttemptRecord {
            attempt: 2,
            thoughts: Vec::new(),
            evaluations: Vec::new(),
            generation_failure: Some(GenerationFailure::new("transport error: refused")),
            decision: Decision::Proceed(ProceedReason::NoCandidates),
            duration_ms: 0,
        };
        let path = write_attempt(&paths, &record).expect("write");
        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(path).expect("read")).expect("parse");
        assert_eq!(
            value["generation_failure"]["message"],
            "transport error: refused"
        );
        assert_eq!(value["decision"]["reason"], "no_candidates");
    }
}
