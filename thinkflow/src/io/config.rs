//! ThinkFlow configuration stored in `thinkflow.toml`.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::gate::{MAX_RETRIES, MIN_QUALITY_SCORE, QualityGate};
use crate::core::types::MAX_SCORE;

/// Default number of thoughts requested per generation attempt.
pub const DEFAULT_K: usize = 6;

/// Upper bound for `run_timeout_secs` and `backend.call_timeout_secs` (one day).
pub const MAX_TIMEOUT_SECS: u64 = 24 * 60 * 60;

/// ThinkFlow configuration (TOML).
///
/// Missing fields default to the values used by the reference loop.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ThinkConfig {
    /// Thoughts requested per generation attempt.
    pub k: usize,

    /// Best-of-batch score accepted without regenerating.
    pub min_quality_score: u8,

    /// Generation attempts before the loop proceeds regardless of score.
    pub max_retries: u32,

    /// Score the thoughts of a batch concurrently instead of one at a time.
    pub parallel_evaluations: bool,

    /// Wall-clock budget for a whole run in seconds.
    pub run_timeout_secs: u64,

    pub backend: BackendConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BackendConfig {
    /// Base URL of an OpenAI-compatible API (without `/chat/completions`).
    pub base_url: String,

    pub model: String,

    /// Environment variable holding the API key. The key is never stored here.
    pub api_key_env: String,

    /// Upper bound for a single backend call in seconds.
    pub call_timeout_secs: u64,

    pub generation_temperature: f32,

    pub evaluation_temperature: f32,

    /// Request `response_format = json_object` from the backend.
    pub json_mode: bool,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "https://openrouter.ai/api/v1".to_string(),
            model: "google/gemini-2.5-flash-lite-preview-09-2025".to_string(),
            api_key_env: "OPENROUTER_API_KEY".to_string(),
            call_timeout_secs: 120,
            generation_temperature: 0.7,
            evaluation_temperature: 0.0,
            json_mode: true,
        }
    }
}

impl Default for ThinkConfig {
    fn default() -> Self {
        Self {
            k: DEFAULT_K,
            min_quality_score: MIN_QUALITY_SCORE,
            max_retries: MAX_RETRIES,
            parallel_evaluations: false,
            run_timeout_secs: 10 * 60,
            backend: BackendConfig::default(),
        }
    }
}

impl ThinkConfig {
    pub fn validate(&self) -> Result<()> {
        if self.k == 0 {
            return Err(anyhow!("k must be >= 1"));
        }
        if self.min_quality_score > MAX_SCORE {
            return Err(anyhow!("min_quality_score must be <= {MAX_SCORE}"));
        }
        if self.max_retries == 0 {
            return Err(anyhow!("max_retries must be >= 1"));
        }
        if !(1..=MAX_TIMEOUT_SECS).contains(&self.run_timeout_secs) {
            return Err(anyhow!(
                "run_timeout_secs must be within 1..={MAX_TIMEOUT_SECS}"
            ));
        }
        if !(1..=MAX_TIMEOUT_SECS).contains(&self.backend.call_timeout_secs) {
            return Err(anyhow!(
                "backend.call_timeout_secs must be within 1..={MAX_TIMEOUT_SECS}"
            ));
        }
        if self.backend.base_url.trim().is_empty() {
            return Err(anyhow!("backend.base_url must be non-empty"));
        }
        if self.backend.model.trim().is_empty() {
            return Err(anyhow!("backend.model must be non-empty"));
        }
        if self.backend.api_key_env.trim().is_empty() {
            return Err(anyhow!("backend.api_key_env must be non-empty"));
        }
        for (name, value) in [
            ("generation_temperature", self.backend.generation_temperature),
            ("evaluation_temperature", self.backend.evaluation_temperature),
        ] {
            if !(0.0..=2.0).contains(&value) {
                return Err(anyhow!("backend.{name} must be within 0.0..=2.0"));
            }
        }
        Ok(())
    }

    pub fn gate(&self) -> QualityGate {
        QualityGate {
            min_quality_score: self.min_quality_score,
            max_retries: self.max_retries,
        }
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `ThinkConfig::default()`.
pub fn load_config(path: &Path) -> Result<ThinkConfig> {
    if !path.exists() {
        debug!(path = %path.display(), "config missing, using defaults");
        let cfg = ThinkConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: ThinkConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    debug!(path = %path.display(), k = cfg.k, max_retries = cfg.max_retries, "config loaded");
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &ThinkConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, ThinkConfig::default());
        assert_eq!(cfg.gate(), QualityGate::default());
    }

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("thinkflow.toml");
        let cfg = ThinkConfig {
            k: 3,
            parallel_evaluations: true,
            ..ThinkConfig::default()
        };
        write_config(&path, &cfg).expect("write");
        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("thinkflow.toml");
        fs::write(&path, "k = 2\n\n[backend]\nmodel = \"local/model\"\n").expect("write");
        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.k, 2);
        assert_eq!(cfg.backend.model, "local/model");
        assert_eq!(cfg.max_retries, MAX_RETRIES);
        assert_eq!(cfg.backend.api_key_env, "OPENROUTER_API_KEY");
    }

    #[test]
    fn rejects_zero_k_and_out_of_range_threshold() {
        let cfg = ThinkConfig {
            k: 0,
            ..ThinkConfig::default()
        };
        assert!(cfg.validate().unwrap_err().to_string().contains("k must be"));

        let cfg = ThinkConfig {
            min_quality_score: 11,
            ..ThinkConfig::default()
        };
        assert!(
            cfg.validate()
                .unwrap_err()
                .to_string()
                .contains("min_quality_score")
        );
    }

    #[test]
    fn rejects_unbounded_timeouts() {
        let cfg = ThinkConfig {
            run_timeout_secs: i64::MAX as u64,
            ..ThinkConfig::default()
        };
        assert!(cfg.validate().unwrap_err().to_string().contains("run_timeout_secs"));

        let mut cfg = ThinkConfig::default();
        cfg.backend.call_timeout_secs = MAX_TIMEOUT_SECS + 1;
        assert!(cfg.validate().unwrap_err().to_string().contains("call_timeout_secs"));

        cfg.backend.call_timeout_secs = MAX_TIMEOUT_SECS;
        cfg.run_timeout_secs = MAX_TIMEOUT_SECS;
        cfg.validate().expect("one day is accepted");
    }
}
