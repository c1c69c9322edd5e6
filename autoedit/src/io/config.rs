//! Pipeline configuration stored under `.autoedit/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::priority::PriorityWeights;
use crate::core::retry::RetryPolicy;
use crate::core::safety::SafetyPolicy;

/// Default location of the config file, relative to the repository root.
pub const DEFAULT_CONFIG_PATH: &str = ".autoedit/config.toml";

/// Pipeline configuration (TOML).
///
/// Intended to be edited by humans. Missing fields default to the values the
/// pipeline was tuned with; thresholds and weights are heuristics, not
/// invariants, which is why they live here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct AppConfig {
    pub model: ModelConfig,
    pub retry: RetryConfig,
    pub safety: SafetyPolicy,
    pub priority: PriorityConfig,
    pub paths: PathsConfig,
    /// Syntax checkers keyed by file extension.
    pub checkers: Vec<CheckerConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ModelConfig {
    /// Chat-completions endpoint.
    pub endpoint: String,
    /// Model identifier used when neither `--model` nor `COPILOT_MODEL` is set.
    pub model: String,
    /// Environment variable holding the bearer token.
    pub token_env: String,
    /// Response size cap sent with every request.
    pub max_tokens: u32,
    pub request_timeout_secs: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://models.inference.ai.azure.com/chat/completions".to_string(),
            model: "gpt-4o-mini".to_string(),
            token_env: "GITHUB_TOKEN".to_string(),
            max_tokens: 4000,
            request_timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    /// First backoff delay; doubles after every failed attempt.
    pub base_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 5_000,
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.base_delay_ms),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PriorityConfig {
    /// Trailing window for counting recent changes per file.
    pub window_days: u32,
    pub weights: PriorityWeights,
}

impl Default for PriorityConfig {
    fn default() -> Self {
        Self {
            window_days: 30,
            weights: PriorityWeights::default(),
        }
    }
}

/// Artifact locations, relative to the repository root unless absolute.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PathsConfig {
    pub queue: PathBuf,
    pub metrics: PathBuf,
    pub history: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            queue: PathBuf::from(".autoedit/tasks.jsonl"),
            metrics: PathBuf::from(".autoedit/metrics.jsonl"),
            history: PathBuf::from(".autoedit/history.jsonl"),
        }
    }
}

impl PathsConfig {
    pub fn queue_path(&self, root: &Path) -> PathBuf {
        root.join(&self.queue)
    }

    pub fn metrics_path(&self, root: &Path) -> PathBuf {
        root.join(&self.metrics)
    }

    pub fn history_path(&self, root: &Path) -> PathBuf {
        root.join(&self.history)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CheckerConfig {
    /// File extension without the dot (e.g. `lua`).
    pub extension: String,
    /// Command to run; the file path is appended as the last argument.
    pub command: Vec<String>,
    #[serde(default = "default_checker_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_checker_timeout_secs() -> u64 {
    10
}

impl CheckerConfig {
    pub fn luac() -> Self {
        Self {
            extension: "lua".to_string(),
            command: vec!["luac".to_string(), "-p".to_string()],
            timeout_secs: default_checker_timeout_secs(),
        }
    }
}

impl AppConfig {
    /// Config written by `autoedit init`: defaults plus the Lua checker.
    pub fn starter() -> Self {
        Self {
            checkers: vec![CheckerConfig::luac()],
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.model.endpoint.trim().is_empty() {
            return Err(anyhow!("model.endpoint must be non-empty"));
        }
        if self.model.model.trim().is_empty() {
            return Err(anyhow!("model.model must be non-empty"));
        }
        if self.model.token_env.trim().is_empty() {
            return Err(anyhow!("model.token_env must be non-empty"));
        }
        if self.model.max_tokens == 0 {
            return Err(anyhow!("model.max_tokens must be > 0"));
        }
        if self.model.request_timeout_secs == 0 {
            return Err(anyhow!("model.request_timeout_secs must be > 0"));
        }
        if self.retry.max_attempts == 0 {
            return Err(anyhow!("retry.max_attempts must be > 0"));
        }
        if !(self.safety.shrink_ratio > 0.0 && self.safety.shrink_ratio <= 1.0) {
            return Err(anyhow!("safety.shrink_ratio must be in (0, 1]"));
        }
        for checker in &self.checkers {
            if checker.extension.trim().is_empty() {
                return Err(anyhow!("checkers.extension must be non-empty"));
            }
            if checker.command.is_empty() || checker.command[0].trim().is_empty() {
                return Err(anyhow!(
                    "checkers.command for '{}' must be a non-empty array",
                    checker.extension
                ));
            }
            if checker.timeout_secs == 0 {
                return Err(anyhow!(
                    "checkers.timeout_secs for '{}' must be > 0",
                    checker.extension
                ));
            }
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `AppConfig::default()`.
pub fn load_config(path: &Path) -> Result<AppConfig> {
    if !path.exists() {
        let cfg = AppConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: AppConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("validate {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &AppConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
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
        assert_eq!(cfg, AppConfig::default());
        assert_eq!(cfg.retry.policy(), RetryPolicy::default());
    }

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join(".autoedit/config.toml");
        let cfg = AppConfig::starter();
        write_config(&path, &cfg).expect("write");
        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        fs::write(
            &path,
            "[retry]\nbase_delay_ms = 10\n\n[priority.weights.types]\nperf = 90\n",
        )
        .expect("write");
        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.retry.max_attempts, 3);
        assert_eq!(cfg.retry.base_delay_ms, 10);
        assert_eq!(cfg.priority.weights.types.get("perf"), Some(&90));
        assert_eq!(cfg.model, ModelConfig::default());
    }

    #[test]
    fn invalid_values_are_rejected() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        fs::write(&path, "[safety]\nshrink_ratio = 1.5\n").expect("write");
        let err = load_config(&path).unwrap_err();
        assert!(format!("{err:#}").contains("shrink_ratio"));
    }
}
