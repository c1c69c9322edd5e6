//! Append-only JSONL audit records (`metrics.jsonl`, `history.jsonl`).
//!
//! Each record is serialized into one complete line and written with a single
//! `write_all` on a file opened in append mode. Prior lines are never touched.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;
use tracing::debug;

use crate::core::outcome::ExecutionStatus;

/// Maximum characters of an error body kept in a record.
pub const ERROR_EXCERPT_CHARS: usize = 500;

/// Status of a single model call attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiCallStatus {
    Success,
    /// Non-success HTTP status (4xx/5xx) or unusable success body.
    Error,
    RateLimited,
    Timeout,
    NetworkError,
}

/// One `api_call` line.
#[derive(Debug, Clone, Serialize)]
pub struct ApiCallRecord {
    pub model: String,
    pub attempt: u32,
    pub elapsed_seconds: f64,
    pub status: ApiCallStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// One `task_execution` line.
#[derive(Debug, Clone, Serialize)]
pub struct TaskExecutionRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    pub file: String,
    pub commit_msg: String,
    pub model: String,
    pub status: ExecutionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub orig_lines: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_lines: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub elapsed_seconds: f64,
}

/// Audit entries written to the metrics log, tagged by `type`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditRecord {
    ApiCall(ApiCallRecord),
    TaskExecution(TaskExecutionRecord),
}

/// One line per queue cycle in the run history.
#[derive(Debug, Clone, Serialize)]
pub struct HistoryRecord {
    pub status: String,
    pub task_id: String,
    pub task_file: String,
    pub commit: String,
    pub instruction: String,
    pub exit_code: i32,
    pub run_id: String,
    pub run_attempt: String,
}

#[derive(Serialize)]
struct Stamped<'a, T: Serialize> {
    timestamp: String,
    #[serde(flatten)]
    record: &'a T,
}

/// Append-only JSONL sink.
#[derive(Debug, Clone)]
pub struct AuditLog {
    path: PathBuf,
}

impl AuditLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stamp `record` with the current UTC time and append it as one line.
    pub fn append<T: Serialize>(&self, record: &T) -> Result<()> {
        let stamped = Stamped {
            timestamp: timestamp_now(),
            record,
        };
        let mut line = serde_json::to_string(&stamped).context("serialize audit record")?;
        line.push('\n');

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create audit dir {}", parent.display()))?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("open {}", self.path.display()))?;
        file.write_all(line.as_bytes())
            .with_context(|| format!("append {}", self.path.display()))?;
        debug!(path = %self.path.display(), "audit record appended");
        Ok(())
    }
}

/// UTC timestamp in the fixed `YYYY-MM-DDTHH:MM:SSZ` format.
pub fn timestamp_now() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// Seconds rounded to two decimals.
pub fn round_seconds(elapsed: Duration) -> f64 {
    (elapsed.as_secs_f64() * 100.0).round() / 100.0
}

/// Truncate to [`ERROR_EXCERPT_CHARS`] characters without splitting a char.
pub fn excerpt(text: &str) -> String {
    text.chars().take(ERROR_EXCERPT_CHARS).collect()
}
