//! Queue record schema and strict line-level ingestion.
//!
//! A queue file holds one JSON object per line. Records are validated into the
//! fixed-shape [`Task`] at the boundary so downstream code never sees a
//! partially valid task.

use std::collections::{BTreeMap, HashSet};
use std::path::{Component, Path};
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Keys every queue record must carry, in the order they are checked.
pub const REQUIRED_FIELDS: [&str; 4] = ["id", "file", "commit", "instruction"];

static COMMIT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\w+)(?:\(([^)]*)\))?!?:").unwrap());

static STRICT_COMMIT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\w+\([^)]+\):\s*\S").unwrap());

/// One queued request to rewrite a single file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    /// Repository-relative path; the only file the task may modify.
    pub file: String,
    /// Conventional-commit summary, `type(scope): subject`.
    pub commit: String,
    pub instruction: String,
    /// Keys we do not interpret. Preserved verbatim when the queue is rewritten.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Structural violation found while ingesting a queue file.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskError {
    #[error("invalid JSON on line {line}: {message}")]
    InvalidJson { line: usize, message: String },
    #[error("line {line} must be a JSON object")]
    NotObject { line: usize },
    #[error("line {line} missing required field: {field}")]
    MissingField { line: usize, field: &'static str },
    #[error("line {line} duplicates task id '{id}'")]
    DuplicateId { line: usize, id: String },
}

impl TaskError {
    /// 1-based physical line of the offending record.
    pub fn line(&self) -> usize {
        match self {
            TaskError::InvalidJson { line, .. }
            | TaskError::NotObject { line }
            | TaskError::MissingField { line, .. }
            | TaskError::DuplicateId { line, .. } => *line,
        }
    }
}

/// Commit type and scope parsed from a conventional-commit summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitKind<'a> {
    pub kind: &'a str,
    pub scope: Option<&'a str>,
}

impl Task {
    pub fn new(
        id: impl Into<String>,
        file: impl Into<String>,
        commit: impl Into<String>,
        instruction: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            file: file.into(),
            commit: commit.into(),
            instruction: instruction.into(),
            extra: BTreeMap::new(),
        }
    }

    /// First required field that is empty or whitespace-only.
    pub fn first_empty_field(&self) -> Option<&'static str> {
        [
            ("id", &self.id),
            ("file", &self.file),
            ("commit", &self.commit),
            ("instruction", &self.instruction),
        ]
        .into_iter()
        .find(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
    }

    pub fn commit_kind(&self) -> Option<CommitKind<'_>> {
        parse_commit(&self.commit)
    }

    /// True if `file` is relative and cannot climb out of the repository.
    pub fn is_repo_relative(&self) -> bool {
        let path = Path::new(&self.file);
        !path.is_absolute() && !path.components().any(|c| c == Component::ParentDir)
    }

    /// Serialize as a single queue line (no trailing newline).
    pub fn to_line(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Parse `type(scope)!: subject`. Scope and `!` are optional.
pub fn parse_commit(commit: &str) -> Option<CommitKind<'_>> {
    let caps = COMMIT_RE.captures(commit.trim_start())?;
    Some(CommitKind {
        kind: caps.get(1)?.as_str(),
        scope: caps.get(2).map(|m| m.as_str()).filter(|s| !s.is_empty()),
    })
}

/// Parse one queue line. `line` is 1-based and only used for error reporting.
pub fn parse_task_line(line: usize, raw: &str) -> Result<Task, TaskError> {
    let value: Value = serde_json::from_str(raw).map_err(|err| TaskError::InvalidJson {
        line,
        message: err.to_string(),
    })?;
    let Value::Object(map) = &value else {
        return Err(TaskError::NotObject { line });
    };
    for field in REQUIRED_FIELDS {
        let present = map
            .get(field)
            .and_then(Value::as_str)
            .is_some_and(|s| !s.trim().is_empty());
        if !present {
            return Err(TaskError::MissingField { line, field });
        }
    }
    serde_json::from_value(value).map_err(|err| TaskError::InvalidJson {
        line,
        message: err.to_string(),
    })
}

/// Parse a whole queue file. Blank lines are skipped; ids must be unique.
pub fn parse_tasks(contents: &str) -> Result<Vec<Task>, TaskError> {
    let mut tasks = Vec::new();
    let mut seen = HashSet::new();
    for (index, raw) in contents.lines().enumerate() {
        let line = index + 1;
        if raw.trim().is_empty() {
            continue;
        }
        let task = parse_task_line(line, raw.trim())?;
        if !seen.insert(task.id.clone()) {
            return Err(TaskError::DuplicateId { line, id: task.id });
        }
        tasks.push(task);
    }
    Ok(tasks)
}

/// Non-structural problems worth reporting before a task reaches the model.
pub fn lint_task(task: &Task) -> Vec<String> {
    let mut findings = Vec::new();
    if !STRICT_COMMIT_RE.is_match(&task.commit) {
        findings.push(format!(
            "task '{}': invalid commit format: {}",
            task.id, task.commit
        ));
    }
    if !task.is_repo_relative() {
        findings.push(format!(
            "task '{}': file must be repository-relative: {}",
            task.id, task.file
        ));
    }
    findings
}
