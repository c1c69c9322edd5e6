//! Terminal outcomes of one task execution.
//!
//! Safety rejections and rollbacks are expected outcomes, not errors: the
//! model declining to produce a safe change is a normal operating condition.

use serde::Serialize;

use crate::core::safety::{LineDelta, RejectReason};

/// Status recorded on `task_execution` audit lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Success,
    FileNotFound,
    ApiFailure,
    NoChange,
    ExtractionFailed,
    SafetyCheckFailed,
    ValidationFailed,
    /// Hard failure (I/O, staging) after the attempt started.
    Error,
}

impl ExecutionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ExecutionStatus::Success => "success",
            ExecutionStatus::FileNotFound => "file_not_found",
            ExecutionStatus::ApiFailure => "api_failure",
            ExecutionStatus::NoChange => "no_change",
            ExecutionStatus::ExtractionFailed => "extraction_failed",
            ExecutionStatus::SafetyCheckFailed => "safety_check_failed",
            ExecutionStatus::ValidationFailed => "validation_failed",
            ExecutionStatus::Error => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    /// Candidate written, checked, and staged.
    Applied(LineDelta),
    /// Target file does not exist.
    FileMissing,
    /// Model invocation failed terminally.
    ModelFailed { message: String },
    /// Explicit no-change sentinel, or candidate identical to the original.
    NoChange,
    /// Reply contained no recognizable file body.
    ExtractionFailed,
    TooDestructive(LineDelta),
    /// Candidate failed the syntax checker and the original was restored.
    RolledBack { delta: LineDelta, message: String },
}

impl TaskOutcome {
    pub fn from_rejection(reason: RejectReason) -> Self {
        match reason {
            RejectReason::ExtractionFailed => TaskOutcome::ExtractionFailed,
            RejectReason::NoChange => TaskOutcome::NoChange,
            RejectReason::TooDestructive(delta) => TaskOutcome::TooDestructive(delta),
        }
    }

    pub fn status(&self) -> ExecutionStatus {
        match self {
            TaskOutcome::Applied(_) => ExecutionStatus::Success,
            TaskOutcome::FileMissing => ExecutionStatus::FileNotFound,
            TaskOutcome::ModelFailed { .. } => ExecutionStatus::ApiFailure,
            TaskOutcome::NoChange => ExecutionStatus::NoChange,
            TaskOutcome::ExtractionFailed => ExecutionStatus::ExtractionFailed,
            TaskOutcome::TooDestructive(_) => ExecutionStatus::SafetyCheckFailed,
            TaskOutcome::RolledBack { .. } => ExecutionStatus::ValidationFailed,
        }
    }

    pub fn line_delta(&self) -> Option<LineDelta> {
        match self {
            TaskOutcome::Applied(delta)
            | TaskOutcome::TooDestructive(delta)
            | TaskOutcome::RolledBack { delta, .. } => Some(*delta),
            _ => None,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            TaskOutcome::ModelFailed { message } | TaskOutcome::RolledBack { message, .. } => {
                Some(message)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejections_map_to_outcomes_and_statuses() {
        let delta = LineDelta {
            original_lines: 20,
            candidate_lines: 3,
        };
        let outcome = TaskOutcome::from_rejection(RejectReason::TooDestructive(delta));
        assert_eq!(outcome, TaskOutcome::TooDestructive(delta));
        assert_eq!(outcome.status(), ExecutionStatus::SafetyCheckFailed);
        assert_eq!(outcome.line_delta(), Some(delta));

        let no_change = TaskOutcome::from_rejection(RejectReason::NoChange);
        assert_eq!(no_change.status().as_str(), "no_change");
        assert_eq!(no_change.line_delta(), None);
    }

    #[test]
    fn status_serializes_as_snake_case() {
        let json = serde_json::to_string(&ExecutionStatus::SafetyCheckFailed).expect("json");
        assert_eq!(json, "\"safety_check_failed\"");
    }
}
