//! Stable exit codes for `autoedit` commands.
//!
//! Codes 0-5 describe the outcome of one task execution (`apply`, `next`).
//! Queue maintenance commands only use `OK`, `INVALID` and `EMPTY_QUEUE`.

use crate::core::outcome::TaskOutcome;

/// Task applied and staged, or a queue command succeeded.
pub const OK: i32 = 0;
/// The task's target file does not exist.
pub const FILE_MISSING: i32 = 1;
/// The model could not be invoked (credential, client error, retries exhausted).
pub const MODEL_FAILED: i32 = 2;
/// No-op outcome: explicit no-change, extraction failure, or identical content.
pub const NO_OP: i32 = 3;
/// Candidate rejected as too destructive.
pub const TOO_DESTRUCTIVE: i32 = 4;
/// Candidate written, failed the syntax checker, and was rolled back.
pub const ROLLED_BACK: i32 = 5;
/// Runner error: malformed queue, config, I/O or staging failure.
pub const INVALID: i32 = 6;
/// `queue peek`, `queue consume` or `next` found no task.
pub const EMPTY_QUEUE: i32 = 7;

/// Map a task outcome to its process exit code.
pub fn for_outcome(outcome: &TaskOutcome) -> i32 {
    match outcome {
        TaskOutcome::Applied(_) => OK,
        TaskOutcome::FileMissing => FILE_MISSING,
        TaskOutcome::ModelFailed { .. } => MODEL_FAILED,
        TaskOutcome::NoChange | TaskOutcome::ExtractionFailed => NO_OP,
        TaskOutcome::TooDestructive(_) => TOO_DESTRUCTIVE,
        TaskOutcome::RolledBack { .. } => ROLLED_BACK,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::safety::LineDelta;

    #[test]
    fn outcomes_map_to_distinct_codes() {
        let delta = LineDelta {
            original_lines: 8,
            candidate_lines: 8,
        };
        assert_eq!(for_outcome(&TaskOutcome::Applied(delta)), OK);
        assert_eq!(for_outcome(&TaskOutcome::FileMissing), FILE_MISSING);
        assert_eq!(
            for_outcome(&TaskOutcome::ModelFailed {
                message: "boom".to_string()
            }),
            MODEL_FAILED
        );
        assert_eq!(for_outcome(&TaskOutcome::NoChange), NO_OP);
        assert_eq!(for_outcome(&TaskOutcome::ExtractionFailed), NO_OP);
        assert_eq!(
            for_outcome(&TaskOutcome::TooDestructive(delta)),
            TOO_DESTRUCTIVE
        );
        assert_eq!(
            for_outcome(&TaskOutcome::RolledBack {
                delta,
                message: "syntax".to_string()
            }),
            ROLLED_BACK
        );
    }
}
