//! One queue cycle (`autoedit next`): peek, apply, record history, consume.
//!
//! The queue stays checked out for the whole cycle. The head task is consumed
//! after any execution attempt, whatever its outcome; failed tasks are not
//! retried automatically.

use anyhow::{Context, Result, bail};
use tracing::{info, instrument, warn};

use crate::apply::{ApplyReport, Pipeline, run_apply};
use crate::core::task::Task;
use crate::exit_codes;
use crate::io::audit::{AuditLog, HistoryRecord};
use crate::io::git::Vcs;
use crate::io::model::Transport;
use crate::io::queue::TaskQueue;

/// CI run identity stamped on history records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunInfo {
    pub run_id: String,
    pub run_attempt: String,
}

impl Default for RunInfo {
    fn default() -> Self {
        Self {
            run_id: "local".to_string(),
            run_attempt: "1".to_string(),
        }
    }
}

impl RunInfo {
    /// Read `GITHUB_RUN_ID` / `GITHUB_RUN_ATTEMPT`, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            run_id: std::env::var("GITHUB_RUN_ID").unwrap_or(defaults.run_id),
            run_attempt: std::env::var("GITHUB_RUN_ATTEMPT").unwrap_or(defaults.run_attempt),
        }
    }
}

#[derive(Debug)]
pub enum NextOutcome {
    /// Queue had no task; nothing was attempted.
    Empty,
    /// The head task was attempted and consumed.
    Executed { task: Task, report: ApplyReport },
}

/// Run one queue cycle.
///
/// A runner error from `apply` is still recorded in the history, and the task
/// is consumed before any error (from `apply` or the history write) is
/// returned.
#[instrument(skip_all, fields(queue = %queue.path().display(), model = %model))]
pub fn run_next<T: Transport, V: Vcs>(
    queue: &TaskQueue,
    history: &AuditLog,
    pipeline: &Pipeline<'_, T, V>,
    model: &str,
    run: &RunInfo,
) -> Result<NextOutcome> {
    let checkout = queue.checkout().context("check out task queue")?;
    let Some(task) = checkout.peek().context("read task queue")? else {
        info!("queue is empty");
        return Ok(NextOutcome::Empty);
    };
    info!(task_id = %task.id, file = %task.file, "starting task");

    let result = run_apply(pipeline, &task, model);
    let (status, exit_code) = match &result {
        Ok(report) => (
            report.outcome.status().as_str(),
            exit_codes::for_outcome(&report.outcome),
        ),
        Err(err) => {
            warn!(err = %format!("{err:#}"), "task execution failed");
            ("error", exit_codes::INVALID)
        }
    };
    let recorded = history.append(&HistoryRecord {
        status: status.to_string(),
        task_id: task.id.clone(),
        task_file: task.file.clone(),
        commit: task.commit.clone(),
        instruction: task.instruction.clone(),
        exit_code,
        run_id: run.run_id.clone(),
        run_attempt: run.run_attempt.clone(),
    });

    match checkout.consume().context("consume task")? {
        Some(consumed) if consumed.id == task.id => {}
        Some(consumed) => bail!(
            "queue head changed during execution: expected '{}', consumed '{}'",
            task.id,
            consumed.id
        ),
        None => bail!("queue emptied during execution of '{}'", task.id),
    }
    info!(task_id = %task.id, status, "task consumed");

    recorded.context("write history record")?;
    let report = result?;
    Ok(NextOutcome::Executed { task, report })
}
