//! Orchestration for a single task execution (`autoedit apply`).
//!
//! Reads the target file, asks the model for a full replacement, gates it,
//! writes it back, and appends exactly one `task_execution` record whatever
//! happens, including hard errors.

use std::fs;
use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow, bail};
use tracing::{error, info, instrument, warn};

use crate::core::extract::extract;
use crate::core::outcome::{ExecutionStatus, TaskOutcome};
use crate::core::prompt::PromptBuilder;
use crate::core::safety::{SafetyPolicy, Verdict, line_count};
use crate::core::task::Task;
use crate::io::audit::{AuditLog, AuditRecord, TaskExecutionRecord, excerpt, round_seconds};
use crate::io::checker::CheckerSet;
use crate::io::git::Vcs;
use crate::io::model::{ModelClient, ModelError, Transport};
use crate::io::writeback::{WriteBack, WriteOutcome};

/// Collaborators for task execution.
pub struct Pipeline<'a, T, V> {
    /// Repository root; task files are resolved against it.
    pub root: &'a Path,
    pub prompts: &'a PromptBuilder,
    pub client: ModelClient<'a, T>,
    pub safety: SafetyPolicy,
    pub checkers: &'a CheckerSet,
    pub vcs: V,
    pub metrics: &'a AuditLog,
}

/// Result of one `apply`.
#[derive(Debug, Clone, PartialEq)]
pub struct ApplyReport {
    pub outcome: TaskOutcome,
    pub elapsed: Duration,
    /// Staged diff summary, when the candidate was applied.
    pub diff_stat: Option<String>,
}

struct Execution {
    outcome: TaskOutcome,
    original_lines: Option<usize>,
    diff_stat: Option<String>,
}

impl Execution {
    fn new(outcome: TaskOutcome, original_lines: Option<usize>) -> Self {
        Self {
            outcome,
            original_lines,
            diff_stat: None,
        }
    }
}

/// Execute `task` against `model`.
///
/// Expected outcomes (missing file, model failure, rejections, rollback) are
/// returned in the report. `Err` is reserved for runner failures: I/O,
/// staging, or an unwritable audit log.
#[instrument(skip_all, fields(task_id = %task.id, file = %task.file, model = %model))]
pub fn run_apply<T: Transport, V: Vcs>(
    pipeline: &Pipeline<'_, T, V>,
    task: &Task,
    model: &str,
) -> Result<ApplyReport> {
    let started = Instant::now();
    let result = execute(pipeline, task, model);
    let elapsed = started.elapsed();

    let record = execution_record(task, model, &result, elapsed);
    let logged = pipeline
        .metrics
        .append(&AuditRecord::TaskExecution(record))
        .context("write task_execution record");

    let execution = match (result, logged) {
        (Ok(execution), Ok(())) => execution,
        (Ok(_), Err(err)) => return Err(err),
        (Err(err), logged) => {
            if let Err(log_err) = logged {
                error!(err = %format!("{log_err:#}"), "task_execution record lost");
            }
            return Err(err);
        }
    };

    info!(
        status = execution.outcome.status().as_str(),
        elapsed_ms = elapsed.as_millis(),
        "task finished"
    );
    Ok(ApplyReport {
        outcome: execution.outcome,
        elapsed,
        diff_stat: execution.diff_stat,
    })
}

fn execute<T: Transport, V: Vcs>(
    pipeline: &Pipeline<'_, T, V>,
    task: &Task,
    model: &str,
) -> Result<Execution> {
    if !task.is_repo_relative() {
        bail!("task file must be repository-relative: {}", task.file);
    }
    let rel_path = Path::new(&task.file);
    let full_path = pipeline.root.join(rel_path);
    if !full_path.is_file() {
        warn!(path = %full_path.display(), "target file not found");
        return Ok(Execution::new(TaskOutcome::FileMissing, None));
    }

    let original = fs::read_to_string(&full_path)
        .with_context(|| format!("read {}", full_path.display()))?;
    let original_lines = Some(line_count(&original));
    let prompt = pipeline
        .prompts
        .build(task, &original)
        .context("render prompt")?;

    let reply = match pipeline.client.invoke(&prompt, model) {
        Ok(reply) => reply,
        Err(ModelError::Audit(err)) => return Err(err.context("write api_call record")),
        Err(err) => {
            let outcome = TaskOutcome::ModelFailed {
                message: err.to_string(),
            };
            return Ok(Execution::new(outcome, original_lines));
        }
    };

    let extraction = extract(&reply);
    let delta = match pipeline.safety.validate(&original, &extraction) {
        Verdict::Accept(delta) => delta,
        Verdict::Reject(reason) => {
            info!(?reason, "candidate rejected");
            return Ok(Execution::new(
                TaskOutcome::from_rejection(reason),
                original_lines,
            ));
        }
    };
    let candidate = extraction
        .candidate()
        .ok_or_else(|| anyhow!("accepted verdict without a candidate"))?;

    let writer = WriteBack::new(pipeline.root, pipeline.checkers, &pipeline.vcs);
    let execution = match writer.apply(rel_path, &original, candidate)? {
        WriteOutcome::Applied { diff_stat } => Execution {
            outcome: TaskOutcome::Applied(delta),
            original_lines,
            diff_stat,
        },
        WriteOutcome::RolledBack { message } => {
            Execution::new(TaskOutcome::RolledBack { delta, message }, original_lines)
        }
    };
    Ok(execution)
}

fn execution_record(
    task: &Task,
    model: &str,
    result: &Result<Execution>,
    elapsed: Duration,
) -> TaskExecutionRecord {
    let (status, original_lines, candidate_lines, error) = match result {
        Ok(execution) => {
            let delta = execution.outcome.line_delta();
            (
                execution.outcome.status(),
                delta
                    .map(|d| d.original_lines)
                    .or(execution.original_lines),
                delta.map(|d| d.candidate_lines),
                execution.outcome.error_message().map(excerpt),
            )
        }
        Err(err) => (
            ExecutionStatus::Error,
            None,
            None,
            Some(excerpt(&format!("{err:#}"))),
        ),
    };
    TaskExecutionRecord {
        task_id: (!task.id.trim().is_empty()).then(|| task.id.clone()),
        file: task.file.clone(),
        commit_msg: task.commit.clone(),
        model: model.to_string(),
        status,
        orig_lines: original_lines,
        new_lines: candidate_lines,
        error,
        elapsed_seconds: round_seconds(elapsed),
    }
}
