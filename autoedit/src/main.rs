//! Queue-driven, model-assisted file rewrites.
//!
//! Tasks live in `.autoedit/tasks.jsonl`. `autoedit next` takes the head task,
//! asks the model for a full-file rewrite, gates and applies it, and records
//! every attempt under `.autoedit/`. Exit codes are listed in
//! [`autoedit::exit_codes`].

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use autoedit::apply::{ApplyReport, Pipeline, run_apply};
use autoedit::core::outcome::TaskOutcome;
use autoedit::core::prompt::PromptBuilder;
use autoedit::core::stats::queue_stats;
use autoedit::core::task::{Task, lint_task};
use autoedit::exit_codes;
use autoedit::io::audit::AuditLog;
use autoedit::io::checker::CheckerSet;
use autoedit::io::config::{AppConfig, DEFAULT_CONFIG_PATH, load_config, write_config};
use autoedit::io::git::Git;
use autoedit::io::model::{HttpTransport, ModelClient};
use autoedit::io::queue::{QueueError, TaskQueue};
use autoedit::logging;
use autoedit::next::{NextOutcome, RunInfo, run_next};
use autoedit::prioritize::run_prioritize;

/// Entries shown by `queue stats` per category, and by `prioritize`.
const STATS_TOP: usize = 10;
const PRIORITIZE_TOP: usize = 5;

#[derive(Parser)]
#[command(
    name = "autoedit",
    version,
    about = "Queue-driven, model-assisted file rewrites with a safety gate"
)]
struct Cli {
    /// Repository root; task files and artifact paths resolve against it.
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,
    /// Config file [default: <root>/.autoedit/config.toml].
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Inspect or edit the task queue.
    Queue {
        /// Queue file [default: from config].
        #[arg(long, global = true)]
        queue: Option<PathBuf>,
        #[command(subcommand)]
        action: QueueCommand,
    },
    /// Run the rewrite pipeline for one explicitly given task.
    Apply {
        /// Conventional-commit summary, e.g. `fix(core): handle nil`.
        #[arg(long)]
        commit: String,
        /// Instruction for the model.
        #[arg(long)]
        task: String,
        /// Repository-relative path of the file to rewrite.
        #[arg(long)]
        file: String,
        #[arg(long)]
        id: Option<String>,
        #[arg(long, env = "COPILOT_MODEL")]
        model: Option<String>,
    },
    /// Execute and consume the head task of the queue.
    Next {
        #[arg(long, env = "COPILOT_MODEL")]
        model: Option<String>,
    },
    /// Reorder the queue by commit type and recent file churn.
    Prioritize {
        /// Write the ranked queue here instead of rewriting the queue in place.
        #[arg(long)]
        output: Option<PathBuf>,
        /// Churn window in days [default: from config].
        #[arg(long)]
        since_days: Option<u32>,
    },
    /// Write the default config file.
    Init {
        /// Overwrite an existing config.
        #[arg(short, long)]
        force: bool,
    },
}

#[derive(Subcommand)]
enum QueueCommand {
    /// Print the head task as JSON (`{}` when empty).
    Peek,
    /// Remove the head task and print its id.
    Consume,
    /// Parse every queue line; report the first malformed one.
    Validate {
        /// Also fail on commit-format and path findings.
        #[arg(long)]
        strict: bool,
    },
    /// Summarize queued tasks by type, scope and file.
    Stats,
    /// Append a task at the tail.
    Append {
        #[arg(long)]
        id: String,
        #[arg(long)]
        file: String,
        #[arg(long)]
        commit: String,
        #[arg(long)]
        instruction: String,
    },
}

fn main() {
    logging::init();
    let code = match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{err:#}");
            exit_codes::INVALID
        }
    };
    std::process::exit(code);
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| cli.root.join(DEFAULT_CONFIG_PATH));
    match cli.command {
        Command::Init { force } => cmd_init(&config_path, force),
        Command::Queue { queue, action } => {
            let config = load_config(&config_path)?;
            let queue = TaskQueue::new(queue.unwrap_or_else(|| config.paths.queue_path(&cli.root)));
            cmd_queue(&queue, action)
        }
        Command::Apply {
            commit,
            task,
            file,
            id,
            model,
        } => {
            let runtime = Runtime::load(&cli.root, &config_path)?;
            let task = Task::new(id.unwrap_or_default(), file, commit, task);
            cmd_apply(&runtime, &task, &runtime.model(model))
        }
        Command::Next { model } => {
            let runtime = Runtime::load(&cli.root, &config_path)?;
            cmd_next(&runtime, &runtime.model(model))
        }
        Command::Prioritize { output, since_days } => {
            let config = load_config(&config_path)?;
            cmd_prioritize(&cli.root, &config, output.as_deref(), since_days)
        }
    }
}

/// Loaded config plus the long-lived collaborators a pipeline borrows.
struct Runtime {
    root: PathBuf,
    config: AppConfig,
    prompts: PromptBuilder,
    checkers: CheckerSet,
    metrics: AuditLog,
    history: AuditLog,
}

impl Runtime {
    fn load(root: &Path, config_path: &Path) -> Result<Self> {
        let config = load_config(config_path)?;
        Ok(Self {
            root: root.to_path_buf(),
            prompts: PromptBuilder::new()?,
            checkers: CheckerSet::from_config(&config.checkers),
            metrics: AuditLog::new(config.paths.metrics_path(root)),
            history: AuditLog::new(config.paths.history_path(root)),
            config,
        })
    }

    fn model(&self, flag: Option<String>) -> String {
        flag.filter(|model| !model.trim().is_empty())
            .unwrap_or_else(|| self.config.model.model.clone())
    }

    fn pipeline(&self) -> Result<Pipeline<'_, HttpTransport, Git>> {
        let transport = HttpTransport::from_config(&self.config.model)?;
        Ok(Pipeline {
            root: &self.root,
            prompts: &self.prompts,
            client: ModelClient::new(
                transport,
                &self.config.model,
                self.config.retry.policy(),
                &self.metrics,
            ),
            safety: self.config.safety,
            checkers: &self.checkers,
            vcs: Git::new(&self.root),
            metrics: &self.metrics,
        })
    }
}

fn cmd_init(config_path: &Path, force: bool) -> Result<i32> {
    if config_path.exists() && !force {
        println!("{} already exists (use --force to overwrite)", config_path.display());
        return Ok(exit_codes::OK);
    }
    write_config(config_path, &AppConfig::starter())?;
    println!("wrote {}", config_path.display());
    Ok(exit_codes::OK)
}

fn cmd_queue(queue: &TaskQueue, action: QueueCommand) -> Result<i32> {
    match action {
        QueueCommand::Peek => match queue.peek()? {
            Some(task) => {
                println!("{}", task.to_line()?);
                Ok(exit_codes::OK)
            }
            None => {
                println!("{{}}");
                Ok(exit_codes::EMPTY_QUEUE)
            }
        },
        QueueCommand::Consume => match queue.consume()? {
            Some(task) => {
                println!("{}", task.id);
                Ok(exit_codes::OK)
            }
            None => {
                eprintln!("queue is empty");
                Ok(exit_codes::EMPTY_QUEUE)
            }
        },
        QueueCommand::Validate { strict } => cmd_validate(queue, strict),
        QueueCommand::Stats => {
            let stats = queue_stats(&queue.load()?);
            println!("total: {}", stats.total);
            print_counts("types", &stats.types, usize::MAX);
            print_counts("scopes", &stats.scopes, STATS_TOP);
            print_counts("files", &stats.files, STATS_TOP);
            Ok(exit_codes::OK)
        }
        QueueCommand::Append {
            id,
            file,
            commit,
            instruction,
        } => {
            let task = Task::new(id, file, commit, instruction);
            let findings = lint_task(&task);
            for finding in &findings {
                eprintln!("warning: {finding}");
            }
            let id = task.id.clone();
            queue.append(task)?;
            println!("appended {id}");
            Ok(exit_codes::OK)
        }
    }
}

fn cmd_validate(queue: &TaskQueue, strict: bool) -> Result<i32> {
    let tasks = match queue.load() {
        Ok(tasks) => tasks,
        Err(QueueError::Malformed(err)) => {
            eprintln!("{}: {err}", queue.path().display());
            return Ok(exit_codes::INVALID);
        }
        Err(err) => return Err(err.into()),
    };
    if strict {
        let findings: Vec<String> = tasks.iter().flat_map(lint_task).collect();
        if !findings.is_empty() {
            for finding in &findings {
                eprintln!("{finding}");
            }
            return Ok(exit_codes::INVALID);
        }
    }
    println!("{} task(s) valid", tasks.len());
    Ok(exit_codes::OK)
}

fn print_counts(label: &str, counts: &[(String, usize)], limit: usize) {
    println!("{label}:");
    for (name, count) in counts.iter().take(limit) {
        println!("  {count:>4}  {name}");
    }
}

fn cmd_apply(runtime: &Runtime, task: &Task, model: &str) -> Result<i32> {
    let pipeline = runtime.pipeline()?;
    let report = run_apply(&pipeline, task, model)?;
    print_report(task, &report);
    Ok(exit_codes::for_outcome(&report.outcome))
}

fn cmd_next(runtime: &Runtime, model: &str) -> Result<i32> {
    let queue = TaskQueue::new(runtime.config.paths.queue_path(&runtime.root));
    let pipeline = runtime.pipeline()?;
    let outcome = run_next(
        &queue,
        &runtime.history,
        &pipeline,
        model,
        &RunInfo::from_env(),
    )?;
    match outcome {
        NextOutcome::Empty => {
            eprintln!("queue is empty");
            Ok(exit_codes::EMPTY_QUEUE)
        }
        NextOutcome::Executed { task, report } => {
            println!("task {}", task.id);
            print_report(&task, &report);
            Ok(exit_codes::for_outcome(&report.outcome))
        }
    }
}

fn print_report(task: &Task, report: &ApplyReport) {
    let status = report.outcome.status().as_str();
    match report.outcome.line_delta() {
        Some(delta) => println!(
            "{status}: {} ({} -> {} lines)",
            task.file, delta.original_lines, delta.candidate_lines
        ),
        None => println!("{status}: {}", task.file),
    }
    match &report.outcome {
        TaskOutcome::ModelFailed { message } | TaskOutcome::RolledBack { message, .. } => {
            eprintln!("{message}");
        }
        _ => {}
    }
    if let Some(stat) = report.diff_stat.as_deref().map(str::trim_end)
        && !stat.is_empty()
    {
        println!("{stat}");
    }
}

fn cmd_prioritize(
    root: &Path,
    config: &AppConfig,
    output: Option<&Path>,
    since_days: Option<u32>,
) -> Result<i32> {
    let queue = TaskQueue::new(config.paths.queue_path(root));
    let report = run_prioritize(&queue, Git::new(root), &config.priority, since_days, output)
        .context("prioritize queue")?;
    for scored in report.ranked.iter().take(PRIORITIZE_TOP) {
        println!(
            "{:>5}  {}  {}",
            scored.score, scored.task.id, scored.task.commit
        );
    }
    println!(
        "wrote {} task(s) to {}",
        report.ranked.len(),
        report.destination.display()
    );
    Ok(exit_codes::OK)
}
