//! Queue-level lifecycle tests: drive `run_next` over several tasks with a
//! scripted model and an in-memory VCS.

use std::fs;
use std::path::Path;
use std::time::Duration;

use autoedit::apply::Pipeline;
use autoedit::core::outcome::TaskOutcome;
use autoedit::core::prompt::PromptBuilder;
use autoedit::core::retry::RetryPolicy;
use autoedit::core::safety::{LineDelta, SafetyPolicy};
use autoedit::core::task::Task;
use autoedit::exit_codes;
use autoedit::io::audit::AuditLog;
use autoedit::io::checker::CheckerSet;
use autoedit::io::config::{ModelConfig, PriorityConfig};
use autoedit::io::model::{HttpReply, ModelClient};
use autoedit::io::queue::TaskQueue;
use autoedit::next::{NextOutcome, RunInfo, run_next};
use autoedit::prioritize::run_prioritize;
use autoedit::test_support::{
    FakeChecker, FakeVcs, ScriptedTransport, chat_reply, numbered_lines, task,
};
use serde_json::Value;

fn jsonl(path: &Path) -> Vec<Value> {
    fs::read_to_string(path)
        .expect("read jsonl")
        .lines()
        .map(|line| serde_json::from_str(line).expect("json"))
        .collect()
}

struct Repo {
    temp: tempfile::TempDir,
    prompts: PromptBuilder,
    checkers: CheckerSet,
    metrics: AuditLog,
    history: AuditLog,
    queue: TaskQueue,
}

impl Repo {
    fn new(checkers: CheckerSet) -> Self {
        let temp = tempfile::tempdir().expect("tempdir");
        let root = temp.path();
        Self {
            prompts: PromptBuilder::new().expect("prompts"),
            checkers,
            metrics: AuditLog::new(root.join(".autoedit/metrics.jsonl")),
            history: AuditLog::new(root.join(".autoedit/history.jsonl")),
            queue: TaskQueue::new(root.join(".autoedit/tasks.jsonl")),
            temp,
        }
    }

    fn root(&self) -> &Path {
        self.temp.path()
    }

    fn write(&self, rel: &str, content: &str) {
        fs::write(self.root().join(rel), content).expect("write");
    }

    fn read(&self, rel: &str) -> String {
        fs::read_to_string(self.root().join(rel)).expect("read")
    }

    fn next(&self, transport: &ScriptedTransport, vcs: &FakeVcs) -> NextOutcome {
        let pipeline = Pipeline {
            root: self.root(),
            prompts: &self.prompts,
            client: ModelClient::new(
                transport,
                &ModelConfig::default(),
                RetryPolicy {
                    max_attempts: 3,
                    base_delay: Duration::from_millis(1),
                },
                &self.metrics,
            )
            .with_credential(Some("token".to_string())),
            safety: SafetyPolicy::default(),
            checkers: &self.checkers,
            vcs,
            metrics: &self.metrics,
        };
        let run = RunInfo {
            run_id: "42".to_string(),
            run_attempt: "2".to_string(),
        };
        run_next(&self.queue, &self.history, &pipeline, "gpt-4o-mini", &run).expect("next")
    }
}

fn executed(outcome: NextOutcome) -> (Task, TaskOutcome) {
    match outcome {
        NextOutcome::Executed { task, report } => (task, report.outcome),
        NextOutcome::Empty => panic!("queue unexpectedly empty"),
    }
}

/// Drains a three-task queue:
/// 1. `t1` rewrites an 8-line file (applied, exit 0)
/// 2. `t2` targets a missing file (no model call, exit 1)
/// 3. `t3` gets a reply that drops most of a 20-line file (rejected, exit 4)
///
/// then checks the queue is empty, history has one line per cycle, and the
/// metrics log has one `api_call` per model attempt plus one
/// `task_execution` per task.
#[test]
fn drains_queue_with_mixed_outcomes() {
    let repo = Repo::new(CheckerSet::new());
    let original = numbered_lines(8);
    repo.write("a.txt", &original);
    repo.write("big.txt", &numbered_lines(20));
    for t in [task("t1", "a.txt"), task("t2", "missing.txt"), task("t3", "big.txt")] {
        repo.queue.append(t).expect("append");
    }
    let updated = original.replace("line 5", "line five");
    let transport = ScriptedTransport::new(vec![
        Ok(HttpReply {
            status: 503,
            body: "unavailable".to_string(),
        }),
        Ok(chat_reply(&format!("Here you go:\n<FILE>\n{updated}</FILE>"))),
        Ok(chat_reply("```lua\nline 1\n```")),
    ]);
    let vcs = FakeVcs::new();

    let (t1, outcome) = executed(repo.next(&transport, &vcs));
    assert_eq!(t1.id, "t1");
    assert_eq!(
        outcome,
        TaskOutcome::Applied(LineDelta {
            original_lines: 8,
            candidate_lines: 8,
        })
    );
    assert_eq!(repo.read("a.txt"), updated);

    let (t2, outcome) = executed(repo.next(&transport, &vcs));
    assert_eq!(t2.id, "t2");
    assert_eq!(outcome, TaskOutcome::FileMissing);

    let (t3, outcome) = executed(repo.next(&transport, &vcs));
    assert_eq!(t3.id, "t3");
    assert!(matches!(outcome, TaskOutcome::TooDestructive(_)));
    assert_eq!(repo.read("big.txt"), numbered_lines(20));

    assert!(matches!(repo.next(&transport, &vcs), NextOutcome::Empty));
    assert_eq!(transport.calls(), 3);
    assert_eq!(vcs.staged(), vec![Path::new("a.txt").to_path_buf()]);

    let history = jsonl(repo.history.path());
    let codes: Vec<_> = history.iter().map(|r| r["exit_code"].clone()).collect();
    assert_eq!(
        codes,
        vec![
            exit_codes::OK,
            exit_codes::FILE_MISSING,
            exit_codes::TOO_DESTRUCTIVE
        ]
    );
    assert!(history.iter().all(|r| r["run_id"] == "42" && r["run_attempt"] == "2"));

    let metrics = jsonl(repo.metrics.path());
    let summary: Vec<String> = metrics
        .iter()
        .map(|r| {
            format!(
                "{}:{}",
                r["type"].as_str().unwrap_or(""),
                r["status"].as_str().unwrap_or("")
            )
        })
        .collect();
    assert_eq!(
        summary,
        vec![
            "api_call:error",
            "api_call:success",
            "task_execution:success",
            "task_execution:file_not_found",
            "api_call:success",
            "task_execution:safety_check_failed",
        ]
    );
    assert!(metrics.iter().all(|r| r["timestamp"].as_str().is_some()));
}

#[test]
fn rolled_back_task_is_consumed_and_file_restored() {
    let mut checkers = CheckerSet::new();
    checkers.insert("lua", FakeChecker::invalid("luac: init.lua:3: 'end' expected"));
    let repo = Repo::new(checkers);
    let original = "local M = {}\n\nfunction M.f()\n  return 1\nend\n\nreturn M\n";
    repo.write("init.lua", original);
    repo.queue.append(task("t1", "init.lua")).expect("append");
    let broken = original.replace("end\n", "");
    let transport = ScriptedTransport::replying(&format!("<FILE>\n{broken}</FILE>"));
    let vcs = FakeVcs::new();

    let (_, outcome) = executed(repo.next(&transport, &vcs));
    match outcome {
        TaskOutcome::RolledBack { message, .. } => assert!(message.contains("'end' expected")),
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(repo.read("init.lua"), original);
    assert!(vcs.staged().is_empty());
    assert_eq!(repo.queue.peek().expect("peek"), None);

    let history = jsonl(repo.history.path());
    assert_eq!(history[0]["status"], "validation_failed");
    assert_eq!(history[0]["exit_code"], exit_codes::ROLLED_BACK);
}

#[test]
fn prioritized_queue_runs_highest_score_first() {
    let repo = Repo::new(CheckerSet::new());
    repo.write("a.txt", &numbered_lines(8));
    repo.write("b.txt", &numbered_lines(8));
    repo.queue
        .append(Task::new("chore-1", "a.txt", "chore(deps): bump", "i"))
        .expect("append");
    repo.queue
        .append(Task::new("fix-1", "b.txt", "fix(core): crash", "i"))
        .expect("append");

    run_prioritize(&repo.queue, &FakeVcs::new(), &PriorityConfig::default(), None, None)
        .expect("prioritize");

    let transport = ScriptedTransport::replying("<NO_CHANGE> nothing to do");
    let (first, outcome) = executed(repo.next(&transport, &FakeVcs::new()));
    assert_eq!(first.id, "fix-1");
    assert_eq!(outcome, TaskOutcome::NoChange);
    assert_eq!(
        repo.queue.peek().expect("peek").map(|t| t.id),
        Some("chore-1".to_string())
    );
}
