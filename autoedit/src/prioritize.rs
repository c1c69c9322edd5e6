//! Queue re-ordering (`autoedit prioritize`).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{info, instrument, warn};

use crate::core::priority::ScoredTask;
use crate::io::config::PriorityConfig;
use crate::io::git::Vcs;
use crate::io::queue::TaskQueue;

#[derive(Debug, Clone)]
pub struct PrioritizeReport {
    /// Tasks in their new order, highest score first.
    pub ranked: Vec<ScoredTask>,
    /// File the ranked queue was written to.
    pub destination: PathBuf,
}

/// Score every queued task and rewrite the queue (or `output`) in rank order.
///
/// Recent-change counts come from `vcs`; if the log cannot be read, every
/// file counts as unchanged.
#[instrument(skip_all, fields(queue = %queue.path().display()))]
pub fn run_prioritize<V: Vcs>(
    queue: &TaskQueue,
    vcs: V,
    config: &PriorityConfig,
    since_days: Option<u32>,
    output: Option<&Path>,
) -> Result<PrioritizeReport> {
    let window_days = since_days.unwrap_or(config.window_days);
    let checkout = queue.checkout().context("check out task queue")?;
    let tasks = checkout.tasks().context("read task queue")?;

    let changes = match vcs.changed_files_since(window_days) {
        Ok(changes) => changes,
        Err(err) => {
            warn!(err = %format!("{err:#}"), "could not read recent changes, scoring by type only");
            BTreeMap::new()
        }
    };
    let ranked = config.weights.prioritize(tasks, &changes);
    let ordered: Vec<_> = ranked.iter().map(|scored| scored.task.clone()).collect();

    let destination = match output {
        Some(path) => {
            checkout
                .export(path, &ordered)
                .with_context(|| format!("write {}", path.display()))?;
            path.to_path_buf()
        }
        None => {
            checkout.replace(&ordered).context("rewrite task queue")?;
            queue.path().to_path_buf()
        }
    };
    info!(tasks = ranked.len(), window_days, "queue prioritized");
    Ok(PrioritizeReport {
        ranked,
        destination,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::task::Task;
    use crate::test_support::FakeVcs;

    fn seed(queue: &TaskQueue) {
        for (id, file, commit) in [
            ("t1", "docs.md", "docs(readme): typo"),
            ("t2", "core.lua", "chore(deps): bump"),
            ("t3", "core.lua", "fix(core): crash"),
            ("t4", "ui.lua", "feat(ui): button"),
        ] {
            queue
                .append(Task::new(id, file, commit, "do it"))
                .expect("append");
        }
    }

    fn ids(report: &PrioritizeReport) -> Vec<&str> {
        report.ranked.iter().map(|s| s.task.id.as_str()).collect()
    }

    #[test]
    fn rewrites_queue_in_score_order() {
        let temp = tempfile::tempdir().expect("tempdir");
        let queue = TaskQueue::new(temp.path().join("tasks.jsonl"));
        seed(&queue);
        let vcs = FakeVcs::new().with_changes(&[("docs.md", 20)]);

        let report =
            run_prioritize(&queue, &vcs, &PriorityConfig::default(), None, None).expect("run");
        // docs: 40 + 5*20 = 140, fix: 100, feat: 80, chore: 10
        assert_eq!(ids(&report), vec!["t1", "t3", "t4", "t2"]);
        let persisted: Vec<_> = queue
            .load()
            .expect("load")
            .into_iter()
            .map(|t| t.id)
            .collect();
        assert_eq!(persisted, vec!["t1", "t3", "t4", "t2"]);
        assert_eq!(report.destination, queue.path());
    }

    #[test]
    fn output_path_leaves_queue_untouched() {
        let temp = tempfile::tempdir().expect("tempdir");
        let queue = TaskQueue::new(temp.path().join("tasks.jsonl"));
        seed(&queue);
        let before = std::fs::read_to_string(queue.path()).expect("read");
        let output = temp.path().join("ranked.jsonl");

        let report = run_prioritize(
            &queue,
            &FakeVcs::new().fail_log(),
            &PriorityConfig::default(),
            Some(7),
            Some(&output),
        )
        .expect("run");
        assert_eq!(ids(&report), vec!["t3", "t4", "t1", "t2"]);
        assert_eq!(std::fs::read_to_string(queue.path()).expect("read"), before);
        let ranked = TaskQueue::new(&output).load().expect("load ranked");
        assert_eq!(ranked.len(), 4);
        assert_eq!(ranked[0].id, "t3");
    }

    #[test]
    fn output_naming_the_queue_rewrites_it_in_place() {
        let temp = tempfile::tempdir().expect("tempdir");
        std::fs::create_dir_all(temp.path().join("nested")).expect("mkdir");
        let queue = TaskQueue::new(temp.path().join("tasks.jsonl"));
        seed(&queue);
        let alias = temp.path().join("nested/../tasks.jsonl");

        let report = run_prioritize(
            &queue,
            &FakeVcs::new(),
            &PriorityConfig::default(),
            None,
            Some(&alias),
        )
        .expect("run");
        assert_eq!(report.destination, alias);
        let persisted: Vec<_> = queue
            .load()
            .expect("load")
            .into_iter()
            .map(|t| t.id)
            .collect();
        assert_eq!(persisted, vec!["t3", "t4", "t1", "t2"]);
    }
}
