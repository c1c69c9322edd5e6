//! Deterministic priority scoring for queued tasks.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::core::task::Task;

/// Score weights. Higher scores run first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PriorityWeights {
    /// Weight per commit type (`fix`, `feat`, ...).
    pub types: BTreeMap<String, i64>,
    /// Weight for commits without a recognized type.
    pub unknown: i64,
    /// Added per recent change to the task's file.
    pub per_recent_change: i64,
}

impl Default for PriorityWeights {
    fn default() -> Self {
        let types = [
            ("fix", 100),
            ("feat", 80),
            ("refactor", 60),
            ("docs", 40),
            ("style", 20),
            ("chore", 10),
        ]
        .into_iter()
        .map(|(kind, weight)| (kind.to_string(), weight))
        .collect();
        Self {
            types,
            unknown: 50,
            per_recent_change: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoredTask {
    pub task: Task,
    pub score: i64,
}

impl PriorityWeights {
    pub fn type_weight(&self, task: &Task) -> i64 {
        task.commit_kind()
            .and_then(|kind| self.types.get(kind.kind).copied())
            .unwrap_or(self.unknown)
    }

    pub fn score(&self, task: &Task, recent_changes: &BTreeMap<String, u32>) -> i64 {
        let changes = recent_changes.get(&task.file).copied().unwrap_or(0);
        self.type_weight(task) + self.per_recent_change * i64::from(changes)
    }

    /// Stable sort, highest score first. Ties keep their queue order.
    pub fn prioritize(
        &self,
        tasks: Vec<Task>,
        recent_changes: &BTreeMap<String, u32>,
    ) -> Vec<ScoredTask> {
        let mut scored: Vec<ScoredTask> = tasks
            .into_iter()
            .map(|task| ScoredTask {
                score: self.score(&task, recent_changes),
                task,
            })
            .collect();
        scored.sort_by(|a, b| b.score.cmp(&a.score));
        scored
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(id: &str, file: &str, commit: &str) -> Task {
        Task::new(id, file, commit, "do it")
    }

    fn ids(scored: &[ScoredTask]) -> Vec<&str> {
        scored.iter().map(|s| s.task.id.as_str()).collect()
    }

    #[test]
    fn fix_outranks_chore_with_equal_churn() {
        let weights = PriorityWeights::default();
        let changes = BTreeMap::from([("a.lua".to_string(), 2), ("b.lua".to_string(), 2)]);
        let tasks = vec![
            task("chore", "a.lua", "chore(build): bump"),
            task("fix", "b.lua", "fix(core): crash"),
        ];
        let sorted = weights.prioritize(tasks, &changes);
        assert_eq!(ids(&sorted), vec!["fix", "chore"]);
        assert_eq!(sorted[0].score, 110);
        assert_eq!(sorted[1].score, 20);
    }

    #[test]
    fn recent_churn_can_lift_lower_types() {
        let weights = PriorityWeights::default();
        let changes = BTreeMap::from([("hot.lua".to_string(), 20)]);
        let tasks = vec![
            task("fix", "cold.lua", "fix(core): x"),
            task("docs", "hot.lua", "docs(api): y"),
        ];
        let sorted = weights.prioritize(tasks, &changes);
        assert_eq!(ids(&sorted), vec!["docs", "fix"]);
    }

    #[test]
    fn unknown_types_use_fallback_weight() {
        let weights = PriorityWeights::default();
        let changes = BTreeMap::new();
        assert_eq!(weights.score(&task("t", "a", "perf(x): y"), &changes), 50);
        assert_eq!(weights.score(&task("t", "a", "no prefix"), &changes), 50);
    }

    #[test]
    fn ties_keep_original_order_and_sorting_is_idempotent() {
        let weights = PriorityWeights::default();
        let changes = BTreeMap::new();
        let tasks = vec![
            task("f1", "a", "feat(a): 1"),
            task("x1", "b", "fix(b): 1"),
            task("f2", "c", "feat(c): 2"),
            task("x2", "d", "fix(d): 2"),
        ];
        let first = weights.prioritize(tasks, &changes);
        assert_eq!(ids(&first), vec!["x1", "x2", "f1", "f2"]);

        let again = weights.prioritize(first.iter().map(|s| s.task.clone()).collect(), &changes);
        assert_eq!(again, first);
    }
}
