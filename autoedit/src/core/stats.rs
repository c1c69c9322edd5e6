//! Queue composition summary for `autoedit queue stats`.

use std::collections::BTreeMap;

use crate::core::task::Task;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct QueueStats {
    pub total: usize,
    pub types: Vec<(String, usize)>,
    pub scopes: Vec<(String, usize)>,
    pub files: Vec<(String, usize)>,
}

/// Count tasks by commit type, scope, and file.
///
/// Each list is sorted by descending count, then by name, so output is stable.
pub fn queue_stats(tasks: &[Task]) -> QueueStats {
    let mut types = BTreeMap::new();
    let mut scopes = BTreeMap::new();
    let mut files = BTreeMap::new();
    for task in tasks {
        if let Some(kind) = task.commit_kind() {
            *types.entry(kind.kind.to_string()).or_insert(0) += 1;
            if let Some(scope) = kind.scope {
                *scopes.entry(scope.to_string()).or_insert(0) += 1;
            }
        }
        *files.entry(task.file.clone()).or_insert(0) += 1;
    }
    QueueStats {
        total: tasks.len(),
        types: ranked(types),
        scopes: ranked(scopes),
        files: ranked(files),
    }
}

fn ranked(counts: BTreeMap<String, usize>) -> Vec<(String, usize)> {
    let mut entries: Vec<_> = counts.into_iter().collect();
    entries.sort_by(|a, b| b.1.cmp(&a.1));
    entries
}
