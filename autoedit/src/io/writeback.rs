//! Write-back of an accepted candidate: overwrite, syntax check, stage.
//!
//! Not crash-transactional. A failed syntax check restores the original bytes
//! and nothing is staged.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{info, instrument, warn};

use crate::io::checker::{CheckResult, CheckerSet};
use crate::io::git::Vcs;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    /// Candidate is on disk and staged. `diff_stat` is best-effort.
    Applied { diff_stat: Option<String> },
    /// Checker rejected the candidate; the original content was restored.
    RolledBack { message: String },
}

pub struct WriteBack<'a, V> {
    root: PathBuf,
    checkers: &'a CheckerSet,
    vcs: V,
}

impl<'a, V: Vcs> WriteBack<'a, V> {
    pub fn new(root: impl Into<PathBuf>, checkers: &'a CheckerSet, vcs: V) -> Self {
        Self {
            root: root.into(),
            checkers,
            vcs,
        }
    }

    /// Replace `rel_path` (relative to the root) with `candidate`.
    ///
    /// Errors on write, restore, or stage failure. A checker that cannot run
    /// is logged and the file is treated as unchecked.
    #[instrument(skip_all, fields(path = %rel_path.display()))]
    pub fn apply(&self, rel_path: &Path, original: &str, candidate: &str) -> Result<WriteOutcome> {
        let full_path = self.root.join(rel_path);
        fs::write(&full_path, candidate)
            .with_context(|| format!("write {}", full_path.display()))?;

        if let Some(checker) = self.checkers.for_path(rel_path) {
            match checker.check(&full_path) {
                Ok(CheckResult::Valid) => {}
                Ok(CheckResult::Invalid(message)) => {
                    warn!(message = %message, "syntax check failed, restoring original");
                    fs::write(&full_path, original)
                        .with_context(|| format!("restore {}", full_path.display()))?;
                    return Ok(WriteOutcome::RolledBack { message });
                }
                Err(err) => {
                    warn!(err = %format!("{err:#}"), "syntax checker unavailable, skipping check");
                }
            }
        }

        self.vcs
            .stage(rel_path)
            .with_context(|| format!("stage {}", rel_path.display()))?;

        let diff_stat = match self.vcs.diff_stat() {
            Ok(stat) => Some(stat),
            Err(err) => {
                warn!(err = %format!("{err:#}"), "diff stat failed");
                None
            }
        };
        info!("candidate written and staged");
        Ok(WriteOutcome::Applied { diff_stat })
    }
}
