//! Git adapter: staging rewritten files and counting recent churn.
//!
//! The pipeline only needs three things from version control, so they sit
//! behind the [`Vcs`] trait and tests substitute a fake.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument};

pub trait Vcs {
    /// Stage one file (path relative to the repository root).
    fn stage(&self, path: &Path) -> Result<()>;

    /// Human-readable summary of staged changes.
    fn diff_stat(&self) -> Result<String>;

    /// How often each file appeared in commits over the trailing window.
    fn changed_files_since(&self, days: u32) -> Result<BTreeMap<String, u32>>;
}

impl<V: Vcs + ?Sized> Vcs for &V {
    fn stage(&self, path: &Path) -> Result<()> {
        (**self).stage(path)
    }

    fn diff_stat(&self) -> Result<String> {
        (**self).diff_stat()
    }

    fn changed_files_since(&self, days: u32) -> Result<BTreeMap<String, u32>> {
        (**self).changed_files_since(days)
    }
}

/// Wrapper for executing git commands in a working directory.
#[derive(Debug, Clone)]
pub struct Git {
    workdir: PathBuf,
}

impl Git {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    fn run_capture(&self, args: &[&str]) -> Result<String> {
        let output = self.run_checked(args)?;
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    fn run_checked(&self, args: &[&str]) -> Result<Output> {
        let output = self.run(args)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("git {} failed: {}", args.join(" "), stderr.trim()));
        }
        Ok(output)
    }

    fn run(&self, args: &[&str]) -> Result<Output> {
        Command::new("git")
            .args(args)
            .current_dir(&self.workdir)
            .output()
            .with_context(|| format!("spawn git {}", args.join(" ")))
    }
}

impl Vcs for Git {
    #[instrument(skip_all, fields(path = %path.display()))]
    fn stage(&self, path: &Path) -> Result<()> {
        let path = path
            .to_str()
            .ok_or_else(|| anyhow!("non-UTF-8 path {}", path.display()))?;
        self.run_checked(&["add", "--", path])?;
        debug!("staged");
        Ok(())
    }

    fn diff_stat(&self) -> Result<String> {
        self.run_capture(&["diff", "--cached", "--stat"])
    }

    #[instrument(skip_all, fields(days))]
    fn changed_files_since(&self, days: u32) -> Result<BTreeMap<String, u32>> {
        let since = format!("--since={days}.days.ago");
        let out = self.run_capture(&["log", &since, "--name-only", "--pretty=format:", "--"])?;
        let counts = count_changed_files(&out);
        debug!(files = counts.len(), "recent changes counted");
        Ok(counts)
    }
}

/// Count file occurrences in `git log --name-only --pretty=format:` output.
pub fn count_changed_files(log_output: &str) -> BTreeMap<String, u32> {
    let mut counts = BTreeMap::new();
    for line in log_output.lines() {
        let path = line.trim();
        if path.is_empty() {
            continue;
        }
        *counts.entry(path.to_string()).or_insert(0) += 1;
    }
    counts
}
