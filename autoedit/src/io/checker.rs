//! External syntax checkers, selected by file extension.

use std::collections::BTreeMap;
use std::path::Path;
use std::process::Command;
use std::time::Duration;

use anyhow::{Result, anyhow};
use tracing::debug;

use crate::io::config::CheckerConfig;
use crate::io::process::{DEFAULT_OUTPUT_LIMIT_BYTES, run_command_with_timeout};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckResult {
    Valid,
    Invalid(String),
}

pub trait SyntaxChecker {
    /// Check the file at `path`. `Err` means the checker itself could not run.
    fn check(&self, path: &Path) -> Result<CheckResult>;
}

/// Runs `command... <path>`; exit 0 means valid.
#[derive(Debug, Clone)]
pub struct CommandChecker {
    command: Vec<String>,
    timeout: Duration,
}

impl CommandChecker {
    pub fn new(command: Vec<String>, timeout: Duration) -> Self {
        Self { command, timeout }
    }

    pub fn from_config(config: &CheckerConfig) -> Self {
        Self::new(
            config.command.clone(),
            Duration::from_secs(config.timeout_secs),
        )
    }
}

impl SyntaxChecker for CommandChecker {
    fn check(&self, path: &Path) -> Result<CheckResult> {
        let (program, args) = self
            .command
            .split_first()
            .ok_or_else(|| anyhow!("empty checker command"))?;
        let mut cmd = Command::new(program);
        cmd.args(args).arg(path);
        let output = run_command_with_timeout(cmd, self.timeout, DEFAULT_OUTPUT_LIMIT_BYTES)?;
        if output.timed_out {
            return Err(anyhow!(
                "{program} timed out after {}s",
                self.timeout.as_secs()
            ));
        }
        if output.status.success() {
            debug!(program = %program, "syntax check passed");
            Ok(CheckResult::Valid)
        } else {
            Ok(CheckResult::Invalid(output.diagnostics()))
        }
    }
}

/// Checkers keyed by lowercase extension (without the dot).
#[derive(Default)]
pub struct CheckerSet {
    by_extension: BTreeMap<String, Box<dyn SyntaxChecker>>,
}

impl CheckerSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(configs: &[CheckerConfig]) -> Self {
        let mut set = Self::new();
        for config in configs {
            set.insert(&config.extension, CommandChecker::from_config(config));
        }
        set
    }

    pub fn insert(&mut self, extension: &str, checker: impl SyntaxChecker + 'static) {
        self.by_extension.insert(
            extension.trim_start_matches('.').to_ascii_lowercase(),
            Box::new(checker),
        );
    }

    /// Checker registered for `path`'s extension, if any.
    pub fn for_path(&self, path: &Path) -> Option<&dyn SyntaxChecker> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        self.by_extension.get(&ext).map(|checker| checker.as_ref())
    }
}

impl std::fmt::Debug for CheckerSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckerSet")
            .field("extensions", &self.by_extension.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeChecker;

    #[test]
    fn selects_checker_by_extension() {
        let mut set = CheckerSet::new();
        set.insert(".LUA", FakeChecker::valid());
        assert!(set.for_path(Path::new("src/init.lua")).is_some());
        assert!(set.for_path(Path::new("src/INIT.Lua")).is_some());
        assert!(set.for_path(Path::new("notes.txt")).is_none());
        assert!(set.for_path(Path::new("Makefile")).is_none());
    }

    #[cfg(unix)]
    #[test]
    fn command_checker_maps_exit_status() {
        let temp = tempfile::tempdir().expect("tempdir");
        let file = temp.path().join("x.txt");
        std::fs::write(&file, "hello\n").expect("write");

        let pass = CommandChecker::new(vec!["true".to_string()], Duration::from_secs(5));
        assert_eq!(pass.check(&file).expect("check"), CheckResult::Valid);

        let fail = CommandChecker::new(
            vec![
                "sh".to_string(),
                "-c".to_string(),
                "echo \"bad syntax in $0\" >&2; exit 1".to_string(),
            ],
            Duration::from_secs(5),
        );
        match fail.check(&file).expect("check") {
            CheckResult::Invalid(message) => assert!(message.contains("bad syntax")),
            CheckResult::Valid => panic!("expected invalid"),
        }
    }

    #[test]
    fn missing_program_is_an_error() {
        let checker = CommandChecker::new(
            vec!["autoedit-no-such-checker".to_string()],
            Duration::from_secs(5),
        );
        assert!(checker.check(Path::new("x.lua")).is_err());
    }
}
