//! Test-only helpers: deterministic tasks and scripted collaborators.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, VecDeque};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use anyhow::{Result, anyhow};

use crate::core::task::Task;
use crate::io::checker::{CheckResult, SyntaxChecker};
use crate::io::git::Vcs;
use crate::io::model::{HttpReply, ModelRequest, Transport, TransportError};

/// Create a deterministic task with a well-formed commit message.
pub fn task(id: &str, file: &str) -> Task {
    Task::new(
        id,
        file,
        "fix(core): adjust",
        format!("{id} instruction"),
    )
}

/// `count` lines of the form `line N`, each newline-terminated.
pub fn numbered_lines(count: usize) -> String {
    (1..=count).map(|n| format!("line {n}\n")).collect()
}

/// A 200 reply whose `choices[0].message.content` is `content`.
pub fn chat_reply(content: &str) -> HttpReply {
    let body = serde_json::json!({
        "choices": [{"message": {"role": "assistant", "content": content}}]
    });
    HttpReply {
        status: 200,
        body: body.to_string(),
    }
}

/// Transport that replays a fixed script and records every request.
///
/// Once the script is exhausted every call fails with a network error.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    script: RefCell<VecDeque<Result<HttpReply, TransportError>>>,
    requests: RefCell<Vec<ModelRequest>>,
    calls: Cell<usize>,
}

impl ScriptedTransport {
    pub fn new(script: Vec<Result<HttpReply, TransportError>>) -> Self {
        Self {
            script: RefCell::new(script.into()),
            ..Self::default()
        }
    }

    /// Transport whose only reply is a successful chat completion.
    pub fn replying(content: &str) -> Self {
        Self::new(vec![Ok(chat_reply(content))])
    }

    pub fn calls(&self) -> usize {
        self.calls.get()
    }

    pub fn requests(&self) -> Vec<ModelRequest> {
        self.requests.borrow().clone()
    }
}

impl Transport for ScriptedTransport {
    fn send(&self, request: &ModelRequest, _token: &str) -> Result<HttpReply, TransportError> {
        self.calls.set(self.calls.get() + 1);
        self.requests.borrow_mut().push(request.clone());
        self.script
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| Err(TransportError::Network("script exhausted".to_string())))
    }
}

/// In-memory VCS that records staged paths.
#[derive(Debug, Default)]
pub struct FakeVcs {
    staged: RefCell<Vec<PathBuf>>,
    changes: BTreeMap<String, u32>,
    fail_stage: bool,
    fail_diff: bool,
    fail_log: bool,
}

impl FakeVcs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_changes(mut self, changes: &[(&str, u32)]) -> Self {
        self.changes = changes
            .iter()
            .map(|(path, count)| (path.to_string(), *count))
            .collect();
        self
    }

    pub fn fail_stage(mut self) -> Self {
        self.fail_stage = true;
        self
    }

    pub fn fail_diff(mut self) -> Self {
        self.fail_diff = true;
        self
    }

    pub fn fail_log(mut self) -> Self {
        self.fail_log = true;
        self
    }

    pub fn staged(&self) -> Vec<PathBuf> {
        self.staged.borrow().clone()
    }
}

impl Vcs for FakeVcs {
    fn stage(&self, path: &Path) -> Result<()> {
        if self.fail_stage {
            return Err(anyhow!("fatal: pathspec did not match"));
        }
        self.staged.borrow_mut().push(path.to_path_buf());
        Ok(())
    }

    fn diff_stat(&self) -> Result<String> {
        if self.fail_diff {
            return Err(anyhow!("diff unavailable"));
        }
        Ok(format!("{} file(s) changed", self.staged.borrow().len()))
    }

    fn changed_files_since(&self, _days: u32) -> Result<BTreeMap<String, u32>> {
        if self.fail_log {
            return Err(anyhow!("not a git repository"));
        }
        Ok(self.changes.clone())
    }
}

/// Syntax checker with a fixed verdict. Records the file content it was shown.
#[derive(Debug, Clone)]
pub struct FakeChecker {
    verdict: std::result::Result<CheckResult, String>,
    seen: Rc<RefCell<Vec<String>>>,
}

impl FakeChecker {
    pub fn valid() -> Self {
        Self::with_verdict(Ok(CheckResult::Valid))
    }

    pub fn invalid(message: &str) -> Self {
        Self::with_verdict(Ok(CheckResult::Invalid(message.to_string())))
    }

    /// Checker that cannot run (binary missing, timeout).
    pub fn failing(message: &str) -> Self {
        Self::with_verdict(Err(message.to_string()))
    }

    fn with_verdict(verdict: std::result::Result<CheckResult, String>) -> Self {
        Self {
            verdict,
            seen: Rc::default(),
        }
    }

    /// Shared handle to the contents seen so far.
    pub fn seen(&self) -> Rc<RefCell<Vec<String>>> {
        Rc::clone(&self.seen)
    }
}

impl SyntaxChecker for FakeChecker {
    fn check(&self, path: &Path) -> Result<CheckResult> {
        let content = std::fs::read_to_string(path)?;
        self.seen.borrow_mut().push(content);
        self.verdict.clone().map_err(|message| anyhow!(message))
    }
}
