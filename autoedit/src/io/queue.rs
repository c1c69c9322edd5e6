//! File-backed FIFO task queue (`tasks.jsonl`).
//!
//! The queue file is the task sequence itself: one JSON object per line, head
//! first. Mutations rewrite the whole file through a temp file and a rename so
//! a reader never observes a partial write. Read-modify-write cycles run inside
//! a [`QueueCheckout`], which holds an exclusive advisory lock on
//! `<queue>.lock` until dropped.

use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::core::task::{Task, TaskError, parse_tasks};

#[derive(Debug, Error)]
pub enum QueueError {
    #[error(transparent)]
    Malformed(#[from] TaskError),
    #[error("task field '{field}' must be non-empty")]
    EmptyField { field: &'static str },
    #[error("task id '{id}' is already queued")]
    DuplicateId { id: String },
    #[error("queue I/O on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("serialize task: {0}")]
    Serialize(#[from] serde_json::Error),
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> QueueError + '_ {
    move |source| QueueError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Handle to a queue file. Cheap to construct; does no I/O until used.
#[derive(Debug, Clone)]
pub struct TaskQueue {
    path: PathBuf,
}

impl TaskQueue {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock_path(&self) -> PathBuf {
        sibling(&self.path, "lock")
    }

    /// Acquire exclusive access for a read-modify-write cycle.
    ///
    /// Blocks until no other checkout holds the lock.
    #[instrument(skip_all, fields(queue = %self.path.display()))]
    pub fn checkout(&self) -> Result<QueueCheckout<'_>, QueueError> {
        let lock = self.open_lock()?;
        lock.lock_exclusive().map_err(io_error(&self.lock_path()))?;
        debug!("queue checked out");
        Ok(QueueCheckout { queue: self, lock })
    }

    /// All tasks, head first. A missing file is an empty queue.
    pub fn load(&self) -> Result<Vec<Task>, QueueError> {
        let lock = self.open_lock()?;
        lock.lock_shared().map_err(io_error(&self.lock_path()))?;
        let tasks = self.read_tasks();
        release(&lock);
        tasks
    }

    /// Head task without removing it.
    pub fn peek(&self) -> Result<Option<Task>, QueueError> {
        Ok(self.load()?.into_iter().next())
    }

    /// Remove and return the head task.
    pub fn consume(&self) -> Result<Option<Task>, QueueError> {
        self.checkout()?.consume()
    }

    pub fn append(&self, task: Task) -> Result<(), QueueError> {
        self.checkout()?.append(task)
    }

    /// Parse every record; returns the number of well-formed tasks.
    pub fn validate(&self) -> Result<usize, QueueError> {
        Ok(self.load()?.len())
    }

    fn open_lock(&self) -> Result<File, QueueError> {
        let lock_path = self.lock_path();
        if let Some(parent) = lock_path.parent() {
            fs::create_dir_all(parent).map_err(io_error(parent))?;
        }
        OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)
            .map_err(io_error(&lock_path))
    }

    fn read_tasks(&self) -> Result<Vec<Task>, QueueError> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(io_error(&self.path)(err)),
        };
        Ok(parse_tasks(&contents)?)
    }

    fn write_tasks(&self, tasks: &[Task]) -> Result<(), QueueError> {
        write_atomic(&self.path, tasks)?;
        debug!(remaining = tasks.len(), "queue rewritten");
        Ok(())
    }
}

/// Exclusive access to the queue. The lock is released on drop.
#[derive(Debug)]
pub struct QueueCheckout<'a> {
    queue: &'a TaskQueue,
    lock: File,
}

impl QueueCheckout<'_> {
    pub fn tasks(&self) -> Result<Vec<Task>, QueueError> {
        self.queue.read_tasks()
    }

    pub fn peek(&self) -> Result<Option<Task>, QueueError> {
        Ok(self.tasks()?.into_iter().next())
    }

    /// Remove the head task and persist the remainder atomically.
    ///
    /// Returns `None` (and writes nothing) when the queue is empty.
    pub fn consume(&self) -> Result<Option<Task>, QueueError> {
        let mut tasks = self.tasks()?;
        if tasks.is_empty() {
            return Ok(None);
        }
        let head = tasks.remove(0);
        self.queue.write_tasks(&tasks)?;
        debug!(task_id = %head.id, "task consumed");
        Ok(Some(head))
    }

    /// Append `task` at the tail after checking fields and id uniqueness.
    pub fn append(&self, task: Task) -> Result<(), QueueError> {
        if let Some(field) = task.first_empty_field() {
            return Err(QueueError::EmptyField { field });
        }
        let mut tasks = self.tasks()?;
        if tasks.iter().any(|existing| existing.id == task.id) {
            return Err(QueueError::DuplicateId { id: task.id });
        }
        debug!(task_id = %task.id, "task appended");
        tasks.push(task);
        self.queue.write_tasks(&tasks)
    }

    /// Replace the whole queue (used after re-ordering).
    pub fn replace(&self, tasks: &[Task]) -> Result<(), QueueError> {
        self.queue.write_tasks(tasks)
    }

    /// Write `tasks` to another file in queue format, atomically.
    ///
    /// Runs under this checkout's lock only, so `path` may name the checked-out
    /// queue itself under any spelling.
    pub fn export(&self, path: &Path, tasks: &[Task]) -> Result<(), QueueError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_error(parent))?;
        }
        write_atomic(path, tasks)?;
        debug!(path = %path.display(), tasks = tasks.len(), "queue exported");
        Ok(())
    }
}

impl Drop for QueueCheckout<'_> {
    fn drop(&mut self) {
        release(&self.lock);
    }
}

fn release(lock: &File) {
    if let Err(err) = FileExt::unlock(lock) {
        debug!(err = %err, "queue unlock failed, lock drops with the handle");
    }
}

fn write_atomic(path: &Path, tasks: &[Task]) -> Result<(), QueueError> {
    let mut buf = String::new();
    for task in tasks {
        buf.push_str(&task.to_line()?);
        buf.push('\n');
    }
    let tmp_path = sibling(path, "tmp");
    let mut tmp = File::create(&tmp_path).map_err(io_error(&tmp_path))?;
    tmp.write_all(buf.as_bytes()).map_err(io_error(&tmp_path))?;
    tmp.sync_all().map_err(io_error(&tmp_path))?;
    fs::rename(&tmp_path, path).map_err(io_error(path))
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "queue".into());
    name.push(".");
    name.push(suffix);
    path.with_file_name(name)
}
