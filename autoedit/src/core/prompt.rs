//! Prompt rendering for the full-file rewrite protocol.
//!
//! The system text is the contract every downstream parser relies on: the
//! model returns the entire file between [`FILE_OPEN`] and [`FILE_CLOSE`], or
//! [`NO_CHANGE_MARKER`] when nothing needs to change.

use anyhow::{Context, Result};
use minijinja::{Environment, context};

use crate::core::extract::{FILE_CLOSE, FILE_OPEN, NO_CHANGE_MARKER};
use crate::core::task::Task;

const SYSTEM_TEMPLATE: &str = include_str!("prompts/system.md");
const USER_TEMPLATE: &str = include_str!("prompts/user.md");

/// Rendered prompt pair sent to the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

/// Template engine wrapper around minijinja.
pub struct PromptBuilder {
    env: Environment<'static>,
}

impl PromptBuilder {
    pub fn new() -> Result<Self> {
        let mut env = Environment::new();
        env.add_template("system", SYSTEM_TEMPLATE)
            .context("load system prompt template")?;
        env.add_template("user", USER_TEMPLATE)
            .context("load user prompt template")?;
        Ok(Self { env })
    }

    /// Render the prompt for `task` given the target file's current content.
    pub fn build(&self, task: &Task, content: &str) -> Result<Prompt> {
        let system = self.env.get_template("system")?.render(context! {
            open => FILE_OPEN,
            close => FILE_CLOSE,
            no_change => NO_CHANGE_MARKER,
        })?;
        let user = self.env.get_template("user")?.render(context! {
            instruction => task.instruction.trim(),
            commit => task.commit.trim(),
            file => task.file.as_str(),
            content => content,
            open => FILE_OPEN,
            close => FILE_CLOSE,
        })?;
        Ok(Prompt { system, user })
    }
}
