//! I/O adapters for the pipeline commands.

pub mod audit;
pub mod checker;
pub mod config;
pub mod git;
pub mod model;
pub mod process;
pub mod queue;
pub mod writeback;
