//! Deterministic, pure logic for the rewrite pipeline.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data and return deterministic outputs suitable for tests.

pub mod extract;
pub mod outcome;
pub mod priority;
pub mod prompt;
pub mod retry;
pub mod safety;
pub mod stats;
pub mod task;
