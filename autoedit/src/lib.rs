//! Queued, model-driven file rewrites with a safety gate.
//!
//! Each queued task names one file and an instruction. The pipeline sends the
//! file to a language model, extracts the proposed full-file replacement,
//! checks it against safety heuristics, and only then writes it back and
//! stages it. Every model call and every task outcome is appended to a JSONL
//! audit log. The architecture enforces a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (task parsing, prompt rendering,
//!   extraction, safety gate, retry policy, priority scoring). No I/O.
//! - **[`io`]**: Side-effecting operations (queue file, model HTTP calls,
//!   audit log, git, syntax checkers, config).
//!
//! Orchestration modules ([`apply`], [`next`], [`prioritize`]) coordinate
//! core logic with I/O to implement CLI commands.

pub mod apply;
pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod next;
pub mod prioritize;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
