//! Iteration-control loop for an autonomous coding agent.
//!
//! The crate drives an external agent process through a phased task list:
//! each iteration selects one eligible task, runs the agent with a prompt for
//! exactly that task, detects completion through an artifact the agent writes,
//! records the outcome, and persists the full project state before deciding
//! whether to continue. The architecture enforces a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (data model, selection, merge,
//!   outcome classification). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting operations (state persistence, document
//!   parsing and write-back, process supervision). Isolated behind the
//!   [`io::monitor::TaskRunner`] seam to enable scripted doubles in tests.
//!
//! The [`orchestrator`] coordinates both halves to implement the loop.

pub mod cancel;
pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod orchestrator;
pub mod progress;
pub mod retry;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
