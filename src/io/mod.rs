//! Side-effecting operations: filesystem, configuration, process execution,
//! and source-document mutation. Kept separate from `core` so tests can mock
//! at the seams.

pub mod config;
pub mod input;
pub mod monitor;
pub mod prompt;
pub mod source_doc;
pub mod state_store;
