//! Development diagnostics via `RUST_LOG`, written to stderr.
//!
//! Kept separate from product output: agent output is streamed to stdout by
//! the monitor and progress reports are printed by the CLI, neither of which
//! goes through tracing.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber.
///
/// Reads `RUST_LOG`; defaults to `warn` when unset.
///
/// ```bash
/// RUST_LOG=foreman=debug foreman run
/// ```
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
