//! Cooperative cancellation token shared between the loop and the in-flight
//! monitor invocation.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Cloneable interrupt flag. The orchestrator polls it at loop-pass
/// boundaries; the monitor polls it between output waits and force-terminates
/// the child when set. Cancelling twice is harmless.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}
