//! Process exit codes for each terminal loop outcome.
//!
//! Stable so wrapper scripts can branch on them. 2 is left to clap's usage
//! errors and 130 follows the shell convention for interruption.

use crate::orchestrator::LoopStop;

pub const COMPLETE: i32 = 0;
pub const FAILED: i32 = 1;
pub const STALLED: i32 = 3;
pub const BLOCKED: i32 = 4;
pub const MAX_ITERATIONS: i32 = 5;
pub const INTERRUPTED: i32 = 130;

pub fn for_stop(stop: &LoopStop) -> i32 {
    match stop {
        LoopStop::Complete => COMPLETE,
        LoopStop::Failed { .. } => FAILED,
        LoopStop::Stalled => STALLED,
        LoopStop::Blocked { .. } => BLOCKED,
        LoopStop::MaxIterationsReached => MAX_ITERATIONS,
        LoopStop::Interrupted => INTERRUPTED,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_stop_maps_to_a_distinct_code() {
        let stops = [
            LoopStop::Complete,
            LoopStop::Failed {
                reason: "x".to_string(),
            },
            LoopStop::Stalled,
            LoopStop::Blocked {
                reason: "x".to_string(),
            },
            LoopStop::MaxIterationsReached,
            LoopStop::Interrupted,
        ];
        let mut codes: Vec<i32> = stops.iter().map(for_stop).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), stops.len());
    }
}
