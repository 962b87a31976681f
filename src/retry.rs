//! Bounded retry with exponential backoff and jitter.
//!
//! Used by the orchestrator around agent spawning; transient infrastructure
//! errors are retried, everything else fails the attempt immediately.

use std::thread;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Backoff configuration (TOML `[retry]` table).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_secs: f64,
    pub max_delay_secs: f64,
    pub exponential_base: f64,
    pub jitter: bool,
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_secs: 1.0,
            max_delay_secs: 60.0,
            exponential_base: 2.0,
            jitter: true,
            jitter_factor: 0.1,
        }
    }
}

impl RetryConfig {
    /// Backoff delay for a 1-indexed attempt:
    /// `min(base * exponential_base^(attempt-1), max)`, optionally perturbed
    /// by a uniform offset within `± jitter_factor * delay`, floored at zero.
    pub fn get_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let mut delay = self.base_delay_secs * self.exponential_base.powi(exponent as i32);
        delay = delay.min(self.max_delay_secs);

        if self.jitter && delay > 0.0 {
            let range = delay * self.jitter_factor;
            delay += rand::rng().random_range(-range..=range);
        }

        Duration::from_secs_f64(delay.max(0.0))
    }
}

/// Result of a retried operation.
#[derive(Debug)]
pub enum RetryOutcome<T, E> {
    /// First non-error result.
    Success(T),
    /// The classifier rejected retrying; no further attempts were consumed.
    Failure(E),
    /// Attempts ran out; carries the last error.
    Exhausted(E),
}

impl<T, E> RetryOutcome<T, E> {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

/// Run `op` up to `config.max_attempts` times, sleeping the backoff delay
/// between attempts (never after the last one).
///
/// `should_retry` classifies errors as transient; returning `false` stops
/// immediately with `Failure`. `on_retry` runs before each re-attempt sleep
/// with the attempt just failed and its error.
pub fn execute<T, E, Op, Classify, OnRetry>(
    config: &RetryConfig,
    mut op: Op,
    mut should_retry: Option<Classify>,
    mut on_retry: Option<OnRetry>,
) -> RetryOutcome<T, E>
where
    Op: FnMut() -> Result<T, E>,
    Classify: FnMut(&E) -> bool,
    OnRetry: FnMut(u32, &E),
{
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match op() {
            Ok(value) => return RetryOutcome::Success(value),
            Err(err) => {
                if let Some(classify) = should_retry.as_mut()
                    && !classify(&err)
                {
                    return RetryOutcome::Failure(err);
                }
                if attempt >= config.max_attempts {
                    return RetryOutcome::Exhausted(err);
                }
                if let Some(callback) = on_retry.as_mut() {
                    callback(attempt, &err);
                }
                let delay = config.get_delay(attempt);
                debug!(attempt, delay_ms = delay.as_millis() as u64, "retrying after backoff");
                thread::sleep(delay);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_jitter() -> RetryConfig {
        RetryConfig {
            jitter: false,
            base_delay_secs: 0.0,
            ..RetryConfig::default()
        }
    }

    /// Classifier/callback type used when a call site passes `None`.
    type NoClassify = fn(&String) -> bool;
    type NoCallback = fn(u32, &String);

    #[test]
    fn delay_without_jitter_is_non_decreasing_until_cap() {
        let config = RetryConfig {
            jitter: false,
            max_delay_secs: 8.0,
            ..RetryConfig::default()
        };
        let mut previous = Duration::ZERO;
        for attempt in 1..=8 {
            let delay = config.get_delay(attempt);
            assert!(delay >= previous, "attempt {attempt} decreased");
            assert!(delay <= Duration::from_secs_f64(8.0));
            previous = delay;
        }
        assert_eq!(config.get_delay(8), Duration::from_secs_f64(8.0));
    }

    #[test]
    fn jittered_delay_stays_within_bound() {
        let config = RetryConfig {
            base_delay_secs: 0.01,
            max_delay_secs: 0.05,
            jitter_factor: 0.1,
            ..RetryConfig::default()
        };
        let bound = Duration::from_secs_f64(0.05 * 1.1);
        for attempt in 1..=10 {
            assert!(config.get_delay(attempt) <= bound);
        }
    }

    #[test]
    fn first_success_returns_without_more_attempts() {
        let mut calls = 0;
        let outcome: RetryOutcome<u32, String> = execute(
            &no_jitter(),
            || {
                calls += 1;
                Ok(42)
            },
            None::<NoClassify>,
            None::<NoCallback>,
        );
        assert!(matches!(outcome, RetryOutcome::Success(42)));
        assert_eq!(calls, 1);
    }

    #[test]
    fn exhausts_after_max_attempts() {
        let mut calls = 0;
        let outcome: RetryOutcome<(), String> = execute(
            &no_jitter(),
            || {
                calls += 1;
                Err("boom".to_string())
            },
            None::<NoClassify>,
            None::<NoCallback>,
        );
        assert!(matches!(outcome, RetryOutcome::Exhausted(ref e) if e == "boom"));
        assert_eq!(calls, 3);
    }

    #[test]
    fn classifier_rejection_fails_immediately() {
        let mut calls = 0;
        let outcome: RetryOutcome<(), String> = execute(
            &no_jitter(),
            || {
                calls += 1;
                Err("terminal".to_string())
            },
            Some(|_: &String| false),
            None::<NoCallback>,
        );
        assert!(matches!(outcome, RetryOutcome::Failure(_)));
        assert_eq!(calls, 1);
    }

    #[test]
    fn on_retry_sees_each_failed_attempt() {
        let mut seen = Vec::new();
        let outcome: RetryOutcome<(), String> = execute(
            &no_jitter(),
            || Err("again".to_string()),
            None::<NoClassify>,
            Some(|attempt: u32, _: &String| seen.push(attempt)),
        );
        assert!(matches!(outcome, RetryOutcome::Exhausted(_)));
        // No callback after the final attempt.
        assert_eq!(seen, vec![1, 2]);
    }

    #[test]
    fn recovers_on_later_attempt() {
        let mut calls = 0;
        let outcome: RetryOutcome<&str, String> = execute(
            &no_jitter(),
            || {
                calls += 1;
                if calls < 3 { Err("transient".to_string()) } else { Ok("ok") }
            },
            Some(|_: &String| true),
            None::<NoCallback>,
        );
        assert!(matches!(outcome, RetryOutcome::Success("ok")));
        assert_eq!(calls, 3);
    }
}
