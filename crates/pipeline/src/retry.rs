//! Exponential-backoff retry policy for transient stage failures.
//!
//! Retries are internal to a stage: no additional `stage-started`
//! events are emitted per attempt, only the final outcome is visible in
//! the job's event stream.

use std::time::Duration;

/// Tunable parameters for a stage's retry behavior.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts including the first (1 = no retries).
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound on the delay between attempts.
    pub max_delay: Duration,
    /// Factor by which the delay grows after each failure.
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries. For stages whose failures are
    /// always permanent (pure local computation).
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }
}

/// Calculate the next backoff delay from the current delay and policy.
///
/// The result is clamped to [`RetryPolicy::max_delay`].
pub fn next_delay(current: Duration, policy: &RetryPolicy) -> Duration {
    let next_ms = (current.as_millis() as f64 * policy.multiplier) as u64;
    Duration::from_millis(next_ms).min(policy.max_delay)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_delay_doubles() {
        let policy = RetryPolicy::default();
        let d = next_delay(Duration::from_secs(1), &policy);
        assert_eq!(d, Duration::from_secs(2));
    }

    #[test]
    fn next_delay_clamps_at_max() {
        let policy = RetryPolicy {
            max_delay: Duration::from_secs(10),
            ..Default::default()
        };
        let d = next_delay(Duration::from_secs(8), &policy);
        assert_eq!(d, Duration::from_secs(10));
    }

    #[test]
    fn next_delay_already_at_max() {
        let policy = RetryPolicy {
            max_delay: Duration::from_secs(30),
            ..Default::default()
        };
        let d = next_delay(Duration::from_secs(30), &policy);
        assert_eq!(d, Duration::from_secs(30));
    }

    #[test]
    fn full_backoff_sequence() {
        let policy = RetryPolicy {
            initial_delay: Duration::from_secs(1),
            ..Default::default()
        };
        let mut delay = policy.initial_delay;
        let expected = [1, 2, 4, 8, 16, 30, 30];

        for &expected_secs in &expected {
            assert_eq!(delay.as_secs(), expected_secs);
            delay = next_delay(delay, &policy);
        }
    }

    #[test]
    fn none_policy_is_single_attempt() {
        assert_eq!(RetryPolicy::none().max_attempts, 1);
    }
}
