//! Jittered exponential backoff for transient fetch failures.
//!
//! The policy is a pure function from (attempt number, failure kind) to a
//! retry delay. Full jitter draws the actual delay uniformly from
//! `[0, ceiling]` to desynchronize concurrent retriers and avoid retry
//! storms against a recovering host.

use std::time::Duration;

use crate::FailureKind;
use crate::retry::RetryExt;

/// Computes jittered retry delays for transient failures.
///
/// Stateless and total: [`BackoffPolicy::next_delay`] never fails, it only
/// ever answers "wait this long" or "do not retry".
#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    base: Duration,
    max_delay: Duration,
    max_attempts: u32,
}

impl BackoffPolicy {
    /// Create a new backoff policy.
    ///
    /// `base` is the delay ceiling before the second attempt; each further
    /// attempt doubles the ceiling, capped at `max_delay`. `max_attempts`
    /// bounds the total number of attempts, including the first.
    #[must_use]
    pub const fn new(base: Duration, max_delay: Duration, max_attempts: u32) -> Self {
        Self {
            base,
            max_delay,
            max_attempts,
        }
    }

    /// Compute the delay to wait before `attempt` (the upcoming attempt
    /// number, so the first retry passes `2`).
    ///
    /// Returns `None` when the request should not be retried: either
    /// `attempt` exceeds the configured maximum or `failure_kind` is
    /// classified as permanent.
    #[must_use]
    pub fn next_delay(&self, attempt: u32, failure_kind: &FailureKind) -> Option<Duration> {
        if attempt > self.max_attempts || !failure_kind.should_retry() {
            return None;
        }
        Some(jitter_within(self.delay_ceiling(attempt)))
    }

    /// The un-jittered delay ceiling before the given attempt:
    /// `base * 2^(attempt - 2)`, capped at `max_delay`.
    #[must_use]
    pub fn delay_ceiling(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(2).min(32);
        let ceiling = self
            .base
            .saturating_mul(2u32.saturating_pow(exponent));
        ceiling.min(self.max_delay)
    }

    /// Maximum number of attempts, including the first
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

/// Draw a uniform duration from `[0, max]` (full jitter).
///
/// Seeded from the high-resolution clock and mixed with xorshift64.
/// Good enough for jitter, not crypto; avoids pulling in the `rand` crate.
fn jitter_within(max: Duration) -> Duration {
    let max_ms = max.as_millis() as u64;
    if max_ms == 0 {
        return max;
    }
    let mut x = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64;
    // xorshift64
    x ^= x << 13;
    x ^= x >> 7;
    x ^= x << 17;
    Duration::from_millis(x % (max_ms + 1))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> BackoffPolicy {
        BackoffPolicy::new(Duration::from_millis(100), Duration::from_secs(2), 5)
    }

    #[test]
    fn test_ceiling_doubles_up_to_cap() {
        let policy = policy();
        assert_eq!(policy.delay_ceiling(2), Duration::from_millis(100));
        assert_eq!(policy.delay_ceiling(3), Duration::from_millis(200));
        assert_eq!(policy.delay_ceiling(4), Duration::from_millis(400));
        assert_eq!(policy.delay_ceiling(5), Duration::from_millis(800));
        // capped
        assert_eq!(policy.delay_ceiling(7), Duration::from_secs(2));
        assert_eq!(policy.delay_ceiling(u32::MAX), Duration::from_secs(2));
    }

    #[test]
    fn test_ceiling_non_decreasing() {
        let policy = policy();
        let mut previous = Duration::ZERO;
        for attempt in 2..20 {
            let ceiling = policy.delay_ceiling(attempt);
            assert!(ceiling >= previous);
            previous = ceiling;
        }
    }

    #[test]
    fn test_jitter_stays_within_ceiling() {
        let policy = policy();
        for attempt in 2..=5 {
            for _ in 0..50 {
                let delay = policy
                    .next_delay(attempt, &FailureKind::Timeout)
                    .expect("retryable attempt");
                assert!(delay <= policy.delay_ceiling(attempt));
            }
        }
    }

    #[test]
    fn test_gives_up_past_max_attempts() {
        let policy = policy();
        assert!(policy.next_delay(5, &FailureKind::Timeout).is_some());
        assert!(policy.next_delay(6, &FailureKind::Timeout).is_none());
    }

    #[test]
    fn test_gives_up_on_permanent_failures() {
        let policy = policy();
        assert!(policy.next_delay(2, &FailureKind::Status(404)).is_none());
        assert!(
            policy
                .next_delay(2, &FailureKind::InvalidRequest("no host".into()))
                .is_none()
        );
        assert!(policy.next_delay(2, &FailureKind::Status(503)).is_some());
    }

    #[test]
    fn test_zero_base_yields_zero_delay() {
        let policy = BackoffPolicy::new(Duration::ZERO, Duration::from_secs(1), 3);
        assert_eq!(
            policy.next_delay(2, &FailureKind::Timeout),
            Some(Duration::ZERO)
        );
    }
}
