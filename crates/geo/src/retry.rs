//! Bounded retry with exponential backoff.

use rand::Rng;
use std::time::Duration;

/// Retry behaviour as an explicit value object so it can be tested (and
/// configured) independently of the loops that use it.
///
/// Delay for attempt `n` (zero-based) is `base_delay * 2^n`, scaled by a
/// random jitter factor in `[1 - jitter, 1 + jitter]`.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first (so `1` means no retries).
    pub max_attempts: u32,
    pub base_delay: Duration,
    /// Jitter fraction in `[0, 1]`.
    pub jitter: f64,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, jitter: f64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            jitter: jitter.clamp(0.0, 1.0),
        }
    }

    /// Backoff delay before retry number `attempt` (zero-based count of
    /// failures so far).
    pub fn delay(&self, attempt: u32) -> Duration {
        // Cap the exponent so a misconfigured max_attempts can't overflow.
        let exp = attempt.min(16);
        let base = self.base_delay.as_secs_f64() * f64::from(1u32 << exp);
        let factor = if self.jitter > 0.0 {
            rand::rng().random_range(1.0 - self.jitter..=1.0 + self.jitter)
        } else {
            1.0
        };
        Duration::from_secs_f64(base * factor)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(500), 0.2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_grows_exponentially_without_jitter() {
        let policy = RetryPolicy::new(5, Duration::from_millis(100), 0.0);
        assert_eq!(policy.delay(0), Duration::from_millis(100));
        assert_eq!(policy.delay(1), Duration::from_millis(200));
        assert_eq!(policy.delay(3), Duration::from_millis(800));
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let policy = RetryPolicy::new(3, Duration::from_millis(100), 0.5);
        for _ in 0..100 {
            let d = policy.delay(1).as_secs_f64();
            assert!((0.1..=0.3).contains(&d), "delay {d} outside jitter envelope");
        }
    }

    #[test]
    fn at_least_one_attempt() {
        assert_eq!(RetryPolicy::new(0, Duration::ZERO, 0.0).max_attempts, 1);
    }

    #[test]
    fn large_attempt_does_not_overflow() {
        let policy = RetryPolicy::new(3, Duration::from_millis(1), 0.0);
        let _ = policy.delay(u32::MAX);
    }
}
