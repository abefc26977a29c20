//! Retry policy for transient replies
//!
//! A command answered with a transient (negative) status is sent again,
//! unchanged, until it succeeds, fails fatally, or the attempt budget is
//! spent. The delay between attempts grows exponentially up to a cap.

use std::time::Duration;

/// Exponential backoff between attempts
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Backoff {
    /// Delay after the first failed attempt
    pub initial: Duration,
    /// Growth factor applied per further attempt
    pub multiplier: f64,
    /// Upper bound for any single delay
    pub max: Duration,
}

impl Backoff {
    /// No delay at all between attempts
    pub fn none() -> Self {
        Self {
            initial: Duration::ZERO,
            multiplier: 1.0,
            max: Duration::ZERO,
        }
    }

    /// A constant delay between attempts
    pub fn fixed(delay: Duration) -> Self {
        Self {
            initial: delay,
            multiplier: 1.0,
            max: delay,
        }
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(10),
            multiplier: 2.0,
            max: Duration::from_millis(500),
        }
    }
}

/// How often, and how patiently, a command is retried
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one
    pub max_attempts: u32,
    /// Delay schedule between attempts
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff: Backoff::default(),
        }
    }
}

impl RetryPolicy {
    /// Create a policy with the given attempt budget and default backoff
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::default()
        }
    }

    /// Create a policy that retries immediately
    pub fn no_backoff(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff: Backoff::none(),
        }
    }

    /// Set the backoff schedule
    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Check whether another attempt is allowed after `attempts` tries
    pub fn can_retry(&self, attempts: u32) -> bool {
        attempts < self.max_attempts
    }

    /// Delay to wait after the given (1-based) failed attempt
    pub fn delay_for(&self, attempt: u32) -> Duration {
        if attempt == 0 || self.backoff.initial.is_zero() {
            return Duration::ZERO;
        }
        let exponent = attempt.saturating_sub(1).min(32) as i32;
        let factor = self.backoff.multiplier.max(1.0).powi(exponent);
        let delay = self.backoff.initial.as_secs_f64() * factor;
        Duration::try_from_secs_f64(delay.min(self.backoff.max.as_secs_f64()))
            .unwrap_or(self.backoff.max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 5);
        assert!(policy.can_retry(4));
        assert!(!policy.can_retry(5));
    }

    #[test]
    fn test_exponential_delay_is_capped() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_millis(10));
        assert_eq!(policy.delay_for(2), Duration::from_millis(20));
        assert_eq!(policy.delay_for(3), Duration::from_millis(40));
        assert_eq!(policy.delay_for(20), Duration::from_millis(500));
    }

    #[test]
    fn test_unbounded_backoff_saturates() {
        let policy = RetryPolicy::new(64).with_backoff(Backoff {
            initial: Duration::from_secs(1),
            multiplier: 1e300,
            max: Duration::MAX,
        });
        assert_eq!(policy.delay_for(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for(32), Duration::MAX);
    }

    #[test]
    fn test_no_backoff() {
        let policy = RetryPolicy::no_backoff(3);
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.delay_for(1), Duration::ZERO);
        assert_eq!(policy.delay_for(3), Duration::ZERO);
    }

    #[test]
    fn test_zero_attempts_is_clamped() {
        assert_eq!(RetryPolicy::new(0).max_attempts, 1);
        assert_eq!(RetryPolicy::no_backoff(0).max_attempts, 1);
    }

    #[test]
    fn test_fixed_backoff() {
        let policy = RetryPolicy::new(5).with_backoff(Backoff::fixed(Duration::from_millis(7)));
        assert_eq!(policy.delay_for(1), Duration::from_millis(7));
        assert_eq!(policy.delay_for(4), Duration::from_millis(7));
    }
}
