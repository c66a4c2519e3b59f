//! # Retry Delay Policies
//!
//! Two distinct policies:
//!
//! - [`ExponentialBackoff`]: `base * multiplier^(attempt - 1)`, stretched by up
//!   to `jitter_factor` and capped at `max_delay`. Used by
//!   [`RetryingHandler`](crate::resilience::RetryingHandler) for in-process
//!   retries and, without jitter, by the connection manager.
//! - [`FixedDelay`]: the same delay for every attempt. This is the worker
//!   pool's re-delivery policy (`retry_delay` between deliveries).
//!
//! Attempts are numbered from 1.

use std::time::Duration;

use crate::constants::defaults;

/// Delay schedule between attempts
pub trait RetryPolicy: Send + Sync + std::fmt::Debug {
    /// Delay to wait after failed attempt number `attempt`
    fn delay_for_attempt(&self, attempt: u32) -> Duration;

    /// Total attempts allowed, the first one included
    fn max_attempts(&self) -> u32;

    /// Whether another attempt is allowed after `attempt` failed
    fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts()
    }
}

/// Exponential backoff with multiplicative jitter
#[derive(Debug, Clone, PartialEq)]
pub struct ExponentialBackoff {
    pub base_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
    /// Fraction in `0.0..=1.0`; each delay is stretched by up to this much
    pub jitter_factor: f64,
    pub max_attempts: u32,
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(defaults::BACKOFF_BASE_DELAY_MS),
            multiplier: defaults::BACKOFF_MULTIPLIER,
            max_delay: Duration::from_millis(defaults::BACKOFF_MAX_DELAY_MS),
            jitter_factor: defaults::BACKOFF_JITTER_FACTOR,
            max_attempts: defaults::BACKOFF_MAX_ATTEMPTS,
        }
    }
}

impl ExponentialBackoff {
    /// Plain doubling from `base_delay`, no jitter and no practical cap
    pub fn doubling(base_delay: Duration, max_attempts: u32) -> Self {
        Self {
            base_delay,
            multiplier: 2.0,
            max_delay: Duration::MAX,
            jitter_factor: 0.0,
            max_attempts,
        }
    }

    pub fn with_jitter(mut self, jitter_factor: f64) -> Self {
        self.jitter_factor = jitter_factor.clamp(0.0, 1.0);
        self
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Delay before jitter is applied
    pub fn base_delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let factor = self.multiplier.max(1.0).powi(exponent);
        let seconds = self.base_delay.as_secs_f64() * factor;

        if !seconds.is_finite() || seconds >= self.max_delay.as_secs_f64() {
            self.max_delay
        } else {
            Duration::from_secs_f64(seconds)
        }
    }
}

impl RetryPolicy for ExponentialBackoff {
    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay = self.base_delay_for_attempt(attempt);

        let jittered_delay = if self.jitter_factor > 0.0 {
            let jitter = fastrand::f64() * self.jitter_factor;
            delay.mul_f64(1.0 + jitter)
        } else {
            delay
        };

        jittered_delay.min(self.max_delay)
    }

    fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

/// Constant delay between attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedDelay {
    pub delay: Duration,
    pub max_attempts: u32,
}

impl FixedDelay {
    pub fn new(delay: Duration, max_attempts: u32) -> Self {
        Self {
            delay,
            max_attempts,
        }
    }
}

impl RetryPolicy for FixedDelay {
    fn delay_for_attempt(&self, _attempt: u32) -> Duration {
        self.delay
    }

    fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_growth_without_jitter() {
        let backoff = ExponentialBackoff {
            jitter_factor: 0.0,
            ..ExponentialBackoff::default()
        };

        assert_eq!(backoff.delay_for_attempt(1), Duration::from_secs(1));
        assert_eq!(backoff.delay_for_attempt(2), Duration::from_secs(2));
        assert_eq!(backoff.delay_for_attempt(3), Duration::from_secs(4));
        assert_eq!(backoff.delay_for_attempt(4), Duration::from_secs(8));
    }

    #[test]
    fn test_delay_capped_at_max() {
        let backoff = ExponentialBackoff::default().with_max_delay(Duration::from_secs(10));
        assert_eq!(backoff.delay_for_attempt(30), Duration::from_secs(10));
        assert_eq!(backoff.delay_for_attempt(u32::MAX), Duration::from_secs(10));
    }

    #[test]
    fn test_jitter_stays_within_bounds() {
        let backoff = ExponentialBackoff::default().with_jitter(0.5);
        for attempt in 1..=5 {
            let base = backoff.base_delay_for_attempt(attempt);
            let delay = backoff.delay_for_attempt(attempt);
            assert!(delay >= base);
            assert!(delay <= base.mul_f64(1.5));
        }
    }

    #[test]
    fn test_doubling_has_no_cap() {
        let backoff = ExponentialBackoff::doubling(Duration::from_millis(100), 5);
        assert_eq!(backoff.delay_for_attempt(1), Duration::from_millis(100));
        assert_eq!(backoff.delay_for_attempt(5), Duration::from_millis(1600));
        assert!(backoff.should_retry(4));
        assert!(!backoff.should_retry(5));
    }

    #[test]
    fn test_fixed_delay_is_linear() {
        let policy = FixedDelay::new(Duration::from_secs(5), 3);
        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(5));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_secs(5));
        assert!(policy.should_retry(2));
        assert!(!policy.should_retry(3));
    }
}
