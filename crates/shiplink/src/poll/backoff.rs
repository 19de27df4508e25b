//! Exponential backoff with a cap for poll retries.

use std::time::Duration;

/// Default delay before the first retry.
pub const DEFAULT_BASE: Duration = Duration::from_secs(10);
/// Default upper bound on a single delay.
pub const DEFAULT_MAX: Duration = Duration::from_secs(300);
/// Default growth factor between consecutive failures.
pub const DEFAULT_FACTOR: f64 = 2.0;

/// Retry delay calculator.
///
/// The first delay is `base`; each consecutive call multiplies it by `factor`
/// until `max` is reached. [`reset`](Self::reset) after a success.
#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    factor: f64,
    attempt: u32,
}

impl Backoff {
    /// Create a backoff. A `factor` below 1.0 is treated as 1.0 (fixed delay).
    #[must_use]
    pub fn new(base: Duration, max: Duration, factor: f64) -> Self {
        Self {
            base,
            max: max.max(base),
            factor: factor.max(1.0),
            attempt: 0,
        }
    }

    /// A backoff that always waits `delay`.
    #[must_use]
    pub fn fixed(delay: Duration) -> Self {
        Self::new(delay, delay, 1.0)
    }

    /// Next delay; advances the attempt counter.
    pub fn next_delay(&mut self) -> Duration {
        let exponent = i32::try_from(self.attempt).unwrap_or(i32::MAX);
        let secs = self.base.as_secs_f64() * self.factor.powi(exponent);
        self.attempt = self.attempt.saturating_add(1);

        let max = self.max.as_secs_f64();
        if secs.is_finite() && secs < max {
            Duration::from_secs_f64(secs)
        } else {
            self.max
        }
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Consecutive failures since the last reset.
    #[must_use]
    pub fn attempt(&self) -> u32 {
        self.attempt
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(DEFAULT_BASE, DEFAULT_MAX, DEFAULT_FACTOR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_delay_is_base() {
        let mut backoff = Backoff::default();
        assert_eq!(backoff.next_delay(), Duration::from_secs(10));
    }

    #[test]
    fn test_delays_grow_then_cap() {
        let mut backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(5), 2.0);
        let delays: Vec<_> = (0..5).map(|_| backoff.next_delay().as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 5, 5]);
        assert_eq!(backoff.attempt(), 5);
    }

    #[test]
    fn test_reset_restarts_at_base() {
        let mut backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(60), 3.0);
        backoff.next_delay();
        backoff.next_delay();
        backoff.reset();
        assert_eq!(backoff.attempt(), 0);
        assert_eq!(backoff.next_delay(), Duration::from_secs(1));
    }

    #[test]
    fn test_fixed_never_grows() {
        let mut backoff = Backoff::fixed(Duration::from_secs(10));
        for _ in 0..4 {
            assert_eq!(backoff.next_delay(), Duration::from_secs(10));
        }
    }

    #[test]
    fn test_huge_attempt_counts_stay_capped() {
        let mut backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(30), 10.0);
        for _ in 0..2000 {
            assert!(backoff.next_delay() <= Duration::from_secs(30));
        }
    }
}
