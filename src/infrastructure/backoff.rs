use crate::types::BACKOFF_JITTER_RATIO;
use std::time::Duration;

/// Reconnect delay computation with bounded exponential growth and jitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    base: Duration,
    max: Duration,
    exponential: bool,
}

impl BackoffPolicy {
    pub fn new(base: Duration, max: Duration, exponential: bool) -> Self {
        Self {
            base,
            max,
            exponential,
        }
    }

    /// Constant delay of `base` for every attempt.
    pub fn constant(base: Duration) -> Self {
        Self::new(base, base, false)
    }

    /// Delay before reconnect attempt `attempt`, with freshly drawn jitter.
    pub fn delay(&self, attempt: u32) -> Duration {
        self.delay_with_jitter(attempt, rand::random::<f64>())
    }

    /// Delay before reconnect attempt `attempt` for a jitter sample in `[0, 1)`.
    ///
    /// Without exponential growth this is always `base`. Otherwise it is
    /// `min(base * 2^attempt, max)` plus `sample * 0.3` of that raw delay.
    pub fn delay_with_jitter(&self, attempt: u32, sample: f64) -> Duration {
        if !self.exponential {
            return self.base;
        }

        let raw = self.raw_delay(attempt);
        let sample = if sample.is_finite() {
            sample.clamp(0.0, 1.0)
        } else {
            0.0
        };

        // Whole nanoseconds, kept strictly below the jitter bound
        let raw_nanos = raw.as_nanos();
        let bound = (raw_nanos as f64 * BACKOFF_JITTER_RATIO) as u128;
        let jitter = ((bound as f64 * sample).floor() as u128).min(bound.saturating_sub(1));
        Duration::from_nanos(u64::try_from(raw_nanos + jitter).unwrap_or(u64::MAX))
    }

    /// The capped exponential delay, before jitter.
    pub fn raw_delay(&self, attempt: u32) -> Duration {
        if !self.exponential {
            return self.base;
        }

        let base_ms = self.base.as_millis().min(u64::MAX as u128) as u64;
        let max_ms = self.max.as_millis().min(u64::MAX as u128) as u64;
        let raw_ms = base_ms.saturating_mul(2u64.saturating_pow(attempt));
        Duration::from_millis(raw_ms.min(max_ms))
    }

    pub fn base(&self) -> Duration {
        self.base
    }

    pub fn max(&self) -> Duration {
        self.max
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> BackoffPolicy {
        BackoffPolicy::new(
            Duration::from_millis(1000),
            Duration::from_millis(30000),
            true,
        )
    }

    #[test]
    fn test_raw_delay_doubles_until_cap() {
        let policy = policy();
        assert_eq!(policy.raw_delay(0), Duration::from_millis(1000));
        assert_eq!(policy.raw_delay(1), Duration::from_millis(2000));
        assert_eq!(policy.raw_delay(2), Duration::from_millis(4000));
        assert_eq!(policy.raw_delay(3), Duration::from_millis(8000));
        assert_eq!(policy.raw_delay(10), Duration::from_millis(30000));
    }

    #[test]
    fn test_raw_delay_does_not_overflow_for_large_attempts() {
        assert_eq!(policy().raw_delay(200), Duration::from_millis(30000));
    }

    #[test]
    fn test_jitter_bounds() {
        let policy = policy();
        assert_eq!(policy.delay_with_jitter(2, 0.0), Duration::from_millis(4000));
        let top = policy.delay_with_jitter(2, 0.999_999);
        assert!(top < Duration::from_millis(5200));
        assert!(top > Duration::from_millis(5199));
        assert_eq!(policy.delay_with_jitter(10, 0.0), Duration::from_millis(30000));
        let saturated = policy.delay_with_jitter(10, 0.5);
        assert!(saturated > Duration::from_millis(34499));
        assert!(saturated < Duration::from_millis(34501));
    }

    #[test]
    fn test_random_delay_within_range() {
        let policy = policy();
        for attempt in 0..5 {
            let raw = policy.raw_delay(attempt);
            for _ in 0..50 {
                let delay = policy.delay(attempt);
                assert!(delay >= raw, "attempt {attempt}: {delay:?} < {raw:?}");
                assert!(delay < raw + raw * 3 / 10, "attempt {attempt}: {delay:?}");
            }
        }
    }

    #[test]
    fn test_constant_policy_ignores_attempt_and_jitter() {
        let policy = BackoffPolicy::new(
            Duration::from_millis(3000),
            Duration::from_millis(30000),
            false,
        );
        assert_eq!(policy.delay(0), Duration::from_millis(3000));
        assert_eq!(policy.delay(12), Duration::from_millis(3000));
        assert_eq!(
            BackoffPolicy::constant(Duration::from_millis(5)).delay(3),
            Duration::from_millis(5)
        );
    }

    #[test]
    fn test_jitter_stays_below_bound_for_samples_near_one() {
        let policy = policy();
        for attempt in 0..6 {
            let raw = policy.raw_delay(attempt);
            let delay = policy.delay_with_jitter(attempt, 1.0 - f64::EPSILON / 2.0);
            assert!(delay < raw + raw * 3 / 10, "attempt {attempt}: {delay:?}");
            assert!(delay > raw);
        }
    }

    #[test]
    fn test_out_of_range_samples_are_clamped() {
        let policy = policy();
        assert_eq!(policy.delay_with_jitter(0, -1.0), Duration::from_millis(1000));
        assert_eq!(policy.delay_with_jitter(0, f64::NAN), Duration::from_millis(1000));
        assert!(policy.delay_with_jitter(0, 7.0) < Duration::from_millis(1300));
    }
}
