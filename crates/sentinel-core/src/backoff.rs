//! Exponential backoff with a cap and bounded jitter.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Exponential backoff policy.
///
/// The nominal delay for attempt `n` (0-based) is `base * factor^n`, capped
/// at `max`. Jitter scales the nominal delay by a random factor in
/// `[1, 1 + jitter)`. Jitter is clamped to `factor - 1` so that consecutive
/// delays never decrease: each one is strictly longer than the previous
/// until the cap is reached, after which they stay at the cap.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Backoff {
    /// Delay for the first attempt, in milliseconds.
    pub base_ms: u64,
    /// Multiplicative growth per attempt.
    pub factor: f64,
    /// Upper bound for any delay, in milliseconds.
    pub max_ms: u64,
    /// Relative jitter, 0.0 disables it.
    #[serde(default)]
    pub jitter: f64,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            base_ms: 500,
            factor: 2.0,
            max_ms: 30_000,
            jitter: 0.2,
        }
    }
}

impl Backoff {
    /// Create a policy without jitter.
    pub fn exponential(base: Duration, factor: f64, max: Duration) -> Self {
        Self {
            base_ms: base.as_millis() as u64,
            factor,
            max_ms: max.as_millis() as u64,
            jitter: 0.0,
        }
    }

    /// Set the relative jitter.
    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter;
        self
    }

    /// Check the policy parameters.
    pub fn validate(&self) -> Result<(), String> {
        if self.base_ms == 0 {
            return Err("base delay must be greater than 0".into());
        }
        if !self.factor.is_finite() || self.factor <= 1.0 {
            return Err("factor must be a finite number greater than 1".into());
        }
        if self.max_ms < self.base_ms {
            return Err("max delay must not be shorter than the base delay".into());
        }
        if !self.jitter.is_finite() || self.jitter < 0.0 {
            return Err("jitter must be a non-negative number".into());
        }
        Ok(())
    }

    /// Upper bound on the delay.
    pub fn max(&self) -> Duration {
        Duration::from_millis(self.max_ms)
    }

    /// Base delay (attempt 0, no jitter).
    pub fn base(&self) -> Duration {
        Duration::from_millis(self.base_ms)
    }

    /// Delay for `attempt` before jitter.
    pub fn nominal(&self, attempt: u32) -> Duration {
        let max = self.max_ms as f64;
        let scaled = self.base_ms as f64 * self.factor.powi(attempt.min(i32::MAX as u32) as i32);
        millis_to_duration(scaled.min(max))
    }

    /// Delay for `attempt` with random jitter applied.
    pub fn delay(&self, attempt: u32) -> Duration {
        self.delay_with(attempt, fastrand::f64())
    }

    /// Delay for `attempt` using `unit` in `[0, 1)` as the jitter sample.
    pub fn delay_with(&self, attempt: u32, unit: f64) -> Duration {
        let nominal = self.nominal(attempt);
        let jitter = self.jitter.clamp(0.0, (self.factor - 1.0).max(0.0));
        if jitter == 0.0 {
            return nominal;
        }
        let nominal_ms = nominal.as_micros() as f64 / 1000.0;
        let scaled = nominal_ms * (1.0 + unit.clamp(0.0, 0.95) * jitter);
        millis_to_duration(scaled.min(self.max_ms as f64))
    }
}

fn millis_to_duration(millis: f64) -> Duration {
    Duration::from_micros((millis * 1000.0).round() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn policy() -> Backoff {
        Backoff::exponential(Duration::from_millis(100), 2.0, Duration::from_secs(2))
    }

    #[test]
    fn test_nominal_growth_and_cap() {
        let b = policy();
        assert_eq!(b.nominal(0), Duration::from_millis(100));
        assert_eq!(b.nominal(1), Duration::from_millis(200));
        assert_eq!(b.nominal(3), Duration::from_millis(800));
        assert_eq!(b.nominal(5), Duration::from_secs(2));
        assert_eq!(b.nominal(500), Duration::from_secs(2));
    }

    #[test]
    fn test_jitter_never_exceeds_cap() {
        let b = policy().with_jitter(0.5);
        for attempt in 0..20 {
            assert!(b.delay(attempt) <= Duration::from_secs(2));
        }
    }

    #[test]
    fn test_validate() {
        assert!(policy().validate().is_ok());
        let mut bad = policy();
        bad.factor = 1.0;
        assert!(bad.validate().is_err());
        let mut bad = policy();
        bad.max_ms = 10;
        assert!(bad.validate().is_err());
    }

    proptest! {
        #[test]
        fn delays_are_monotone_until_cap(
            base in 1u64..5_000,
            factor in 1.1f64..4.0,
            cap_mult in 1u64..200,
            jitter in 0.0f64..2.0,
            samples in prop::collection::vec(0.0f64..1.0, 24),
        ) {
            let b = Backoff { base_ms: base, factor, max_ms: base * cap_mult, jitter };
            let delays: Vec<Duration> = samples
                .iter()
                .enumerate()
                .map(|(i, u)| b.delay_with(i as u32, *u))
                .collect();
            for pair in delays.windows(2) {
                let at_cap = pair[1] == b.max();
                prop_assert!(pair[1] > pair[0] || (at_cap && pair[0] <= pair[1]));
            }
        }
    }
}
