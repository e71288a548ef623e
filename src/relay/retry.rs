use std::time::Duration;

use rand::Rng;

/// Bounded retry with exponential backoff for webhook commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one (at least 1).
    pub max_attempts: u32,
    /// Wait after the first failure.
    pub initial_backoff: Duration,
    /// Ceiling for any single wait.
    pub max_backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_backoff: Duration, max_backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_backoff,
            max_backoff: max_backoff.max(initial_backoff),
        }
    }

    /// A policy that never retries.
    pub fn once() -> Self {
        Self::new(1, Duration::ZERO, Duration::ZERO)
    }

    /// Backoff after failed attempt number `attempt` (1-based), before jitter.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }

    /// Backoff with jitter: uniformly drawn from the upper half of
    /// [`RetryPolicy::backoff`].
    pub fn jittered(&self, attempt: u32, rng: &mut impl Rng) -> Duration {
        let full = self.backoff(attempt);
        let half = full / 2;
        if full.is_zero() {
            return full;
        }
        let nanos = rng.random_range(half.as_nanos()..=full.as_nanos());
        Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(500), Duration::from_secs(8))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{SeedableRng, rngs::StdRng};

    #[test]
    fn backoff_doubles_until_capped() {
        let p = RetryPolicy::new(6, Duration::from_millis(100), Duration::from_millis(500));
        assert_eq!(p.backoff(1), Duration::from_millis(100));
        assert_eq!(p.backoff(2), Duration::from_millis(200));
        assert_eq!(p.backoff(3), Duration::from_millis(400));
        assert_eq!(p.backoff(4), Duration::from_millis(500));
        assert_eq!(p.backoff(40), Duration::from_millis(500));
    }

    #[test]
    fn jitter_stays_in_upper_half() {
        let p = RetryPolicy::new(3, Duration::from_millis(200), Duration::from_secs(1));
        let mut rng = StdRng::seed_from_u64(7);
        for attempt in 1..=3 {
            let full = p.backoff(attempt);
            for _ in 0..50 {
                let d = p.jittered(attempt, &mut rng);
                assert!(d >= full / 2 && d <= full, "{d:?} outside {full:?}");
            }
        }
    }

    #[test]
    fn zero_attempts_is_clamped_to_one() {
        assert_eq!(RetryPolicy::new(0, Duration::ZERO, Duration::ZERO).max_attempts, 1);
        assert_eq!(RetryPolicy::once().backoff(1), Duration::ZERO);
    }
}
