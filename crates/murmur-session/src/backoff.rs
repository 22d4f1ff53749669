//! Retry delay policy for the connection manager.

use std::time::Duration;

use rand::Rng;

use murmur_core::config::ConnectionConfig;

/// Capped exponential backoff with randomized jitter.
///
/// The delay for attempt `n` (1-based) is `min(base * 2^(n-1), max)`,
/// scaled by a uniform factor in `[1 - jitter, 1 + jitter]` so that many
/// overlay instances restarting at once do not reconnect in lockstep.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(1_000),
            max_delay: Duration::from_millis(30_000),
            jitter: 0.2,
        }
    }
}

impl BackoffPolicy {
    pub fn from_config(config: &ConnectionConfig) -> Self {
        Self {
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            jitter: config.jitter,
        }
    }

    /// Compute the delay before retry `attempt` (1-based).
    ///
    /// `attempt` 0 is treated as 1 so a miscounted caller still gets the
    /// base delay rather than a zero sleep.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.max(1) - 1;
        // Shift capped well below 64 so the doubling can never overflow.
        let factor = 1u64 << exponent.min(32);
        let base_ms = self.base_delay.as_millis() as u64;
        let max_ms = self.max_delay.as_millis() as u64;
        let raw_ms = base_ms.saturating_mul(factor).min(max_ms);

        if self.jitter <= 0.0 {
            return Duration::from_millis(raw_ms);
        }

        let scale = rand::rng().random_range(1.0 - self.jitter..=1.0 + self.jitter);
        Duration::from_millis((raw_ms as f64 * scale).round() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_jitter(base_ms: u64, max_ms: u64) -> BackoffPolicy {
        BackoffPolicy {
            base_delay: Duration::from_millis(base_ms),
            max_delay: Duration::from_millis(max_ms),
            jitter: 0.0,
        }
    }

    #[test]
    fn test_first_attempt_uses_base_delay() {
        let policy = no_jitter(1_000, 30_000);
        assert_eq!(policy.delay_for(1), Duration::from_millis(1_000));
    }

    #[test]
    fn test_attempt_zero_treated_as_one() {
        let policy = no_jitter(1_000, 30_000);
        assert_eq!(policy.delay_for(0), Duration::from_millis(1_000));
    }

    #[test]
    fn test_exponential_growth() {
        let policy = no_jitter(1_000, 30_000);
        assert_eq!(policy.delay_for(2), Duration::from_millis(2_000));
        assert_eq!(policy.delay_for(3), Duration::from_millis(4_000));
        assert_eq!(policy.delay_for(4), Duration::from_millis(8_000));
    }

    #[test]
    fn test_delay_is_capped() {
        let policy = no_jitter(1_000, 30_000);
        assert_eq!(policy.delay_for(6), Duration::from_millis(30_000));
        assert_eq!(policy.delay_for(40), Duration::from_millis(30_000));
        // Large attempt numbers must not overflow.
        assert_eq!(policy.delay_for(u32::MAX), Duration::from_millis(30_000));
    }

    #[test]
    fn test_monotone_without_jitter() {
        let policy = no_jitter(500, 30_000);
        let mut previous = Duration::ZERO;
        for attempt in 1..20 {
            let delay = policy.delay_for(attempt);
            assert!(delay >= previous, "delay shrank at attempt {}", attempt);
            previous = delay;
        }
    }

    #[test]
    fn test_jitter_stays_within_bounds() {
        let policy = BackoffPolicy {
            base_delay: Duration::from_millis(1_000),
            max_delay: Duration::from_millis(30_000),
            jitter: 0.2,
        };
        for _ in 0..100 {
            let delay = policy.delay_for(3); // raw 4000ms
            assert!(delay >= Duration::from_millis(3_200), "delay {:?}", delay);
            assert!(delay <= Duration::from_millis(4_800), "delay {:?}", delay);
        }
    }

    #[test]
    fn test_from_config() {
        let config = ConnectionConfig {
            server_url: String::new(),
            base_delay_ms: 250,
            max_delay_ms: 5_000,
            jitter: 0.0,
        };
        let policy = BackoffPolicy::from_config(&config);
        assert_eq!(policy.delay_for(1), Duration::from_millis(250));
        assert_eq!(policy.delay_for(10), Duration::from_millis(5_000));
    }
}
