//! Reconnect timing for the live-update channel.

use std::time::Duration;

/// Configuration for auto-reconnect behavior
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectConfig {
    /// Maximum number of reconnect attempts (0 = infinite)
    pub max_attempts: u32,
    /// Initial delay in milliseconds
    pub initial_delay_ms: u32,
    /// Maximum delay in milliseconds
    pub max_delay_ms: u32,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay_ms: 1000,
            max_delay_ms: 30000,
            backoff_multiplier: 2.0,
        }
    }
}

impl ReconnectConfig {
    /// Calculate delay for a given attempt number.
    ///
    /// Non-decreasing in `attempt` and never above `max_delay_ms`. A
    /// multiplier below 1 is treated as 1.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let multiplier = f64::from(self.backoff_multiplier.max(1.0));
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let delay = f64::from(self.initial_delay_ms) * multiplier.powi(exponent);
        let capped = delay.min(f64::from(self.max_delay_ms));
        Duration::from_millis(capped as u64)
    }

    /// Whether another reconnect may be scheduled after `attempt` earlier ones.
    pub fn should_retry(&self, attempt: u32) -> bool {
        self.max_attempts == 0 || attempt < self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_doubles_from_one_second() {
        let config = ReconnectConfig::default();
        let delays: Vec<_> = (0..5)
            .map(|attempt| config.delay_for_attempt(attempt).as_millis())
            .collect();
        assert_eq!(delays, [1000, 2000, 4000, 8000, 16000]);
    }

    #[test]
    fn delays_are_monotone_and_capped() {
        let config = ReconnectConfig {
            max_attempts: 0,
            ..ReconnectConfig::default()
        };
        let ceiling = Duration::from_millis(u64::from(config.max_delay_ms));

        let mut previous = Duration::ZERO;
        for attempt in [0, 1, 2, 3, 4, 5, 6, 10, 31, 64, 1000, u32::MAX] {
            let delay = config.delay_for_attempt(attempt);
            assert!(delay >= previous, "attempt {attempt} went backwards");
            assert!(delay <= ceiling, "attempt {attempt} exceeded the ceiling");
            previous = delay;
        }
        assert_eq!(config.delay_for_attempt(u32::MAX), ceiling);
    }

    #[test]
    fn shrinking_multiplier_is_clamped() {
        let config = ReconnectConfig {
            backoff_multiplier: 0.5,
            ..ReconnectConfig::default()
        };
        assert_eq!(config.delay_for_attempt(0), config.delay_for_attempt(4));
    }

    #[test]
    fn attempt_ceiling() {
        let config = ReconnectConfig::default();
        assert!((0..5).all(|attempt| config.should_retry(attempt)));
        assert!(!config.should_retry(5));
        assert!(!config.should_retry(6));

        let unbounded = ReconnectConfig {
            max_attempts: 0,
            ..ReconnectConfig::default()
        };
        assert!(unbounded.should_retry(u32::MAX));
    }
}
