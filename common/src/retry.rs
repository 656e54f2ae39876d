// Exponential backoff with jitter for failed message deliveries

use crate::config::BroadcastConfig;
use chrono::{DateTime, Utc};
use rand::Rng;
use std::time::Duration;

/// Retry strategy for calculating redelivery delays
pub trait RetryStrategy: Send + Sync {
    /// Delay before the next attempt, given how many attempts were made.
    /// Returns None once attempts are exhausted.
    fn next_delay(&self, attempts: u32) -> Option<Duration>;

    fn max_attempts(&self) -> u32;

    fn should_retry(&self, attempts: u32) -> bool {
        attempts < self.max_attempts()
    }

    /// Absolute time of the next attempt
    fn next_retry_at(&self, attempts: u32, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let delay = self.next_delay(attempts)?;
        let delay = chrono::Duration::from_std(delay).ok()?;
        Some(now + delay)
    }
}

/// Exponential backoff: base * 3^(attempts-1), capped, plus up to 10% jitter
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    base_delay_secs: u64,
    max_delay_secs: u64,
    max_attempts: u32,
    /// Jitter factor (0.0 to 1.0)
    jitter_factor: f64,
}

impl ExponentialBackoff {
    pub fn with_config(
        base_delay_secs: u64,
        max_delay_secs: u64,
        max_attempts: u32,
        jitter_factor: f64,
    ) -> Self {
        Self {
            base_delay_secs,
            max_delay_secs,
            max_attempts,
            jitter_factor: jitter_factor.clamp(0.0, 1.0),
        }
    }

    pub fn from_config(config: &BroadcastConfig) -> Self {
        Self::with_config(
            config.retry_base_delay_seconds,
            config.retry_max_delay_seconds,
            config.retry_max_attempts,
            0.1,
        )
    }

    fn calculate_base_delay(&self, attempts: u32) -> u64 {
        let exponent = attempts.saturating_sub(1).min(20);
        self.base_delay_secs
            .saturating_mul(3_u64.pow(exponent))
            .min(self.max_delay_secs)
    }

    fn add_jitter_ms(&self, base_delay_secs: u64) -> u64 {
        let base_delay_ms = base_delay_secs * 1000;
        if self.jitter_factor == 0.0 {
            return base_delay_ms;
        }

        let jitter_range_ms = (base_delay_ms as f64 * self.jitter_factor) as u64;
        let jitter_ms = if jitter_range_ms > 0 {
            rand::thread_rng().gen_range(0..=jitter_range_ms)
        } else {
            0
        };

        base_delay_ms + jitter_ms
    }
}

impl RetryStrategy for ExponentialBackoff {
    fn next_delay(&self, attempts: u32) -> Option<Duration> {
        if !self.should_retry(attempts) {
            return None;
        }

        let base_delay_secs = self.calculate_base_delay(attempts);
        Some(Duration::from_millis(self.add_jitter_ms(base_delay_secs)))
    }

    fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

/// Fixed delay retry strategy
#[derive(Debug, Clone)]
pub struct FixedDelay {
    delay: Duration,
    max_attempts: u32,
}

impl FixedDelay {
    pub fn new(delay: Duration, max_attempts: u32) -> Self {
        Self {
            delay,
            max_attempts,
        }
    }
}

impl RetryStrategy for FixedDelay {
    fn next_delay(&self, attempts: u32) -> Option<Duration> {
        if !self.should_retry(attempts) {
            return None;
        }
        Some(self.delay)
    }

    fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}
