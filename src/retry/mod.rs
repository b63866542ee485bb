//! Retry Mechanism Module
//!
//! Retries are sequential full re-issues of the request. A call makes at most
//! `max_retries + 1` attempts, and only results carrying an error object are
//! retried. The delay between attempts defaults to zero; when set it grows
//! exponentially with jitter.

use rand::Rng;
use std::time::Duration;

use crate::config::EffectiveConfig;
use crate::defaults;
use crate::types::RequestResult;

/// Retry policy configuration
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Whether retries are enabled at all
    pub enabled: bool,
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Backoff multiplier (for exponential backoff)
    pub backoff_multiplier: f64,
    /// Maximum jitter percentage (0.0 to 1.0)
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            enabled: false,
            max_retries: defaults::http::MAX_RETRIES,
            initial_delay: defaults::http::RETRY_DELAY,
            max_delay: defaults::http::RETRY_MAX_DELAY,
            backoff_multiplier: defaults::http::RETRY_BACKOFF_MULTIPLIER,
            jitter_factor: defaults::http::RETRY_JITTER_FACTOR,
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &EffectiveConfig) -> Self {
        Self {
            enabled: config.retry,
            max_retries: config.max_retries,
            initial_delay: config.retry_delay,
            ..Self::default()
        }
    }

    /// Whether `result` (produced by retry number `retries_done`) should be retried.
    pub fn should_retry(&self, result: &RequestResult, retries_done: u32) -> bool {
        self.enabled && result.error.is_some() && retries_done < self.max_retries
    }

    /// Delay before retry number `retry` (1-based).
    pub fn calculate_delay(&self, retry: u32) -> Duration {
        if self.initial_delay.is_zero() {
            return Duration::ZERO;
        }
        let exponent = retry.saturating_sub(1) as i32;
        let base_delay =
            self.initial_delay.as_millis() as f64 * self.backoff_multiplier.powi(exponent);
        let delay = Duration::from_millis(base_delay as u64).min(self.max_delay);
        self.add_jitter(delay)
    }

    /// Add jitter to a delay
    fn add_jitter(&self, delay: Duration) -> Duration {
        let jitter_range = delay.as_millis() as f64 * self.jitter_factor;
        if jitter_range <= 0.0 {
            return delay;
        }
        let mut rng = rand::thread_rng();
        let jitter = rng.gen_range(-jitter_range..=jitter_range);
        let new_delay = delay.as_millis() as f64 + jitter;
        Duration::from_millis(new_delay.max(0.0) as u64)
    }
}
