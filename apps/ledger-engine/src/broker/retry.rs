//! Retry policy with exponential backoff for gateway submissions.
//!
//! Only transient errors (connectivity, rate limiting) are retried; broker
//! rejections are surfaced immediately.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Retry policy configuration for broker gateway calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerRetryPolicy {
    /// Maximum number of attempts including the first (default: 3).
    pub max_attempts: u32,
    /// Initial backoff duration (default: 100ms).
    pub initial_backoff: Duration,
    /// Maximum backoff duration (default: 5s).
    pub max_backoff: Duration,
    /// Backoff multiplier for exponential growth (default: 2.0).
    pub backoff_multiplier: f64,
    /// Jitter factor for randomization (default: 0.2 = ±20%).
    pub jitter_factor: f64,
}

impl Default for BrokerRetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(5),
            backoff_multiplier: 2.0,
            jitter_factor: 0.2,
        }
    }
}

/// Calculates successive backoff durations for one retried call.
#[derive(Debug)]
pub struct ExponentialBackoffCalculator {
    current: Duration,
    max_backoff: Duration,
    multiplier: f64,
    jitter_factor: f64,
}

impl ExponentialBackoffCalculator {
    /// Create a calculator positioned at the policy's initial backoff.
    #[must_use]
    pub fn new(policy: &BrokerRetryPolicy) -> Self {
        Self {
            current: policy.initial_backoff,
            max_backoff: policy.max_backoff,
            multiplier: policy.backoff_multiplier,
            jitter_factor: policy.jitter_factor,
        }
    }

    /// Next backoff duration, with jitter applied, advancing the sequence.
    pub fn next_backoff(&mut self) -> Duration {
        let base = self.current;
        let next = base.mul_f64(self.multiplier);
        self.current = next.min(self.max_backoff);
        self.apply_jitter(base)
    }

    fn apply_jitter(&self, duration: Duration) -> Duration {
        if self.jitter_factor <= 0.0 {
            return duration;
        }
        let spread = self.jitter_factor;
        let factor = rand::rng().random_range(1.0 - spread..=1.0 + spread);
        duration.mul_f64(factor.max(0.0))
    }
}
