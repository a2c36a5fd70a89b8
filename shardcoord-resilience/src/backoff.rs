//! Exponential backoff for retried operations

use rand::Rng;
use std::time::Duration;

/// Backoff delay calculator
///
/// Delay for attempt `n` (1-indexed) is `initial_delay * 2^(n-1)`, capped at
/// `max_delay`, optionally spread by ±20%.
#[derive(Debug, Clone)]
pub struct BackoffCalculator {
    initial_delay: Duration,
    max_delay: Duration,
    jitter: bool,
}

impl BackoffCalculator {
    /// Create a new backoff calculator
    pub fn new(initial_delay: Duration, max_delay: Duration, jitter: bool) -> Self {
        Self {
            initial_delay,
            max_delay,
            jitter,
        }
    }

    /// Doubling delays without jitter
    pub fn exponential(initial_delay: Duration, max_delay: Duration) -> Self {
        Self::new(initial_delay, max_delay, false)
    }

    /// Calculate delay for a specific attempt (1-indexed)
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let capped_delay = self.calculate_base_delay(attempt).min(self.max_delay);

        if self.jitter {
            add_jitter(capped_delay)
        } else {
            capped_delay
        }
    }

    fn calculate_base_delay(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let multiplier = 2f64.powi(attempt.min(64) as i32 - 1);
        let nanos = self.initial_delay.as_nanos() as f64 * multiplier;
        if !nanos.is_finite() || nanos >= u64::MAX as f64 {
            return self.max_delay;
        }
        Duration::from_nanos(nanos as u64)
    }
}

fn add_jitter(delay: Duration) -> Duration {
    let mut rng = rand::thread_rng();

    // Add ±20% jitter
    let jitter_factor = rng.gen_range(0.8..1.2);
    Duration::from_nanos((delay.as_nanos() as f64 * jitter_factor) as u64)
}
