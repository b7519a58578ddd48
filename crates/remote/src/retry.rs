use std::time::Duration;

use rand::Rng;

/// Bounded exponential backoff for retryable remote failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub min_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            min_delay: Duration::from_secs(4),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no waiting.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            min_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Delay before attempt `attempt + 1`, where `attempt` starts at 1.
    pub fn backoff(&self, attempt: usize) -> Duration {
        let exp = (attempt as u32).min(16);
        let raw = Duration::from_secs(1_u64 << exp);
        raw.clamp(self.min_delay, self.max_delay.max(self.min_delay))
    }

    /// `backoff` plus up to 10% jitter.
    pub fn backoff_with_jitter(&self, attempt: usize) -> Duration {
        let base = self.backoff(attempt);
        let bound = (base.as_millis() as u64 / 10).max(1);
        base + Duration::from_millis(rand::thread_rng().gen_range(0..bound))
    }
}
