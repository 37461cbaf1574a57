//! Executor tuning knobs.

use std::time::Duration;

/// Tuning knobs for the executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutorConfig {
    /// Maximum number of times a transient step failure will be retried.
    pub max_retries: u32,
    /// Base delay for exponential back-off between retries.
    pub retry_base_delay: Duration,
    /// Upper bound on a single back-off delay.
    pub retry_max_delay: Duration,
    /// Buffered status events per subscriber before the slowest one lags.
    pub status_capacity: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_base_delay: Duration::from_millis(100),
            retry_max_delay: Duration::from_secs(10),
            status_capacity: 256,
        }
    }
}

impl ExecutorConfig {
    /// Delay before retry number `attempt` (1-based): `base * 2^(attempt-1)`,
    /// capped at `retry_max_delay`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.retry_base_delay
            .saturating_mul(factor)
            .min(self.retry_max_delay)
    }
}
