// Retry policy
//
// Shared by the completion path (exponential backoff) and action execution
// (fixed delay). Only errors the taxonomy marks retryable are retried; a
// quota error in particular is returned after a single attempt, because
// retrying it would spend the same exhausted quota.

use std::future::Future;
use std::time::Duration;

use crate::error::Result;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub backoff_multiplier: f64,
}

impl RetryPolicy {
    /// Completion calls: up to 3 attempts, 1s then 2s between them
    pub fn completion() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            backoff_multiplier: 2.0,
        }
    }

    /// Provider calls that hit rate limits: up to 3 attempts, 1s then 2s
    pub fn provider_backoff() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            backoff_multiplier: 2.0,
        }
    }

    /// Fixed-delay policy, used for automation action execution (3 x 2s)
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            initial_delay: delay,
            backoff_multiplier: 1.0,
        }
    }

    /// Delay to sleep after a failed attempt (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = self.backoff_multiplier.powi(attempt.saturating_sub(1) as i32);
        self.initial_delay.mul_f64(factor)
    }
}

/// Run `op` under `policy`, retrying retryable errors until the attempt
/// budget runs out. The final error is returned unchanged.
pub async fn retry_with<F, Fut, T>(policy: &RetryPolicy, label: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < policy.max_attempts && e.is_retryable() => {
                let delay = policy.delay_for(attempt);
                tracing::warn!(
                    %label,
                    attempt,
                    max_attempts = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "retrying after failure"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}
