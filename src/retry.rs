//! Retry with exponential backoff.
//!
//! One shared primitive serves both concurrency regimes: the validator
//! worker wraps single evaluator calls, the audit scheduler wraps whole
//! relation evaluations. Delay grows as `base * exponential_base^attempt`
//! capped at `max_delay`, with optional jitter to spread out retries from
//! multiple workers.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

/// Retry behavior shared by the validator worker and the audit scheduler.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Retries after the first attempt, so max_retries + 1 attempts total.
    pub max_retries: u32,
    /// Base delay in seconds.
    pub base_delay: f64,
    /// Delay ceiling in seconds.
    pub max_delay: f64,
    /// Exponential growth factor.
    pub exponential_base: f64,
    /// Scale each delay by a uniform random factor in [0.5, 1.5).
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: 1.0,
            max_delay: 30.0,
            exponential_base: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// No waiting between attempts; keeps tests fast.
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            base_delay: 0.0,
            max_delay: 0.0,
            exponential_base: 2.0,
            jitter: false,
        }
    }

    /// Delay before the retry following `attempt` (0-indexed).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let mut delay = (self.base_delay * self.exponential_base.powi(attempt as i32))
            .min(self.max_delay);
        if self.jitter {
            delay *= 0.5 + rand::random::<f64>();
        }
        Duration::from_secs_f64(delay.max(0.0))
    }
}

/// Run `op` until it succeeds or retries are exhausted.
///
/// Returns the last error once `max_retries + 1` attempts have failed. The
/// backoff sleep is a tokio timer, so other tasks keep running.
pub async fn retry_with_backoff<T, E, F, Fut>(
    config: &RetryConfig,
    what: &str,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempt: u32 = 0;
    loop {
        match op().await {
            Ok(value) => {
                if attempt > 0 {
                    debug!("{} succeeded on attempt {}", what, attempt + 1);
                }
                return Ok(value);
            }
            Err(err) => {
                if attempt >= config.max_retries {
                    warn!(
                        "{} failed after {} attempts: {}",
                        what,
                        attempt + 1,
                        err
                    );
                    return Err(err);
                }
                let delay = config.delay_for(attempt);
                warn!(
                    "{} failed (attempt {}/{}), retrying in {:.1}s: {}",
                    what,
                    attempt + 1,
                    config.max_retries + 1,
                    delay.as_secs_f64(),
                    err
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
