//! Bounded retry with exponential backoff

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{E2eError, E2eResult};

/// Backoff schedule for a bounded number of retries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,

    pub initial_backoff_ms: u64,

    #[serde(default = "default_multiplier")]
    pub multiplier: f64,

    pub max_backoff_ms: u64,
}

fn default_multiplier() -> f64 {
    2.0
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff_ms: 100,
            multiplier: 2.0,
            max_backoff_ms: 1000,
        }
    }
}

impl RetryPolicy {
    /// Fixed interval between retries
    pub fn fixed(max_retries: u32, interval_ms: u64) -> Self {
        Self {
            max_retries,
            initial_backoff_ms: interval_ms,
            multiplier: 1.0,
            max_backoff_ms: interval_ms,
        }
    }

    pub fn validate(&self) -> E2eResult<()> {
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err(E2eError::InvalidConfig(format!(
                "retry multiplier must be >= 1.0, got {}",
                self.multiplier
            )));
        }
        if self.initial_backoff_ms > self.max_backoff_ms {
            return Err(E2eError::InvalidConfig(format!(
                "initial backoff {}ms exceeds max backoff {}ms",
                self.initial_backoff_ms, self.max_backoff_ms
            )));
        }
        Ok(())
    }

    /// Delay before retry `n` (zero-based), capped at `max_backoff_ms`
    pub fn delay_for(&self, retry: u32) -> Duration {
        let scaled = self.initial_backoff_ms as f64 * self.multiplier.powi(retry as i32);
        let capped = scaled.min(self.max_backoff_ms as f64);
        Duration::from_millis(capped as u64)
    }

    /// The whole schedule, one entry per retry
    pub fn delays(&self) -> Vec<Duration> {
        (0..self.max_retries).map(|n| self.delay_for(n)).collect()
    }

    /// Upper bound on time spent sleeping across all retries
    pub fn total_backoff(&self) -> Duration {
        self.delays().into_iter().sum()
    }

    /// Run `op` until it succeeds or the schedule is exhausted.
    ///
    /// `op` returning `Ok(None)` means "not yet"; `Err` aborts immediately.
    pub async fn run<T, F, Fut>(&self, what: &str, mut op: F) -> E2eResult<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = E2eResult<Option<T>>>,
    {
        let mut attempt = 0;
        loop {
            if let Some(value) = op(attempt).await? {
                return Ok(value);
            }
            if attempt >= self.max_retries {
                return Err(E2eError::RetryExhausted {
                    what: what.to_string(),
                    attempts: attempt as usize + 1,
                });
            }
            let delay = self.delay_for(attempt);
            debug!("{} not ready (attempt {}), retrying in {:?}", what, attempt + 1, delay);
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}
