//! Bounded retry for transient storage failures.
//!
//! Retries a `Conflict` a small, fixed number of times before surfacing it.
//! This is not a fallback path - exhausting retries still returns the error
//! to the caller; there is no silent downgrade to a different data path.

use kato_core::{KatoError, Result};
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(10),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self { max_attempts, base_delay }
    }

    /// Run `op` up to `max_attempts` times, with linear backoff, but only
    /// while it keeps failing with a retriable error
    /// (`KatoError::is_retriable`). Any non-retriable error returns
    /// immediately on its first occurrence.
    pub async fn retry<F, Fut, T>(&self, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match op().await {
                Ok(v) => return Ok(v),
                Err(e) if e.is_retriable() && attempt < self.max_attempts => {
                    warn!(attempt, max = self.max_attempts, error = %e, "retrying after conflict");
                    tokio::time::sleep(self.base_delay * attempt).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
