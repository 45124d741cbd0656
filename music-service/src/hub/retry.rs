//! Bounded retry with exponential backoff.
//!
//! Two policies live on top of this helper and they are deliberately not
//! unified: chunk fetches retry only on [`TransportError::Timeout`] with
//! growing delays, while the authorization import handshake retries only on
//! [`TransportError::InvalidAuthBytes`] in a tight loop.

use super::transport::TransportError;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Additional attempts after the first failure.
    pub max_retries: u32,
    /// Delay before the first retry. Zero disables waiting entirely.
    pub base_delay: Duration,
    /// Factor applied to the delay after each retry.
    pub multiplier: u32,
}

/// Chunk fetch: 3 retries, 1s/2s/4s.
pub const CHUNK_FETCH_RETRY: RetryPolicy = RetryPolicy {
    max_retries: 3,
    base_delay: Duration::from_secs(1),
    multiplier: 2,
};

/// Authorization import: 6 attempts total, no backoff between them.
pub const AUTH_IMPORT_RETRY: RetryPolicy = RetryPolicy {
    max_retries: 5,
    base_delay: Duration::ZERO,
    multiplier: 1,
};

impl RetryPolicy {
    /// Run `op`, retrying while `is_retryable` holds and the attempt budget
    /// lasts. The error that exhausts the budget is returned unchanged.
    pub async fn run<T, F, Fut, P>(&self, mut is_retryable: P, mut op: F) -> Result<T, TransportError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, TransportError>>,
        P: FnMut(&TransportError) -> bool,
    {
        let mut delay = self.base_delay;
        let mut attempt = 0u32;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if attempt < self.max_retries && is_retryable(&err) => {
                    attempt += 1;
                    tracing::warn!(
                        attempt,
                        max_retries = self.max_retries,
                        error = %err,
                        "retrying hub request"
                    );
                    if !delay.is_zero() {
                        sleep(delay).await;
                        delay *= self.multiplier;
                    }
                }
                Err(err) => return Err(err),
            }
        }
    }
}
