use crate::services::ProviderError;
use std::future::Future;
use std::time::Duration;

/// Longest single wait between attempts
const MAX_DELAY: Duration = Duration::from_secs(5);

/// Bounded exponential backoff for upstream calls
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(retries: u32, base_delay: Duration) -> Self {
        Self { retries, base_delay }
    }

    /// No retries, no waiting
    pub fn none() -> Self {
        Self::new(0, Duration::ZERO)
    }

    /// Wait before retry number `retry` (0-based): base * 2^retry, capped
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry);
        self.base_delay.saturating_mul(factor).min(MAX_DELAY)
    }

    /// Run `call` until it succeeds, fails with a non-retryable error,
    /// or the retry budget is spent.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut call: F) -> Result<T, ProviderError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let mut retry = 0;
        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && retry < self.retries => {
                    let delay = self.delay_for(retry);
                    tracing::warn!(
                        "{} failed (attempt {}/{}), retrying in {:?}: {}",
                        operation,
                        retry + 1,
                        self.retries + 1,
                        delay,
                        e
                    );
                    tokio::time::sleep(delay).await;
                    retry += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
