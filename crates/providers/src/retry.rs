//! Retry wrapper: bounded retries with a per-attempt timeout.
//!
//! Retry counts and timeouts are client configuration. The agent only ever
//! sees the final outcome: a response, or the last error.

use async_trait::async_trait;
use finassist_core::error::ProviderError;
use finassist_core::provider::*;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// A provider that retries transient failures of an inner provider.
pub struct RetryProvider {
    inner: Arc<dyn finassist_core::Provider>,
    max_retries: u32,
    timeout: Duration,
    backoff: Duration,
}

impl RetryProvider {
    pub fn new(inner: Arc<dyn finassist_core::Provider>, max_retries: u32, timeout: Duration) -> Self {
        Self {
            inner,
            max_retries,
            timeout,
            backoff: Duration::from_millis(500),
        }
    }

    /// Base delay between attempts; doubles after each failure.
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    fn delay_for(&self, attempt: u32, error: &ProviderError) -> Duration {
        let exponential = self.backoff * 2u32.saturating_pow(attempt);
        match error {
            ProviderError::RateLimited { retry_after_secs } => {
                exponential.max(Duration::from_secs(*retry_after_secs).min(self.timeout))
            }
            _ => exponential,
        }
    }

    fn timeout_error(&self) -> ProviderError {
        ProviderError::Timeout(format!(
            "Provider '{}' timed out after {}s",
            self.inner.name(),
            self.timeout.as_secs()
        ))
    }
}

#[async_trait]
impl finassist_core::Provider for RetryProvider {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn complete(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ProviderResponse, ProviderError> {
        let mut attempt = 0;
        loop {
            let error = match tokio::time::timeout(self.timeout, self.inner.complete(request.clone())).await {
                Ok(Ok(response)) => return Ok(response),
                Ok(Err(e)) => e,
                Err(_) => self.timeout_error(),
            };

            if attempt >= self.max_retries || !error.is_transient() {
                return Err(error);
            }

            let delay = self.delay_for(attempt, &error);
            attempt += 1;
            warn!(
                provider = %self.inner.name(),
                attempt,
                max_retries = self.max_retries,
                error = %error,
                "Retrying completion request"
            );
            tokio::time::sleep(delay).await;
        }
    }

    /// Retries only the stream setup. Once chunks flow, an interruption is
    /// reported to the consumer rather than silently replayed.
    async fn stream(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<
        tokio::sync::mpsc::Receiver<std::result::Result<StreamChunk, ProviderError>>,
        ProviderError,
    > {
        let mut attempt = 0;
        loop {
            let error = match tokio::time::timeout(self.timeout, self.inner.stream(request.clone())).await {
                Ok(Ok(rx)) => return Ok(rx),
                Ok(Err(e)) => e,
                Err(_) => self.timeout_error(),
            };

            if attempt >= self.max_retries || !error.is_transient() {
                return Err(error);
            }

            let delay = self.delay_for(attempt, &error);
            attempt += 1;
            info!(
                provider = %self.inner.name(),
                attempt,
                error = %error,
                "Retrying stream request"
            );
            tokio::time::sleep(delay).await;
        }
    }
}
