//! Bounded retries for Telnet operations.

use crate::config::TelnetConfig;
use crate::error::{OltError, Result};
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Up to `retry_count` extra attempts, `retry_delay` apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub retry_count: u32,
    pub retry_delay: Duration,
}

impl RetryPolicy {
    pub fn new(retry_count: u32, retry_delay: Duration) -> Self {
        Self {
            retry_count,
            retry_delay,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.retry_count + 1
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or the
    /// attempts run out. `before_retry` runs after each delay and before the
    /// next attempt; the session manager uses it to reconnect.
    pub async fn execute<T, Op, OpFut, Hook, HookFut>(
        &self,
        cancel: &CancellationToken,
        mut op: Op,
        mut before_retry: Hook,
    ) -> Result<T>
    where
        Op: FnMut() -> OpFut,
        OpFut: Future<Output = Result<T>>,
        Hook: FnMut() -> HookFut,
        HookFut: Future<Output = ()>,
    {
        let mut attempt = 0u32;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) if attempt >= self.retry_count => {
                    return Err(OltError::RetriesExhausted {
                        attempts: attempt + 1,
                        source: Box::new(e),
                    })
                }
                Err(e) => {
                    warn!(error = %e, attempt = attempt + 1, "Operation failed, will retry");
                }
            }

            attempt += 1;
            info!(attempt, max_attempts = self.retry_count, "Retrying operation");

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(OltError::Cancelled),
                _ = tokio::time::sleep(self.retry_delay) => {}
            }
            before_retry().await;
        }
    }
}

impl From<&TelnetConfig> for RetryPolicy {
    fn from(config: &TelnetConfig) -> Self {
        Self::new(config.retry_count, config.retry_delay())
    }
}
