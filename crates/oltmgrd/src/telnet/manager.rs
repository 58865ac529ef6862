//! Entry point for CLI operations on the OLT.
//!
//! A [`SessionManager`] is built once at startup and shared by `Arc` with
//! whatever needs the device CLI. Every operation holds the pooled session
//! for its whole duration, so a multi-command batch is never interleaved with
//! another caller's commands.

use super::pool::{PoolStatus, SessionPool, IDLE_CLEANUP_INTERVAL};
use super::retry::RetryPolicy;
use crate::config::TelnetConfig;
use crate::error::{OltError, Result};
use crate::model::{TelnetBatchResponse, TelnetResponse};
use parking_lot::Mutex;
use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

pub struct SessionManager {
    pool: SessionPool,
    retry: RetryPolicy,
    cleanup: Mutex<Option<JoinHandle<()>>>,
}

impl SessionManager {
    /// Build the manager and start the idle sweep. Must run inside a Tokio runtime.
    pub fn new(config: TelnetConfig) -> Self {
        Self::with_cleanup_interval(config, IDLE_CLEANUP_INTERVAL)
    }

    pub fn with_cleanup_interval(config: TelnetConfig, period: Duration) -> Self {
        if config.pool_size > 1 {
            warn!(
                pool_size = config.pool_size,
                "The OLT accepts a single CLI session; using one"
            );
        }
        let retry = RetryPolicy::from(&config);
        let pool = SessionPool::new(config);
        let cleanup = pool.start_idle_cleanup(period);
        info!("Telnet session manager initialized");

        Self {
            pool,
            retry,
            cleanup: Mutex::new(Some(cleanup)),
        }
    }

    pub fn pool(&self) -> &SessionPool {
        &self.pool
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    #[instrument(skip(self, cancel))]
    pub async fn execute_command(
        &self,
        cancel: &CancellationToken,
        command: &str,
    ) -> Result<TelnetResponse> {
        let session = self.pool.acquire(cancel).await?;
        Ok(session.execute(command).await?)
    }

    /// Run a batch in order on one session. Per-command failures are
    /// recorded in the batch rather than returned.
    #[instrument(skip_all, fields(count = commands.len()))]
    pub async fn execute_commands(
        &self,
        cancel: &CancellationToken,
        commands: &[String],
    ) -> Result<TelnetBatchResponse> {
        let session = self.pool.acquire(cancel).await?;
        session.execute_multi(cancel, commands).await
    }

    /// Run a batch in config mode, then always try to return to enable mode.
    #[instrument(skip_all, fields(count = commands.len()))]
    pub async fn execute_in_config_mode(
        &self,
        cancel: &CancellationToken,
        commands: &[String],
    ) -> Result<TelnetBatchResponse> {
        let session = self.pool.acquire(cancel).await?;
        session.enter_enable_mode().await?;
        session.enter_config_mode().await?;

        let result = session.execute_multi(cancel, commands).await;

        if let Err(e) = session.exit_config_mode().await {
            error!(error = %e, "Failed to exit config mode");
        }
        result
    }

    #[instrument(skip(self, cancel))]
    pub async fn execute_with_expect(
        &self,
        cancel: &CancellationToken,
        command: &str,
        pattern: &str,
        timeout: Option<Duration>,
    ) -> Result<TelnetResponse> {
        let session = self.pool.acquire(cancel).await?;
        Ok(session.execute_with_expect(command, pattern, timeout).await?)
    }

    /// Persist the running configuration (`write` from enable mode).
    pub async fn save_configuration(&self, cancel: &CancellationToken) -> Result<()> {
        let session = self.pool.acquire(cancel).await?;
        session.enter_enable_mode().await?;
        Ok(session.save_config().await?)
    }

    pub async fn show_running_config(&self, cancel: &CancellationToken) -> Result<String> {
        let session = self.pool.acquire(cancel).await?;
        session.enter_enable_mode().await?;
        Ok(session.show_running_config().await?)
    }

    pub fn connection_status(&self) -> PoolStatus {
        self.pool.status()
    }

    /// Retry `op` under the configured policy, reconnecting the session
    /// before every retry.
    pub async fn with_retry<T, Op, Fut>(&self, cancel: &CancellationToken, op: Op) -> Result<T>
    where
        Op: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.retry
            .execute(cancel, op, || async {
                match self.pool.acquire(cancel).await {
                    Ok(session) => {
                        if let Err(e) = session.reconnect().await {
                            warn!(error = %e, "Reconnect before retry failed");
                        }
                    }
                    Err(OltError::Cancelled) => {}
                    Err(e) => warn!(error = %e, "Could not acquire session to reconnect"),
                }
            })
            .await
    }

    /// Close the pool and stop the idle sweep.
    pub async fn close(&self) {
        self.pool.close().await;
        let handle = self.cleanup.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "Idle cleanup task ended abnormally");
            }
        }
        info!("Telnet session manager closed");
    }
}
