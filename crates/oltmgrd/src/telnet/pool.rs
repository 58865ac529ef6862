//! Exclusive access to the single OLT Telnet session.
//!
//! The pool hands out one [`SessionGuard`] at a time. Waiters queue on a
//! one-permit semaphore, bounded by the acquire timeout and by cancellation.
//! Dropping the guard releases the session and stamps its last-use time.

use super::session::{Mode, TelnetSession};
use crate::config::TelnetConfig;
use crate::error::{OltError, Result, TelnetError};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::ops::Deref;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

/// Period of the idle-session sweep.
pub const IDLE_CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug)]
struct PoolState {
    in_use: bool,
    last_used: Instant,
    closed: bool,
}

struct PoolInner {
    session: Arc<TelnetSession>,
    permits: Arc<Semaphore>,
    state: Arc<Mutex<PoolState>>,
    shutdown: CancellationToken,
    acquire_timeout: Duration,
    max_idle: Duration,
}

/// Pool status as reported to operators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PoolStatus {
    pub closed: bool,
    pub in_use: bool,
    pub last_used: DateTime<Utc>,
    pub idle_secs: u64,
    pub connected: bool,
    pub mode: Mode,
    pub uptime_secs: u64,
}

/// Holds the session exclusively until dropped.
pub struct SessionGuard {
    session: Arc<TelnetSession>,
    state: Arc<Mutex<PoolState>>,
    _permit: OwnedSemaphorePermit,
}

impl Deref for SessionGuard {
    type Target = TelnetSession;

    fn deref(&self) -> &TelnetSession {
        &self.session
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        let mut state = self.state.lock();
        state.in_use = false;
        state.last_used = Instant::now();
        debug!("Session released back to pool");
    }
}

/// Single-session Telnet pool. Clones share the same session.
#[derive(Clone)]
pub struct SessionPool {
    inner: Arc<PoolInner>,
}

impl SessionPool {
    pub fn new(config: TelnetConfig) -> Self {
        let acquire_timeout = config.acquire_timeout();
        let max_idle = config.max_idle_time();
        Self {
            inner: Arc::new(PoolInner {
                session: Arc::new(TelnetSession::new(config)),
                permits: Arc::new(Semaphore::new(1)),
                state: Arc::new(Mutex::new(PoolState {
                    in_use: false,
                    last_used: Instant::now(),
                    closed: false,
                })),
                shutdown: CancellationToken::new(),
                acquire_timeout,
                max_idle,
            }),
        }
    }

    fn closed_error() -> OltError {
        TelnetError::session_busy("session pool is closed", false).into()
    }

    /// Wait for the session, connecting it if needed and reconnecting it
    /// when it sat idle longer than the configured limit.
    #[instrument(skip_all)]
    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<SessionGuard> {
        let inner = &self.inner;
        if inner.state.lock().closed {
            return Err(Self::closed_error());
        }

        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(OltError::Cancelled),
            acquired = tokio::time::timeout(
                inner.acquire_timeout,
                Arc::clone(&inner.permits).acquire_owned(),
            ) => match acquired {
                Ok(Ok(permit)) => permit,
                Ok(Err(_)) => return Err(Self::closed_error()),
                Err(_) => {
                    return Err(TelnetError::session_busy(
                        "timeout waiting for available session",
                        true,
                    )
                    .into())
                }
            },
        };

        let idle = {
            let mut state = inner.state.lock();
            if state.closed {
                return Err(Self::closed_error());
            }
            state.in_use = true;
            let idle = state.last_used.elapsed();
            state.last_used = Instant::now();
            idle
        };

        let guard = SessionGuard {
            session: Arc::clone(&inner.session),
            state: Arc::clone(&inner.state),
            _permit: permit,
        };

        if !guard.is_connected() {
            info!("Session not connected, establishing connection");
            guard.connect().await?;
        } else if idle > inner.max_idle {
            info!(idle_secs = idle.as_secs(), "Session idle too long, reconnecting");
            guard.reconnect().await?;
        }

        Ok(guard)
    }

    /// Close the session if nobody holds it and it has been idle too long.
    /// Returns whether the session was closed.
    pub async fn cleanup_idle(&self) -> bool {
        let inner = &self.inner;
        let Ok(_permit) = Arc::clone(&inner.permits).try_acquire_owned() else {
            return false;
        };
        if !inner.session.is_connected() {
            return false;
        }

        let idle = inner.state.lock().last_used.elapsed();
        if idle <= inner.max_idle {
            return false;
        }

        info!(idle_secs = idle.as_secs(), "Closing idle telnet session");
        inner.session.close().await;
        true
    }

    /// Spawn the periodic idle sweep. It stops when the pool is closed.
    pub fn start_idle_cleanup(&self, period: Duration) -> JoinHandle<()> {
        let pool = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            loop {
                tokio::select! {
                    _ = pool.inner.shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        pool.cleanup_idle().await;
                    }
                }
            }
            debug!("Idle cleanup stopped");
        })
    }

    pub fn status(&self) -> PoolStatus {
        let (closed, in_use, idle) = {
            let state = self.inner.state.lock();
            (state.closed, state.in_use, state.last_used.elapsed())
        };
        let info = self.inner.session.connection_info();
        let last_used = chrono::Duration::from_std(idle)
            .map(|d| Utc::now() - d)
            .unwrap_or_else(|_| Utc::now());

        PoolStatus {
            closed,
            in_use,
            last_used,
            idle_secs: idle.as_secs(),
            connected: info.connected,
            mode: info.mode,
            uptime_secs: info.uptime_secs,
        }
    }

    /// Close the pool and its session. Later calls do nothing.
    pub async fn close(&self) {
        {
            let mut state = self.inner.state.lock();
            if state.closed {
                return;
            }
            state.closed = true;
        }

        self.inner.shutdown.cancel();
        self.inner.permits.close();
        self.inner.session.close().await;
        info!("Session pool closed");
    }

    pub fn is_closed(&self) -> bool {
        self.inner.state.lock().closed
    }
}
