//! Telnet CLI access to the OLT.
//!
//! - [`session`]: one connection, login and the user/enable/config mode machine
//! - [`pool`]: exclusive, idle-aware access to that one session
//! - [`retry`]: bounded retries that stop on non-recoverable errors
//! - [`manager`]: the operations callers use

pub mod manager;
pub mod negotiation;
pub mod pool;
pub mod retry;
pub mod session;

pub use manager::SessionManager;
pub use pool::{PoolStatus, SessionGuard, SessionPool, IDLE_CLEANUP_INTERVAL};
pub use retry::RetryPolicy;
pub use session::{clean_output, ConnectionInfo, Mode, TelnetSession};

use crate::error::TelnetError;

/// Result of a single exchange with the CLI.
pub type TelnetResult<T> = std::result::Result<T, TelnetError>;
