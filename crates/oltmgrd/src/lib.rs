//! GPON OLT management daemon
//!
//! This crate talks to a single GPON OLT over its two management planes:
//!
//! - **SNMP** for ONU inventory and optical telemetry. Reads go cache first
//!   (Redis or in-process), and concurrent identical reads share one device
//!   request.
//! - **Telnet** for the command line. The OLT accepts one CLI login at a
//!   time, so all callers share one pooled session that walks the
//!   user/enable/config mode ladder.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌──────────────────────────┐     ┌─────────────────┐
//! │    callers      │     │         oltmgrd          │     │    GPON OLT     │
//! │                 │     │                          │     │                 │
//! │  list / detail  │────▶│  OnuPoller               │     │                 │
//! │  empty IDs      │     │    │ RequestGroup        │     │                 │
//! │                 │     │    ├──▶ CacheStore ──────┼────▶│ (Redis)         │
//! │                 │     │    └──▶ SnmpClient ──────┼────▶│  SNMP agent     │
//! │                 │     │                          │     │                 │
//! │  CLI commands   │────▶│  SessionManager          │     │                 │
//! │                 │     │    │ RetryPolicy         │     │                 │
//! │                 │     │    └──▶ SessionPool      │     │                 │
//! │                 │     │          └ TelnetSession─┼────▶│  Telnet CLI     │
//! └─────────────────┘     └──────────────────────────┘     └─────────────────┘
//! ```

pub mod cache;
pub mod coalesce;
pub mod config;
pub mod error;
pub mod model;
pub mod poller;
pub mod snmp;
pub mod telnet;

pub use cache::{CacheStore, MemoryCache, RedisCache};
pub use coalesce::RequestGroup;
pub use config::{OltConfig, OltmgrConfig, RedisConfig, SnmpConfig, TelnetConfig};
pub use error::{OltError, Result, TelnetError, TelnetErrorCode};
pub use model::{
    OnuDetail, OnuId, OnuInfo, OnuPage, OnuSerialNumber, TelnetBatchResponse, TelnetResponse,
};
pub use poller::{OnuPoller, PollerSettings};
pub use snmp::{SnmpClient, UdpSnmpClient};
pub use telnet::{Mode, PoolStatus, RetryPolicy, SessionManager, SessionPool, TelnetSession};

use std::future::Future;
use tokio_util::sync::CancellationToken;

/// Await `fut` unless `cancel` fires first, in which case the caller gets
/// [`OltError::Cancelled`] and `fut` is dropped.
pub async fn cancellable<T>(
    cancel: &CancellationToken,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(OltError::Cancelled),
        result = fut => result,
    }
}
