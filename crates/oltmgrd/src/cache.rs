//! Cache-aside storage for polled ONU data.
//!
//! Cached entries are hints. A read error, a missing key and an undecodable
//! payload are all reported to callers as a miss, and a failed write is only
//! logged, so the poller always has SNMP as its fallback.

use crate::config::RedisConfig;
use crate::error::{OltError, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, instrument, warn};

/// Key/value store with per-entry TTL.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Returns `None` when the key is absent or expired.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()>;

    /// Returns whether the key existed.
    async fn delete(&self, key: &str) -> Result<bool>;
}

/// Redis-backed cache store
pub struct RedisCache {
    conn: ConnectionManager,
}

impl RedisCache {
    /// Connect to the configured Redis database
    #[instrument(skip_all, fields(host = %config.host, port = config.port, db = config.db))]
    pub async fn connect(config: &RedisConfig) -> Result<Self> {
        debug!("Connecting to Redis");
        let client = Client::open(config.url())?;
        let conn = ConnectionManager::new(client).await?;
        debug!("Connected to Redis");
        Ok(Self { conn })
    }
}

#[async_trait]
impl CacheStore for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut conn = self.conn.clone();
        conn.get::<_, Option<Vec<u8>>>(key)
            .await
            .map_err(|e| OltError::cache("get", key, e))
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()> {
        let mut conn = self.conn.clone();
        let seconds = ttl.as_secs().max(1);
        let _: () = conn
            .set_ex(key, value, seconds)
            .await
            .map_err(|e| OltError::cache("set", key, e))?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        let removed: i64 = conn
            .del(key)
            .await
            .map_err(|e| OltError::cache("delete", key, e))?;
        Ok(removed > 0)
    }
}

/// In-process cache store, used when Redis is disabled.
#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, (Vec<u8>, Instant)>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops expired entries, returning how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, (_, expires)| *expires > now);
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        let expired = match entries.get(key) {
            Some((value, expires)) if *expires > now => return Ok(Some(value.clone())),
            Some(_) => true,
            None => false,
        };
        if expired {
            entries.remove(key);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()> {
        self.entries
            .lock()
            .insert(key.to_string(), (value, Instant::now() + ttl));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        Ok(self.entries.lock().remove(key).is_some())
    }
}

/// Read and decode a JSON entry. Any failure is a miss.
pub async fn get_json<T: DeserializeOwned>(store: &dyn CacheStore, key: &str) -> Option<T> {
    let bytes = match store.get(key).await {
        Ok(Some(bytes)) => bytes,
        Ok(None) => {
            debug!(key, "Cache miss");
            return None;
        }
        Err(e) => {
            warn!(key, error = %e, "Cache read failed, treating as miss");
            return None;
        }
    };

    match serde_json::from_slice(&bytes) {
        Ok(value) => {
            debug!(key, "Cache hit");
            Some(value)
        }
        Err(e) => {
            warn!(key, error = %e, "Cached payload undecodable, treating as miss");
            None
        }
    }
}

/// Encode and store a JSON entry. Failures are logged, not returned.
pub async fn set_json<T: Serialize + ?Sized>(
    store: &dyn CacheStore,
    key: &str,
    value: &T,
    ttl: Duration,
) -> bool {
    let bytes = match serde_json::to_vec(value) {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(key, error = %e, "Failed to encode cache entry");
            return false;
        }
    };

    match store.set(key, bytes, ttl).await {
        Ok(()) => {
            debug!(key, ttl_secs = ttl.as_secs(), "Cache entry saved");
            true
        }
        Err(e) => {
            warn!(key, error = %e, "Failed to save cache entry");
            false
        }
    }
}
