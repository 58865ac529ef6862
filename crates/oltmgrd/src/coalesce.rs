//! Request coalescing.
//!
//! A [`RequestGroup`] runs at most one future per key at a time. Callers that
//! arrive while a request for the same key is in flight wait on the same
//! shared future and receive a clone of its result, success or error.
//! Different keys never block each other.

use crate::error::{OltError, Result};
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tracing::debug;

type SharedResult<T> = Shared<BoxFuture<'static, std::result::Result<T, Arc<OltError>>>>;

/// Deduplicates concurrent requests by key.
pub struct RequestGroup<T> {
    inflight: Mutex<HashMap<String, SharedResult<T>>>,
}

impl<T> Default for RequestGroup<T> {
    fn default() -> Self {
        Self {
            inflight: Mutex::new(HashMap::new()),
        }
    }
}

impl<T> RequestGroup<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `make()` for `key`, or join the request already in flight.
    ///
    /// `make` is only called when no request for `key` is pending, and only
    /// builds the future; the work itself runs once the future is awaited by
    /// any of the waiting callers.
    pub async fn run<F, Fut>(&self, key: &str, make: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let fut = {
            let mut inflight = self.inflight.lock();
            match inflight.get(key) {
                // A finished entry nobody removed (all waiters dropped) is stale.
                Some(existing) if existing.peek().is_none() => {
                    debug!(key, "Joining in-flight request");
                    existing.clone()
                }
                _ => {
                    let fut = make().map(|r| r.map_err(Arc::new)).boxed().shared();
                    inflight.insert(key.to_string(), fut.clone());
                    fut
                }
            }
        };

        let result = fut.clone().await;

        {
            let mut inflight = self.inflight.lock();
            if inflight.get(key).is_some_and(|current| current.ptr_eq(&fut)) {
                inflight.remove(key);
            }
        }

        result.map_err(OltError::Shared)
    }

    /// Number of keys with a request in flight.
    pub fn in_flight(&self) -> usize {
        self.inflight.lock().len()
    }
}
