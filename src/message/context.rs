//! Per-request context sidecar.

use std::sync::Arc;

use dashmap::DashMap;
use serde_json::Value;

/// Well-known context keys written by built-in middlewares.
pub mod keys {
    /// Request identifier assigned by `RequestIdMiddleware`.
    pub const REQUEST_ID: &str = "request.id";
    /// Retries performed by `RetryMiddleware` (attempts minus one).
    pub const RETRY_ATTEMPTS: &str = "retry.attempts";
    /// Milliseconds since the UNIX epoch when tracing saw the request.
    pub const TIMING_START_MS: &str = "timing.start_ms";
    /// Wall time spent below the tracing middleware, in milliseconds.
    pub const TIMING_ELAPSED_MS: &str = "timing.elapsed_ms";
}

/// Mutable key/value map attached to a request.
///
/// Cloning a `Context` yields a handle to the same map. This is how a
/// middleware hands data to middlewares further down the chain (or back up
/// it) without the request itself becoming mutable shared state.
#[derive(Debug, Clone, Default)]
pub struct Context {
    values: Arc<DashMap<String, Value>>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value, returning the previous one.
    pub fn insert(&self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.values.insert(key.into(), value.into())
    }

    /// Clone out the value stored under `key`.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.values.get(key).map(|v| v.value().clone())
    }

    pub fn get_str(&self, key: &str) -> Option<String> {
        self.values
            .get(key)
            .and_then(|v| v.value().as_str().map(str::to_owned))
    }

    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.values.get(key).and_then(|v| v.value().as_u64())
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        self.values.remove(key).map(|(_, v)| v)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
