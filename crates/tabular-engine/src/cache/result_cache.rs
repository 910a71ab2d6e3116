//! Memoization layer over a [`CacheStore`].
//!
//! Reads are fail-open: any transport error is logged and treated as a
//! miss, because caching is an optimization, not a correctness
//! requirement. Writes are fire-and-forget: errors are logged and
//! swallowed so a flaky cache never fails a successful pipeline run.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::CacheStore;
use crate::utils::sanitize_json;

#[derive(Clone)]
pub struct ResultCache {
    store: Arc<dyn CacheStore>,
}

impl ResultCache {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self { store }
    }

    /// Fetch and deserialize a cached value. Transport and decode errors
    /// are both treated as a miss.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        match self.store.get(key).await {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(value) => {
                    debug!(key, "cache hit");
                    Some(value)
                }
                Err(e) => {
                    warn!(key, error = %e, "cached value failed to decode, treating as miss");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!(key, error = %e, "cache read failed, treating as miss");
                None
            }
        }
    }

    /// Serialize, sanitize non-finite floats, and store. Errors are
    /// logged, never surfaced.
    pub async fn set_json<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) {
        let mut json = match serde_json::to_value(value) {
            Ok(v) => v,
            Err(e) => {
                warn!(key, error = %e, "cache write skipped: serialization failed");
                return;
            }
        };
        sanitize_json(&mut json);
        if let Err(e) = self.store.set(key, json.to_string(), ttl).await {
            warn!(key, error = %e, "cache write failed");
        }
    }

    pub async fn delete(&self, key: &str) -> bool {
        match self.store.delete(key).await {
            Ok(existed) => existed,
            Err(e) => {
                warn!(key, error = %e, "cache delete failed");
                false
            }
        }
    }

    pub async fn delete_matching(&self, pattern: &str) -> usize {
        match self.store.delete_matching(pattern).await {
            Ok(count) => count,
            Err(e) => {
                warn!(pattern, error = %e, "cache pattern delete failed");
                0
            }
        }
    }
}
