//! Cache and task-status collaborators.
//!
//! The engine never talks to a cache transport directly; it goes through
//! the [`CacheStore`] trait, injected into services at construction time.
//! Values are UTF-8 JSON strings with non-finite floats already sanitized
//! to null.

pub mod memory;
pub mod result_cache;
pub mod task;

use std::time::Duration;

use async_trait::async_trait;

pub use memory::InMemoryCache;
pub use result_cache::ResultCache;
pub use task::{TaskState, TaskStatus, TaskTracker};

/// Key-value cache with TTL expiry.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Fetch a value; `None` on miss.
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>>;

    /// Store a value with a time-to-live.
    async fn set(&self, key: &str, value: String, ttl: Duration) -> anyhow::Result<()>;

    /// Remove a key. Returns whether it existed.
    async fn delete(&self, key: &str) -> anyhow::Result<bool>;

    /// Remove every key matching a `*`-wildcard pattern. Returns the
    /// number of keys removed.
    async fn delete_matching(&self, pattern: &str) -> anyhow::Result<usize>;
}

/// Match a key against a `*`-wildcard pattern.
pub(crate) fn wildcard_match(pattern: &str, key: &str) -> bool {
    let segments: Vec<&str> = pattern.split('*').collect();
    if segments.len() == 1 {
        return pattern == key;
    }
    let mut rest = key;
    for (i, segment) in segments.iter().enumerate() {
        if segment.is_empty() {
            continue;
        }
        if i == 0 {
            match rest.strip_prefix(segment) {
                Some(r) => rest = r,
                None => return false,
            }
        } else if i == segments.len() - 1 {
            return rest.ends_with(segment);
        } else {
            match rest.find(segment) {
                Some(pos) => rest = &rest[pos + segment.len()..],
                None => return false,
            }
        }
    }
    // pattern ended with '*'
    true
}
