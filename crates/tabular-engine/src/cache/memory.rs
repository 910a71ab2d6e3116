//! In-memory [`CacheStore`] implementation.
//!
//! Backs tests and single-process deployments; production deployments
//! inject a transport-backed implementation instead.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{CacheStore, wildcard_match};

#[derive(Debug)]
struct Entry {
    value: String,
    expires_at: Instant,
}

/// TTL-aware in-memory key-value store.
#[derive(Debug, Default)]
pub struct InMemoryCache {
    entries: Mutex<HashMap<String, Entry>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn prune(entries: &mut HashMap<String, Entry>) {
        let now = Instant::now();
        entries.retain(|_, e| e.expires_at > now);
    }
}

#[async_trait]
impl CacheStore for InMemoryCache {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        let mut entries = self.entries.lock();
        Self::prune(&mut entries);
        Ok(entries.get(key).map(|e| e.value.clone()))
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> anyhow::Result<()> {
        let mut entries = self.entries.lock();
        entries.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> anyhow::Result<bool> {
        let mut entries = self.entries.lock();
        Self::prune(&mut entries);
        Ok(entries.remove(key).is_some())
    }

    async fn delete_matching(&self, pattern: &str) -> anyhow::Result<usize> {
        let mut entries = self.entries.lock();
        Self::prune(&mut entries);
        let before = entries.len();
        entries.retain(|k, _| !wildcard_match(pattern, k));
        Ok(before - entries.len())
    }
}
