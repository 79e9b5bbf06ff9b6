//! # TtlCache
//!
//! Read-through cache keyed by query parameters. Entries expire after a fixed
//! TTL and can be dropped early by tag when a write touches what they hold.
//! The cache is advisory: a miss only costs a storage round-trip.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use serde::Serialize;
use tokio::time::Instant;

struct CacheEntry<V> {
    value: V,
    tags: Vec<String>,
    stored_at: Instant,
}

/// Every this many inserts, expired entries are swept out.
const SWEEP_EVERY: usize = 64;

pub struct TtlCache<V> {
    entries: DashMap<String, CacheEntry<V>>,
    ttl: Duration,
    inserts: AtomicUsize,
}

impl<V: Clone + Send + Sync> TtlCache<V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            inserts: AtomicUsize::new(0),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns a live entry. Expired entries are evicted on the way.
    pub fn get(&self, key: &str) -> Option<V> {
        if let Some(entry) = self.entries.get(key) {
            if entry.stored_at.elapsed() < self.ttl {
                return Some(entry.value.clone());
            }
        }
        let ttl = self.ttl;
        self.entries
            .remove_if(key, |_, entry| entry.stored_at.elapsed() >= ttl);
        None
    }

    pub fn insert(&self, key: impl Into<String>, value: V, tags: &[&str]) {
        if (self.inserts.fetch_add(1, Ordering::Relaxed) + 1) % SWEEP_EVERY == 0 {
            self.purge_expired();
        }
        self.entries.insert(
            key.into(),
            CacheEntry {
                value,
                tags: tags.iter().map(|t| t.to_string()).collect(),
                stored_at: Instant::now(),
            },
        );
    }

    /// Drops every expired entry. Returns how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let before = self.entries.len();
        let ttl = self.ttl;
        self.entries.retain(|_, entry| entry.stored_at.elapsed() < ttl);
        let dropped = before.saturating_sub(self.entries.len());
        if dropped > 0 {
            tracing::debug!(dropped, "expired cache entries swept");
        }
        dropped
    }

    /// Drops every entry carrying `tag`. Returns how many were dropped.
    pub fn invalidate_tag(&self, tag: &str) -> usize {
        let mut dropped = 0;
        self.entries.retain(|_, entry| {
            let keep = !entry.tags.iter().any(|t| t == tag);
            if !keep {
                dropped += 1;
            }
            keep
        });
        if dropped > 0 {
            tracing::debug!(tag, dropped, "cache entries invalidated");
        }
        dropped
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Serves `key` from the cache or runs `fetch` and stores its success.
    /// Failures are passed through and never cached.
    pub async fn get_or_try_insert_with<F, Fut, E>(
        &self,
        key: &str,
        tags: &[&str],
        fetch: F,
    ) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if let Some(hit) = self.get(key) {
            return Ok(hit);
        }
        let value = fetch().await?;
        self.insert(key, value.clone(), tags);
        Ok(value)
    }
}

/// Builds a stable cache key from a prefix and serializable parameters.
pub fn cache_key<P: Serialize>(prefix: &str, params: &P) -> String {
    match serde_json::to_string(params) {
        Ok(json) => format!("{prefix}:{json}"),
        Err(_) => format!("{prefix}:{}", std::any::type_name::<P>()),
    }
}
