//! In-memory TTL cache for validated token claims
//!
//! Entries expire lazily on read. Memory is reclaimed only by [`TokenCache::cleanup`],
//! which the owner runs periodically (see [`spawn_cleanup_task`]).

use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::interval;

use crate::oauth::claims::Claims;
use crate::utils::logging::LoggingHelper;

/// Namespace prefix for token keys
const TOKEN_KEY_PREFIX: &str = "t-";

#[derive(Debug, Clone)]
struct CacheEntry {
    value: Value,
    /// `None` when the TTL reaches past what `Instant` can represent
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

/// Concurrency-safe map of JSON values with absolute expiry
#[derive(Debug, Default)]
pub struct Cache {
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl Cache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace `key`, expiring `ttl` from now
    ///
    /// A TTL too large to represent never expires.
    pub fn set(&self, key: &str, value: Value, ttl: Duration) {
        let expires_at = Instant::now().checked_add(ttl);
        self.entries
            .write()
            .insert(key.to_string(), CacheEntry { value, expires_at });
    }

    /// Live value for `key`
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Value> {
        let entries = self.entries.read();
        let entry = entries.get(key)?;
        if entry.is_expired(Instant::now()) {
            return None;
        }
        Some(entry.value.clone())
    }

    pub fn delete(&self, key: &str) {
        self.entries.write().remove(key);
    }

    /// Remove expired entries, returning how many were dropped
    pub fn cleanup(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        before - entries.len()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

/// Claims cache keyed by raw token
#[derive(Debug, Default)]
pub struct TokenCache {
    cache: Cache,
}

impl TokenCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn key(token: &str) -> String {
        format!("{TOKEN_KEY_PREFIX}{token}")
    }

    pub fn set(&self, token: &str, claims: Claims, ttl: Duration) {
        self.cache.set(&Self::key(token), Value::Object(claims), ttl);
    }

    /// Cached claims for `token`; an expired entry or a non-object value is a miss
    #[must_use]
    pub fn get(&self, token: &str) -> Option<Claims> {
        match self.cache.get(&Self::key(token))? {
            Value::Object(claims) => Some(claims),
            _ => None,
        }
    }

    pub fn delete(&self, token: &str) {
        self.cache.delete(&Self::key(token));
    }

    /// Remove expired entries, returning how many were dropped
    pub fn cleanup(&self) -> usize {
        let removed = self.cache.cleanup();
        LoggingHelper::log_cache_cleanup(removed, self.cache.len());
        removed
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    #[cfg(test)]
    fn insert_raw(&self, token: &str, value: Value, ttl: Duration) {
        self.cache.set(&Self::key(token), value, ttl);
    }
}

/// Spawn a background task that sweeps `cache` every `period`
///
/// Returns a `JoinHandle` that can be used to abort the task.
pub fn spawn_cleanup_task(cache: Arc<TokenCache>, period: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(period);

        // Skip the first immediate tick
        ticker.tick().await;

        loop {
            ticker.tick().await;
            cache.cleanup();
        }
    })
}
