//! Short-lived key/value caching.
//!
//! ## Backends
//!
//! - [`InMemoryCache`] - process-local cache with per-entry TTL
//! - [`DummyCache`] - stores nothing, for deployments that disable caching

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::error::CentralError;

/// A value that can be stored in a cache backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CacheValue {
    /// A string value.
    String(String),
    /// A 64-bit integer value.
    Integer(i64),
    /// A JSON value.
    Json(serde_json::Value),
}

impl CacheValue {
    /// Returns the value as a string, if it is a `String` variant.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the value as JSON, if it is a `Json` variant.
    pub const fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Json(v) => Some(v),
            _ => None,
        }
    }
}

/// A backend for storing and retrieving cached values.
///
/// Caches are an optimization: callers must produce the same answer when a
/// backend forgets everything.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Retrieves a value. Returns `None` if the key is absent or expired.
    async fn get(&self, key: &str) -> Result<Option<CacheValue>, CentralError>;

    /// Stores a value. With `ttl` set to `None` the entry never expires.
    async fn set(&self, key: &str, value: CacheValue, ttl: Option<Duration>)
        -> Result<(), CentralError>;

    /// Deletes a value. Returns `true` if the key existed.
    async fn delete(&self, key: &str) -> Result<bool, CentralError>;

    /// Removes all entries.
    async fn clear(&self) -> Result<(), CentralError>;

    /// Checks whether a live entry exists for `key`.
    async fn has_key(&self, key: &str) -> Result<bool, CentralError> {
        Ok(self.get(key).await?.is_some())
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: CacheValue,
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|exp| Instant::now() >= exp)
    }
}

/// Entry count below which expired entries are left for reads to skip.
const PRUNE_MIN_ENTRIES: usize = 1024;

/// Process-local cache backed by `RwLock<HashMap>`.
///
/// Expired entries are skipped on read. They are swept on write once the map
/// grows past a threshold, which then doubles relative to what survived, so
/// inserts stay amortized O(1).
#[derive(Debug, Clone, Default)]
pub struct InMemoryCache {
    store: Arc<RwLock<CacheMap>>,
}

#[derive(Debug)]
struct CacheMap {
    entries: HashMap<String, CacheEntry>,
    prune_at: usize,
}

impl Default for CacheMap {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
            prune_at: PRUNE_MIN_ENTRIES,
        }
    }
}

impl CacheMap {
    fn prune_if_full(&mut self) {
        if self.entries.len() < self.prune_at {
            return;
        }
        self.entries.retain(|_, entry| !entry.is_expired());
        self.prune_at = (self.entries.len() * 2).max(PRUNE_MIN_ENTRIES);
    }
}

impl InMemoryCache {
    /// Creates a new empty in-memory cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries, expired ones included.
    pub async fn len(&self) -> usize {
        self.store.read().await.entries.len()
    }

    /// Returns `true` when nothing is stored.
    pub async fn is_empty(&self) -> bool {
        self.store.read().await.entries.is_empty()
    }
}

#[async_trait]
impl CacheBackend for InMemoryCache {
    async fn get(&self, key: &str) -> Result<Option<CacheValue>, CentralError> {
        let store = self.store.read().await;
        Ok(store
            .entries
            .get(key)
            .filter(|entry| !entry.is_expired())
            .map(|entry| entry.value.clone()))
    }

    async fn set(
        &self,
        key: &str,
        value: CacheValue,
        ttl: Option<Duration>,
    ) -> Result<(), CentralError> {
        let expires_at = match ttl {
            Some(ttl) => Some(Instant::now().checked_add(ttl).ok_or_else(|| {
                CentralError::ConfigurationError(format!("cache TTL out of range: {ttl:?}"))
            })?),
            None => None,
        };
        let mut store = self.store.write().await;
        store.prune_if_full();
        store.entries.insert(key.to_string(), CacheEntry { value, expires_at });
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, CentralError> {
        Ok(self.store.write().await.entries.remove(key).is_some())
    }

    async fn clear(&self) -> Result<(), CentralError> {
        let mut store = self.store.write().await;
        store.entries.clear();
        store.prune_at = PRUNE_MIN_ENTRIES;
        Ok(())
    }
}

/// A cache that never stores anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct DummyCache;

#[async_trait]
impl CacheBackend for DummyCache {
    async fn get(&self, _key: &str) -> Result<Option<CacheValue>, CentralError> {
        Ok(None)
    }

    async fn set(
        &self,
        _key: &str,
        _value: CacheValue,
        _ttl: Option<Duration>,
    ) -> Result<(), CentralError> {
        Ok(())
    }

    async fn delete(&self, _key: &str) -> Result<bool, CentralError> {
        Ok(false)
    }

    async fn clear(&self) -> Result<(), CentralError> {
        Ok(())
    }
}
