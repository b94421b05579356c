//! # Summary Cache
//!
//! TTL memoization of computed payloads over an injected key/value store.
//!
//! Aggregation costs O(points × segments), so it must not run on every
//! request. The cache is best-effort: a store that errors, or a payload that
//! no longer deserializes, is logged and treated as a miss. A cache problem
//! never fails the request.
//!
//! Freshness is checked lazily on read: an entry is served only while
//! `now - entry.timestamp < ttl`. Stores are asked to keep entries for at
//! least the TTL; how they expire them beyond that is their business.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TrailError};

/// Key of the cached progress report.
pub const STATS_CACHE_KEY: &str = "progress:summary";

/// Key of the cached weather snapshot.
pub const WEATHER_CACHE_KEY: &str = "weather:current";

/// Shortest expiration requested from a store.
pub const MIN_STORE_EXPIRATION: Duration = Duration::from_secs(60);

/// A stored payload with the time it was computed.
///
/// An entry stamped later than the reading clock (clock skew) is never
/// fresh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    /// Serialized JSON payload
    pub payload: String,
    /// Unix milliseconds at which the payload was computed
    pub timestamp_ms: i64,
}

impl CacheEntry {
    /// Age of the entry at `now`, in milliseconds (negative if written
    /// "in the future").
    pub fn age_ms(&self, now: DateTime<Utc>) -> i64 {
        now.timestamp_millis() - self.timestamp_ms
    }

    /// Whether the entry is still within `ttl` at `now`.
    pub fn is_fresh(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        let age = self.age_ms(now);
        age >= 0 && (age as u128) < ttl.as_millis()
    }
}

/// Key/value store backing the cache.
pub trait CacheStore: Send + Sync {
    /// Entry for `key`, unless it has expired by `now`.
    fn get(&self, key: &str, now: DateTime<Utc>) -> Result<Option<CacheEntry>>;

    /// Store `entry`, keeping it for at least `expiration`.
    fn put(&self, key: &str, entry: CacheEntry, expiration: Duration) -> Result<()>;
}

impl<S: CacheStore + ?Sized> CacheStore for std::sync::Arc<S> {
    fn get(&self, key: &str, now: DateTime<Utc>) -> Result<Option<CacheEntry>> {
        (**self).get(key, now)
    }

    fn put(&self, key: &str, entry: CacheEntry, expiration: Duration) -> Result<()> {
        (**self).put(key, entry, expiration)
    }
}

// ============================================================================
// In-memory store
// ============================================================================

#[derive(Debug)]
struct Slot {
    entry: CacheEntry,
    expires_at_ms: i64,
    last_access: u64,
}

#[derive(Debug)]
struct MemoryInner {
    capacity: usize,
    slots: HashMap<String, Slot>,
    access_counter: u64,
}

impl MemoryInner {
    /// Drop entries that expired before `now_ms`.
    fn purge_expired(&mut self, now_ms: i64) {
        self.slots.retain(|_, slot| slot.expires_at_ms > now_ms);
    }

    /// Evict the least recently used entry.
    fn evict_oldest(&mut self) {
        let oldest_key = self
            .slots
            .iter()
            .min_by_key(|(_, slot)| slot.last_access)
            .map(|(k, _)| k.clone());

        if let Some(key) = oldest_key {
            self.slots.remove(&key);
        }
    }
}

/// In-process store with LRU eviction and per-entry expiry.
///
/// Eviction is a linear scan; the cache holds a handful of keys.
/// Expired entries are dropped when read, and swept when a newer entry is
/// written.
#[derive(Debug)]
pub struct MemoryCacheStore {
    inner: Mutex<MemoryInner>,
}

impl MemoryCacheStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(MemoryInner {
                capacity: capacity.max(1),
                slots: HashMap::with_capacity(capacity),
                access_counter: 0,
            }),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|i| i.slots.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, key: &str) -> bool {
        self.inner
            .lock()
            .map(|i| i.slots.contains_key(key))
            .unwrap_or(false)
    }

    /// Remove a specific key.
    pub fn invalidate(&self, key: &str) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.slots.remove(key);
        }
    }

    /// Remove every entry.
    pub fn clear(&self) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.slots.clear();
            inner.access_counter = 0;
        }
    }
}

impl Default for MemoryCacheStore {
    fn default() -> Self {
        Self::new(16)
    }
}

impl CacheStore for MemoryCacheStore {
    fn get(&self, key: &str, now: DateTime<Utc>) -> Result<Option<CacheEntry>> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| TrailError::cache("memory cache lock poisoned"))?;
        let expired = inner
            .slots
            .get(key)
            .map_or(false, |slot| slot.expires_at_ms <= now.timestamp_millis());
        if expired {
            inner.slots.remove(key);
            return Ok(None);
        }
        inner.access_counter += 1;
        let counter = inner.access_counter;
        Ok(inner.slots.get_mut(key).map(|slot| {
            slot.last_access = counter;
            slot.entry.clone()
        }))
    }

    fn put(&self, key: &str, entry: CacheEntry, expiration: Duration) -> Result<()> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| TrailError::cache("memory cache lock poisoned"))?;

        inner.purge_expired(entry.timestamp_ms);
        inner.access_counter += 1;
        let counter = inner.access_counter;
        let expires_at_ms = entry
            .timestamp_ms
            .saturating_add(i64::try_from(expiration.as_millis()).unwrap_or(i64::MAX));

        if !inner.slots.contains_key(key) && inner.slots.len() >= inner.capacity {
            inner.evict_oldest();
        }

        inner.slots.insert(
            key.to_string(),
            Slot {
                entry,
                expires_at_ms,
                last_access: counter,
            },
        );
        Ok(())
    }
}

// ============================================================================
// TTL cache
// ============================================================================

/// Typed, best-effort TTL cache over a [`CacheStore`].
#[derive(Debug)]
pub struct TtlCache<S> {
    store: S,
}

impl<S: CacheStore> TtlCache<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Cached value for `key` if present, fresh and decodable.
    pub fn get_fresh<T: DeserializeOwned>(
        &self,
        key: &str,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Option<T> {
        let entry = match self.store.get(key, now) {
            Ok(Some(entry)) => entry,
            Ok(None) => return None,
            Err(e) => {
                warn!("[TtlCache] Read of '{}' failed, recomputing: {}", key, e);
                return None;
            }
        };

        if !entry.is_fresh(ttl, now) {
            debug!(
                "[TtlCache] '{}' is stale ({} ms old, ttl {} ms)",
                key,
                entry.age_ms(now),
                ttl.as_millis()
            );
            return None;
        }

        match serde_json::from_str(&entry.payload) {
            Ok(value) => {
                debug!("[TtlCache] Hit for '{}'", key);
                Some(value)
            }
            Err(e) => {
                warn!("[TtlCache] Undecodable payload for '{}': {}", key, e);
                None
            }
        }
    }

    /// Store `value` computed at `now`. Returns whether the write succeeded.
    pub fn put<T: Serialize>(&self, key: &str, value: &T, ttl: Duration, now: DateTime<Utc>) -> bool {
        let payload = match serde_json::to_string(value) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("[TtlCache] Could not serialize '{}': {}", key, e);
                return false;
            }
        };
        let entry = CacheEntry {
            payload,
            timestamp_ms: now.timestamp_millis(),
        };
        match self.store.put(key, entry, ttl.max(MIN_STORE_EXPIRATION)) {
            Ok(()) => true,
            Err(e) => {
                warn!("[TtlCache] Write of '{}' failed: {}", key, e);
                false
            }
        }
    }

    /// Serve a fresh cached value, or compute, store and return a new one.
    pub fn get_or_compute<T, F>(&self, key: &str, ttl: Duration, now: DateTime<Utc>, compute: F) -> T
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> T,
    {
        if let Some(cached) = self.get_fresh(key, ttl, now) {
            return cached;
        }
        let value = compute();
        self.put(key, &value, ttl, now);
        value
    }
}
