use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use lru::LruCache;

use crate::foundation::clock::Clock;

/// A cached payload together with the instant it was fetched.
#[derive(Clone, Debug)]
pub struct ListingCacheEntry<V> {
    /// Cached value.
    pub payload: V,
    /// Fetch instant.
    pub fetched_at: DateTime<Utc>,
    /// Lifetime from `fetched_at`.
    pub ttl: Duration,
}

impl<V> ListingCacheEntry<V> {
    /// Return `true` while `now - fetched_at < ttl`.
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        now - self.fetched_at < self.ttl
    }
}

/// Time-boxed cache with LRU eviction.
///
/// Expired entries are treated as absent and dropped on lookup; there is no partial
/// revalidation, a miss is always replaced wholesale by the caller.
pub struct TtlCache<K: Hash + Eq, V> {
    entries: LruCache<K, ListingCacheEntry<V>>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl<K: Hash + Eq, V: Clone> TtlCache<K, V> {
    /// Create a cache holding at most `capacity` entries (minimum 1).
    pub fn new(capacity: usize, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: LruCache::new(capacity),
            ttl,
            clock,
        }
    }

    /// Return a live payload, evicting the entry if it has expired.
    pub fn get(&mut self, key: &K) -> Option<V> {
        let now = self.clock.now();
        match self.entries.get(key) {
            Some(entry) if entry.is_live(now) => Some(entry.payload.clone()),
            Some(_) => {
                self.entries.pop(key);
                None
            }
            None => None,
        }
    }

    /// Store `payload` with a fresh `fetched_at`.
    pub fn insert(&mut self, key: K, payload: V) {
        let entry = ListingCacheEntry {
            payload,
            fetched_at: self.clock.now(),
            ttl: self.ttl,
        };
        self.entries.put(key, entry);
    }

    /// Drop `key` regardless of age.
    pub fn invalidate(&mut self, key: &K) {
        self.entries.pop(key);
    }

    /// Drop every entry matching `pred`.
    pub fn invalidate_where(&mut self, mut pred: impl FnMut(&K) -> bool)
    where
        K: Clone,
    {
        let doomed: Vec<K> = self
            .entries
            .iter()
            .filter(|(k, _)| pred(k))
            .map(|(k, _)| k)
            .cloned()
            .collect();
        for k in doomed {
            self.entries.pop(&k);
        }
    }

    /// Entries currently stored, live or not.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Return `true` when nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Configured TTL.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}

#[cfg(test)]
#[path = "../../tests/unit/listing/cache.rs"]
mod tests;
