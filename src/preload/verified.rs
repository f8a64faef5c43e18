use std::num::NonZeroUsize;
use std::sync::Mutex;

use lru::LruCache;

/// URLs confirmed decodable, bounded by LRU eviction.
///
/// A member never needs another fetch; only a URL evicted for capacity can be fetched again.
pub struct VerifiedImageSet {
    urls: Mutex<LruCache<String, ()>>,
}

impl VerifiedImageSet {
    /// Create a set remembering at most `capacity` URLs (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            urls: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Return `true` when `url` is verified; a hit refreshes its recency.
    pub fn contains(&self, url: &str) -> bool {
        self.lock().get(url).is_some()
    }

    /// Mark `url` verified. Idempotent.
    pub fn insert(&self, url: &str) {
        self.lock().put(url.to_string(), ());
    }

    /// Number of remembered URLs.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Return `true` when nothing is remembered.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LruCache<String, ()>> {
        self.urls.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl Default for VerifiedImageSet {
    fn default() -> Self {
        Self::new(4_096)
    }
}
