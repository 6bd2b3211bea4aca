//! Metadata Cache Implementation
//!
//! Shared, mutex-guarded LRU cache of entry metadata keyed by entry URL.
//! Passed around explicitly as an `Arc<MetadataCache>`; there is no global instance.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use lru::LruCache;
use tracing::{debug, trace};

use crate::entry::Metadata;

/// Metadata cache with hit/miss accounting
pub struct MetadataCache {
    /// Metadata by entry URL
    entries: Mutex<LruCache<String, Metadata>>,
    /// Cache hit counter
    hits: AtomicU64,
    /// Cache miss counter
    misses: AtomicU64,
}

impl MetadataCache {
    /// Create a cache holding at most `capacity` entries
    pub fn new(capacity: NonZeroUsize) -> Self {
        debug!(capacity = capacity.get(), "Metadata cache initialized");
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Whether metadata for `url` is cached. Does not touch recency.
    pub fn has(&self, url: &str) -> bool {
        self.lock().contains(url)
    }

    /// Get cached metadata for `url`
    ///
    /// Returns Some(metadata) if found, None otherwise.
    /// Marks the entry most recently used and updates hit/miss counters.
    pub fn get(&self, url: &str) -> Option<Metadata> {
        let found = self.lock().get(url).cloned();
        match found {
            Some(metadata) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                trace!(url = url, "Cache HIT for entry metadata");
                Some(metadata)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                trace!(url = url, "Cache MISS for entry metadata");
                None
            }
        }
    }

    /// Store metadata for `url`, evicting the least recently used entry if full
    ///
    /// Overwriting an existing URL refreshes it and never evicts.
    pub fn put(&self, url: String, metadata: Metadata) {
        // push hands back the replaced pair on overwrite, the evicted one otherwise
        let displaced = self.lock().push(url.clone(), metadata);
        debug!(url = %url, "Cached entry metadata");
        if let Some((displaced_url, _)) = displaced {
            if displaced_url != url {
                debug!(url = %displaced_url, "Evicted least recently used metadata");
            }
        }
    }

    /// Number of cached entries
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Maximum number of cached entries
    pub fn capacity(&self) -> usize {
        self.lock().cap().get()
    }

    /// Cached URLs from least to most recently used
    pub fn urls_by_recency(&self) -> Vec<String> {
        self.lock().iter().rev().map(|(url, _)| url.clone()).collect()
    }

    /// Clear the cache and reset counters
    ///
    /// Regular callers never remove entries; this is for resets and tests.
    pub fn clear(&self) {
        self.lock().clear();
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        debug!("Cleared metadata cache");
    }

    /// Get cache statistics
    ///
    /// Returns (hits, misses, hit_rate)
    pub fn stats(&self) -> (u64, u64, f64) {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        let hit_rate = if total > 0 {
            (hits as f64 / total as f64) * 100.0
        } else {
            0.0
        };
        (hits, misses, hit_rate)
    }

    /// Log current cache metrics
    pub fn log_metrics(&self) {
        let (hits, misses, hit_rate) = self.stats();

        debug!(
            hits = hits,
            misses = misses,
            hit_rate = format!("{:.1}%", hit_rate),
            entries = self.len(),
            capacity = self.capacity(),
            "Cache metrics"
        );
    }

    fn lock(&self) -> MutexGuard<'_, LruCache<String, Metadata>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
