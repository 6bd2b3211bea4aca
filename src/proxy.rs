//! Metadata Proxy - read-through cache in front of entry metadata fetches
//!
//! A cache hit resolves immediately. A miss fetches through the entry on a
//! spawned task, stores successful results and hands them back. Concurrent
//! misses for the same URL wait on the same fetch instead of starting their own.
//! Failures are never cached.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::oneshot;
use tracing::{debug, trace, warn};

use crate::cache::MetadataCache;
use crate::entry::{Entry, FetchError, Metadata};

/// A fetch that any number of callers may await
type SharedFetch = Shared<BoxFuture<'static, Result<Metadata, FetchError>>>;

type InFlightMap = Arc<Mutex<HashMap<String, SharedFetch>>>;

/// Outcome of the synchronous part of a lookup
enum Lookup {
    Hit(Metadata),
    Pending(SharedFetch),
}

/// Read-through metadata proxy
///
/// Cheap to clone; clones share the cache and the in-flight table.
#[derive(Clone)]
pub struct MetadataProxy {
    /// Shared metadata cache
    cache: Arc<MetadataCache>,
    /// Fetches currently running, by URL
    in_flight: InFlightMap,
}

/// Removes an in-flight record when its fetch task ends, including by panic
struct InFlightGuard {
    in_flight: InFlightMap,
    url: String,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        lock(&self.in_flight).remove(&self.url);
    }
}

impl MetadataProxy {
    /// Create a proxy over an existing cache
    pub fn new(cache: Arc<MetadataCache>) -> Self {
        Self {
            cache,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// The cache this proxy reads through
    pub fn cache(&self) -> &Arc<MetadataCache> {
        &self.cache
    }

    /// Number of fetches currently running
    pub fn in_flight(&self) -> usize {
        lock(&self.in_flight).len()
    }

    /// Get metadata for `entry`, fetching and caching it on a miss
    ///
    /// The fetch runs on its own task: dropping the returned future does not
    /// cancel it, and a late success is still cached.
    ///
    /// # Errors
    /// Returns the entry's fetch error unchanged. Nothing is cached for it.
    pub async fn get_entry_metadata<E>(&self, entry: &E) -> Result<Metadata, FetchError>
    where
        E: Entry + Clone + 'static,
    {
        let url = entry.to_url();

        if self.cache.has(&url) {
            if let Some(metadata) = self.cache.get(&url) {
                return Ok(metadata);
            }
        }

        match self.lookup_or_fetch(url, entry) {
            Lookup::Hit(metadata) => Ok(metadata),
            Lookup::Pending(fetch) => fetch.await,
        }
    }

    /// Join a running fetch for `url` or start a new one
    fn lookup_or_fetch<E>(&self, url: String, entry: &E) -> Lookup
    where
        E: Entry + Clone + 'static,
    {
        let (tx, fetch) = {
            let mut in_flight = lock(&self.in_flight);

            if let Some(fetch) = in_flight.get(&url) {
                debug!(url = %url, "Joining in-flight metadata fetch");
                return Lookup::Pending(fetch.clone());
            }

            // A fetch may have finished between the cache check and taking the
            // in-flight lock; it stores before it unregisters.
            if let Some(metadata) = self.cache.get(&url) {
                return Lookup::Hit(metadata);
            }

            let (tx, rx) = oneshot::channel();
            let fetch = async move {
                rx.await.unwrap_or_else(|_| {
                    warn!("Metadata fetch task ended without a result");
                    Err(FetchError::TaskFailed("fetch task dropped".to_string()))
                })
            }
            .boxed()
            .shared();

            in_flight.insert(url.clone(), fetch.clone());
            (tx, fetch)
        };

        trace!(url = %url, "Starting metadata fetch");

        // Outside the lock: a closing runtime drops the task (and guard) inside spawn
        let guard = InFlightGuard {
            in_flight: Arc::clone(&self.in_flight),
            url: url.clone(),
        };
        let cache = Arc::clone(&self.cache);
        let entry = entry.clone();

        tokio::spawn(async move {
            let _guard = guard;
            let result = entry.get_metadata().await;
            match &result {
                Ok(metadata) => cache.put(url.clone(), metadata.clone()),
                Err(e) => debug!(url = %url, error = %e, "Metadata fetch failed, not caching"),
            }
            // Waiters may all have gone away
            let _ = tx.send(result);
        });

        Lookup::Pending(fetch)
    }
}

fn lock(in_flight: &Mutex<HashMap<String, SharedFetch>>) -> MutexGuard<'_, HashMap<String, SharedFetch>> {
    in_flight.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::num::NonZeroUsize;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{Duration, UNIX_EPOCH};
    use tokio::sync::Notify;

    /// Entry that counts fetches and can be held until released
    #[derive(Clone)]
    struct TestEntry {
        url: String,
        size: u64,
        fail: bool,
        panics: bool,
        fetches: Arc<AtomicUsize>,
        gate: Option<Arc<Notify>>,
    }

    impl TestEntry {
        fn new(url: &str, size: u64) -> Self {
            Self {
                url: url.to_string(),
                size,
                fail: false,
                panics: false,
                fetches: Arc::new(AtomicUsize::new(0)),
                gate: None,
            }
        }

        fn failing(url: &str) -> Self {
            Self {
                fail: true,
                ..Self::new(url, 0)
            }
        }

        fn gated(url: &str, size: u64, gate: Arc<Notify>) -> Self {
            Self {
                gate: Some(gate),
                ..Self::new(url, size)
            }
        }

        fn fetch_count(&self) -> usize {
            self.fetches.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Entry for TestEntry {
        fn to_url(&self) -> String {
            self.url.clone()
        }

        async fn get_metadata(&self) -> Result<Metadata, FetchError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            if self.panics {
                panic!("metadata source crashed");
            }
            if self.fail {
                return Err(FetchError::NotFound(self.url.clone()));
            }
            Ok(metadata(self.size))
        }
    }

    fn metadata(size: u64) -> Metadata {
        Metadata {
            size,
            modification_time: UNIX_EPOCH + Duration::from_secs(size),
            is_directory: false,
            read_only: false,
        }
    }

    fn proxy(capacity: usize) -> MetadataProxy {
        let cache = MetadataCache::new(NonZeroUsize::new(capacity).unwrap());
        MetadataProxy::new(Arc::new(cache))
    }

    async fn wait_until_cached(proxy: &MetadataProxy, url: &str) {
        for _ in 0..200 {
            if proxy.cache().has(url) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("{} was never cached", url);
    }

    #[tokio::test]
    async fn test_miss_then_hit_fetches_once() {
        let proxy = proxy(10);
        let entry = TestEntry::new("file:///a", 3);

        let first = proxy.get_entry_metadata(&entry).await.unwrap();
        let second = proxy.get_entry_metadata(&entry).await.unwrap();

        assert_eq!(first, metadata(3));
        assert_eq!(second, first);
        assert_eq!(entry.fetch_count(), 1);
        assert!(proxy.cache().has("file:///a"));

        let (hits, misses, _) = proxy.cache().stats();
        assert_eq!(hits, 1);
        assert_eq!(misses, 1);
    }

    #[tokio::test]
    async fn test_failure_is_not_cached() {
        let proxy = proxy(10);
        let entry = TestEntry::failing("file:///missing");

        let err = proxy.get_entry_metadata(&entry).await.unwrap_err();
        assert_eq!(err, FetchError::NotFound("file:///missing".to_string()));
        assert!(!proxy.cache().has("file:///missing"));
        assert_eq!(proxy.in_flight(), 0);

        // No negative caching: the next call fetches again
        proxy.get_entry_metadata(&entry).await.unwrap_err();
        assert_eq!(entry.fetch_count(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_misses_share_one_fetch() {
        let proxy = proxy(10);
        let gate = Arc::new(Notify::new());
        let entry = TestEntry::gated("file:///slow", 9, Arc::clone(&gate));

        let callers: Vec<_> = (0..4)
            .map(|_| {
                let proxy = proxy.clone();
                let entry = entry.clone();
                tokio::spawn(async move { proxy.get_entry_metadata(&entry).await })
            })
            .collect();

        while proxy.in_flight() == 0 {
            tokio::task::yield_now().await;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        gate.notify_one();

        for caller in callers {
            assert_eq!(caller.await.unwrap().unwrap(), metadata(9));
        }
        assert_eq!(entry.fetch_count(), 1);
        assert_eq!(proxy.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_failure_reaches_every_waiter() {
        let proxy = proxy(10);
        let gate = Arc::new(Notify::new());
        let entry = TestEntry {
            fail: true,
            ..TestEntry::gated("file:///bad", 0, Arc::clone(&gate))
        };

        let first = {
            let (proxy, entry) = (proxy.clone(), entry.clone());
            tokio::spawn(async move { proxy.get_entry_metadata(&entry).await })
        };
        let second = {
            let (proxy, entry) = (proxy.clone(), entry.clone());
            tokio::spawn(async move { proxy.get_entry_metadata(&entry).await })
        };

        while proxy.in_flight() == 0 {
            tokio::task::yield_now().await;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        gate.notify_one();

        assert!(first.await.unwrap().is_err());
        assert!(second.await.unwrap().is_err());
        assert_eq!(entry.fetch_count(), 1);
        assert!(!proxy.cache().has("file:///bad"));
    }

    #[tokio::test]
    async fn test_abandoned_fetch_still_caches() {
        let proxy = proxy(10);
        let gate = Arc::new(Notify::new());
        let entry = TestEntry::gated("file:///late", 5, Arc::clone(&gate));

        let abandoned =
            tokio::time::timeout(Duration::from_millis(10), proxy.get_entry_metadata(&entry)).await;
        assert!(abandoned.is_err());
        assert!(!proxy.cache().has("file:///late"));

        gate.notify_one();
        wait_until_cached(&proxy, "file:///late").await;

        assert_eq!(proxy.get_entry_metadata(&entry).await.unwrap(), metadata(5));
        assert_eq!(entry.fetch_count(), 1);
    }

    #[tokio::test]
    async fn test_lru_eviction_through_proxy() {
        let proxy = proxy(10);
        let entries: Vec<TestEntry> = ('a'..='j')
            .enumerate()
            .map(|(i, c)| TestEntry::new(&format!("file:///{}", c), i as u64))
            .collect();

        for entry in &entries {
            proxy.get_entry_metadata(entry).await.unwrap();
        }

        // Touch "a" so "b" becomes the oldest
        proxy.get_entry_metadata(&entries[0]).await.unwrap();
        proxy
            .get_entry_metadata(&TestEntry::new("file:///k", 10))
            .await
            .unwrap();

        assert!(proxy.cache().has("file:///a"));
        assert!(!proxy.cache().has("file:///b"));
        assert_eq!(proxy.cache().len(), 10);
        assert_eq!(entries[0].fetch_count(), 1);
    }

    #[tokio::test]
    async fn test_panicking_fetch_reports_task_failure() {
        let proxy = proxy(10);
        let entry = TestEntry {
            panics: true,
            ..TestEntry::new("file:///crash", 1)
        };

        let err = proxy.get_entry_metadata(&entry).await.unwrap_err();
        assert!(matches!(err, FetchError::TaskFailed(_)));
        assert_eq!(proxy.in_flight(), 0);
        assert!(!proxy.cache().has("file:///crash"));

        // The record is gone, so a healthy entry for the same URL fetches again
        let healthy = TestEntry::new("file:///crash", 4);
        assert_eq!(proxy.get_entry_metadata(&healthy).await.unwrap(), metadata(4));
    }

    #[test]
    fn test_fetch_on_closed_runtime_fails_without_deadlock() {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let handle = runtime.handle().clone();
        drop(runtime);

        let _context = handle.enter();
        let proxy = proxy(10);
        let entry = TestEntry::new("file:///closed", 1);

        let err = futures::executor::block_on(proxy.get_entry_metadata(&entry)).unwrap_err();
        assert!(matches!(err, FetchError::TaskFailed(_)));
        assert_eq!(proxy.in_flight(), 0);
        assert_eq!(entry.fetch_count(), 0);
    }
}
