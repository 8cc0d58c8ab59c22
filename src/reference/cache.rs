//! Reference data cache
//!
//! Lazily populated key → value store for reference tables. Each key is
//! loaded at most once per process (or until [`ReferenceCache::clear`]);
//! callers racing on an unpopulated key share the single in-flight load.
//!
//! There is no TTL here. Reference tables are immutable for the lifetime of
//! a session; only the admin cache-bust clears them.
//!
//! A failed load is not cached: the error goes back to the caller and the
//! next `get` for that key runs the loader again.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use crate::error::Result;

// =============================================================================
// Statistics
// =============================================================================

#[derive(Debug, Default)]
struct CacheCounters {
    hits: AtomicU64,
    loads: AtomicU64,
    failures: AtomicU64,
    clears: AtomicU64,
}

/// Snapshot of reference cache statistics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReferenceCacheStats {
    /// Calls answered from an already-populated key
    pub hits: u64,
    /// Loader executions
    pub loads: u64,
    /// Loader executions that returned an error
    pub failures: u64,
    /// Explicit clears
    pub clears: u64,
    /// Keys currently populated
    pub populated: usize,
}

// =============================================================================
// Cache
// =============================================================================

/// Process-wide reference cache.
///
/// Construct once at start-up and share through an `Arc`; tests build their
/// own isolated instances.
pub struct ReferenceCache<T> {
    cells: DashMap<String, Arc<OnceCell<Arc<T>>>>,
    counters: CacheCounters,
}

impl<T> ReferenceCache<T> {
    pub fn new() -> Self {
        Self {
            cells: DashMap::new(),
            counters: CacheCounters::default(),
        }
    }

    /// Get the value for `key`, running `loader` only if it is not yet cached.
    pub async fn get<F, Fut>(&self, key: &str, loader: F) -> Result<Arc<T>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let cell = self
            .cells
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone();

        if let Some(value) = cell.get() {
            self.counters.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(value.clone());
        }

        let result = cell
            .get_or_try_init(|| async move {
                self.counters.loads.fetch_add(1, Ordering::Relaxed);
                debug!(key = key, "Loading reference table");
                loader().await.map(Arc::new)
            })
            .await;

        match result {
            Ok(value) => Ok(value.clone()),
            Err(e) => {
                self.counters.failures.fetch_add(1, Ordering::Relaxed);
                warn!(key = key, error = %e, "Reference load failed, key left empty");
                Err(e)
            }
        }
    }

    /// Cached value without loading.
    pub fn peek(&self, key: &str) -> Option<Arc<T>> {
        self.cells.get(key).and_then(|cell| cell.get().cloned())
    }

    /// Whether `key` holds a loaded value.
    pub fn contains(&self, key: &str) -> bool {
        self.peek(key).is_some()
    }

    /// Drop one key so the next `get` reloads it.
    pub fn invalidate(&self, key: &str) -> bool {
        self.cells.remove(key).is_some()
    }

    /// Drop every key (admin cache-bust).
    pub fn clear(&self) {
        self.cells.clear();
        self.counters.clears.fetch_add(1, Ordering::Relaxed);
    }

    /// Number of populated keys.
    pub fn len(&self) -> usize {
        self.cells.iter().filter(|c| c.value().initialized()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> ReferenceCacheStats {
        ReferenceCacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            loads: self.counters.loads.load(Ordering::Relaxed),
            failures: self.counters.failures.load(Ordering::Relaxed),
            clears: self.counters.clears.load(Ordering::Relaxed),
            populated: self.len(),
        }
    }
}

impl<T> Default for ReferenceCache<T> {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CatalogError;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[tokio::test]
    async fn test_loader_runs_once() {
        let cache: ReferenceCache<Vec<u32>> = ReferenceCache::new();
        let calls = AtomicUsize::new(0);

        for _ in 0..3 {
            let value = cache
                .get("sdgs", || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(vec![1, 2, 3])
                })
                .await
                .unwrap();
            assert_eq!(*value, vec![1, 2, 3]);
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let stats = cache.stats();
        assert_eq!(stats.loads, 1);
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.populated, 1);
    }

    #[tokio::test]
    async fn test_concurrent_gets_share_one_load() {
        let cache: Arc<ReferenceCache<String>> = Arc::new(ReferenceCache::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let cache = cache.clone();
                let calls = calls.clone();
                tokio::spawn(async move {
                    cache
                        .get("standards", || async move {
                            calls.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(20)).await;
                            Ok("loaded".to_string())
                        })
                        .await
                })
            })
            .collect();

        for task in futures_util::future::join_all(tasks).await {
            assert_eq!(*task.unwrap().unwrap(), "loaded");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failure_not_cached() {
        let cache: ReferenceCache<u32> = ReferenceCache::new();

        let first = cache
            .get("countries", || async {
                Err(CatalogError::ReferenceLoad {
                    key: "countries".into(),
                    reason: "offline".into(),
                })
            })
            .await;
        assert!(first.is_err());
        assert!(!cache.contains("countries"));

        let second = cache.get("countries", || async { Ok(42) }).await.unwrap();
        assert_eq!(*second, 42);
        assert_eq!(cache.stats().failures, 1);
    }

    #[tokio::test]
    async fn test_failure_does_not_poison_other_keys() {
        let cache: ReferenceCache<u32> = ReferenceCache::new();
        cache.get("a", || async { Ok(1) }).await.unwrap();
        let _ = cache
            .get("b", || async { Err(CatalogError::Internal("boom".into())) })
            .await;
        assert_eq!(*cache.peek("a").unwrap(), 1);
        assert!(cache.peek("b").is_none());
    }

    #[tokio::test]
    async fn test_clear_and_invalidate() {
        let cache: ReferenceCache<u32> = ReferenceCache::new();
        cache.get("a", || async { Ok(1) }).await.unwrap();
        cache.get("b", || async { Ok(2) }).await.unwrap();
        assert_eq!(cache.len(), 2);

        assert!(cache.invalidate("a"));
        assert!(!cache.contains("a"));
        assert!(cache.contains("b"));

        cache.clear();
        assert!(cache.is_empty());

        let reloaded = cache.get("b", || async { Ok(20) }).await.unwrap();
        assert_eq!(*reloaded, 20);
    }
}
