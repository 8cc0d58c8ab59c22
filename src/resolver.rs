//! Progressive Resolver - serves one entity in increasingly complete phases
//!
//! ```text
//! resolve(id)
//!   ├─ resolved cache hit ───────────────────────────────► Complete
//!   ├─ phase 1: summary index entry (no reference I/O) ──► Basic
//!   └─ phase 2 (spawned):
//!        wait for readiness (bounded) ─► fetch raw record ─► Detailed
//!        resolve_entity(raw, refs) ──────────────────────► Complete
//!        any failure ─► stay Basic with error (or Error if no basic data)
//! ```
//!
//! Phase 2 uses the same [`tiers::resolve_entity`] as the tier compiler, so
//! a completed entity equals its entry in `index-resolved.json`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

use crate::error::{CatalogError, Result};
use crate::record;
use crate::reference::ReferenceCatalog;
use crate::source::CatalogSource;
use crate::tiers::{self, NormalizedRecord};

// =============================================================================
// Resolved entity cache
// =============================================================================

/// Configuration for the resolved-entity cache.
#[derive(Debug, Clone)]
pub struct ResolvedCacheConfig {
    /// How long a resolved entity is served without refetching
    pub default_ttl: Duration,

    /// Maximum number of cached entities
    pub max_entries: usize,
}

impl Default for ResolvedCacheConfig {
    fn default() -> Self {
        Self {
            default_ttl: Duration::from_secs(600), // 10 minutes
            max_entries: 1_000,
        }
    }
}

struct CachedEntity {
    value: Arc<Value>,
    expires_at: Instant,
    last_used: Instant,
}

impl CachedEntity {
    fn new(value: Value, ttl: Duration) -> Self {
        let now = Instant::now();
        Self {
            value: Arc::new(value),
            expires_at: now + ttl,
            last_used: now,
        }
    }

    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

#[derive(Debug, Default)]
struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    inserts: AtomicU64,
    evictions: AtomicU64,
}

impl CacheStats {
    fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    fn record_insert(&self) {
        self.inserts.fetch_add(1, Ordering::Relaxed);
    }

    fn record_eviction(&self) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
    }
}

/// Snapshot of resolved-cache statistics.
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedCacheStats {
    pub hits: u64,
    pub misses: u64,
    pub inserts: u64,
    pub evictions: u64,
    pub entries: usize,
}

/// TTL cache of fully resolved entities, keyed `resolved:<ID>`.
///
/// Separate from the reference cache: reference tables live for the whole
/// process, resolved entities expire.
pub struct ResolvedEntityCache {
    cache: DashMap<String, CachedEntity>,
    config: ResolvedCacheConfig,
    stats: CacheStats,
}

impl ResolvedEntityCache {
    pub fn new(config: ResolvedCacheConfig) -> Self {
        Self {
            cache: DashMap::new(),
            config,
            stats: CacheStats::default(),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(ResolvedCacheConfig::default())
    }

    pub fn cache_key(id: &str) -> String {
        format!("resolved:{}", id)
    }

    /// Store a resolved entity, evicting the least recently used one at capacity.
    pub fn insert(&self, id: &str, value: Value) {
        let key = Self::cache_key(id);
        if !self.cache.contains_key(&key) && self.cache.len() >= self.config.max_entries {
            self.evict_lru();
        }
        self.cache
            .insert(key, CachedEntity::new(value, self.config.default_ttl));
        self.stats.record_insert();
    }

    /// Cached entity, if present and not expired.
    pub fn get(&self, id: &str) -> Option<Arc<Value>> {
        let key = Self::cache_key(id);
        if let Some(mut entry) = self.cache.get_mut(&key) {
            if entry.is_expired() {
                drop(entry);
                self.cache.remove(&key);
                self.stats.record_miss();
                self.stats.record_eviction();
                return None;
            }

            entry.last_used = Instant::now();
            self.stats.record_hit();
            return Some(entry.value.clone());
        }

        self.stats.record_miss();
        None
    }

    pub fn contains(&self, id: &str) -> bool {
        self.cache
            .get(&Self::cache_key(id))
            .map(|e| !e.is_expired())
            .unwrap_or(false)
    }

    pub fn remove(&self, id: &str) -> bool {
        self.cache.remove(&Self::cache_key(id)).is_some()
    }

    pub fn clear(&self) {
        self.cache.clear();
    }

    /// Remove all expired entries. Returns how many were removed.
    pub fn cleanup(&self) -> usize {
        let mut removed = 0;
        self.cache.retain(|_, v| {
            if v.is_expired() {
                removed += 1;
                self.stats.record_eviction();
                false
            } else {
                true
            }
        });
        removed
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    pub fn stats(&self) -> ResolvedCacheStats {
        ResolvedCacheStats {
            hits: self.stats.hits.load(Ordering::Relaxed),
            misses: self.stats.misses.load(Ordering::Relaxed),
            inserts: self.stats.inserts.load(Ordering::Relaxed),
            evictions: self.stats.evictions.load(Ordering::Relaxed),
            entries: self.cache.len(),
        }
    }

    fn evict_lru(&self) {
        let oldest_key = self
            .cache
            .iter()
            .min_by_key(|e| e.last_used)
            .map(|e| e.key().clone());

        if let Some(key) = oldest_key {
            self.cache.remove(&key);
            self.stats.record_eviction();
        }
    }
}

impl Default for ResolvedEntityCache {
    fn default() -> Self {
        Self::with_defaults()
    }
}

// =============================================================================
// Resolution state
// =============================================================================

/// How complete a resolution is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Initial,
    Basic,
    Detailed,
    Complete,
    Error,
}

/// Snapshot of one entity's resolution.
#[derive(Debug, Clone, Serialize)]
pub struct ResolutionState {
    pub id: String,
    /// Summary-tier shape, available before any reference data
    pub basic: Option<Value>,
    /// Raw record while `Detailed`, resolved entity once `Complete`
    pub detailed: Option<Value>,
    pub phase: Phase,
    pub error: Option<String>,
}

impl ResolutionState {
    fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            basic: None,
            detailed: None,
            phase: Phase::Initial,
            error: None,
        }
    }

    /// No further updates will follow.
    pub fn is_settled(&self) -> bool {
        matches!(self.phase, Phase::Complete | Phase::Error) || self.error.is_some()
    }
}

/// Watchable handle to a resolution in progress.
pub struct ResolutionHandle {
    rx: watch::Receiver<ResolutionState>,
}

impl ResolutionHandle {
    /// Current state without waiting.
    pub fn current(&self) -> ResolutionState {
        self.rx.borrow().clone()
    }

    /// Wait until no further updates will follow.
    pub async fn settled(mut self) -> ResolutionState {
        if let Ok(state) = self.rx.wait_for(ResolutionState::is_settled).await {
            return state.clone();
        }
        // Phase-2 task gone; whatever was published last is final
        let state = self.rx.borrow().clone();
        state
    }
}

// =============================================================================
// Progressive resolver
// =============================================================================

type SummaryIndex = HashMap<String, Value>;

/// How long phase 2 waits for another task to warm the reference catalog
/// before loading it itself.
pub const DEFAULT_READINESS_TIMEOUT: Duration = Duration::from_secs(5);

/// Resolves entities by ID, phase by phase.
pub struct ProgressiveResolver {
    source: Arc<dyn CatalogSource>,
    catalog: Arc<ReferenceCatalog>,
    cache: Arc<ResolvedEntityCache>,
    readiness: watch::Receiver<bool>,
    readiness_timeout: Duration,
    index: Mutex<Option<Arc<SummaryIndex>>>,
}

impl ProgressiveResolver {
    /// `readiness` must turn `true` once reference data is loaded; phase 2
    /// waits on it and never polls. After the readiness timeout phase 2
    /// loads the catalog itself, so a catalog cleared mid-request cannot
    /// stall a resolution.
    pub fn new(
        source: Arc<dyn CatalogSource>,
        catalog: Arc<ReferenceCatalog>,
        cache: Arc<ResolvedEntityCache>,
        readiness: watch::Receiver<bool>,
    ) -> Self {
        Self {
            source,
            catalog,
            cache,
            readiness,
            readiness_timeout: DEFAULT_READINESS_TIMEOUT,
            index: Mutex::new(None),
        }
    }

    pub fn with_readiness_timeout(mut self, timeout: Duration) -> Self {
        self.readiness_timeout = timeout;
        self
    }

    pub fn cache(&self) -> &Arc<ResolvedEntityCache> {
        &self.cache
    }

    /// Start resolving `id`. Phase 1 is done when this returns.
    pub async fn resolve(self: &Arc<Self>, id: &str) -> ResolutionHandle {
        let mut state = ResolutionState::new(id);

        if let Some(resolved) = self.cache.get(id) {
            debug!(id = %id, "Resolved cache hit");
            state.basic = NormalizedRecord::from_record(&resolved)
                .ok()
                .map(|n| n.summary());
            state.detailed = Some((*resolved).clone());
            state.phase = Phase::Complete;
            let (_tx, rx) = watch::channel(state);
            return ResolutionHandle { rx };
        }

        state.basic = self.basic(id).await;
        if state.basic.is_some() {
            state.phase = Phase::Basic;
        }

        let (tx, rx) = watch::channel(state);
        let resolver = Arc::clone(self);
        let id = id.to_string();
        tokio::spawn(async move {
            resolver.run_detailed(id, tx).await;
        });

        ResolutionHandle { rx }
    }

    /// Resolve and wait for the final state.
    pub async fn resolve_complete(self: &Arc<Self>, id: &str) -> ResolutionState {
        self.resolve(id).await.settled().await
    }

    /// Drop the cached summary index so the next phase 1 rereads it.
    pub async fn reset_index(&self) {
        *self.index.lock().await = None;
    }

    /// Drop every resolved entity and the summary index.
    pub async fn clear(&self) {
        self.cache.clear();
        self.reset_index().await;
        info!("Resolver caches cleared");
    }

    async fn basic(&self, id: &str) -> Option<Value> {
        match self.summary_index().await {
            Ok(index) => index.get(id).cloned(),
            Err(e) => {
                warn!(id = %id, error = %e, "Summary index unavailable, skipping basic phase");
                None
            }
        }
    }

    async fn summary_index(&self) -> Result<Arc<SummaryIndex>> {
        let mut slot = self.index.lock().await;
        if let Some(ref index) = *slot {
            return Ok(index.clone());
        }

        let entries = self.source.fetch_index().await?;
        let index: SummaryIndex = entries
            .into_iter()
            .filter_map(|entry| {
                let id = record::record_id(&entry)?.to_string();
                Some((id, entry))
            })
            .collect();
        debug!(entries = index.len(), "Summary index loaded");

        let index = Arc::new(index);
        *slot = Some(index.clone());
        Ok(index)
    }

    async fn run_detailed(&self, id: String, tx: watch::Sender<ResolutionState>) {
        match self.load_detailed(&id, &tx).await {
            Ok(resolved) => {
                self.cache.insert(&id, resolved.clone());
                tx.send_modify(|state| {
                    state.detailed = Some(resolved);
                    state.phase = Phase::Complete;
                    state.error = None;
                });
                debug!(id = %id, "Entity resolved");
            }
            Err(e) => {
                warn!(id = %id, error = %e, "Could not load entity details");
                tx.send_modify(|state| {
                    state.detailed = None;
                    state.phase = if state.basic.is_some() {
                        Phase::Basic
                    } else {
                        Phase::Error
                    };
                    state.error = Some(e.to_string());
                });
            }
        }
    }

    async fn load_detailed(&self, id: &str, tx: &watch::Sender<ResolutionState>) -> Result<Value> {
        let mut ready = self.readiness.clone();
        match tokio::time::timeout(self.readiness_timeout, ready.wait_for(|ready| *ready)).await {
            Ok(Ok(_)) => {}
            Ok(Err(_)) => return Err(CatalogError::NotReady("reference catalog shut down".into())),
            // load_all below warms the catalog on demand
            Err(_) => debug!(id = %id, "Reference catalog not ready, loading it for phase 2"),
        }

        let raw = self.source.fetch_record(id).await?;
        tx.send_modify(|state| {
            state.detailed = Some(raw.clone());
            state.phase = Phase::Detailed;
        });

        let refs = self.catalog.load_all().await?;
        tiers::resolve_entity(&raw, &refs)
    }
}
