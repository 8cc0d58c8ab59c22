//! Reference data: classification, standard, country and license tables
//!
//! ```text
//! ReferenceCatalog ──get(key)──► ReferenceCache ──miss──► CatalogSource
//!        │                              (at most one load per key)
//!        └── load_all() ──► ReferenceSet (snapshot used for resolution)
//! ```

pub mod cache;
pub mod table;

pub use cache::{ReferenceCache, ReferenceCacheStats};
pub use table::{default_aliases, resolve_reference, AliasRule, ReferenceTable};

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::future::try_join_all;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::error::{CatalogError, Result};
use crate::normalize::CodeList;
use crate::source::CatalogSource;

// =============================================================================
// Reference keys
// =============================================================================

/// The reference domains, each loaded into its own cache key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceKey {
    Sdgs,
    WhoSystem,
    Wmo,
    Dpi,
    HealthStandards,
    InteropStandards,
    ClimateStandards,
    Countries,
    Licenses,
}

impl ReferenceKey {
    pub const ALL: [ReferenceKey; 9] = [
        ReferenceKey::Sdgs,
        ReferenceKey::WhoSystem,
        ReferenceKey::Wmo,
        ReferenceKey::Dpi,
        ReferenceKey::HealthStandards,
        ReferenceKey::InteropStandards,
        ReferenceKey::ClimateStandards,
        ReferenceKey::Countries,
        ReferenceKey::Licenses,
    ];

    /// Cache key
    pub fn as_str(&self) -> &'static str {
        match self {
            ReferenceKey::Sdgs => "sdgs",
            ReferenceKey::WhoSystem => "who_system",
            ReferenceKey::Wmo => "wmo",
            ReferenceKey::Dpi => "dpi",
            ReferenceKey::HealthStandards => "health_standards",
            ReferenceKey::InteropStandards => "interop_standards",
            ReferenceKey::ClimateStandards => "climate_standards",
            ReferenceKey::Countries => "countries",
            ReferenceKey::Licenses => "licenses",
        }
    }

    /// Path relative to the reference root
    pub fn path(&self) -> &'static str {
        match self {
            ReferenceKey::Sdgs => "classifications/sdgs.json",
            ReferenceKey::WhoSystem => "classifications/who.json",
            ReferenceKey::Wmo => "classifications/wmo.json",
            ReferenceKey::Dpi => "classifications/dpi.json",
            ReferenceKey::HealthStandards => "standards/health.json",
            ReferenceKey::InteropStandards => "standards/interoperability.json",
            ReferenceKey::ClimateStandards => "standards/climate.json",
            ReferenceKey::Countries => "countries.json",
            ReferenceKey::Licenses => "licenses.json",
        }
    }

    /// Standards tables get the alias fallback pass.
    pub fn is_standard(&self) -> bool {
        matches!(
            self,
            ReferenceKey::HealthStandards
                | ReferenceKey::InteropStandards
                | ReferenceKey::ClimateStandards
        )
    }

    pub fn parse(key: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|k| k.as_str() == key)
    }
}

impl std::fmt::Display for ReferenceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Reference set
// =============================================================================

/// Snapshot of every loaded table, used for code resolution.
#[derive(Debug, Clone, Default)]
pub struct ReferenceSet {
    tables: HashMap<ReferenceKey, Arc<ReferenceTable>>,
    aliases: Vec<AliasRule>,
}

impl ReferenceSet {
    pub fn new(aliases: Vec<AliasRule>) -> Self {
        Self {
            tables: HashMap::new(),
            aliases,
        }
    }

    pub fn insert(&mut self, key: ReferenceKey, table: Arc<ReferenceTable>) {
        self.tables.insert(key, table);
    }

    pub fn with_table(mut self, key: ReferenceKey, table: ReferenceTable) -> Self {
        self.insert(key, Arc::new(table));
        self
    }

    pub fn table(&self, key: ReferenceKey) -> Option<&Arc<ReferenceTable>> {
        self.tables.get(&key)
    }

    /// Whether every domain is present.
    pub fn is_complete(&self) -> bool {
        ReferenceKey::ALL.iter().all(|k| self.tables.contains_key(k))
    }

    /// Resolve one code. Missing table or unknown code yields `None`.
    pub fn resolve(&self, key: ReferenceKey, code: &str) -> Option<Value> {
        let table = self.tables.get(&key)?;
        let aliases: &[AliasRule] = if key.is_standard() { &self.aliases } else { &[] };
        resolve_reference(code, table, aliases)
    }

    /// Resolve every code, dropping the ones that do not resolve.
    pub fn resolve_all(&self, key: ReferenceKey, codes: &CodeList) -> Vec<Value> {
        codes.iter().filter_map(|code| self.resolve(key, code)).collect()
    }
}

// =============================================================================
// Reference catalog
// =============================================================================

/// Cached access to reference tables from a [`CatalogSource`].
///
/// Also owns the readiness signal handed to the progressive resolver: it
/// flips to `true` once every table has been loaded.
pub struct ReferenceCatalog {
    source: Arc<dyn CatalogSource>,
    cache: Arc<ReferenceCache<ReferenceTable>>,
    aliases: Vec<AliasRule>,
    ready_tx: watch::Sender<bool>,
}

impl ReferenceCatalog {
    pub fn new(
        source: Arc<dyn CatalogSource>,
        cache: Arc<ReferenceCache<ReferenceTable>>,
        aliases: Vec<AliasRule>,
    ) -> Self {
        let (ready_tx, _) = watch::channel(false);
        Self {
            source,
            cache,
            aliases,
            ready_tx,
        }
    }

    /// Get one table, loading it on first use.
    pub async fn table(&self, key: ReferenceKey) -> Result<Arc<ReferenceTable>> {
        let source = self.source.clone();
        self.cache
            .get(key.as_str(), || async move {
                let raw = source.fetch_reference(key).await.map_err(|e| {
                    CatalogError::ReferenceLoad {
                        key: key.as_str().to_string(),
                        reason: e.to_string(),
                    }
                })?;
                ReferenceTable::from_value(key.as_str(), raw)
            })
            .await
    }

    /// Load every table concurrently and return a resolution snapshot.
    ///
    /// Marks the catalog ready on success.
    pub async fn load_all(&self) -> Result<ReferenceSet> {
        let loads = ReferenceKey::ALL.iter().map(|&key| async move {
            let table = self.table(key).await?;
            Ok::<_, CatalogError>((key, table))
        });

        let tables = match try_join_all(loads).await {
            Ok(tables) => tables,
            Err(e) => {
                warn!(error = %e, "Reference warm-up failed");
                return Err(e);
            }
        };

        let mut set = ReferenceSet::new(self.aliases.clone());
        for (key, table) in tables {
            set.insert(key, table);
        }

        info!(
            tables = ReferenceKey::ALL.len(),
            source = %self.source.describe(),
            "Reference tables loaded"
        );
        self.ready_tx.send_replace(true);
        Ok(set)
    }

    /// Receiver that turns `true` once reference data is loaded.
    pub fn readiness(&self) -> watch::Receiver<bool> {
        self.ready_tx.subscribe()
    }

    pub fn is_ready(&self) -> bool {
        *self.ready_tx.borrow()
    }

    /// Drop all cached tables (admin cache-bust).
    pub fn clear(&self) {
        self.cache.clear();
        self.ready_tx.send_replace(false);
        info!("Reference cache cleared");
    }

    pub fn stats(&self) -> ReferenceCacheStats {
        self.cache.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSource {
        fetches: AtomicUsize,
        fail_key: Option<ReferenceKey>,
    }

    #[async_trait]
    impl CatalogSource for CountingSource {
        async fn fetch_index(&self) -> Result<Vec<Value>> {
            Ok(vec![])
        }

        async fn fetch_record(&self, id: &str) -> Result<Value> {
            Err(CatalogError::NotFound(id.to_string()))
        }

        async fn fetch_reference(&self, key: ReferenceKey) -> Result<Value> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            if Some(key) == self.fail_key {
                return Err(CatalogError::NotFound(key.to_string()));
            }
            Ok(json!([{"code": format!("{}-1", key.as_str())}]))
        }

        fn describe(&self) -> String {
            "counting".into()
        }
    }

    fn catalog(fail_key: Option<ReferenceKey>) -> (Arc<CountingSource>, ReferenceCatalog) {
        let source = Arc::new(CountingSource {
            fetches: AtomicUsize::new(0),
            fail_key,
        });
        let catalog = ReferenceCatalog::new(
            source.clone(),
            Arc::new(ReferenceCache::new()),
            default_aliases(),
        );
        (source, catalog)
    }

    #[test]
    fn test_key_roundtrip() {
        for key in ReferenceKey::ALL {
            assert_eq!(ReferenceKey::parse(key.as_str()), Some(key));
        }
        assert_eq!(ReferenceKey::parse("nope"), None);
    }

    #[tokio::test]
    async fn test_load_all_once_and_ready() {
        let (source, catalog) = catalog(None);
        let mut ready = catalog.readiness();
        assert!(!*ready.borrow());

        let set = catalog.load_all().await.unwrap();
        assert!(set.is_complete());
        assert!(ready.has_changed().unwrap());
        assert!(*ready.borrow_and_update());

        catalog.load_all().await.unwrap();
        assert_eq!(source.fetches.load(Ordering::SeqCst), ReferenceKey::ALL.len());
        assert_eq!(
            set.resolve(ReferenceKey::Sdgs, "sdgs-1").unwrap()["code"],
            "sdgs-1"
        );
    }

    #[tokio::test]
    async fn test_load_all_failure_keeps_other_tables() {
        let (_, catalog) = catalog(Some(ReferenceKey::Countries));
        let err = catalog.load_all().await.unwrap_err();
        assert!(matches!(err, CatalogError::ReferenceLoad { .. }));
        assert!(!catalog.is_ready());
        assert!(catalog.table(ReferenceKey::Sdgs).await.is_ok());
    }

    #[tokio::test]
    async fn test_clear_resets_readiness() {
        let (source, catalog) = catalog(None);
        catalog.load_all().await.unwrap();
        catalog.clear();
        assert!(!catalog.is_ready());
        catalog.load_all().await.unwrap();
        assert_eq!(source.fetches.load(Ordering::SeqCst), 2 * ReferenceKey::ALL.len());
    }

    #[test]
    fn test_aliases_only_for_standards() {
        let table = ReferenceTable::from_value("t", json!([{"code": "HL7 FHIR"}])).unwrap();
        let set = ReferenceSet::new(default_aliases())
            .with_table(ReferenceKey::InteropStandards, table.clone())
            .with_table(ReferenceKey::Sdgs, table);
        assert!(set.resolve(ReferenceKey::InteropStandards, "fhir").is_some());
        assert!(set.resolve(ReferenceKey::Sdgs, "fhir-r4").is_none());
    }
}
