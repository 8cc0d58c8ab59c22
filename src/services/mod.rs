//! Service layer for dpg-catalog
//!
//! Services sit between HTTP handlers and the core pipeline:
//!
//! ```text
//! HTTP Handlers (thin)
//!     ↓
//! Service Layer (auth, orchestration, corpus snapshots)
//!     ↓
//! Core (compiler, resolver, relations, reference)
//! ```

pub mod rebuild_service;
pub mod relationship_service;
pub mod response;

pub use rebuild_service::{extract_token_from_header, RebuildResponse, RebuildService};
pub use relationship_service::RelationshipService;
pub use response::*;

use std::sync::Arc;

use crate::compiler::TierCompiler;
use crate::config::Config;
use crate::reference::{ReferenceCache, ReferenceCatalog};
use crate::resolver::{ProgressiveResolver, ResolvedCacheConfig, ResolvedEntityCache};
use crate::source::CatalogSource;

/// Service container for dependency injection
///
/// Every cache is constructed here once and shared by `Arc`.
pub struct Services {
    pub catalog: Arc<ReferenceCatalog>,
    pub resolver: Arc<ProgressiveResolver>,
    pub relationships: Arc<RelationshipService>,
    pub rebuild: Arc<RebuildService>,
}

impl Services {
    pub fn new(config: &Config, source: Arc<dyn CatalogSource>) -> Self {
        let catalog = Arc::new(ReferenceCatalog::new(
            source.clone(),
            Arc::new(ReferenceCache::new()),
            config.aliases.clone(),
        ));

        let resolved_cache = Arc::new(ResolvedEntityCache::new(ResolvedCacheConfig {
            default_ttl: config.resolved_ttl(),
            max_entries: config.resolved_max_entries,
        }));
        let resolver = Arc::new(ProgressiveResolver::new(
            source,
            catalog.clone(),
            resolved_cache,
            catalog.readiness(),
        ));

        let relationships = Arc::new(RelationshipService::from_config(config));
        let rebuild = Arc::new(RebuildService::new(
            config.admin_token.clone(),
            catalog.clone(),
            TierCompiler::new(config.records_dir(), config.output_dir()),
            resolver.clone(),
            relationships.clone(),
        ));

        Self {
            catalog,
            resolver,
            relationships,
            rebuild,
        }
    }
}
