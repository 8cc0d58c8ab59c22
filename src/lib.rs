//! DPG Catalog - data-resolution and relationship core for a catalog of
//! digital public goods and the use cases that adopt them
//!
//! ## Architecture
//!
//! ```text
//! individual/*.json ─► normalize ─► TierCompiler ─► index-{minimal,summary,resolved}.json
//!                                        ▲
//! reference/*.json ─► ReferenceCatalog ──┤ (ReferenceCache: one load per table)
//!                                        ▼
//!                     ProgressiveResolver ─► Basic ─► Detailed ─► Complete
//!                                                (ResolvedEntityCache, 10 min TTL)
//! goods + use cases ─► RelationshipEngine ─► ranked, evidenced edges
//! ```
//!
//! ## Data Layout
//!
//! ```text
//! <data_dir>/
//! ├── individual/<ID>.json     # raw global-good records
//! ├── use-cases/<ID>.json      # raw use-case records
//! ├── reference/               # classification, standard, country, license tables
//! ├── index-minimal.json       # compiled tiers
//! ├── index-summary.json
//! ├── index-resolved.json
//! ├── index.json               # = summary
//! └── config.toml
//! ```

pub mod compiler;
pub mod config;
pub mod error;
pub mod http;
pub mod normalize;
pub mod record;
pub mod reference;
pub mod relations;
pub mod resolver;
pub mod services;
pub mod source;
pub mod tiers;

// Re-exports
pub use compiler::{CompileReport, TierCompiler};
pub use config::Config;
pub use error::{CatalogError, Result};
pub use http::HttpServer;
pub use normalize::{normalize, CodeList};
pub use reference::{ReferenceCache, ReferenceCatalog, ReferenceKey, ReferenceSet, ReferenceTable};
pub use relations::{Corpus, RelationKind, RelationshipEdge, RelationshipEngine};
pub use resolver::{Phase, ProgressiveResolver, ResolutionState, ResolvedEntityCache};
pub use services::Services;
pub use source::{CatalogSource, FsSource, HttpSource};
