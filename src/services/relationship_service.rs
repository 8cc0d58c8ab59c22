//! Relationship service - related-content queries over the loaded corpus
//!
//! Holds the current [`Corpus`] behind a lock so a rebuild can swap in a
//! fresh one while queries keep reading the old snapshot.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::info;

use crate::config::Config;
use crate::error::{CatalogError, Result};
use crate::record::EntityKind;
use crate::relations::{Corpus, GoodUseCases, RelationKind, RelationshipEdge, RelationshipEngine};
use crate::tiers::RESOLVED_FILE;

/// Relationship service for related-content queries
pub struct RelationshipService {
    engine: RelationshipEngine,
    corpus: RwLock<Arc<Corpus>>,
    resolved_tier: PathBuf,
    goods_dir: PathBuf,
    use_cases_dir: PathBuf,
}

impl RelationshipService {
    /// Create a service with an empty corpus; call [`reload`](Self::reload).
    pub fn new(
        engine: RelationshipEngine,
        resolved_tier: PathBuf,
        goods_dir: PathBuf,
        use_cases_dir: PathBuf,
    ) -> Self {
        Self {
            engine,
            corpus: RwLock::new(Arc::new(Corpus::default())),
            resolved_tier,
            goods_dir,
            use_cases_dir,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            RelationshipEngine::new(config.weights.clone()),
            config.output_dir().join(RESOLVED_FILE),
            config.records_dir(),
            config.use_cases_dir(),
        )
    }

    /// Reread the corpus from disk. Returns `(goods, use_cases)` counts.
    pub async fn reload(&self) -> Result<(usize, usize)> {
        let corpus = Corpus::load(&self.resolved_tier, &self.goods_dir, &self.use_cases_dir).await?;
        let counts = (corpus.goods.len(), corpus.use_cases.len());
        *self.corpus.write().await = Arc::new(corpus);
        info!(goods = counts.0, use_cases = counts.1, "Relationship corpus reloaded");
        Ok(counts)
    }

    pub async fn corpus(&self) -> Arc<Corpus> {
        self.corpus.read().await.clone()
    }

    pub async fn related(&self, kind: RelationKind, subject_id: &str) -> Result<Vec<RelationshipEdge>> {
        let corpus = self.corpus().await;
        self.engine.related(subject_id, &corpus, kind)
    }

    /// Direct and scored use cases for a good, kept apart.
    pub async fn use_cases_for_good(&self, good_id: &str) -> Result<GoodUseCases> {
        let corpus = self.corpus().await;
        let good = corpus
            .find(EntityKind::GlobalGood, good_id)
            .ok_or_else(|| CatalogError::NotFound(good_id.to_string()))?;
        Ok(self.engine.use_cases_for_good(good, &corpus.use_cases))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_reload_from_disk() {
        let dir = tempfile::TempDir::new().unwrap();
        let goods = dir.path().join("individual");
        let use_cases = dir.path().join("use-cases");
        std::fs::create_dir_all(&goods).unwrap();
        std::fs::create_dir_all(&use_cases).unwrap();
        std::fs::write(
            goods.join("dhis2.json"),
            json!({"ID": "dhis2", "Name": "DHIS2", "Classifications": {"SDGs": ["SDG-3"]}}).to_string(),
        )
        .unwrap();
        std::fs::write(
            use_cases.join("uc-1.json"),
            json!({"ID": "uc-1", "GlobalGoods": ["dhis2"]}).to_string(),
        )
        .unwrap();

        let service = RelationshipService::new(
            RelationshipEngine::default(),
            dir.path().join(RESOLVED_FILE),
            goods,
            use_cases,
        );
        assert_eq!(service.reload().await.unwrap(), (1, 1));

        let result = service.use_cases_for_good("dhis2").await.unwrap();
        assert_eq!(result.direct.len(), 1);
        assert!(result.related.is_empty());

        let edges = service.related(RelationKind::GoodUseCases, "dhis2").await.unwrap();
        assert!(edges[0].is_directly_referenced);
        assert!(matches!(
            service.related(RelationKind::UseCases, "dhis2").await,
            Err(CatalogError::NotFound(_))
        ));
    }
}
