//! Relationship Engine - weighted overlap scoring between catalog entities
//!
//! Three relations are supported, each with its own weights and result cap:
//!
//! | Relation | Dimensions | Cap |
//! |----------|------------|-----|
//! | goods ↔ goods | SDG, WHO system, WMO, DPI, health/interop standards, type | 6 |
//! | use case ↔ use case | SDG, WHO system, standards, shared goods, keywords, country, sector | 6 |
//! | good → use cases | SDG, WHO system, standards, keywords | 4 |
//!
//! Every contributing dimension adds `weight × matches` to the score (keywords
//! are capped). Candidates with score 0 and the subject itself are dropped.
//! Ranking is by descending score; ties keep corpus order and nothing else.
//!
//! Use cases that name a good in their `GlobalGoods` list are returned
//! separately for that good, flagged `is_directly_referenced`, and never
//! scored.

use std::collections::BTreeSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::compiler::read_records;
use crate::error::{CatalogError, Result};
use crate::normalize::{normalize_entity_refs, CodeList};
use crate::record::{self, fields, EntityKind};

// =============================================================================
// Weights
// =============================================================================

/// Weights for goods ↔ goods.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GoodsWeights {
    pub sdg: u32,
    pub who_system: u32,
    pub wmo: u32,
    pub dpi: u32,
    pub health_standard: u32,
    pub interoperability: u32,
    pub entity_type: u32,
    pub limit: usize,
}

impl Default for GoodsWeights {
    fn default() -> Self {
        Self {
            sdg: 3,
            who_system: 2,
            wmo: 2,
            dpi: 2,
            health_standard: 2,
            // strongest technical-compatibility signal
            interoperability: 3,
            entity_type: 1,
            limit: 6,
        }
    }
}

/// Weights for use case ↔ use case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UseCaseWeights {
    pub sdg: u32,
    pub who_system: u32,
    pub standard: u32,
    pub global_good: u32,
    pub keyword: u32,
    pub keyword_cap: u32,
    pub country: u32,
    pub sector: u32,
    pub limit: usize,
}

impl Default for UseCaseWeights {
    fn default() -> Self {
        Self {
            sdg: 5,
            who_system: 3,
            standard: 4,
            global_good: 3,
            keyword: 1,
            keyword_cap: 3,
            country: 1,
            sector: 1,
            limit: 6,
        }
    }
}

/// Weights for good → use cases.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GoodToUseCaseWeights {
    pub sdg: u32,
    pub who_system: u32,
    pub standard: u32,
    pub keyword: u32,
    pub keyword_cap: u32,
    pub limit: usize,
}

impl Default for GoodToUseCaseWeights {
    fn default() -> Self {
        Self {
            sdg: 3,
            who_system: 2,
            standard: 3,
            keyword: 1,
            keyword_cap: 3,
            limit: 4,
        }
    }
}

/// All relationship weights and caps.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelationshipWeights {
    pub goods: GoodsWeights,
    pub use_cases: UseCaseWeights,
    pub good_to_use_cases: GoodToUseCaseWeights,
}

// =============================================================================
// Entities
// =============================================================================

const STOPWORDS: &[&str] = &[
    "about", "across", "also", "based", "been", "being", "both", "from", "have",
    "into", "more", "other", "such", "that", "their", "them", "these", "they",
    "this", "through", "used", "using", "when", "where", "which", "while", "will",
    "with", "within",
];

fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|word| word.chars().count() >= 4)
        .map(str::to_lowercase)
        .filter(|word| !STOPWORDS.contains(&word.as_str()))
}

/// Free text at a path: a string, or the strings of an array.
fn text_at(raw: &Value, path: &str) -> Vec<String> {
    match record::lookup(raw, path) {
        Some(Value::String(s)) => vec![s.clone()],
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| {
                item.as_str()
                    .or_else(|| item.get("name").and_then(Value::as_str))
                    .map(str::to_string)
            })
            .collect(),
        _ => vec![],
    }
}

fn keywords_from(raw: &Value, paths: &[&str]) -> BTreeSet<String> {
    paths
        .iter()
        .flat_map(|path| text_at(raw, path))
        .flat_map(|text| tokenize(&text).collect::<Vec<_>>())
        .collect()
}

/// The scoring view of one good or use case.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogEntity {
    pub id: String,
    pub name: String,
    pub kind: EntityKind,
    pub sdgs: CodeList,
    pub who_system: CodeList,
    pub wmo: CodeList,
    pub dpi: CodeList,
    pub health_standards: CodeList,
    pub interoperability: CodeList,
    /// Every standard, whatever its category
    pub standards: CodeList,
    pub types: CodeList,
    /// Goods a use case references (empty for goods)
    pub global_goods: CodeList,
    pub keywords: BTreeSet<String>,
    pub country: Option<String>,
    pub sector: Option<String>,
}

impl CatalogEntity {
    /// Build from a raw or resolved record. `None` when it has no `ID`.
    pub fn from_record(kind: EntityKind, raw: &Value) -> Option<Self> {
        let id = record::record_id(raw)?.to_string();
        let name = record::str_at(raw, fields::NAME).unwrap_or(&id).to_string();

        let entity = match kind {
            EntityKind::GlobalGood => {
                let health_standards = record::codes_at(raw, &[fields::HEALTH_STANDARDS]);
                let interoperability = record::codes_at(raw, &[fields::INTEROPERABILITY]);
                let standards = record::codes_at(
                    raw,
                    &[
                        fields::HEALTH_STANDARDS,
                        fields::INTEROPERABILITY,
                        fields::CLIMATE_STANDARDS,
                    ],
                );
                Self {
                    sdgs: record::codes_at(raw, &[fields::SDGS]),
                    who_system: record::codes_at(raw, &[fields::WHO_SYSTEM]),
                    wmo: record::codes_at(raw, &[fields::WMO]),
                    dpi: record::codes_at(raw, &[fields::DPI]),
                    health_standards,
                    interoperability,
                    standards,
                    types: record::codes_at(raw, &[fields::GLOBAL_GOODS_TYPE]),
                    global_goods: CodeList::new(),
                    keywords: keywords_from(raw, &[fields::NAME, fields::OVERVIEW_SUMMARY]),
                    country: None,
                    sector: None,
                    id,
                    name,
                    kind,
                }
            }
            EntityKind::UseCase => Self {
                sdgs: record::codes_at(raw, &[fields::USE_CASE_SDGS, fields::SDGS]),
                who_system: record::codes_at(raw, &[fields::USE_CASE_WHO_SYSTEM, fields::WHO_SYSTEM]),
                wmo: CodeList::new(),
                dpi: CodeList::new(),
                health_standards: CodeList::new(),
                interoperability: CodeList::new(),
                standards: record::codes_at(
                    raw,
                    &[
                        fields::USE_CASE_STANDARDS,
                        fields::HEALTH_STANDARDS,
                        fields::INTEROPERABILITY,
                        fields::CLIMATE_STANDARDS,
                    ],
                ),
                types: CodeList::new(),
                global_goods: normalize_entity_refs(record::lookup(raw, fields::GLOBAL_GOODS)),
                keywords: keywords_from(raw, &[fields::PURPOSE, fields::ACTORS, fields::SCOPE]),
                country: record::str_at(raw, fields::COUNTRY).map(str::to_string),
                sector: record::str_at(raw, fields::SECTOR).map(str::to_string),
                id,
                name,
                kind,
            },
        };
        Some(entity)
    }

    /// Whether this use case names `good` by ID or name.
    pub fn references_good(&self, good: &CatalogEntity) -> bool {
        self.global_goods.iter().any(|reference| {
            reference.eq_ignore_ascii_case(&good.id) || reference.eq_ignore_ascii_case(&good.name)
        })
    }
}

// =============================================================================
// Edges
// =============================================================================

/// Matched codes per dimension group, sorted.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SharedEvidence {
    pub classifications: Vec<String>,
    pub standards: Vec<String>,
    pub global_goods: Vec<String>,
    pub actors: Vec<String>,
}

/// A scored link from a subject to a candidate.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationshipEdge {
    #[serde(rename = "subjectID")]
    pub subject_id: String,
    #[serde(rename = "candidateID")]
    pub candidate_id: String,
    pub candidate_name: String,
    pub score: u32,
    pub shared_evidence: SharedEvidence,
    pub reasons: Vec<String>,
    pub is_directly_referenced: bool,
}

/// Use cases for one good: explicit references first, then scored matches.
#[derive(Debug, Clone, Default, Serialize)]
pub struct GoodUseCases {
    pub direct: Vec<RelationshipEdge>,
    pub related: Vec<RelationshipEdge>,
}

impl GoodUseCases {
    pub fn into_edges(self) -> Vec<RelationshipEdge> {
        let mut edges = self.direct;
        edges.extend(self.related);
        edges
    }
}

/// Which relation to compute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RelationKind {
    Goods,
    UseCases,
    GoodUseCases,
}

impl RelationKind {
    pub fn parse(kind: &str) -> Option<Self> {
        match kind {
            "goods" => Some(RelationKind::Goods),
            "use-cases" => Some(RelationKind::UseCases),
            "good-use-cases" => Some(RelationKind::GoodUseCases),
            _ => None,
        }
    }

    /// Kind of entity the subject ID refers to.
    pub fn subject_kind(&self) -> EntityKind {
        match self {
            RelationKind::Goods | RelationKind::GoodUseCases => EntityKind::GlobalGood,
            RelationKind::UseCases => EntityKind::UseCase,
        }
    }
}

// =============================================================================
// Scoring
// =============================================================================

#[derive(Debug, Clone, Copy)]
enum Dimension {
    Sdg,
    WhoSystem,
    Wmo,
    Dpi,
    HealthStandard,
    Interoperability,
    Standard,
    EntityType,
    GlobalGood,
    Keyword,
    Country,
    Sector,
}

impl Dimension {
    fn reason(&self, matched: &BTreeSet<String>) -> String {
        let n = matched.len();
        let first = matched.iter().next().map(String::as_str).unwrap_or_default();
        let list = || matched.iter().cloned().collect::<Vec<_>>().join(", ");
        match (self, n) {
            (Dimension::Sdg, 1) => format!("Both target {}", first),
            (Dimension::Sdg, _) => format!("Both target {} SDGs ({})", n, list()),
            (Dimension::WhoSystem, 1) => format!("Same WHO system category: {}", first),
            (Dimension::WhoSystem, _) => format!("Share {} WHO system categories", n),
            (Dimension::Wmo, 1) => format!("Same WMO category: {}", first),
            (Dimension::Wmo, _) => format!("Share {} WMO categories", n),
            (Dimension::Dpi, 1) => format!("Same DPI classification: {}", first),
            (Dimension::Dpi, _) => format!("Share {} DPI classifications", n),
            (Dimension::HealthStandard, 1) => format!("Both use health standard {}", first),
            (Dimension::HealthStandard, _) => format!("Share {} health standards", n),
            (Dimension::Interoperability, 1) => format!("Both support {}", first),
            (Dimension::Interoperability, _) => format!("Share {} interoperability standards", n),
            (Dimension::Standard, 1) => format!("Both use {}", first),
            (Dimension::Standard, _) => format!("Share {} technical standards", n),
            (Dimension::EntityType, 1) => format!("Same type: {}", first),
            (Dimension::EntityType, _) => format!("Share {} types", n),
            (Dimension::GlobalGood, 1) => format!("Both use {}", first),
            (Dimension::GlobalGood, _) => format!("Share {} global goods", n),
            (Dimension::Keyword, _) => format!("Similar actors or purpose: {}", list()),
            (Dimension::Country, _) => format!("Same country: {}", first),
            (Dimension::Sector, _) => format!("Same sector: {}", first),
        }
    }
}

#[derive(Default)]
struct Scoring {
    score: u32,
    classifications: BTreeSet<String>,
    standards: BTreeSet<String>,
    global_goods: BTreeSet<String>,
    actors: BTreeSet<String>,
    reasons: Vec<String>,
}

impl Scoring {
    /// Add `weight` per match, up to `cap` for this dimension.
    fn add(&mut self, dimension: Dimension, weight: u32, matched: BTreeSet<String>, cap: Option<u32>) {
        if weight == 0 || matched.is_empty() {
            return;
        }
        let mut contribution = weight.saturating_mul(matched.len() as u32);
        if let Some(cap) = cap {
            contribution = contribution.min(cap);
        }
        self.score = self.score.saturating_add(contribution);

        let reason = dimension.reason(&matched);
        if !self.reasons.contains(&reason) {
            self.reasons.push(reason);
        }

        let bucket = match dimension {
            Dimension::Sdg
            | Dimension::WhoSystem
            | Dimension::Wmo
            | Dimension::Dpi
            | Dimension::EntityType => &mut self.classifications,
            Dimension::HealthStandard | Dimension::Interoperability | Dimension::Standard => {
                &mut self.standards
            }
            Dimension::GlobalGood => &mut self.global_goods,
            Dimension::Keyword => &mut self.actors,
            Dimension::Country | Dimension::Sector => return,
        };
        bucket.extend(matched);
    }

    fn into_edge(self, subject: &CatalogEntity, candidate: &CatalogEntity) -> RelationshipEdge {
        RelationshipEdge {
            subject_id: subject.id.clone(),
            candidate_id: candidate.id.clone(),
            candidate_name: candidate.name.clone(),
            score: self.score,
            shared_evidence: SharedEvidence {
                classifications: self.classifications.into_iter().collect(),
                standards: self.standards.into_iter().collect(),
                global_goods: self.global_goods.into_iter().collect(),
                actors: self.actors.into_iter().collect(),
            },
            reasons: self.reasons,
            is_directly_referenced: false,
        }
    }
}

fn shared(a: &CodeList, b: &CodeList) -> BTreeSet<String> {
    a.iter().filter(|code| b.contains(code)).cloned().collect()
}

fn shared_keywords(a: &BTreeSet<String>, b: &BTreeSet<String>) -> BTreeSet<String> {
    a.intersection(b).cloned().collect()
}

fn same_scalar(a: &Option<String>, b: &Option<String>) -> BTreeSet<String> {
    match (a, b) {
        (Some(a), Some(b)) if a.eq_ignore_ascii_case(b) => BTreeSet::from([a.clone()]),
        _ => BTreeSet::new(),
    }
}

/// Keep positive scores, drop the subject, stable-sort by score, cap.
fn rank(subject: &CatalogEntity, mut edges: Vec<RelationshipEdge>, limit: usize) -> Vec<RelationshipEdge> {
    edges.retain(|edge| edge.score > 0 && edge.candidate_id != subject.id);
    // sort_by is stable: equal scores keep corpus order
    edges.sort_by(|a, b| b.score.cmp(&a.score));
    edges.truncate(limit);
    edges
}

/// Stateless scorer over two entity collections.
#[derive(Debug, Clone, Default)]
pub struct RelationshipEngine {
    weights: RelationshipWeights,
}

impl RelationshipEngine {
    pub fn new(weights: RelationshipWeights) -> Self {
        Self { weights }
    }

    /// Score one good against another.
    pub fn score_goods(&self, subject: &CatalogEntity, candidate: &CatalogEntity) -> RelationshipEdge {
        let w = &self.weights.goods;
        let mut scoring = Scoring::default();
        scoring.add(Dimension::Sdg, w.sdg, shared(&subject.sdgs, &candidate.sdgs), None);
        scoring.add(Dimension::WhoSystem, w.who_system, shared(&subject.who_system, &candidate.who_system), None);
        scoring.add(Dimension::Wmo, w.wmo, shared(&subject.wmo, &candidate.wmo), None);
        scoring.add(Dimension::Dpi, w.dpi, shared(&subject.dpi, &candidate.dpi), None);
        scoring.add(
            Dimension::HealthStandard,
            w.health_standard,
            shared(&subject.health_standards, &candidate.health_standards),
            None,
        );
        scoring.add(
            Dimension::Interoperability,
            w.interoperability,
            shared(&subject.interoperability, &candidate.interoperability),
            None,
        );
        scoring.add(Dimension::EntityType, w.entity_type, shared(&subject.types, &candidate.types), None);
        scoring.into_edge(subject, candidate)
    }

    /// Score one use case against another.
    pub fn score_use_cases(&self, subject: &CatalogEntity, candidate: &CatalogEntity) -> RelationshipEdge {
        let w = &self.weights.use_cases;
        let mut scoring = Scoring::default();
        scoring.add(Dimension::Sdg, w.sdg, shared(&subject.sdgs, &candidate.sdgs), None);
        scoring.add(Dimension::WhoSystem, w.who_system, shared(&subject.who_system, &candidate.who_system), None);
        scoring.add(Dimension::Standard, w.standard, shared(&subject.standards, &candidate.standards), None);
        scoring.add(
            Dimension::GlobalGood,
            w.global_good,
            shared(&subject.global_goods, &candidate.global_goods),
            None,
        );
        scoring.add(
            Dimension::Keyword,
            w.keyword,
            shared_keywords(&subject.keywords, &candidate.keywords),
            Some(w.keyword_cap),
        );
        scoring.add(Dimension::Country, w.country, same_scalar(&subject.country, &candidate.country), None);
        scoring.add(Dimension::Sector, w.sector, same_scalar(&subject.sector, &candidate.sector), None);
        scoring.into_edge(subject, candidate)
    }

    /// Score a use case as related content for a good.
    pub fn score_good_use_case(&self, good: &CatalogEntity, use_case: &CatalogEntity) -> RelationshipEdge {
        let w = &self.weights.good_to_use_cases;
        let mut scoring = Scoring::default();
        scoring.add(Dimension::Sdg, w.sdg, shared(&good.sdgs, &use_case.sdgs), None);
        scoring.add(Dimension::WhoSystem, w.who_system, shared(&good.who_system, &use_case.who_system), None);
        scoring.add(Dimension::Standard, w.standard, shared(&good.standards, &use_case.standards), None);
        scoring.add(
            Dimension::Keyword,
            w.keyword,
            shared_keywords(&good.keywords, &use_case.keywords),
            Some(w.keyword_cap),
        );
        scoring.into_edge(good, use_case)
    }

    pub fn related_goods(&self, subject: &CatalogEntity, goods: &[CatalogEntity]) -> Vec<RelationshipEdge> {
        let edges = goods
            .iter()
            .filter(|candidate| candidate.id != subject.id)
            .map(|candidate| self.score_goods(subject, candidate))
            .collect();
        rank(subject, edges, self.weights.goods.limit)
    }

    pub fn related_use_cases(&self, subject: &CatalogEntity, use_cases: &[CatalogEntity]) -> Vec<RelationshipEdge> {
        let edges = use_cases
            .iter()
            .filter(|candidate| candidate.id != subject.id)
            .map(|candidate| self.score_use_cases(subject, candidate))
            .collect();
        rank(subject, edges, self.weights.use_cases.limit)
    }

    /// Use cases for a good: direct references (unscored, uncapped, corpus
    /// order) and the top scored matches among the rest.
    pub fn use_cases_for_good(&self, good: &CatalogEntity, use_cases: &[CatalogEntity]) -> GoodUseCases {
        let mut result = GoodUseCases::default();
        let mut scored = Vec::new();

        for use_case in use_cases {
            if use_case.references_good(good) {
                result.direct.push(RelationshipEdge {
                    subject_id: good.id.clone(),
                    candidate_id: use_case.id.clone(),
                    candidate_name: use_case.name.clone(),
                    score: 0,
                    shared_evidence: SharedEvidence {
                        global_goods: vec![good.id.clone()],
                        ..Default::default()
                    },
                    reasons: vec![format!("References {}", good.name)],
                    is_directly_referenced: true,
                });
            } else {
                scored.push(self.score_good_use_case(good, use_case));
            }
        }

        result.related = rank(good, scored, self.weights.good_to_use_cases.limit);
        result
    }

    /// Related entities for `subject_id` within `corpus`.
    pub fn related(&self, subject_id: &str, corpus: &Corpus, kind: RelationKind) -> Result<Vec<RelationshipEdge>> {
        let subject = corpus
            .find(kind.subject_kind(), subject_id)
            .ok_or_else(|| CatalogError::NotFound(subject_id.to_string()))?;

        let edges = match kind {
            RelationKind::Goods => self.related_goods(subject, &corpus.goods),
            RelationKind::UseCases => self.related_use_cases(subject, &corpus.use_cases),
            RelationKind::GoodUseCases => self.use_cases_for_good(subject, &corpus.use_cases).into_edges(),
        };
        debug!(subject = %subject_id, kind = ?kind, edges = edges.len(), "Related entities computed");
        Ok(edges)
    }
}

// =============================================================================
// Corpus
// =============================================================================

/// Goods and use cases, each sorted by ID.
#[derive(Debug, Clone, Default)]
pub struct Corpus {
    pub goods: Vec<CatalogEntity>,
    pub use_cases: Vec<CatalogEntity>,
}

/// Sorted by ID; of several records sharing an ID the one whose canonical
/// JSON sorts first is kept.
fn entities(kind: EntityKind, records: impl IntoIterator<Item = Value>) -> Vec<CatalogEntity> {
    let mut records: Vec<Value> = records.into_iter().collect();
    records.sort_by_cached_key(|raw| raw.to_string());
    let mut entities: Vec<CatalogEntity> = records
        .iter()
        .filter_map(|raw| CatalogEntity::from_record(kind, raw))
        .collect();
    entities.sort_by(|a, b| a.id.cmp(&b.id));
    entities.dedup_by(|a, b| a.id == b.id);
    entities
}

impl Corpus {
    pub fn from_records(
        goods: impl IntoIterator<Item = Value>,
        use_cases: impl IntoIterator<Item = Value>,
    ) -> Self {
        Self {
            goods: entities(EntityKind::GlobalGood, goods),
            use_cases: entities(EntityKind::UseCase, use_cases),
        }
    }

    /// Load goods from the resolved tier when present, else from the
    /// records directory; use cases from their directory.
    pub async fn load(resolved_tier: &Path, goods_dir: &Path, use_cases_dir: &Path) -> Result<Self> {
        let goods = match tokio::fs::read(resolved_tier).await {
            Ok(bytes) => match serde_json::from_slice::<Vec<Value>>(&bytes) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!(path = %resolved_tier.display(), error = %e, "Resolved tier unreadable, using records");
                    Self::read_dir(goods_dir).await?
                }
            },
            Err(_) => Self::read_dir(goods_dir).await?,
        };
        let use_cases = Self::read_dir(use_cases_dir).await?;

        let corpus = Self::from_records(goods, use_cases);
        debug!(
            goods = corpus.goods.len(),
            use_cases = corpus.use_cases.len(),
            "Relationship corpus loaded"
        );
        Ok(corpus)
    }

    /// A missing directory is an empty collection.
    async fn read_dir(dir: &Path) -> Result<Vec<Value>> {
        if !tokio::fs::try_exists(dir).await.unwrap_or(false) {
            return Ok(vec![]);
        }
        let batch = read_records(dir).await?;
        Ok(batch.records.into_iter().map(|(_, raw)| raw).collect())
    }

    pub fn find(&self, kind: EntityKind, id: &str) -> Option<&CatalogEntity> {
        let list = match kind {
            EntityKind::GlobalGood => &self.goods,
            EntityKind::UseCase => &self.use_cases,
        };
        list.iter().find(|e| e.id == id)
    }
}
