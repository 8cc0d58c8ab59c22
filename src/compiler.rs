//! Tier Compiler - rebuilds the index artifacts from individual records
//!
//! ## Pipeline
//!
//! ```text
//! individual/*.json
//!     │  Read → Parse → Normalize → Project → Sorted-Insert
//!     │    └──────────── any failure ──► Skipped(reason)
//!     ▼
//! index-minimal.json   index-summary.json   index-resolved.json   index.json
//! ```
//!
//! One corrupt file never stops the rebuild: it is logged, recorded in the
//! [`CompileReport`] and the remaining records are compiled. The job as a
//! whole only fails when the records directory cannot be listed or an
//! artifact cannot be written.
//!
//! Output is sorted by `ID` (ordinal), and JSON object keys serialize in
//! sorted order, so identical inputs give byte-identical artifacts.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::error::{CatalogError, Result};
use crate::record;
use crate::reference::ReferenceSet;
use crate::tiers::{self, NormalizedRecord, Tier};

// =============================================================================
// Report types
// =============================================================================

/// A record that did not make it into the tiers.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SkippedRecord {
    /// File name within the records directory
    pub file: String,
    /// ID, when the record got far enough to have one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub reason: String,
}

/// One written artifact.
#[derive(Debug, Clone, Serialize)]
pub struct ArtifactInfo {
    pub name: String,
    pub path: PathBuf,
    pub entries: usize,
    pub sha256: String,
}

/// Outcome of a compile run.
#[derive(Debug, Clone, Serialize)]
pub struct CompileReport {
    pub started_at: DateTime<Utc>,
    /// Record files found
    pub total: usize,
    /// Records present in every tier
    pub compiled: usize,
    pub skipped: Vec<SkippedRecord>,
    pub artifacts: Vec<ArtifactInfo>,
    pub duration_ms: u64,
}

impl CompileReport {
    pub fn skip_count(&self) -> usize {
        self.skipped.len()
    }

}

// =============================================================================
// Reading records
// =============================================================================

/// Parsed records from one directory plus the files that failed.
#[derive(Debug, Default)]
pub struct RecordBatch {
    /// `(file name, parsed JSON)` sorted by file name
    pub records: Vec<(String, Value)>,
    pub skipped: Vec<SkippedRecord>,
    pub total: usize,
}

/// Read and parse every `*.json` file in `dir`.
///
/// Unreadable or malformed files are skipped; only an unreadable directory
/// is an error.
pub async fn read_records(dir: &Path) -> Result<RecordBatch> {
    let mut entries = tokio::fs::read_dir(dir).await.map_err(|e| {
        warn!(dir = %dir.display(), error = %e, "Cannot list records directory");
        e
    })?;

    let mut batch = RecordBatch::default();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let file = entry.file_name().to_string_lossy().into_owned();
        batch.total += 1;

        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(file = %file, error = %e, "Skipping unreadable record");
                batch.skipped.push(SkippedRecord {
                    file,
                    id: None,
                    reason: format!("read failed: {}", e),
                });
                continue;
            }
        };

        match serde_json::from_slice::<Value>(&bytes) {
            Ok(value) => batch.records.push((file, value)),
            Err(e) => {
                warn!(file = %file, error = %e, "Skipping malformed record");
                batch.skipped.push(SkippedRecord {
                    file,
                    id: None,
                    reason: format!("invalid JSON: {}", e),
                });
            }
        }
    }

    batch.records.sort_by(|a, b| a.0.cmp(&b.0));
    batch.skipped.sort_by(|a, b| a.file.cmp(&b.file));

    debug!(
        dir = %dir.display(),
        parsed = batch.records.len(),
        skipped = batch.skipped.len(),
        "Records read"
    );
    Ok(batch)
}

// =============================================================================
// Compilation
// =============================================================================

/// All three tiers, sorted by ID.
#[derive(Debug, Default)]
pub struct CompiledTiers {
    pub minimal: Vec<Value>,
    pub summary: Vec<Value>,
    pub resolved: Vec<Value>,
    pub skipped: Vec<SkippedRecord>,
}

struct TierEntry {
    minimal: Value,
    summary: Value,
    resolved: Value,
}

/// Normalize, project and sort a batch of parsed records.
///
/// Records without an `ID` are skipped. When several records share an `ID`
/// the one whose canonical JSON sorts first is kept, so the tiers depend
/// only on the set of records and never on enumeration order or file names.
pub fn compile_batch(batch: RecordBatch, refs: &ReferenceSet) -> CompiledTiers {
    let mut sorted: BTreeMap<String, TierEntry> = BTreeMap::new();
    let mut skipped = batch.skipped;
    let mut records = batch.records;
    records.sort_by_cached_key(|(file, raw)| (raw.to_string(), file.clone()));

    for (file, raw) in records {
        let normalized = match NormalizedRecord::from_record(&raw) {
            Ok(n) => n,
            Err(e) => {
                warn!(file = %file, error = %e, "Skipping record");
                skipped.push(SkippedRecord {
                    file,
                    id: None,
                    reason: "missing required field ID".into(),
                });
                continue;
            }
        };

        if sorted.contains_key(&normalized.id) {
            warn!(file = %file, id = %normalized.id, "Skipping duplicate ID");
            skipped.push(SkippedRecord {
                file,
                id: Some(normalized.id),
                reason: "duplicate ID".into(),
            });
            continue;
        }

        let resolved = match tiers::resolve_entity(&raw, refs) {
            Ok(r) => r,
            Err(e) => {
                warn!(file = %file, id = %normalized.id, error = %e, "Skipping record");
                skipped.push(SkippedRecord {
                    file,
                    id: Some(normalized.id),
                    reason: e.to_string(),
                });
                continue;
            }
        };

        sorted.insert(
            normalized.id.clone(),
            TierEntry {
                minimal: normalized.minimal(),
                summary: normalized.summary(),
                resolved,
            },
        );
    }

    skipped.sort_by(|a, b| a.file.cmp(&b.file));
    let mut tiers = CompiledTiers {
        skipped,
        ..Default::default()
    };
    for entry in sorted.into_values() {
        tiers.minimal.push(entry.minimal);
        tiers.summary.push(entry.summary);
        tiers.resolved.push(entry.resolved);
    }
    tiers
}

// =============================================================================
// Tier compiler
// =============================================================================

/// Builds the tier artifacts from a records directory.
#[derive(Debug, Clone)]
pub struct TierCompiler {
    records_dir: PathBuf,
    output_dir: PathBuf,
}

impl TierCompiler {
    pub fn new(records_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            records_dir: records_dir.into(),
            output_dir: output_dir.into(),
        }
    }

    /// Run a full rebuild.
    ///
    /// `refs` must hold every reference table, so that a missing resolution
    /// inside the loop always means "code not found".
    pub async fn compile(&self, refs: &ReferenceSet) -> Result<CompileReport> {
        if !refs.is_complete() {
            return Err(CatalogError::NotReady(
                "reference tables must be loaded before compiling".into(),
            ));
        }

        let started_at = Utc::now();
        let start = Instant::now();
        info!(records_dir = %self.records_dir.display(), "Compiling index tiers");

        let batch = read_records(&self.records_dir).await?;
        let total = batch.total;
        let tiers = compile_batch(batch, refs);
        let compiled = tiers.resolved.len();

        let artifacts = self.write_tiers(&tiers).await?;
        let duration_ms = start.elapsed().as_millis() as u64;

        info!(
            total = total,
            compiled = compiled,
            skipped = tiers.skipped.len(),
            duration_ms = duration_ms,
            "Index tiers compiled"
        );

        Ok(CompileReport {
            started_at,
            total,
            compiled,
            skipped: tiers.skipped,
            artifacts,
            duration_ms,
        })
    }

    /// Write every artifact as a full overwrite.
    pub async fn write_tiers(&self, tiers: &CompiledTiers) -> Result<Vec<ArtifactInfo>> {
        tokio::fs::create_dir_all(&self.output_dir).await?;

        let outputs: [(&str, &[Value]); 4] = [
            (Tier::Minimal.file_name(), tiers.minimal.as_slice()),
            (Tier::Summary.file_name(), tiers.summary.as_slice()),
            (Tier::Resolved.file_name(), tiers.resolved.as_slice()),
            (tiers::LEGACY_INDEX_FILE, tiers.summary.as_slice()),
        ];

        let mut artifacts = Vec::with_capacity(outputs.len());
        for (name, entries) in outputs {
            artifacts.push(self.write_artifact(name, entries).await?);
        }
        Ok(artifacts)
    }

    async fn write_artifact(&self, name: &str, entries: &[Value]) -> Result<ArtifactInfo> {
        let bytes = serde_json::to_vec(entries)?;
        let sha256 = hex::encode(Sha256::digest(&bytes));

        let path = self.output_dir.join(name);
        let tmp = self.output_dir.join(format!("{}.tmp", name));
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, &path).await?;

        debug!(artifact = name, entries = entries.len(), sha256 = %sha256, "Artifact written");
        Ok(ArtifactInfo {
            name: name.to_string(),
            path,
            entries: entries.len(),
            sha256,
        })
    }
}

/// IDs of a tier artifact, in file order.
pub fn tier_ids(entries: &[Value]) -> Vec<String> {
    entries
        .iter()
        .filter_map(|e| record::record_id(e).map(str::to_string))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn batch(records: Vec<Value>) -> RecordBatch {
        RecordBatch {
            total: records.len(),
            records: records
                .into_iter()
                .enumerate()
                .map(|(i, r)| (format!("{}.json", i), r))
                .collect(),
            skipped: vec![],
        }
    }

    #[test]
    fn test_sorted_by_id_ordinal() {
        let tiers = compile_batch(
            batch(vec![
                json!({"ID": "openmrs"}),
                json!({"ID": "Zeta"}),
                json!({"ID": "dhis2"}),
                json!({"ID": "a"}),
            ]),
            &ReferenceSet::default(),
        );
        // Ordinal: uppercase sorts before lowercase
        let expected = vec!["Zeta", "a", "dhis2", "openmrs"];
        assert_eq!(tier_ids(&tiers.minimal), expected);
        assert_eq!(tier_ids(&tiers.summary), expected);
        assert_eq!(tier_ids(&tiers.resolved), expected);
    }

    #[test]
    fn test_missing_id_and_duplicates_skipped() {
        let tiers = compile_batch(
            batch(vec![
                json!({"ID": "dhis2", "Name": "first"}),
                json!({"Name": "no id"}),
                json!({"ID": "dhis2", "Name": "second"}),
                json!({"ID": "openmrs"}),
            ]),
            &ReferenceSet::default(),
        );
        assert_eq!(tiers.summary.len(), 2);
        assert_eq!(tiers.skipped.len(), 2);
        assert_eq!(tiers.summary[0]["Name"], "first");
        assert_eq!(tiers.skipped[1].reason, "duplicate ID");
    }

    #[test]
    fn test_duplicate_id_choice_ignores_order() {
        let records = vec![
            ("a.json".to_string(), json!({"ID": "dup", "Name": "second"})),
            ("b.json".to_string(), json!({"ID": "dup", "Name": "first"})),
        ];
        let mut reversed = records.clone();
        reversed.reverse();

        let compile = |records: Vec<(String, Value)>| {
            compile_batch(
                RecordBatch { total: records.len(), records, skipped: vec![] },
                &ReferenceSet::default(),
            )
        };
        let forward = compile(records);
        let backward = compile(reversed);

        assert_eq!(forward.summary, backward.summary);
        assert_eq!(forward.resolved, backward.resolved);
        assert_eq!(forward.summary[0]["Name"], "first");
        assert_eq!(forward.skipped, backward.skipped);

        // Same records under the index-based names of `batch`
        let by_index = compile_batch(
            batch(vec![json!({"ID": "dup", "Name": "second"}), json!({"ID": "dup", "Name": "first"})]),
            &ReferenceSet::default(),
        );
        assert_eq!(by_index.summary, forward.summary);
    }

    #[test]
    fn test_input_order_irrelevant() {
        let records = vec![
            json!({"ID": "b", "Classifications": {"SDGs": ["SDG-1"]}}),
            json!({"ID": "a"}),
            json!({"ID": "c"}),
        ];
        let mut reversed = records.clone();
        reversed.reverse();

        let one = compile_batch(batch(records), &ReferenceSet::default());
        let two = compile_batch(batch(reversed), &ReferenceSet::default());
        assert_eq!(
            serde_json::to_vec(&one.resolved).unwrap(),
            serde_json::to_vec(&two.resolved).unwrap()
        );
    }

    #[tokio::test]
    async fn test_compile_requires_loaded_references() {
        let dir = tempfile::TempDir::new().unwrap();
        let compiler = TierCompiler::new(dir.path().join("individual"), dir.path());
        let err = compiler.compile(&ReferenceSet::default()).await.unwrap_err();
        assert!(matches!(err, CatalogError::NotReady(_)));
    }
}
