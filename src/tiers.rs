//! Index tiers
//!
//! Three projections of a global-good record, from smallest to largest:
//!
//! | Tier | Use | Content |
//! |------|-----|---------|
//! | Minimal | first paint | ID, name, logo, 200-char summary, ≤2 types, ≤3 SDGs, country count |
//! | Summary | filter/sort | Minimal + overview, all classifications, standards, countries, maturity |
//! | Resolved | detail view | full record + Summary fields + `<Field>Resolved` siblings |
//!
//! Every key present in a smaller tier is present in the larger ones; the
//! resolved projection is built by filling the summary fields into the raw
//! record wherever the record does not already carry them.
//!
//! The same [`resolve_entity`] is used by the tier compiler and by the
//! progressive resolver, so both produce identical resolved entities.

use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::error::{CatalogError, Result};
use crate::normalize::{normalize, CodeList};
use crate::record::{self, fields};
use crate::reference::{ReferenceKey, ReferenceSet};

pub const MINIMAL_FILE: &str = "index-minimal.json";
pub const SUMMARY_FILE: &str = "index-summary.json";
pub const RESOLVED_FILE: &str = "index-resolved.json";
/// Kept for consumers of the original single index; same content as summary.
pub const LEGACY_INDEX_FILE: &str = "index.json";

pub const SUMMARY_MAX_CHARS: usize = 200;
pub const DESCRIPTION_MAX_CHARS: usize = 500;
pub const MINIMAL_MAX_TYPES: usize = 2;
pub const MINIMAL_MAX_SDGS: usize = 3;

/// Index tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Minimal,
    Summary,
    Resolved,
}

impl Tier {
    pub fn file_name(&self) -> &'static str {
        match self {
            Tier::Minimal => MINIMAL_FILE,
            Tier::Summary => SUMMARY_FILE,
            Tier::Resolved => RESOLVED_FILE,
        }
    }
}

// =============================================================================
// Normalized record
// =============================================================================

/// A global-good record with every reference field normalized.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedRecord {
    pub id: String,
    pub name: String,
    pub logo: Option<String>,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub climate_health: bool,
    pub types: CodeList,
    pub license: CodeList,
    pub sdgs: CodeList,
    pub who_system: CodeList,
    pub wmo: CodeList,
    pub dpi: CodeList,
    pub health_standards: CodeList,
    pub interoperability: CodeList,
    pub climate_standards: CodeList,
    pub countries: CodeList,
    pub country_count: u64,
    pub overall_score: Option<f64>,
    pub inception_year: Value,
}

impl NormalizedRecord {
    /// Normalize a raw record. Fails only when the record has no usable `ID`.
    pub fn from_record(raw: &Value) -> Result<Self> {
        let id = record::record_id(raw)
            .ok_or_else(|| CatalogError::MalformedRecord {
                file: String::new(),
                reason: "missing ID".into(),
            })?
            .to_string();

        let name = record::str_at(raw, fields::NAME).unwrap_or(&id).to_string();
        let summary = record::str_at(raw, fields::OVERVIEW_SUMMARY)
            .or_else(|| record::str_at(raw, "Summary"))
            .map(str::to_string);
        let countries = normalize(record::lookup(raw, fields::COUNTRIES));
        let country_count = if countries.is_empty() {
            record::lookup(raw, fields::IMPLEMENTATION_COUNT)
                .and_then(Value::as_u64)
                .unwrap_or(0)
        } else {
            countries.len() as u64
        };
        let inception_year = match record::lookup(raw, fields::INCEPTION_YEAR) {
            Some(v @ Value::Number(_)) | Some(v @ Value::String(_)) => v.clone(),
            _ => Value::Null,
        };

        Ok(Self {
            name,
            logo: record::str_at(raw, fields::LOGO).map(str::to_string),
            summary,
            description: record::str_at(raw, fields::OVERVIEW_DESCRIPTION).map(str::to_string),
            climate_health: record::lookup(raw, fields::CLIMATE_HEALTH)
                .and_then(Value::as_bool)
                .unwrap_or(false),
            types: normalize(record::lookup(raw, fields::GLOBAL_GOODS_TYPE)),
            license: normalize(record::lookup(raw, fields::LICENSE)),
            sdgs: normalize(record::lookup(raw, fields::SDGS)),
            who_system: normalize(record::lookup(raw, fields::WHO_SYSTEM)),
            wmo: normalize(record::lookup(raw, fields::WMO)),
            dpi: normalize(record::lookup(raw, fields::DPI)),
            health_standards: normalize(record::lookup(raw, fields::HEALTH_STANDARDS)),
            interoperability: normalize(record::lookup(raw, fields::INTEROPERABILITY)),
            climate_standards: normalize(record::lookup(raw, fields::CLIMATE_STANDARDS)),
            countries,
            country_count,
            overall_score: overall_score(raw),
            inception_year,
            id,
        })
    }

    fn truncated_summary(&self) -> Value {
        self.summary
            .as_deref()
            .map(|s| Value::String(record::truncate_chars(s, SUMMARY_MAX_CHARS)))
            .unwrap_or(Value::Null)
    }

    /// Minimal tier entry.
    pub fn minimal(&self) -> Value {
        json!({
            "ID": self.id,
            "Name": self.name,
            "Logo": self.logo,
            "Summary": self.truncated_summary(),
            "ClimateHealth": self.climate_health,
            "GlobalGoodsType": self.types.truncated(MINIMAL_MAX_TYPES),
            "CountryCount": self.country_count,
            "Classifications": {
                "SDGs": self.sdgs.truncated(MINIMAL_MAX_SDGS),
            },
        })
    }

    /// Summary tier entry.
    pub fn summary(&self) -> Value {
        json!({
            "ID": self.id,
            "Name": self.name,
            "Logo": self.logo,
            "Summary": self.truncated_summary(),
            "ClimateHealth": self.climate_health,
            "GlobalGoodsType": self.types,
            "CountryCount": self.country_count,
            "ProductOverview": {
                "Summary": self.truncated_summary(),
                "Description": self
                    .description
                    .as_deref()
                    .map(|d| record::truncate_chars(d, DESCRIPTION_MAX_CHARS)),
            },
            "Classifications": {
                "SDGs": self.sdgs,
                "WHO_System": self.who_system,
                "WMO": self.wmo,
                "DPI": self.dpi,
            },
            "Standards": {
                "HealthStandards": self.health_standards,
                "Interoperability": self.interoperability,
                "ClimateStandards": self.climate_standards,
            },
            "Reach": {
                "Countries": self.countries,
            },
            "Maturity": {
                "OverallScore": self.overall_score,
            },
            "InceptionYear": self.inception_year,
        })
    }
}

/// Explicit `Maturity.OverallScore`, else the mean of numeric
/// `Maturity.Scores` values rounded to one decimal.
fn overall_score(raw: &Value) -> Option<f64> {
    if let Some(score) = record::lookup(raw, fields::MATURITY_OVERALL).and_then(Value::as_f64) {
        return Some(score);
    }

    let scores: Vec<f64> = match record::lookup(raw, fields::MATURITY_SCORES)? {
        Value::Object(map) => map.values().filter_map(Value::as_f64).collect(),
        Value::Array(items) => items
            .iter()
            .filter_map(|item| item.as_f64().or_else(|| item.get("score").and_then(Value::as_f64)))
            .collect(),
        _ => return None,
    };
    if scores.is_empty() {
        return None;
    }
    let mean = scores.iter().sum::<f64>() / scores.len() as f64;
    Some((mean * 10.0).round() / 10.0)
}

// =============================================================================
// Resolution
// =============================================================================

/// Fill keys from `source` that `target` lacks, recursing into objects.
/// Existing values in `target` win, except where `source` has an object and
/// `target` does not (`null`, scalar or array): the object replaces it so
/// every key of `source` ends up in `target`.
pub fn merge_missing(target: &mut Value, source: &Value) {
    match (target, source) {
        (Value::Object(target), Value::Object(source)) => {
            for (key, value) in source {
                match target.get_mut(key) {
                    Some(existing) => merge_missing(existing, value),
                    None => {
                        target.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (target, Value::Object(_)) => *target = source.clone(),
        _ => {}
    }
}

fn resolved_group(refs: &ReferenceSet, entries: &[(&str, ReferenceKey, &CodeList)]) -> Option<Value> {
    let mut group = Map::new();
    for (name, key, codes) in entries {
        let resolved = refs.resolve_all(*key, codes);
        if !resolved.is_empty() {
            group.insert(name.to_string(), Value::Array(resolved));
        }
    }
    if group.is_empty() {
        None
    } else {
        Some(Value::Object(group))
    }
}

/// Resolved tier entry: the raw record, the summary fields it lacks, and the
/// `<Field>Resolved` siblings. Unresolvable codes are dropped; empty siblings
/// are omitted.
pub fn resolve_entity(raw: &Value, refs: &ReferenceSet) -> Result<Value> {
    let normalized = NormalizedRecord::from_record(raw)?;
    let mut resolved = match raw {
        Value::Object(_) => raw.clone(),
        _ => {
            return Err(CatalogError::MalformedRecord {
                file: normalized.id.clone(),
                reason: "record is not a JSON object".into(),
            })
        }
    };
    merge_missing(&mut resolved, &normalized.summary());

    let mut siblings = Map::new();

    if let Some(license) = normalized
        .license
        .iter()
        .find_map(|code| refs.resolve(ReferenceKey::Licenses, code))
    {
        siblings.insert("LicenseResolved".into(), license);
    }

    if let Some(group) = resolved_group(
        refs,
        &[
            ("SDGs", ReferenceKey::Sdgs, &normalized.sdgs),
            ("WHO_System", ReferenceKey::WhoSystem, &normalized.who_system),
            ("WMO", ReferenceKey::Wmo, &normalized.wmo),
            ("DPI", ReferenceKey::Dpi, &normalized.dpi),
        ],
    ) {
        siblings.insert("ClassificationsResolved".into(), group);
    }

    if let Some(group) = resolved_group(
        refs,
        &[
            ("HealthStandards", ReferenceKey::HealthStandards, &normalized.health_standards),
            ("Interoperability", ReferenceKey::InteropStandards, &normalized.interoperability),
            ("ClimateStandards", ReferenceKey::ClimateStandards, &normalized.climate_standards),
        ],
    ) {
        siblings.insert("StandardsAndInteroperabilityResolved".into(), group);
    }

    if let Some(group) = resolved_group(
        refs,
        &[("Countries", ReferenceKey::Countries, &normalized.countries)],
    ) {
        siblings.insert("ReachResolved".into(), group);
    }

    if let Value::Object(ref mut map) = resolved {
        map.extend(siblings);
    }
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference::{default_aliases, ReferenceTable};

    fn dhis2() -> Value {
        json!({
            "ID": "dhis2",
            "Name": "DHIS2",
            "Logo": "/logos/dhis2.png",
            "ClimateHealth": true,
            "License": "bsd-3-clause",
            "GlobalGoodsType": [{"code": "software"}, "platform", "content"],
            "ProductOverview": {
                "Summary": "x".repeat(450),
                "Description": "Health information system"
            },
            "Classifications": {
                "SDGs": [{"code": "SDG-3"}, "SDG-5", "SDG-9", "SDG-17"],
                "WHO_System": ["Client"],
                "DPI": "unknown-dpi"
            },
            "StandardsAndInteroperability": {
                "Interoperability": [{"code": "fhir"}],
                "HealthStandards": ["ICD-11"]
            },
            "Reach": {"ImplementationCountries": ["KE", {"code": "UG"}, "KE"]},
            "Maturity": {"Scores": {"Global Utility": 8, "Community": 7, "Software": "n/a"}},
            "InceptionYear": 2006
        })
    }

    fn refs() -> ReferenceSet {
        ReferenceSet::new(default_aliases())
            .with_table(
                ReferenceKey::Sdgs,
                ReferenceTable::from_value("sdgs", json!([{"code": "SDG-3", "name": "Good Health"}])).unwrap(),
            )
            .with_table(
                ReferenceKey::InteropStandards,
                ReferenceTable::from_value("i", json!([{"code": "HL7 FHIR"}])).unwrap(),
            )
            .with_table(
                ReferenceKey::Countries,
                ReferenceTable::from_value("c", json!({"KE": {"name": "Kenya"}})).unwrap(),
            )
            .with_table(
                ReferenceKey::Licenses,
                ReferenceTable::from_value("l", json!([{"id": "bsd-3-clause", "name": "BSD 3"}])).unwrap(),
            )
    }

    #[test]
    fn test_normalized_record() {
        let rec = NormalizedRecord::from_record(&dhis2()).unwrap();
        assert_eq!(rec.countries.as_slice(), &["KE", "UG"]);
        assert_eq!(rec.country_count, 2);
        assert_eq!(rec.overall_score, Some(7.5));
        assert_eq!(rec.types.len(), 3);
    }

    #[test]
    fn test_missing_id_rejected() {
        assert!(NormalizedRecord::from_record(&json!({"Name": "x"})).is_err());
    }

    #[test]
    fn test_minimal_limits() {
        let minimal = NormalizedRecord::from_record(&dhis2()).unwrap().minimal();
        assert_eq!(minimal["Summary"].as_str().unwrap().chars().count(), SUMMARY_MAX_CHARS);
        assert_eq!(minimal["GlobalGoodsType"].as_array().unwrap().len(), 2);
        assert_eq!(minimal["Classifications"]["SDGs"], json!(["SDG-3", "SDG-5", "SDG-9"]));
        assert_eq!(minimal["CountryCount"], 2);
    }

    #[test]
    fn test_country_count_from_implementation_number() {
        let rec = NormalizedRecord::from_record(&json!({
            "ID": "x",
            "Reach": {"NumberOfImplementations": 14}
        }))
        .unwrap();
        assert_eq!(rec.country_count, 14);
    }

    #[test]
    fn test_overall_score_from_scores() {
        let derived = json!({"Maturity": {"Scores": {"a": 3, "b": 4, "c": 4}}});
        assert_eq!(overall_score(&derived), Some(3.7));

        let explicit = json!({"Maturity": {"OverallScore": 2.5, "Scores": {"a": 5}}});
        assert_eq!(overall_score(&explicit), Some(2.5));

        assert_eq!(overall_score(&json!({"Maturity": {"Scores": {}}})), None);
    }

    #[test]
    fn test_resolved_siblings() {
        let resolved = resolve_entity(&dhis2(), &refs()).unwrap();
        assert_eq!(resolved["LicenseResolved"]["name"], "BSD 3");
        assert_eq!(
            resolved["ClassificationsResolved"]["SDGs"],
            json!([{"code": "SDG-3", "name": "Good Health"}])
        );
        // No DPI/WHO table entries: group keys omitted
        assert!(resolved["ClassificationsResolved"].get("DPI").is_none());
        assert_eq!(
            resolved["StandardsAndInteroperabilityResolved"]["Interoperability"][0]["code"],
            "HL7 FHIR"
        );
        assert_eq!(
            resolved["ReachResolved"]["Countries"],
            json!([{"code": "KE", "name": "Kenya"}])
        );
        // Raw record untouched where it already had data
        assert_eq!(resolved["Classifications"]["DPI"], "unknown-dpi");
    }

    #[test]
    fn test_resolved_without_tables_omits_siblings() {
        let resolved = resolve_entity(&dhis2(), &ReferenceSet::default()).unwrap();
        assert!(resolved.get("LicenseResolved").is_none());
        assert!(resolved.get("ClassificationsResolved").is_none());
    }

    fn keys_subset(small: &Value, large: &Value) -> bool {
        match (small, large) {
            (Value::Object(s), Value::Object(l)) => s
                .iter()
                .all(|(k, v)| l.get(k).map(|lv| keys_subset(v, lv)).unwrap_or(false)),
            _ => true,
        }
    }

    #[test]
    fn test_tier_monotonicity() {
        let raw = dhis2();
        let rec = NormalizedRecord::from_record(&raw).unwrap();
        let resolved = resolve_entity(&raw, &refs()).unwrap();
        assert!(keys_subset(&rec.minimal(), &rec.summary()));
        assert!(keys_subset(&rec.summary(), &resolved));
    }

    #[test]
    fn test_tier_monotonicity_with_null_groups() {
        let raw = json!({
            "ID": "x",
            "Name": "X",
            "Maturity": null,
            "Reach": null,
            "Classifications": null,
            "StandardsAndInteroperability": "n/a"
        });
        let rec = NormalizedRecord::from_record(&raw).unwrap();
        let resolved = resolve_entity(&raw, &refs()).unwrap();
        assert!(keys_subset(&rec.minimal(), &rec.summary()));
        assert!(keys_subset(&rec.summary(), &resolved));
        assert!(resolved["Maturity"].get("OverallScore").is_some());
        assert!(resolved["Classifications"].get("SDGs").is_some());
        assert_eq!(resolved["Name"], "X");
    }

    #[test]
    fn test_merge_missing_keeps_existing() {
        let mut target = json!({"a": 1, "b": {"c": 2}});
        merge_missing(&mut target, &json!({"a": 9, "b": {"c": 9, "d": 3}, "e": 4}));
        assert_eq!(target, json!({"a": 1, "b": {"c": 2, "d": 3}, "e": 4}));

        let mut target = json!({"a": null, "b": [1]});
        merge_missing(&mut target, &json!({"a": {"c": 1}, "b": {"d": 2}}));
        assert_eq!(target, json!({"a": {"c": 1}, "b": {"d": 2}}));
    }
}
