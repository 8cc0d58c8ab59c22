//! Raw catalog records
//!
//! Records are kept as `serde_json::Value` because their nested shape is owned
//! by the catalog editors, not by this crate. This module names the fields
//! the pipeline reads and provides path lookups over them.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::normalize::{normalize, CodeList};

/// The two kinds of catalog entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    GlobalGood,
    UseCase,
}

/// Dotted field paths used across the pipeline.
pub mod fields {
    pub const ID: &str = "ID";
    pub const NAME: &str = "Name";
    pub const LOGO: &str = "Logo";
    pub const CLIMATE_HEALTH: &str = "ClimateHealth";
    pub const GLOBAL_GOODS_TYPE: &str = "GlobalGoodsType";
    pub const LICENSE: &str = "License";
    pub const INCEPTION_YEAR: &str = "InceptionYear";

    pub const PRODUCT_OVERVIEW: &str = "ProductOverview";
    pub const OVERVIEW_SUMMARY: &str = "ProductOverview.Summary";
    pub const OVERVIEW_DESCRIPTION: &str = "ProductOverview.Description";

    pub const SDGS: &str = "Classifications.SDGs";
    pub const WHO_SYSTEM: &str = "Classifications.WHO_System";
    pub const WMO: &str = "Classifications.WMO";
    pub const DPI: &str = "Classifications.DPI";

    pub const HEALTH_STANDARDS: &str = "StandardsAndInteroperability.HealthStandards";
    pub const INTEROPERABILITY: &str = "StandardsAndInteroperability.Interoperability";
    pub const CLIMATE_STANDARDS: &str = "StandardsAndInteroperability.ClimateStandards";

    pub const COUNTRIES: &str = "Reach.ImplementationCountries";
    pub const IMPLEMENTATION_COUNT: &str = "Reach.NumberOfImplementations";
    pub const MATURITY_OVERALL: &str = "Maturity.OverallScore";
    pub const MATURITY_SCORES: &str = "Maturity.Scores";

    // Use-case specific
    pub const PURPOSE: &str = "Purpose";
    pub const SCOPE: &str = "Scope";
    pub const ACTORS: &str = "Actors";
    pub const SECTOR: &str = "Sector";
    pub const COUNTRY: &str = "Country";
    pub const USE_CASE_SDGS: &str = "SDGs";
    pub const USE_CASE_WHO_SYSTEM: &str = "WHO_System";
    pub const USE_CASE_STANDARDS: &str = "Standards";
    pub const GLOBAL_GOODS: &str = "GlobalGoods";
}

/// Follow a dotted path (`"Reach.ImplementationCountries"`) into a record.
pub fn lookup<'a>(record: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .try_fold(record, |current, segment| current.as_object()?.get(segment))
}

/// String at a path, ignoring blanks.
pub fn str_at<'a>(record: &'a Value, path: &str) -> Option<&'a str> {
    lookup(record, path)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Normalized codes gathered from several paths, first path first.
pub fn codes_at(record: &Value, paths: &[&str]) -> CodeList {
    let mut codes = CodeList::new();
    for path in paths {
        codes.extend_from(&normalize(lookup(record, path)));
    }
    codes
}

/// The record's identifier: a non-empty `ID` string.
pub fn record_id(record: &Value) -> Option<&str> {
    str_at(record, fields::ID)
}

/// Cut a string to at most `max` characters, on a char boundary.
pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_lookup_nested() {
        let record = json!({"Reach": {"ImplementationCountries": ["KE"]}});
        assert_eq!(
            lookup(&record, fields::COUNTRIES),
            Some(&json!(["KE"]))
        );
        assert!(lookup(&record, "Reach.Missing").is_none());
        assert!(lookup(&record, "Reach.ImplementationCountries.deeper").is_none());
    }

    #[test]
    fn test_record_id() {
        assert_eq!(record_id(&json!({"ID": "dhis2"})), Some("dhis2"));
        assert_eq!(record_id(&json!({"ID": "  "})), None);
        assert_eq!(record_id(&json!({"ID": 7})), None);
        assert_eq!(record_id(&json!({})), None);
    }

    #[test]
    fn test_codes_at_merges_paths() {
        let record = json!({
            "SDGs": ["SDG-3"],
            "Classifications": {"SDGs": [{"code": "SDG-5"}, "SDG-3"]}
        });
        let codes = codes_at(&record, &[fields::SDGS, fields::USE_CASE_SDGS]);
        assert_eq!(codes.as_slice(), &["SDG-5", "SDG-3"]);
    }

    #[test]
    fn test_truncate_chars_multibyte() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
    }
}
