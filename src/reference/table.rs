//! Reference tables and code lookup
//!
//! A table is published either as an array of descriptor objects
//! (`[{"code": "SDG-3", "name": "..."}]`, sometimes keyed by `id`) or as an
//! object map (`{"SDG-3": {"name": "..."}}`). Lookup runs in passes:
//!
//! 1. exact match on `id`/`code` (or map key)
//! 2. ASCII case-insensitive match, only after exact fails
//! 3. alias rules (standards only), see [`AliasRule`]

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{CatalogError, Result};

/// Loaded reference table for one domain.
#[derive(Debug, Clone, PartialEq)]
pub enum ReferenceTable {
    /// Array of descriptor objects carrying `id` and/or `code`
    List(Vec<Value>),
    /// Object map `code -> descriptor`
    Map(Map<String, Value>),
}

impl ReferenceTable {
    /// Build a table from its published JSON.
    pub fn from_value(key: &str, value: Value) -> Result<Self> {
        match value {
            Value::Array(items) => Ok(ReferenceTable::List(items)),
            Value::Object(map) => Ok(ReferenceTable::Map(map)),
            other => Err(CatalogError::ReferenceLoad {
                key: key.to_string(),
                reason: format!("expected array or object, got {}", json_type(&other)),
            }),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ReferenceTable::List(items) => items.len(),
            ReferenceTable::Map(map) => map.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// JSON form, as published.
    pub fn to_value(&self) -> Value {
        match self {
            ReferenceTable::List(items) => Value::Array(items.clone()),
            ReferenceTable::Map(map) => Value::Object(map.clone()),
        }
    }

    /// Pass 1: exact `id`/`code`/key match.
    pub fn find_exact(&self, code: &str) -> Option<Value> {
        self.find_by(|candidate| candidate == code, false)
    }

    /// Pass 2: ASCII case-insensitive `id`/`code`/key match.
    pub fn find_case_insensitive(&self, code: &str) -> Option<Value> {
        self.find_by(|candidate| candidate.eq_ignore_ascii_case(code), false)
    }

    /// First entry whose key fields satisfy `matches`.
    ///
    /// With `include_name`, an entry's `name` is tested too.
    fn find_by<F>(&self, matches: F, include_name: bool) -> Option<Value>
    where
        F: Fn(&str) -> bool,
    {
        match self {
            ReferenceTable::List(items) => items
                .iter()
                .find(|item| {
                    let mut keys = vec!["id", "code"];
                    if include_name {
                        keys.push("name");
                    }
                    keys.iter()
                        .filter_map(|k| item.get(*k).and_then(Value::as_str))
                        .any(&matches)
                })
                .cloned(),
            ReferenceTable::Map(map) => map
                .iter()
                .find(|(key, descriptor)| {
                    matches(key)
                        || (include_name
                            && descriptor
                                .get("name")
                                .and_then(Value::as_str)
                                .map(&matches)
                                .unwrap_or(false))
                })
                .map(|(key, descriptor)| with_code(key, descriptor)),
        }
    }
}

/// Map-shaped descriptors do not carry their own code; add it so resolved
/// records look the same for both table shapes.
fn with_code(key: &str, descriptor: &Value) -> Value {
    match descriptor {
        Value::Object(fields) => {
            let mut fields = fields.clone();
            fields
                .entry("code")
                .or_insert_with(|| Value::String(key.to_string()));
            Value::Object(fields)
        }
        other => serde_json::json!({ "code": key, "value": other }),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// =============================================================================
// Alias rules
// =============================================================================

/// Substring alias for standards whose codes are written inconsistently.
///
/// If the lowercased input contains `needle`, the rule applies: the
/// `canonical` code is looked up first (exact, then case-insensitive, also
/// matching `name`); failing that, the first entry whose code or name
/// contains the needle is used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AliasRule {
    pub needle: String,
    #[serde(default)]
    pub canonical: Option<String>,
}

impl AliasRule {
    pub fn new(needle: &str, canonical: Option<&str>) -> Self {
        Self {
            needle: needle.to_lowercase(),
            canonical: canonical.map(str::to_string),
        }
    }

    fn applies_to(&self, code: &str) -> bool {
        !self.needle.is_empty() && code.to_lowercase().contains(&self.needle)
    }

    fn resolve(&self, table: &ReferenceTable) -> Option<Value> {
        if let Some(ref canonical) = self.canonical {
            let found = table
                .find_by(|c| c == canonical, true)
                .or_else(|| table.find_by(|c| c.eq_ignore_ascii_case(canonical), true));
            if found.is_some() {
                return found;
            }
        }
        table.find_by(|c| c.to_lowercase().contains(&self.needle), true)
    }
}

/// The aliases observed in the catalog data: FHIR and ICD variants.
pub fn default_aliases() -> Vec<AliasRule> {
    vec![
        AliasRule::new("fhir", Some("HL7 FHIR")),
        AliasRule::new("icd", None),
    ]
}

/// Resolve one code against a table.
///
/// `aliases` is empty for classification and country tables. Returns `None`
/// when nothing matches; callers omit the resolved sibling.
pub fn resolve_reference(code: &str, table: &ReferenceTable, aliases: &[AliasRule]) -> Option<Value> {
    let code = code.trim();
    if code.is_empty() {
        return None;
    }

    table
        .find_exact(code)
        .or_else(|| table.find_case_insensitive(code))
        .or_else(|| {
            aliases
                .iter()
                .filter(|rule| rule.applies_to(code))
                .find_map(|rule| rule.resolve(table))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn standards() -> ReferenceTable {
        ReferenceTable::from_value(
            "interop_standards",
            json!([
                {"code": "HL7 FHIR", "name": "Fast Healthcare Interoperability Resources"},
                {"code": "ICD-11", "name": "International Classification of Diseases 11"},
                {"id": "openHIE", "name": "OpenHIE Architecture"}
            ]),
        )
        .unwrap()
    }

    #[test]
    fn test_from_value_rejects_scalars() {
        assert!(ReferenceTable::from_value("x", json!("nope")).is_err());
        assert!(ReferenceTable::from_value("x", json!([])).unwrap().is_empty());
    }

    #[test]
    fn test_exact_by_code_and_id() {
        let table = standards();
        assert_eq!(resolve_reference("HL7 FHIR", &table, &[]).unwrap()["code"], "HL7 FHIR");
        assert_eq!(resolve_reference("openHIE", &table, &[]).unwrap()["id"], "openHIE");
    }

    #[test]
    fn test_case_insensitive_fallback() {
        let table = standards();
        assert_eq!(resolve_reference("openhie", &table, &[]).unwrap()["id"], "openHIE");
    }

    #[test]
    fn test_exact_preferred_over_case_insensitive() {
        let table = ReferenceTable::from_value(
            "t",
            json!([{"code": "abc", "n": 1}, {"code": "ABC", "n": 2}]),
        )
        .unwrap();
        assert_eq!(resolve_reference("ABC", &table, &[]).unwrap()["n"], 2);
        assert_eq!(resolve_reference("Abc", &table, &[]).unwrap()["n"], 1);
    }

    #[test]
    fn test_alias_only_when_enabled() {
        let table = standards();
        assert!(resolve_reference("FHIR R4", &table, &[]).is_none());

        let aliases = default_aliases();
        assert_eq!(
            resolve_reference("FHIR R4", &table, &aliases).unwrap()["code"],
            "HL7 FHIR"
        );
        assert_eq!(
            resolve_reference("icd10", &table, &aliases).unwrap()["code"],
            "ICD-11"
        );
        assert!(resolve_reference("SNOMED", &table, &aliases).is_none());
    }

    #[test]
    fn test_map_table_adds_code() {
        let table = ReferenceTable::from_value(
            "countries",
            json!({"KE": {"name": "Kenya"}, "UG": {"name": "Uganda", "code": "UGA"}}),
        )
        .unwrap();
        let kenya = resolve_reference("KE", &table, &[]).unwrap();
        assert_eq!(kenya, json!({"name": "Kenya", "code": "KE"}));
        let uganda = resolve_reference("ug", &table, &[]).unwrap();
        assert_eq!(uganda["code"], "UGA");
        assert!(resolve_reference("TZ", &table, &[]).is_none());
    }
}
