//! Reference normalizer
//!
//! Classification, standard and country fields arrive as a bare code, an
//! array of codes, or an array of descriptor objects (`{"code": "SDG-3",
//! "name": "Good health"}`). Everything downstream works on a [`CodeList`];
//! the polymorphic shape never leaves this module.
//!
//! The tier compiler, the progressive resolver and the relationship engine
//! all normalize through the functions here, so tier artifacts and
//! runtime-resolved entities always agree.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// =============================================================================
// CodeList
// =============================================================================

/// Canonical list of reference codes.
///
/// Non-empty strings, no duplicates, first-occurrence order preserved.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CodeList(Vec<String>);

impl CodeList {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Append a code, ignoring blanks and duplicates.
    ///
    /// Returns true if the code was added.
    pub fn push(&mut self, code: impl Into<String>) -> bool {
        let code = code.into();
        let code = code.trim();
        if code.is_empty() || self.contains(code) {
            return false;
        }
        self.0.push(code.to_string());
        true
    }

    pub fn contains(&self, code: &str) -> bool {
        self.0.iter().any(|c| c == code)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, String> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    /// First `n` codes.
    pub fn truncated(&self, n: usize) -> CodeList {
        CodeList(self.0.iter().take(n).cloned().collect())
    }

    /// Merge another list into this one, keeping first-occurrence order.
    pub fn extend_from(&mut self, other: &CodeList) {
        for code in other.iter() {
            self.push(code.clone());
        }
    }

    pub fn to_value(&self) -> Value {
        Value::Array(self.0.iter().cloned().map(Value::String).collect())
    }
}

impl<S: Into<String>> FromIterator<S> for CodeList {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut list = CodeList::new();
        for code in iter {
            list.push(code);
        }
        list
    }
}

impl<'a> IntoIterator for &'a CodeList {
    type Item = &'a String;
    type IntoIter = std::slice::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

// =============================================================================
// Extractor strategies
// =============================================================================

/// One way of pulling a code out of a single field element.
///
/// Extractors are applied in order; the first one that yields a code wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extractor {
    /// The element itself is the code (string or number).
    Verbatim,
    /// The element is an object and the named member holds the code.
    Field(&'static str),
}

impl Extractor {
    pub fn extract(&self, element: &Value) -> Option<String> {
        match self {
            Extractor::Verbatim => scalar_code(element),
            Extractor::Field(name) => element.as_object()?.get(*name).and_then(scalar_code),
        }
    }
}

fn scalar_code(value: &Value) -> Option<String> {
    let code = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    if code.is_empty() {
        None
    } else {
        Some(code)
    }
}

/// Extractors for classification, standard, country and license fields.
pub const CODE_EXTRACTORS: &[Extractor] = &[
    Extractor::Verbatim,
    Extractor::Field("code"),
    Extractor::Field("name"),
];

/// Extractors for references to other catalog entities (a use case's
/// `GlobalGoods` list).
pub const ENTITY_REF_EXTRACTORS: &[Extractor] = &[
    Extractor::Verbatim,
    Extractor::Field("id"),
    Extractor::Field("ID"),
    Extractor::Field("code"),
    Extractor::Field("name"),
];

// =============================================================================
// Normalization
// =============================================================================

/// Normalize a reference field into a [`CodeList`].
///
/// Absent, `null` and malformed input yield an empty list. Never fails.
pub fn normalize(value: Option<&Value>) -> CodeList {
    normalize_with(value, CODE_EXTRACTORS)
}

/// Normalize a field holding references to other catalog entities.
pub fn normalize_entity_refs(value: Option<&Value>) -> CodeList {
    normalize_with(value, ENTITY_REF_EXTRACTORS)
}

/// Normalize with an explicit extractor chain.
pub fn normalize_with(value: Option<&Value>, extractors: &[Extractor]) -> CodeList {
    let mut codes = CodeList::new();
    match value {
        None | Some(Value::Null) => {}
        Some(Value::Array(items)) => {
            for item in items {
                if let Some(code) = extract_first(item, extractors) {
                    codes.push(code);
                }
            }
        }
        Some(single) => {
            if let Some(code) = extract_first(single, extractors) {
                codes.push(code);
            }
        }
    }
    codes
}

fn extract_first(element: &Value, extractors: &[Extractor]) -> Option<String> {
    extractors.iter().find_map(|e| e.extract(element))
}
