//! Shared fixtures: a data directory with records, use cases and every
//! reference table.

#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use dpg_catalog::{Config, FsSource, ReferenceKey, Services};
use serde_json::{json, Value};
use tempfile::TempDir;

pub fn write_json(path: &Path, value: &Value) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, serde_json::to_vec_pretty(value).unwrap()).unwrap();
}

pub fn reference_table(key: ReferenceKey) -> Value {
    match key {
        ReferenceKey::Sdgs => json!([
            {"code": "SDG-3", "name": "Good Health and Well-being"},
            {"code": "SDG-5", "name": "Gender Equality"},
            {"code": "SDG-13", "name": "Climate Action"}
        ]),
        ReferenceKey::WhoSystem => json!([{"code": "Client", "name": "Client-level services"}]),
        ReferenceKey::Wmo => json!([{"code": "Observations"}]),
        ReferenceKey::Dpi => json!({"ID": {"name": "Digital Identity"}}),
        ReferenceKey::HealthStandards => json!([{"code": "ICD-11"}]),
        ReferenceKey::InteropStandards => json!([{"code": "HL7 FHIR", "name": "FHIR"}]),
        ReferenceKey::ClimateStandards => json!([]),
        ReferenceKey::Countries => json!({"KE": {"name": "Kenya"}, "UG": {"name": "Uganda"}}),
        ReferenceKey::Licenses => json!([{"id": "bsd-3-clause", "name": "BSD 3-Clause"}]),
    }
}

pub fn good(id: &str, sdgs: &[&str]) -> Value {
    json!({
        "ID": id,
        "Name": id.to_uppercase(),
        "License": "bsd-3-clause",
        "ProductOverview": {"Summary": format!("{} summary", id)},
        "Classifications": {"SDGs": sdgs},
        "StandardsAndInteroperability": {"Interoperability": ["fhir r4"]},
        "Reach": {"ImplementationCountries": ["KE", {"code": "UG"}]}
    })
}

/// Data directory with `goods` records, the given use cases and all tables.
pub fn data_dir(goods: &[Value], use_cases: &[Value]) -> TempDir {
    let dir = TempDir::new().unwrap();
    for key in ReferenceKey::ALL {
        write_json(&dir.path().join("reference").join(key.path()), &reference_table(key));
    }
    for record in goods {
        let id = record["ID"].as_str().unwrap();
        write_json(&dir.path().join("individual").join(format!("{}.json", id)), record);
    }
    for record in use_cases {
        let id = record["ID"].as_str().unwrap();
        write_json(&dir.path().join("use-cases").join(format!("{}.json", id)), record);
    }
    dir
}

pub fn config(dir: &TempDir, admin_token: Option<&str>) -> Config {
    Config {
        data_dir: dir.path().to_path_buf(),
        admin_token: admin_token.map(str::to_string),
        ..Config::default()
    }
}

pub fn services(config: &Config) -> Arc<Services> {
    Arc::new(Services::new(config, Arc::new(FsSource::from_config(config))))
}
