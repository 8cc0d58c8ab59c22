//! Catalog sources
//!
//! Where the resolver and the reference catalog read static JSON from: the
//! local data directory, or the same layout served over plain HTTP.
//!
//! ```text
//! <root>/
//! ├── index.json              # summary tier (phase-1 stubs)
//! ├── individual/<ID>.json    # raw global-good records
//! └── reference/...           # reference tables, see ReferenceKey::path
//! ```

use async_trait::async_trait;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::config::Config;
use crate::error::{CatalogError, Result};
use crate::reference::ReferenceKey;

/// Read-only access to catalog artifacts.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    /// Summary tier entries, used for phase-1 stubs.
    async fn fetch_index(&self) -> Result<Vec<Value>>;

    /// Raw record for one entity.
    async fn fetch_record(&self, id: &str) -> Result<Value>;

    /// Raw reference table (array or map shaped).
    async fn fetch_reference(&self, key: ReferenceKey) -> Result<Value>;

    /// Human-readable origin for logs.
    fn describe(&self) -> String;
}

/// Reject IDs that would escape the records directory or URL path.
pub fn validate_id(id: &str) -> Result<()> {
    if id.is_empty() || id.contains('/') || id.contains('\\') || id.contains("..") {
        return Err(CatalogError::InvalidInput(format!("invalid entity id '{}'", id)));
    }
    Ok(())
}

// =============================================================================
// Filesystem source
// =============================================================================

/// Catalog source backed by the local data directory.
#[derive(Debug, Clone)]
pub struct FsSource {
    records_dir: PathBuf,
    reference_dir: PathBuf,
    index_path: PathBuf,
}

impl FsSource {
    pub fn new(records_dir: PathBuf, reference_dir: PathBuf, index_path: PathBuf) -> Self {
        Self {
            records_dir,
            reference_dir,
            index_path,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.records_dir(),
            config.reference_dir(),
            config.output_dir().join(crate::tiers::LEGACY_INDEX_FILE),
        )
    }

    async fn read_json(path: &Path, what: &str) -> Result<Value> {
        debug!(path = %path.display(), "Reading JSON");
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(CatalogError::NotFound(what.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[async_trait]
impl CatalogSource for FsSource {
    async fn fetch_index(&self) -> Result<Vec<Value>> {
        match Self::read_json(&self.index_path, "index").await? {
            Value::Array(entries) => Ok(entries),
            _ => Err(CatalogError::MalformedRecord {
                file: self.index_path.display().to_string(),
                reason: "index is not a JSON array".into(),
            }),
        }
    }

    async fn fetch_record(&self, id: &str) -> Result<Value> {
        validate_id(id)?;
        let path = self.records_dir.join(format!("{}.json", id));
        Self::read_json(&path, id).await
    }

    async fn fetch_reference(&self, key: ReferenceKey) -> Result<Value> {
        let path = self.reference_dir.join(key.path());
        Self::read_json(&path, key.as_str()).await
    }

    fn describe(&self) -> String {
        format!("fs:{}", self.records_dir.display())
    }
}

// =============================================================================
// HTTP source
// =============================================================================

/// Catalog source reading the published static JSON over HTTP.
#[derive(Debug, Clone)]
pub struct HttpSource {
    base_url: String,
    client: reqwest::Client,
}

impl HttpSource {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    async fn get_json(&self, relative: &str, what: &str) -> Result<Value> {
        let url = format!("{}/{}", self.base_url, relative);
        debug!(url = %url, "Fetching JSON");
        let response = self.client.get(&url).send().await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(CatalogError::NotFound(what.to_string()));
        }
        Ok(response.error_for_status()?.json::<Value>().await?)
    }
}

#[async_trait]
impl CatalogSource for HttpSource {
    async fn fetch_index(&self) -> Result<Vec<Value>> {
        match self.get_json(crate::tiers::LEGACY_INDEX_FILE, "index").await? {
            Value::Array(entries) => Ok(entries),
            _ => Err(CatalogError::MalformedRecord {
                file: format!("{}/{}", self.base_url, crate::tiers::LEGACY_INDEX_FILE),
                reason: "index is not a JSON array".into(),
            }),
        }
    }

    async fn fetch_record(&self, id: &str) -> Result<Value> {
        validate_id(id)?;
        self.get_json(&format!("individual/{}.json", id), id).await
    }

    async fn fetch_reference(&self, key: ReferenceKey) -> Result<Value> {
        self.get_json(&format!("reference/{}", key.path()), key.as_str())
            .await
    }

    fn describe(&self) -> String {
        format!("http:{}", self.base_url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_validate_id() {
        assert!(validate_id("dhis2").is_ok());
        assert!(validate_id("").is_err());
        assert!(validate_id("../etc/passwd").is_err());
        assert!(validate_id("a/b").is_err());
    }

    #[tokio::test]
    async fn test_fs_source_record_and_missing() {
        let dir = TempDir::new().unwrap();
        let records = dir.path().join("individual");
        std::fs::create_dir_all(&records).unwrap();
        std::fs::write(records.join("dhis2.json"), r#"{"ID":"dhis2"}"#).unwrap();

        let source = FsSource::new(
            records,
            dir.path().join("reference"),
            dir.path().join("index.json"),
        );
        let record = source.fetch_record("dhis2").await.unwrap();
        assert_eq!(record["ID"], "dhis2");

        assert!(matches!(
            source.fetch_record("missing").await,
            Err(CatalogError::NotFound(_))
        ));
        assert!(matches!(
            source.fetch_index().await,
            Err(CatalogError::NotFound(_))
        ));
    }

    #[test]
    fn test_http_source_trims_base() {
        let source = HttpSource::new("https://example.org/data/");
        assert_eq!(source.describe(), "http:https://example.org/data");
    }
}
