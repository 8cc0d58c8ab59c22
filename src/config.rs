//! Configuration for dpg-catalog

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{CatalogError, Result};
use crate::reference::{default_aliases, AliasRule};
use crate::relations::RelationshipWeights;

/// Default data directory
pub fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("dpg-catalog")
}

/// Configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Root of `individual/`, `use-cases/` and `reference/`
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Where index artifacts are written (defaults to `data_dir`)
    #[serde(default)]
    pub output_dir: Option<PathBuf>,

    /// Base URL of the published static JSON; when set the resolver and
    /// reference catalog read over HTTP instead of from `data_dir`
    #[serde(default)]
    pub source_url: Option<String>,

    /// HTTP API port
    #[serde(default = "default_http_port")]
    pub http_port: u16,

    /// Bearer token for admin routes; admin routes are refused when unset
    #[serde(default)]
    pub admin_token: Option<String>,

    /// Resolved-entity cache TTL in seconds
    #[serde(default = "default_resolved_ttl")]
    pub resolved_ttl_secs: u64,

    /// Resolved-entity cache capacity
    #[serde(default = "default_resolved_max_entries")]
    pub resolved_max_entries: usize,

    /// Alias rules for standards lookup
    #[serde(default = "default_aliases")]
    pub aliases: Vec<AliasRule>,

    /// Relationship scoring weights and caps
    #[serde(default)]
    pub weights: RelationshipWeights,
}

fn default_http_port() -> u16 {
    8095
}

fn default_resolved_ttl() -> u64 {
    600
}

fn default_resolved_max_entries() -> usize {
    1_000
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            output_dir: None,
            source_url: None,
            http_port: default_http_port(),
            admin_token: None,
            resolved_ttl_secs: default_resolved_ttl(),
            resolved_max_entries: default_resolved_max_entries(),
            aliases: default_aliases(),
            weights: RelationshipWeights::default(),
        }
    }
}

impl Config {
    /// Load config from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| CatalogError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Save config to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self).map_err(|e| CatalogError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Individual global-good records
    pub fn records_dir(&self) -> PathBuf {
        self.data_dir.join("individual")
    }

    /// Individual use-case records
    pub fn use_cases_dir(&self) -> PathBuf {
        self.data_dir.join("use-cases")
    }

    /// Reference tables root
    pub fn reference_dir(&self) -> PathBuf {
        self.data_dir.join("reference")
    }

    /// Index artifacts directory
    pub fn output_dir(&self) -> PathBuf {
        self.output_dir.clone().unwrap_or_else(|| self.data_dir.clone())
    }

    /// Default config file location
    pub fn config_path(&self) -> PathBuf {
        self.data_dir.join("config.toml")
    }

    pub fn resolved_ttl(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.resolved_ttl_secs)
    }
}
