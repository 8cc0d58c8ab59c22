//! Rebuild service - the authorization-gated index rebuild trigger
//!
//! ```text
//! rebuild(token)
//!   ├─ bad/missing token ─► Err(Unauthorized)      (no file I/O)
//!   └─ warm references ─► compile tiers ─► reset resolver ─► reload corpus
//!          any failure ─► Ok({success: false, error})
//! ```

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::compiler::{CompileReport, TierCompiler};
use crate::error::{CatalogError, Result};
use crate::reference::ReferenceCatalog;
use crate::resolver::ProgressiveResolver;

use super::relationship_service::RelationshipService;

/// Extract the token from an `Authorization` header.
/// Supports "Bearer <token>" and raw tokens.
pub fn extract_token_from_header(auth_header: Option<&str>) -> Option<&str> {
    let header = auth_header?;

    if let Some(token) = header.strip_prefix("Bearer ") {
        let token = token.trim();
        if !token.is_empty() {
            return Some(token);
        }
    }

    if !header.contains(' ') {
        let token = header.trim();
        if !token.is_empty() {
            return Some(token);
        }
    }

    None
}

/// Outcome of a rebuild request.
#[derive(Debug, Clone, Serialize)]
pub struct RebuildResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<CompileReport>,
}

impl RebuildResponse {
    fn succeeded(report: CompileReport) -> Self {
        Self {
            success: true,
            message: Some(format!(
                "Compiled {} of {} records ({} skipped)",
                report.compiled,
                report.total,
                report.skip_count()
            )),
            error: None,
            timestamp: Utc::now(),
            report: Some(report),
        }
    }

    fn failed(error: &CatalogError) -> Self {
        Self {
            success: false,
            message: None,
            error: Some(error.to_string()),
            timestamp: Utc::now(),
            report: None,
        }
    }
}

/// Runs the tier compiler on request and refreshes runtime state afterwards.
pub struct RebuildService {
    admin_token: Option<String>,
    catalog: Arc<ReferenceCatalog>,
    compiler: TierCompiler,
    resolver: Arc<ProgressiveResolver>,
    relationships: Arc<RelationshipService>,
    running: Mutex<()>,
}

impl RebuildService {
    pub fn new(
        admin_token: Option<String>,
        catalog: Arc<ReferenceCatalog>,
        compiler: TierCompiler,
        resolver: Arc<ProgressiveResolver>,
        relationships: Arc<RelationshipService>,
    ) -> Self {
        Self {
            admin_token,
            catalog,
            compiler,
            resolver,
            relationships,
            running: Mutex::new(()),
        }
    }

    /// Check a presented token. Admin routes are closed when no token is configured.
    pub fn authorize(&self, presented: Option<&str>) -> Result<()> {
        let expected = self
            .admin_token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| CatalogError::Unauthorized("admin token not configured".into()))?;

        match presented {
            Some(token) if token == expected => Ok(()),
            Some(_) => Err(CatalogError::Unauthorized("invalid admin token".into())),
            None => Err(CatalogError::Unauthorized("missing admin token".into())),
        }
    }

    /// Rebuild every tier. Only authorization failures are returned as
    /// errors; processing failures come back as `success: false`.
    pub async fn rebuild(&self, token: Option<&str>) -> Result<RebuildResponse> {
        if let Err(e) = self.authorize(token) {
            warn!(error = %e, "Rebuild rejected");
            return Err(e);
        }

        let _running = self.running.lock().await;
        info!("Rebuild started");

        match self.run().await {
            Ok(report) => {
                info!(
                    compiled = report.compiled,
                    skipped = report.skip_count(),
                    "Rebuild finished"
                );
                Ok(RebuildResponse::succeeded(report))
            }
            Err(e) => {
                error!(error = %e, "Rebuild failed");
                Ok(RebuildResponse::failed(&e))
            }
        }
    }

    async fn run(&self) -> Result<CompileReport> {
        let refs = self.catalog.load_all().await?;
        let report = self.compiler.compile(&refs).await?;
        self.resolver.clear().await;
        self.relationships.reload().await?;
        Ok(report)
    }

    /// Drop both caches (reference tables and resolved entities).
    pub async fn clear_caches(&self, token: Option<&str>) -> Result<()> {
        self.authorize(token)?;
        self.catalog.clear();
        self.resolver.clear().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_token() {
        assert_eq!(extract_token_from_header(Some("Bearer abc")), Some("abc"));
        assert_eq!(extract_token_from_header(Some("abc")), Some("abc"));
        assert_eq!(extract_token_from_header(Some("Bearer ")), None);
        assert_eq!(extract_token_from_header(Some("Basic a b")), None);
        assert_eq!(extract_token_from_header(None), None);
    }

    #[test]
    fn test_failed_response_shape() {
        let response = RebuildResponse::failed(&CatalogError::NotReady("x".into()));
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["success"], false);
        assert!(value.get("message").is_none());
        assert!(value["error"].as_str().unwrap().contains("not ready"));
        assert!(value.get("timestamp").is_some());
    }
}
