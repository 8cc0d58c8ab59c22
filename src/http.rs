//! HTTP API for the catalog
//!
//! - `GET /health` - status and cache statistics
//! - `GET /reference/{key}` - one reference table
//! - `GET /entities/{id}` - fully resolved entity (resolution state JSON)
//! - `GET /related/{kind}/{id}` - `kind` is `goods`, `use-cases` or `good-use-cases`
//! - `POST /admin/rebuild` - rebuild the index tiers (bearer token)
//! - `POST /admin/cache/clear` - drop reference and resolved caches (bearer token)
//!
//! ```bash
//! curl http://localhost:8095/entities/dhis2
//! curl -X POST -H "Authorization: Bearer $TOKEN" http://localhost:8095/admin/rebuild
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{header, Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::error::{CatalogError, Result};
use crate::reference::ReferenceKey;
use crate::relations::RelationKind;
use crate::services::{self, extract_token_from_header, Services};

/// HTTP server state
pub struct HttpServer {
    services: Arc<Services>,
    bind_addr: SocketAddr,
}

impl HttpServer {
    pub fn new(services: Arc<Services>, bind_addr: SocketAddr) -> Self {
        Self {
            services,
            bind_addr,
        }
    }

    /// Run the HTTP server
    pub async fn run(self: Arc<Self>) -> Result<()> {
        let listener = TcpListener::bind(self.bind_addr).await?;
        info!(addr = %self.bind_addr, "HTTP server listening");

        loop {
            let (stream, remote_addr) = listener.accept().await?;
            let io = TokioIo::new(stream);
            let server = self.clone();

            tokio::spawn(async move {
                let service = service_fn(move |req| {
                    let server = server.clone();
                    async move { server.handle_request(req).await }
                });

                if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                    warn!(addr = %remote_addr, error = %err, "Connection error");
                }
            });
        }
    }

    /// Route requests to handlers
    pub async fn handle_request<B>(
        &self,
        req: Request<B>,
    ) -> std::result::Result<Response<Full<Bytes>>, hyper::Error> {
        let path = req.uri().path().to_string();
        let method = req.method().clone();
        let token = req
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| extract_token_from_header(Some(v)))
            .map(str::to_string);

        debug!(method = %method, path = %path, "Incoming request");

        let response = match (method, path.as_str()) {
            (Method::GET, "/health") => self.handle_health(),

            (Method::GET, p) if p.starts_with("/reference/") => {
                let key = p.strip_prefix("/reference/").unwrap_or("");
                self.handle_reference(key).await
            }

            (Method::GET, p) if p.starts_with("/entities/") => {
                let id = p.strip_prefix("/entities/").unwrap_or("");
                self.handle_entity(id).await
            }

            (Method::GET, p) if p.starts_with("/related/") => {
                let rest = p.strip_prefix("/related/").unwrap_or("");
                self.handle_related(rest).await
            }

            (Method::POST, "/admin/rebuild") => self.handle_rebuild(token.as_deref()).await,
            (Method::POST, "/admin/cache/clear") => {
                self.handle_cache_clear(token.as_deref()).await
            }
            (_, "/admin/rebuild") | (_, "/admin/cache/clear") => services::method_not_allowed(),

            _ => services::not_found("Not found"),
        };

        Ok(response)
    }

    fn handle_health(&self) -> Response<Full<Bytes>> {
        services::ok(&serde_json::json!({
            "status": "ok",
            "reference_ready": self.services.catalog.is_ready(),
            "reference_cache": self.services.catalog.stats(),
            "resolved_cache": self.services.resolver.cache().stats(),
        }))
    }

    async fn handle_reference(&self, key: &str) -> Response<Full<Bytes>> {
        let Some(key) = ReferenceKey::parse(key) else {
            return services::not_found(&format!("Unknown reference table '{}'", key));
        };
        services::from_result(
            self.services
                .catalog
                .table(key)
                .await
                .map(|table| table.to_value()),
        )
    }

    /// Resolve to a terminal state. Reference data is warmed first, since the
    /// resolver's detailed phase waits for it.
    async fn handle_entity(&self, id: &str) -> Response<Full<Bytes>> {
        if let Err(e) = crate::source::validate_id(id) {
            return services::error_response(e);
        }
        if !self.services.catalog.is_ready() {
            if let Err(e) = self.services.catalog.load_all().await {
                return services::error_response(e);
            }
        }

        let state = self.services.resolver.resolve_complete(id).await;
        let status = match state.phase {
            crate::resolver::Phase::Error => StatusCode::NOT_FOUND,
            _ => StatusCode::OK,
        };
        services::json_response(status, &state)
    }

    async fn handle_related(&self, rest: &str) -> Response<Full<Bytes>> {
        let Some((kind, id)) = rest.split_once('/') else {
            return services::bad_request("Expected /related/{kind}/{id}");
        };
        let Some(kind) = RelationKind::parse(kind) else {
            return services::error_response(CatalogError::InvalidInput(format!(
                "unknown relation kind '{}'",
                kind
            )));
        };

        if kind == RelationKind::GoodUseCases {
            return services::from_result(self.services.relationships.use_cases_for_good(id).await);
        }
        services::from_result(self.services.relationships.related(kind, id).await)
    }

    async fn handle_rebuild(&self, token: Option<&str>) -> Response<Full<Bytes>> {
        match self.services.rebuild.rebuild(token).await {
            Ok(response) if response.success => services::ok(&response),
            Ok(response) => services::json_response(StatusCode::INTERNAL_SERVER_ERROR, &response),
            Err(e) => services::error_response(e),
        }
    }

    async fn handle_cache_clear(&self, token: Option<&str>) -> Response<Full<Bytes>> {
        match self.services.rebuild.clear_caches(token).await {
            Ok(()) => services::ok(&serde_json::json!({ "success": true })),
            Err(e) => services::error_response(e),
        }
    }
}
