//! DPG Catalog Daemon
//!
//! ## Usage
//!
//! ```bash
//! # Serve the HTTP API from a data directory
//! dpg-catalog --data-dir /srv/catalog
//!
//! # Rebuild the index tiers once and print the report
//! dpg-catalog --data-dir /srv/catalog compile
//!
//! # Read records and reference tables from the published site instead
//! dpg-catalog --source-url https://catalog.example.org/data serve
//! ```

use clap::{Parser, Subcommand};
use dpg_catalog::config::default_data_dir;
use dpg_catalog::{CatalogSource, Config, FsSource, HttpServer, HttpSource, Services, TierCompiler};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "dpg-catalog")]
#[command(about = "Tier compiler, resolver and related-content API for the DPG catalog")]
struct Args {
    /// Path to config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Data directory (records, use cases, reference tables)
    #[arg(long, env = "CATALOG_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// HTTP API port
    #[arg(long, env = "CATALOG_HTTP_PORT")]
    http_port: Option<u16>,

    /// Bearer token for /admin routes
    #[arg(long, env = "CATALOG_ADMIN_TOKEN")]
    admin_token: Option<String>,

    /// Base URL of the published static JSON
    #[arg(long, env = "CATALOG_SOURCE_URL")]
    source_url: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP API (default)
    Serve,
    /// Compile the index tiers once and exit
    Compile,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("dpg_catalog=info".parse()?),
        )
        .init();

    let args = Args::parse();

    // Explicit --config, else config.toml inside the data directory if present
    let mut config = if let Some(config_path) = &args.config {
        Config::load(config_path)?
    } else {
        let defaults = Config {
            data_dir: args.data_dir.clone().unwrap_or_else(default_data_dir),
            ..Config::default()
        };
        let config_path = defaults.config_path();
        if config_path.exists() {
            info!(path = %config_path.display(), "Loading config");
            Config::load(&config_path)?
        } else {
            defaults
        }
    };

    // Apply CLI overrides
    if let Some(dir) = args.data_dir {
        config.data_dir = dir;
    }
    if let Some(port) = args.http_port {
        config.http_port = port;
    }
    if args.admin_token.is_some() {
        config.admin_token = args.admin_token;
    }
    if args.source_url.is_some() {
        config.source_url = args.source_url;
    }

    info!(
        data_dir = %config.data_dir.display(),
        source_url = ?config.source_url,
        "Starting dpg-catalog"
    );

    let source: Arc<dyn CatalogSource> = match config.source_url {
        Some(ref url) => Arc::new(HttpSource::new(url.clone())),
        None => Arc::new(FsSource::from_config(&config)),
    };
    let services = Arc::new(Services::new(&config, source));

    match args.command.unwrap_or(Command::Serve) {
        Command::Compile => {
            let refs = services.catalog.load_all().await?;
            let compiler = TierCompiler::new(config.records_dir(), config.output_dir());
            let report = compiler.compile(&refs).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Serve => {
            if config.admin_token.is_none() {
                warn!("No admin token configured; /admin routes are disabled");
            }

            // Warm reference tables so resolver phase 2 can start immediately
            if let Err(e) = services.catalog.load_all().await {
                warn!(error = %e, "Reference warm-up failed, will retry on demand");
            }
            if let Err(e) = services.relationships.reload().await {
                warn!(error = %e, "Relationship corpus not loaded");
            }

            let addr = SocketAddr::from(([0, 0, 0, 0], config.http_port));
            let server = Arc::new(HttpServer::new(services, addr));
            server.run().await?;
        }
    }

    Ok(())
}
