mod config;
mod mcp;
mod oauth;
mod routes;
mod tenants;

use axum::routing::{get, post};
use axum::Router;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::oauth::virtual_clients::VirtualClientStore;
use crate::routes::AppState;
use crate::tenants::TenantRegistry;

/// LMS MCP Gateway — fronts many independent LMS tenants behind one OAuth2
/// proxy and JSON-RPC endpoint, substituting real upstream credentials for
/// caller-supplied or virtual ones.
#[derive(Parser, Debug)]
#[command(name = "lms-mcp-gateway", version, about)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Port to listen on (overrides config file)
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut cfg = match config::load_config(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("Configuration error: {e}");
            std::process::exit(1);
        }
    };

    // CLI --port overrides config
    if let Some(port) = cli.port {
        cfg.server.port = port;
    }

    let registry = TenantRegistry::new(&cfg);
    let tenants = registry.list_configured_tenants();
    tracing::info!(tenants = tenants.len(), "Configuration loaded successfully");
    for tenant in &tenants {
        tracing::info!(tenant = %tenant, "  Tenant configured");
    }

    let store = VirtualClientStore::new(cfg.store.path.clone(), cfg.server_secret_bytes());
    if let Err(e) = store.initialize().await {
        tracing::error!("Failed to initialize virtual client store: {e}");
        std::process::exit(1);
    }

    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()
        .unwrap_or_else(|e| {
            tracing::error!("Failed to build HTTP client: {e}");
            std::process::exit(1);
        });

    let bind_addr = format!("{}:{}", cfg.server.host, cfg.server.port);
    let public_url = cfg.server.public_url.clone();

    let state = AppState {
        config: Arc::new(cfg),
        registry: Arc::new(registry),
        store: Arc::new(store),
        http,
    };

    let app = Router::new()
        // Discovery endpoints
        .route(
            "/.well-known/oauth-authorization-server",
            get(routes::well_known::authorization_server),
        )
        .route(
            "/.well-known/oauth-protected-resource",
            get(routes::well_known::protected_resource),
        )
        // OAuth2 proxy endpoints
        .route("/oauth2/authorize", get(routes::authorize::authorize))
        .route("/oauth2/token", post(routes::token::token))
        .route("/oauth2/register", post(routes::register::register))
        // JSON-RPC endpoint
        .route("/mcp", post(mcp::mcp))
        .route("/health", get(routes::health))
        .with_state(state);

    tracing::info!("Listening on {bind_addr}");
    tracing::info!("Public URL: {public_url}");

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .unwrap_or_else(|e| {
            tracing::error!("Failed to bind to {bind_addr}: {e}");
            std::process::exit(1);
        });

    axum::serve(listener, app).await.unwrap_or_else(|e| {
        tracing::error!("Server error: {e}");
        std::process::exit(1);
    });
}
