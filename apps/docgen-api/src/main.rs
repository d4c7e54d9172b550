//! Document Hub API Server binary

use anyhow::Result;
use docgen_api::AppState;
use docgen_core::HubConfig;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("docgen_api=info".parse()?)
                .add_directive("docgen_core=info".parse()?)
                .add_directive("tower_http=debug".parse()?),
        )
        .init();

    let config = match std::env::var("DOCGEN_CONFIG") {
        Ok(path) => {
            info!("Loading configuration from {}", path);
            HubConfig::from_file(&path)?
        }
        Err(_) => HubConfig::default(),
    }
    .with_env_overrides();

    // Initialize application state
    info!("Initializing Document Hub API...");
    let state = Arc::new(AppState::new(config).await?);
    let app = docgen_api::app(state);

    // Parse bind address
    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(3001);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Starting Document Hub API on http://{}", addr);

    // Start server
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
