//! Document Hub API Server
//!
//! Provides REST endpoints for:
//! - Template discovery per category
//! - Document rendering, delivery and download
//! - Per-tenant audit log review

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub mod audit;
pub mod error;
pub mod handlers;
pub mod models;
pub mod state;
pub mod tenant;

pub use state::AppState;

/// Build the router for a prepared state
pub fn app(state: Arc<AppState>) -> Router {
    // CORS configuration for web clients
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health check
        .route("/health", get(handlers::health))
        // Template discovery
        .route("/api/templates/:category", get(handlers::list_templates))
        .route(
            "/api/templates/:category/:name/fields",
            get(handlers::template_fields),
        )
        // Rendering and download
        .route("/api/documents", post(handlers::render_document))
        .route(
            "/api/documents/:category/:name",
            get(handlers::get_document),
        )
        // Audit
        .route("/api/audit", get(handlers::audit_log))
        // Add middleware
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
