//! Application state for the Document Hub API

use anyhow::{Context, Result};
use docgen_core::{
    DocumentService, HubConfig, LocalStorage, OpenAiCompatibleClient, ResendClient,
    TemplateStorage,
};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use std::sync::Arc;

use crate::audit::SqliteAuditSink;

pub struct AppState {
    pub db: SqlitePool,
    pub audit: Arc<SqliteAuditSink>,
    pub documents: DocumentService,
}

impl AppState {
    pub async fn new(config: HubConfig) -> Result<Self> {
        // Get database path from env or keep it next to the document store
        let db_url = match std::env::var("DATABASE_URL") {
            Ok(url) => url,
            Err(_) => {
                std::fs::create_dir_all(&config.storage.root).with_context(|| {
                    format!("Failed to create {}", config.storage.root.display())
                })?;
                format!(
                    "sqlite:{}/audit.db?mode=rwc",
                    config.storage.root.display()
                )
            }
        };

        Self::connect(&db_url, config).await
    }

    /// Build state against an explicit database URL
    pub async fn connect(db_url: &str, config: HubConfig) -> Result<Self> {
        tracing::info!("Connecting to database: {}", db_url);

        // In-memory databases exist per connection
        let max_connections = if db_url.contains(":memory:") { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(db_url)
            .await?;

        Self::run_migrations(&pool).await?;

        let storage: Arc<dyn TemplateStorage> =
            Arc::new(LocalStorage::new(config.storage.root.clone()));
        let audit = Arc::new(SqliteAuditSink::new(pool.clone()));

        let mut documents = DocumentService::new(storage, audit.clone(), &config);
        if let Some(key) = &config.generation.api_key {
            tracing::info!("Text generation enabled ({})", config.generation.model);
            documents = documents.with_generator(Arc::new(OpenAiCompatibleClient::with_endpoint(
                key.clone(),
                config.generation.endpoint.clone(),
            )));
        }
        if let Some(key) = &config.email.api_key {
            tracing::info!("Email delivery enabled");
            documents = documents.with_email(Arc::new(ResendClient::new(
                key.clone(),
                config.email.from_address.clone(),
            )));
        }

        Ok(Self {
            db: pool,
            audit,
            documents,
        })
    }

    async fn run_migrations(pool: &SqlitePool) -> Result<()> {
        tracing::info!("Running database migrations...");

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS audit_events (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                event_id TEXT NOT NULL UNIQUE,
                tenant_id TEXT NOT NULL,
                actor TEXT NOT NULL,
                action TEXT NOT NULL,
                details_json TEXT NOT NULL,
                metadata_json TEXT NOT NULL DEFAULT '{}',
                document_hash TEXT,
                previous_hash TEXT,
                event_hash TEXT NOT NULL,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(pool)
        .await?;

        // Index for per-tenant chain walks
        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_audit_events_tenant ON audit_events(tenant_id, seq)
            "#,
        )
        .execute(pool)
        .await?;

        tracing::info!("Migrations complete");
        Ok(())
    }
}
