//! SQLite-backed audit sink
//!
//! Rows form one hash-linked chain per tenant: each row stores the hash of the
//! tenant's previous row. Appends are serialized so the chain never forks.

use async_trait::async_trait;
use docgen_core::{AuditError, AuditSink, TracingAuditSink};
use shared_types::{AuditAction, AuditChain, AuditEvent, TenantContext};
use sqlx::sqlite::SqlitePool;
use std::collections::BTreeMap;
use tokio::sync::Mutex;

use crate::models::DbAuditEvent;

pub struct SqliteAuditSink {
    db: SqlitePool,
    append_lock: Mutex<()>,
}

impl SqliteAuditSink {
    pub fn new(db: SqlitePool) -> Self {
        Self {
            db,
            append_lock: Mutex::new(()),
        }
    }

    /// Most recent `limit` events of a tenant, oldest first
    pub async fn recent(&self, tenant_id: &str, limit: u32) -> Result<Vec<DbAuditEvent>, sqlx::Error> {
        let mut rows: Vec<DbAuditEvent> = sqlx::query_as(
            r#"
            SELECT seq, event_id, tenant_id, actor, action, details_json, metadata_json,
                   document_hash, previous_hash, event_hash, created_at
            FROM audit_events
            WHERE tenant_id = ?
            ORDER BY seq DESC
            LIMIT ?
            "#,
        )
        .bind(tenant_id)
        .bind(i64::from(limit))
        .fetch_all(&self.db)
        .await?;
        rows.reverse();
        Ok(rows)
    }

    /// Rebuild the tenant's full chain from its rows and verify every link
    pub async fn verify_chain(&self, tenant_id: &str) -> Result<Result<(), String>, sqlx::Error> {
        let rows: Vec<DbAuditEvent> = sqlx::query_as(
            r#"
            SELECT seq, event_id, tenant_id, actor, action, details_json, metadata_json,
                   document_hash, previous_hash, event_hash, created_at
            FROM audit_events
            WHERE tenant_id = ?
            ORDER BY seq ASC
            "#,
        )
        .bind(tenant_id)
        .fetch_all(&self.db)
        .await?;

        let mut chain = AuditChain::new(tenant_id);
        for row in rows {
            let event = match row.to_event() {
                Ok(event) => event,
                Err(e) => return Ok(Err(format!("Row {} unreadable: {}", row.seq, e))),
            };
            if event.compute_hash() != row.event_hash {
                return Ok(Err(format!("Row {} hash mismatch", row.seq)));
            }
            chain.events.push(event);
        }
        Ok(chain.verify())
    }

    async fn last_hash(&self, tenant_id: &str) -> Result<Option<String>, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT event_hash FROM audit_events WHERE tenant_id = ? ORDER BY seq DESC LIMIT 1",
        )
        .bind(tenant_id)
        .fetch_optional(&self.db)
        .await
    }
}

#[async_trait]
impl AuditSink for SqliteAuditSink {
    async fn record(
        &self,
        ctx: &TenantContext,
        action: AuditAction,
        document_hash: Option<String>,
        metadata: BTreeMap<String, String>,
    ) -> Result<(), AuditError> {
        TracingAuditSink
            .record(ctx, action.clone(), document_hash.clone(), metadata.clone())
            .await?;

        let _append = self.append_lock.lock().await;
        let previous_hash = self
            .last_hash(&ctx.tenant_id)
            .await
            .map_err(|e| AuditError(e.to_string()))?;

        let event = AuditEvent::new(
            &ctx.tenant_id,
            action,
            &ctx.user_id,
            document_hash,
            previous_hash,
            metadata,
        );
        let details_json =
            serde_json::to_string(&event.action).map_err(|e| AuditError(e.to_string()))?;
        let metadata_json =
            serde_json::to_string(&event.metadata).map_err(|e| AuditError(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO audit_events (event_id, tenant_id, actor, action, details_json, metadata_json,
                                      document_hash, previous_hash, event_hash, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&event.event_id)
        .bind(&event.tenant_id)
        .bind(&event.actor)
        .bind(event.action.name())
        .bind(&details_json)
        .bind(&metadata_json)
        .bind(&event.document_hash)
        .bind(&event.previous_hash)
        .bind(event.compute_hash())
        .bind(&event.timestamp)
        .execute(&self.db)
        .await
        .map_err(|e| AuditError(e.to_string()))?;

        Ok(())
    }
}
