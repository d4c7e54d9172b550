//! Audit sinks
//!
//! Every document event is recorded through an `AuditSink`. Recording must
//! never fail the operation it describes, so callers go through
//! [`record_quietly`].

use async_trait::async_trait;
use shared_types::{AuditAction, AuditChain, AuditEvent, TenantContext};
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
#[error("Audit sink error: {0}")]
pub struct AuditError(pub String);

#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(
        &self,
        ctx: &TenantContext,
        action: AuditAction,
        document_hash: Option<String>,
        metadata: BTreeMap<String, String>,
    ) -> Result<(), AuditError>;
}

/// Record an event, logging and swallowing any sink failure
pub async fn record_quietly(
    sink: &dyn AuditSink,
    ctx: &TenantContext,
    action: AuditAction,
    document_hash: Option<String>,
    metadata: BTreeMap<String, String>,
) {
    let name = action.name();
    if let Err(e) = sink.record(ctx, action, document_hash, metadata).await {
        warn!(tenant = %ctx.tenant_id, action = name, "Failed to record audit event: {}", e);
    }
}

/// Writes audit events to the `audit` and `security_audit` log targets
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn record(
        &self,
        ctx: &TenantContext,
        action: AuditAction,
        document_hash: Option<String>,
        metadata: BTreeMap<String, String>,
    ) -> Result<(), AuditError> {
        let details = serde_json::to_string(&action).map_err(|e| AuditError(e.to_string()))?;
        let document_hash = document_hash.unwrap_or_default();

        if action.is_security_event() {
            warn!(
                target: "security_audit",
                tenant = %ctx.tenant_id,
                actor = %ctx.user_id,
                action = action.name(),
                details = %details,
                "Security event"
            );
        } else {
            info!(
                target: "audit",
                tenant = %ctx.tenant_id,
                actor = %ctx.user_id,
                action = action.name(),
                document_hash = %document_hash,
                details = %details,
                metadata = ?metadata,
                "Audit event"
            );
        }
        Ok(())
    }
}

/// Keeps one hash-linked chain per tenant in memory
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    chains: Mutex<HashMap<String, AuditChain>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of a tenant's chain
    pub fn chain(&self, tenant_id: &str) -> Option<AuditChain> {
        self.chains.lock().ok()?.get(tenant_id).cloned()
    }

    pub fn events(&self, tenant_id: &str) -> Vec<AuditEvent> {
        self.chain(tenant_id).map(|c| c.events).unwrap_or_default()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn record(
        &self,
        ctx: &TenantContext,
        action: AuditAction,
        document_hash: Option<String>,
        metadata: BTreeMap<String, String>,
    ) -> Result<(), AuditError> {
        let mut chains = self
            .chains
            .lock()
            .map_err(|_| AuditError("audit chain lock poisoned".to_string()))?;
        chains
            .entry(ctx.tenant_id.clone())
            .or_insert_with(|| AuditChain::new(&ctx.tenant_id))
            .append(action, &ctx.user_id, document_hash, metadata);
        Ok(())
    }
}
