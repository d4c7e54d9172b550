//! Request and response models for the Document Hub API

use serde::{Deserialize, Serialize};
use shared_types::{AuditAction, AuditEvent};
use std::collections::BTreeMap;

#[derive(Debug, Serialize, Deserialize)]
pub struct TemplateListResponse {
    pub category: String,
    pub templates: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TemplateFieldsResponse {
    pub template: String,
    pub fields: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct AuditQuery {
    pub limit: Option<u32>,
}

impl AuditQuery {
    pub const DEFAULT_LIMIT: u32 = 100;
    pub const MAX_LIMIT: u32 = 1000;

    pub fn limit(&self) -> u32 {
        self.limit
            .unwrap_or(Self::DEFAULT_LIMIT)
            .clamp(1, Self::MAX_LIMIT)
    }
}

/// Audit row as stored in SQLite
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct DbAuditEvent {
    pub seq: i64,
    pub event_id: String,
    pub tenant_id: String,
    pub actor: String,
    pub action: String,
    pub details_json: String,
    pub metadata_json: String,
    pub document_hash: Option<String>,
    pub previous_hash: Option<String>,
    pub event_hash: String,
    pub created_at: String,
}

impl DbAuditEvent {
    pub fn to_event(&self) -> Result<AuditEvent, serde_json::Error> {
        let action: AuditAction = serde_json::from_str(&self.details_json)?;
        let metadata: BTreeMap<String, String> = serde_json::from_str(&self.metadata_json)?;
        Ok(AuditEvent {
            event_id: self.event_id.clone(),
            timestamp: self.created_at.clone(),
            tenant_id: self.tenant_id.clone(),
            action,
            actor: self.actor.clone(),
            document_hash: self.document_hash.clone(),
            previous_hash: self.previous_hash.clone(),
            metadata,
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AuditEntry {
    pub seq: i64,
    pub action: String,
    pub actor: String,
    pub document_hash: Option<String>,
    pub event_hash: String,
    pub metadata: BTreeMap<String, String>,
    pub created_at: String,
}

impl From<DbAuditEvent> for AuditEntry {
    fn from(row: DbAuditEvent) -> Self {
        let metadata = serde_json::from_str(&row.metadata_json).unwrap_or_default();
        Self {
            seq: row.seq,
            action: row.action,
            actor: row.actor,
            document_hash: row.document_hash,
            event_hash: row.event_hash,
            metadata,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AuditLogResponse {
    pub tenant_id: String,
    pub chain_valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chain_error: Option<String>,
    pub events: Vec<AuditEntry>,
}
