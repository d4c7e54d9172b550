//! Tamper-evident audit log for document generation events

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::io::{self, Read};
use uuid::Uuid;

/// Types of auditable events
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    TemplateMerged {
        template: String,
        content_hash: String,
    },
    MacroRejected {
        template: String,
        part: String,
    },
    MergeFailed {
        code: String,
    },
    DocumentUploaded {
        path: String,
    },
    DocumentEmailed {
        recipients: u32,
    },
    CaseStatusUpdated {
        case_id: String,
        status: String,
    },
    TextGenerated {
        field: String,
        attempts: u32,
    },
}

impl AuditAction {
    /// Short machine name used in logs and database rows
    pub fn name(&self) -> &'static str {
        match self {
            AuditAction::TemplateMerged { .. } => "TEMPLATE_MERGED",
            AuditAction::MacroRejected { .. } => "MACRO_REJECTED",
            AuditAction::MergeFailed { .. } => "MERGE_FAILED",
            AuditAction::DocumentUploaded { .. } => "DOCUMENT_UPLOADED",
            AuditAction::DocumentEmailed { .. } => "DOCUMENT_EMAILED",
            AuditAction::CaseStatusUpdated { .. } => "CASE_STATUS_UPDATED",
            AuditAction::TextGenerated { .. } => "TEXT_GENERATED",
        }
    }

    /// Security-relevant actions get a separate log stream
    pub fn is_security_event(&self) -> bool {
        matches!(self, AuditAction::MacroRejected { .. })
    }
}

/// A single audit log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub event_id: String,
    pub timestamp: String,
    pub tenant_id: String,
    pub action: AuditAction,
    pub actor: String,
    pub document_hash: Option<String>,
    pub previous_hash: Option<String>,
    pub metadata: BTreeMap<String, String>,
}

impl AuditEvent {
    /// Create a new audit event
    pub fn new(
        tenant_id: &str,
        action: AuditAction,
        actor: &str,
        document_hash: Option<String>,
        previous_hash: Option<String>,
        metadata: BTreeMap<String, String>,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4().to_string(),
            timestamp: Utc::now().to_rfc3339(),
            tenant_id: tenant_id.to_string(),
            action,
            actor: actor.to_string(),
            document_hash,
            previous_hash,
            metadata,
        }
    }

    /// Compute the hash of this event (for chain linking)
    pub fn compute_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.event_id.as_bytes());
        hasher.update(self.timestamp.as_bytes());
        hasher.update(self.tenant_id.as_bytes());
        hasher.update(format!("{:?}", self.action).as_bytes());
        hasher.update(self.actor.as_bytes());
        if let Some(ref hash) = self.document_hash {
            hasher.update(hash.as_bytes());
        }
        for (key, value) in &self.metadata {
            hasher.update(key.as_bytes());
            hasher.update(b"=");
            hasher.update(value.as_bytes());
        }
        if let Some(ref prev) = self.previous_hash {
            hasher.update(prev.as_bytes());
        }
        hex::encode(hasher.finalize())
    }
}

/// Chain of audit events with hash linking, one per tenant
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct AuditChain {
    pub events: Vec<AuditEvent>,
    pub tenant_id: String,
    pub created_at: String,
}

impl AuditChain {
    /// Create a new audit chain for a tenant
    pub fn new(tenant_id: &str) -> Self {
        Self {
            events: Vec::new(),
            tenant_id: tenant_id.to_string(),
            created_at: Utc::now().to_rfc3339(),
        }
    }

    /// Get the hash of the last event (for linking)
    pub fn last_hash(&self) -> Option<String> {
        self.events.last().map(|e| e.compute_hash())
    }

    /// Append an event, automatically linking to previous hash
    pub fn append(
        &mut self,
        action: AuditAction,
        actor: &str,
        document_hash: Option<String>,
        metadata: BTreeMap<String, String>,
    ) -> &AuditEvent {
        let previous_hash = self.last_hash();
        let event = AuditEvent::new(
            &self.tenant_id,
            action,
            actor,
            document_hash,
            previous_hash,
            metadata,
        );
        self.events.push(event);
        &self.events[self.events.len() - 1]
    }

    /// Verify the integrity of the chain
    pub fn verify(&self) -> Result<(), String> {
        let mut expected_prev: Option<String> = None;

        for (i, event) in self.events.iter().enumerate() {
            if event.previous_hash != expected_prev {
                return Err(format!(
                    "Chain broken at event {}: expected prev {:?}, got {:?}",
                    i, expected_prev, event.previous_hash
                ));
            }
            if event.tenant_id != self.tenant_id {
                return Err(format!(
                    "Event {} belongs to tenant {}, chain is {}",
                    i, event.tenant_id, self.tenant_id
                ));
            }
            expected_prev = Some(event.compute_hash());
        }

        Ok(())
    }

    /// Serialize to JSON
    pub fn to_json(&self) -> Result<String, String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| format!("Failed to serialize audit chain: {}", e))
    }

    /// Deserialize from JSON
    pub fn from_json(json: &str) -> Result<Self, String> {
        serde_json::from_str(json).map_err(|e| format!("Failed to deserialize audit chain: {}", e))
    }

    /// Generate a summary for display
    pub fn summary(&self) -> Vec<String> {
        self.events
            .iter()
            .map(|e| {
                format!(
                    "[{}] {} - {}",
                    e.timestamp.split('T').next().unwrap_or(&e.timestamp),
                    e.actor,
                    e.action.name()
                )
            })
            .collect()
    }
}

/// Compute SHA-256 hash of document bytes
pub fn hash_document(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Compute SHA-256 hash of a document without loading it into memory
pub fn hash_reader<R: Read>(mut reader: R) -> io::Result<String> {
    let mut hasher = Sha256::new();
    io::copy(&mut reader, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}
