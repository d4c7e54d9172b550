//! Request fingerprints and in-flight deduplication
//!
//! Two identical render requests from the same tenant must not run
//! concurrently; the second one is turned away while the first holds the guard.

use docx_merge::{ReplacementValue, Replacements};
use sha2::{Digest, Sha256};
use shared_types::TenantContext;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use crate::documents::RenderRequest;
use crate::storage::StorageLayout;

/// SHA-256 over tenant, template, the replacement map and, for render
/// requests, every other field that changes the outcome
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestFingerprint(String);

impl RequestFingerprint {
    /// Replacement order does not matter: the map is iterated sorted by name.
    pub fn compute(ctx: &TenantContext, template: &str, replacements: &Replacements) -> Self {
        Self(hex::encode(digest(ctx, template, replacements).finalize()))
    }

    /// Fingerprint of a whole render request
    pub fn for_render(ctx: &TenantContext, request: &RenderRequest) -> Self {
        let template = StorageLayout::template_path(request.category, &request.template);
        let mut hasher = digest(ctx, &template, &request.replacements);

        hasher.update([b'g']);
        hasher.update((request.generated_fields.len() as u64).to_le_bytes());
        for field in &request.generated_fields {
            update_str(&mut hasher, Some(&field.name));
            update_str(&mut hasher, Some(&field.prompt));
            update_str(&mut hasher, field.system_message.as_deref());
        }

        hasher.update([b'o']);
        update_str(&mut hasher, request.output_name.as_deref());

        hasher.update([b'e']);
        match &request.email {
            Some(email) => {
                hasher.update([1]);
                hasher.update((email.to.len() as u64).to_le_bytes());
                for to in &email.to {
                    update_str(&mut hasher, Some(to));
                }
                update_str(&mut hasher, Some(&email.subject));
                update_str(&mut hasher, Some(&email.html));
                update_str(&mut hasher, email.reply_to.as_deref());
            }
            None => hasher.update([0]),
        }

        hasher.update([b'c']);
        update_str(&mut hasher, request.case_id.as_deref());
        hasher.update([b's']);
        update_str(&mut hasher, request.session_id.as_deref());

        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn digest(ctx: &TenantContext, template: &str, replacements: &Replacements) -> Sha256 {
    let mut hasher = Sha256::new();
    hasher.update(ctx.tenant_id.as_bytes());
    hasher.update([0]);
    hasher.update(template.as_bytes());
    hasher.update([0]);
    for (name, value) in replacements.iter() {
        hasher.update(name.as_bytes());
        hasher.update([0]);
        match value {
            ReplacementValue::Scalar(text) => {
                hasher.update([b's']);
                hasher.update(text.as_bytes());
                hasher.update([0]);
            }
            ReplacementValue::List(items) => {
                hasher.update([b'l']);
                hasher.update((items.len() as u64).to_le_bytes());
                for item in items {
                    hasher.update(item.as_bytes());
                    hasher.update([0]);
                }
            }
        }
    }
    hasher
}

/// Length-prefixed so absent, empty and adjacent values stay distinct
fn update_str(hasher: &mut Sha256, value: Option<&str>) {
    match value {
        Some(value) => {
            hasher.update([1]);
            hasher.update((value.len() as u64).to_le_bytes());
            hasher.update(value.as_bytes());
        }
        None => hasher.update([0]),
    }
}

impl std::fmt::Display for RequestFingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Set of fingerprints currently being processed
#[derive(Debug, Clone, Default)]
pub struct InFlight {
    active: Arc<Mutex<HashSet<RequestFingerprint>>>,
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// `None` when the same request is already running
    pub fn try_acquire(&self, fingerprint: RequestFingerprint) -> Option<InFlightGuard> {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if !active.insert(fingerprint.clone()) {
            return None;
        }
        Some(InFlightGuard {
            active: Arc::clone(&self.active),
            fingerprint,
        })
    }

    pub fn len(&self) -> usize {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Releases its fingerprint on drop
#[derive(Debug)]
pub struct InFlightGuard {
    active: Arc<Mutex<HashSet<RequestFingerprint>>>,
    fingerprint: RequestFingerprint,
}

impl InFlightGuard {
    pub fn fingerprint(&self) -> &RequestFingerprint {
        &self.fingerprint
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.fingerprint);
    }
}
