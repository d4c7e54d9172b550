//! Request identity shared by every tenant-scoped operation

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Role of the acting user within a tenant (firm)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Attorney,
    Paralegal,
    Viewer,
}

impl Role {
    /// Whether this role may produce new documents
    pub fn can_render(self) -> bool {
        !matches!(self, Role::Viewer)
    }

    /// Parse a role name, case-insensitive
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "admin" => Some(Role::Admin),
            "attorney" => Some(Role::Attorney),
            "paralegal" => Some(Role::Paralegal),
            "viewer" => Some(Role::Viewer),
            _ => None,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Admin => write!(f, "admin"),
            Role::Attorney => write!(f, "attorney"),
            Role::Paralegal => write!(f, "paralegal"),
            Role::Viewer => write!(f, "viewer"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContextError {
    #[error("Missing tenant id")]
    MissingTenant,

    #[error("Missing user id")]
    MissingUser,

    #[error("Invalid tenant id: {0}")]
    InvalidTenant(String),
}

/// Tenant, user and role of the caller.
///
/// Constructed once per request by the authentication layer and passed
/// explicitly to every operation that scopes data by tenant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TenantContext {
    pub tenant_id: String,
    pub user_id: String,
    pub role: Role,
}

impl TenantContext {
    /// Build a validated context.
    ///
    /// Tenant ids end up in storage paths, so only `[A-Za-z0-9_-]` is accepted.
    pub fn new(tenant_id: &str, user_id: &str, role: Role) -> Result<Self, ContextError> {
        let tenant_id = tenant_id.trim();
        let user_id = user_id.trim();

        if tenant_id.is_empty() {
            return Err(ContextError::MissingTenant);
        }
        if user_id.is_empty() {
            return Err(ContextError::MissingUser);
        }
        if !tenant_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(ContextError::InvalidTenant(tenant_id.to_string()));
        }

        Ok(Self {
            tenant_id: tenant_id.to_string(),
            user_id: user_id.to_string(),
            role,
        })
    }
}
