//! Caller identity extracted from request headers
//!
//! Authentication happens upstream; the gateway forwards the verified tenant,
//! user and role as `X-Tenant-Id`, `X-User-Id` and `X-User-Role`.

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use shared_types::{ContextError, Role, TenantContext};

use crate::error::ApiError;

pub const TENANT_HEADER: &str = "x-tenant-id";
pub const USER_HEADER: &str = "x-user-id";
pub const ROLE_HEADER: &str = "x-user-role";

/// Validated `TenantContext` for the current request
#[derive(Debug, Clone)]
pub struct Tenant(pub TenantContext);

#[async_trait]
impl<S> FromRequestParts<S> for Tenant
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string()
        };

        let role_name = header(ROLE_HEADER);
        let role = Role::parse(&role_name)
            .ok_or_else(|| ApiError::Unauthorized(format!("unknown role {:?}", role_name)))?;

        let ctx = TenantContext::new(&header(TENANT_HEADER), &header(USER_HEADER), role)
            .map_err(|e| match e {
                ContextError::InvalidTenant(_) => ApiError::InvalidRequest(e.to_string()),
                other => ApiError::Unauthorized(other.to_string()),
            })?;

        Ok(Tenant(ctx))
    }
}
