pub mod audit;
pub mod types;

pub use audit::{hash_document, hash_reader, AuditAction, AuditChain, AuditEvent};
pub use types::{ContextError, Role, TenantContext};
