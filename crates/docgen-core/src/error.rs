use docx_merge::MergeError;
use shared_types::Role;
use std::time::Duration;
use thiserror::Error;

use crate::cases::CaseError;
use crate::email::EmailError;
use crate::generation::GenerationError;
use crate::storage::StorageError;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Merge(#[from] MergeError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error(transparent)]
    Email(#[from] EmailError),

    #[error(transparent)]
    Case(#[from] CaseError),

    #[error("Role {0} may not render documents")]
    Forbidden(Role),

    #[error("Render quota exceeded, retry after {}s", retry_after.as_secs())]
    QuotaExceeded { retry_after: Duration },

    #[error("An identical request is already being processed")]
    DuplicateRequest,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("{0} is not configured")]
    NotConfigured(&'static str),

    #[error("Internal error: {0}")]
    Internal(String),
}
