//! Document automation hub core
//!
//! Collaborator interfaces (storage, text generation, email, case management,
//! audit) and the workflow that drives the DOCX merge engine through them.
//! Tenant identity is always passed explicitly as a `TenantContext`.

pub mod audit;
pub mod cache;
pub mod cases;
pub mod config;
pub mod documents;
pub mod email;
pub mod error;
pub mod fingerprint;
pub mod generation;
pub mod quota;
pub mod storage;

pub use audit::{record_quietly, AuditError, AuditSink, MemoryAuditSink, TracingAuditSink};
pub use cache::SessionCache;
pub use cases::{CaseError, CaseManagement, CaseStatus, InMemoryCases};
pub use config::HubConfig;
pub use documents::{DocumentService, EmailDelivery, GeneratedField, RenderOutcome, RenderRequest};
pub use email::{Attachment, EmailError, EmailMessage, EmailSender, ResendClient};
pub use error::ServiceError;
pub use fingerprint::{InFlight, InFlightGuard, RequestFingerprint};
pub use generation::{
    generate_with_retry, GenerationError, GenerationRequest, OpenAiCompatibleClient, RetryPolicy,
    TextGenerator,
};
pub use quota::{QuotaConfig, QuotaDecision, QuotaLimiter};
pub use storage::{LocalStorage, StorageError, StorageLayout, TemplateCategory, TemplateStorage};
