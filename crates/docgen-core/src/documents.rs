//! Document workflow
//!
//! Ties the merge engine to its collaborators. A render request goes through:
//! 1. Role check, then request validation
//! 2. In-flight deduplication, then the tenant quota (refunded when nothing
//!    is stored)
//! 3. Optional generated fields (text generation with retry)
//! 4. Template download, merge on a blocking thread, output upload
//! 5. Optional email delivery and case status update
//!
//! Every outcome that matters (merge, macro rejection, failure, upload, email,
//! case update, generated text) is recorded through the audit sink.

use chrono::{DateTime, Utc};
use docx_merge::{
    merge_bytes, template_placeholders, MergeError, MergeOptions, RenderStats, RenderedBytes,
    Replacements,
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use shared_types::{AuditAction, TenantContext};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::audit::{record_quietly, AuditSink};
use crate::cache::SessionCache;
use crate::cases::{CaseManagement, CaseStatus};
use crate::config::HubConfig;
use crate::email::{Attachment, EmailMessage, EmailSender};
use crate::error::ServiceError;
use crate::fingerprint::{InFlight, RequestFingerprint};
use crate::generation::{generate_with_retry, GenerationRequest, RetryPolicy, TextGenerator};
use crate::quota::{QuotaDecision, QuotaLimiter};
use crate::storage::{StorageLayout, TemplateCategory, TemplateStorage};

/// A field whose value is written by the text generator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedField {
    pub name: String,
    pub prompt: String,
    #[serde(default)]
    pub system_message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailDelivery {
    pub to: Vec<String>,
    pub subject: String,
    #[serde(default)]
    pub html: String,
    #[serde(default)]
    pub reply_to: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderRequest {
    pub category: TemplateCategory,
    /// Template file name inside `/Templates/<category>/`
    pub template: String,
    #[serde(default)]
    pub replacements: Replacements,
    #[serde(default)]
    pub generated_fields: Vec<GeneratedField>,
    /// Output file name; derived from the template and content hash when absent
    #[serde(default)]
    pub output_name: Option<String>,
    #[serde(default)]
    pub email: Option<EmailDelivery>,
    #[serde(default)]
    pub case_id: Option<String>,
    /// Generated text is reused within one session
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RenderOutcome {
    pub output_path: String,
    pub content_hash: String,
    pub rendered_at: DateTime<Utc>,
    pub stats: RenderStats,
    pub generated_fields: Vec<String>,
    pub email_message_id: Option<String>,
    pub case_status: Option<CaseStatus>,
}

pub struct DocumentService {
    storage: Arc<dyn TemplateStorage>,
    audit: Arc<dyn AuditSink>,
    generator: Option<Arc<dyn TextGenerator>>,
    email: Option<Arc<dyn EmailSender>>,
    cases: Option<Arc<dyn CaseManagement>>,
    quota: QuotaLimiter,
    in_flight: InFlight,
    generated: SessionCache<String>,
    options: MergeOptions,
    retry: RetryPolicy,
    model: String,
    temperature: f32,
}

impl DocumentService {
    pub fn new(
        storage: Arc<dyn TemplateStorage>,
        audit: Arc<dyn AuditSink>,
        config: &HubConfig,
    ) -> Self {
        Self {
            storage,
            audit,
            generator: None,
            email: None,
            cases: None,
            quota: QuotaLimiter::new(config.quota.clone()),
            in_flight: InFlight::new(),
            generated: SessionCache::new(config.cache.max_entries, config.cache.ttl()),
            options: config.merge.clone(),
            retry: config.generation.retry_policy(),
            model: config.generation.model.clone(),
            temperature: config.generation.temperature,
        }
    }

    pub fn with_generator(mut self, generator: Arc<dyn TextGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    pub fn with_email(mut self, email: Arc<dyn EmailSender>) -> Self {
        self.email = Some(email);
        self
    }

    pub fn with_cases(mut self, cases: Arc<dyn CaseManagement>) -> Self {
        self.cases = Some(cases);
        self
    }

    pub fn quota(&self) -> &QuotaLimiter {
        &self.quota
    }

    /// `.docx` templates available in a category
    pub async fn list_templates(
        &self,
        ctx: &TenantContext,
        category: TemplateCategory,
    ) -> Result<Vec<String>, ServiceError> {
        let names = self
            .storage
            .list(ctx, &StorageLayout::template_folder(category))
            .await?;
        Ok(names
            .into_iter()
            .filter(|n| n.to_ascii_lowercase().ends_with(".docx"))
            .collect())
    }

    /// Placeholder names a template expects
    pub async fn template_fields(
        &self,
        ctx: &TenantContext,
        category: TemplateCategory,
        name: &str,
    ) -> Result<BTreeSet<String>, ServiceError> {
        validate_file_name(name)?;
        let path = StorageLayout::template_path(category, name);
        let bytes = self.storage.download(ctx, &path).await?;

        let options = self.options.clone();
        let template = path.clone();
        let result = tokio::task::spawn_blocking(move || {
            template_placeholders(&template, &bytes, &options)
        })
        .await
        .map_err(|e| ServiceError::Internal(e.to_string()))?;

        match result {
            Ok(fields) => Ok(fields),
            Err(err) => {
                self.record_merge_failure(ctx, &path, &err).await;
                Err(err.into())
            }
        }
    }

    /// Bytes of a previously rendered output
    pub async fn fetch_output(
        &self,
        ctx: &TenantContext,
        category: TemplateCategory,
        name: &str,
    ) -> Result<Vec<u8>, ServiceError> {
        validate_file_name(name)?;
        let bytes = self
            .storage
            .download(ctx, &StorageLayout::output_path(category, name))
            .await?;
        Ok(bytes)
    }

    /// Render a template and deliver the result
    #[instrument(skip_all, fields(tenant = %ctx.tenant_id, template = %request.template))]
    pub async fn render(
        &self,
        ctx: &TenantContext,
        request: RenderRequest,
    ) -> Result<RenderOutcome, ServiceError> {
        if !ctx.role.can_render() {
            return Err(ServiceError::Forbidden(ctx.role));
        }
        validate_file_name(&request.template)?;
        if let Some(output) = &request.output_name {
            validate_file_name(output)?;
        }
        if request.replacements.is_empty() && request.generated_fields.is_empty() {
            return Err(MergeError::EmptyReplacements.into());
        }

        let _guard = self
            .in_flight
            .try_acquire(RequestFingerprint::for_render(ctx, &request))
            .ok_or(ServiceError::DuplicateRequest)?;

        match self.quota.check(&ctx.tenant_id) {
            QuotaDecision::Allowed => {}
            decision => {
                let retry_after = decision.retry_after().unwrap_or_default();
                warn!(retry_after_secs = retry_after.as_secs(), "Render quota exceeded");
                return Err(ServiceError::QuotaExceeded { retry_after });
            }
        }

        let template_path = StorageLayout::template_path(request.category, &request.template);
        let (rendered, generated_fields, output_name, output_path) =
            match self.produce(ctx, &request, &template_path).await {
                Ok(produced) => produced,
                Err(err) => {
                    // Only a stored document costs quota
                    self.quota.refund(&ctx.tenant_id);
                    return Err(err);
                }
            };

        record_quietly(
            self.audit.as_ref(),
            ctx,
            AuditAction::TemplateMerged {
                template: template_path.clone(),
                content_hash: rendered.content_hash.clone(),
            },
            Some(rendered.content_hash.clone()),
            stats_metadata(&rendered.stats),
        )
        .await;
        record_quietly(
            self.audit.as_ref(),
            ctx,
            AuditAction::DocumentUploaded {
                path: output_path.clone(),
            },
            Some(rendered.content_hash.clone()),
            BTreeMap::new(),
        )
        .await;

        let email_message_id = match &request.email {
            Some(delivery) => Some(
                self.deliver(ctx, delivery, &output_name, &rendered.bytes, &rendered.content_hash)
                    .await?,
            ),
            None => None,
        };

        let case_status = match &request.case_id {
            Some(case_id) => {
                let status = if email_message_id.is_some() {
                    CaseStatus::Sent
                } else {
                    CaseStatus::DocumentDrafted
                };
                self.update_case(ctx, case_id, status).await?;
                Some(status)
            }
            None => None,
        };

        info!(
            output = %output_path,
            content_hash = %rendered.content_hash,
            processing_time_ms = rendered.stats.processing_time_ms,
            "Document rendered"
        );

        Ok(RenderOutcome {
            output_path,
            content_hash: rendered.content_hash,
            rendered_at: rendered.rendered_at,
            stats: rendered.stats,
            generated_fields,
            email_message_id,
            case_status,
        })
    }

    /// Generation, merge and upload; everything that must succeed before the
    /// render counts against the tenant's quota
    async fn produce(
        &self,
        ctx: &TenantContext,
        request: &RenderRequest,
        template_path: &str,
    ) -> Result<(RenderedBytes, Vec<String>, String, String), ServiceError> {
        let mut replacements = request.replacements.clone();
        let generated_fields = self
            .fill_generated_fields(ctx, request, &mut replacements)
            .await?;

        let template_bytes = self.storage.download(ctx, template_path).await?;
        let rendered = {
            let options = self.options.clone();
            let name = template_path.to_string();
            tokio::task::spawn_blocking(move || {
                merge_bytes(&name, &template_bytes, &replacements, &options)
            })
            .await
            .map_err(|e| ServiceError::Internal(e.to_string()))?
        };
        let rendered = match rendered {
            Ok(rendered) => rendered,
            Err(err) => {
                self.record_merge_failure(ctx, template_path, &err).await;
                return Err(err.into());
            }
        };

        let output_name = request
            .output_name
            .clone()
            .unwrap_or_else(|| default_output_name(&request.template, &rendered.content_hash));
        let output_path = StorageLayout::output_path(request.category, &output_name);
        self.storage
            .upload(ctx, &output_path, &rendered.bytes)
            .await?;

        Ok((rendered, generated_fields, output_name, output_path))
    }

    async fn fill_generated_fields(
        &self,
        ctx: &TenantContext,
        request: &RenderRequest,
        replacements: &mut Replacements,
    ) -> Result<Vec<String>, ServiceError> {
        if request.generated_fields.is_empty() {
            return Ok(Vec::new());
        }
        let generator = self
            .generator
            .as_ref()
            .ok_or(ServiceError::NotConfigured("Text generation"))?;

        let mut filled = Vec::with_capacity(request.generated_fields.len());
        for field in &request.generated_fields {
            let cache_key = generation_cache_key(field);
            let cached = match &request.session_id {
                Some(session) => self.generated.get(ctx, session, &cache_key).await,
                None => None,
            };

            let text = match cached {
                Some(text) => text,
                None => {
                    let generation = GenerationRequest {
                        prompt: field.prompt.clone(),
                        system_message: field.system_message.clone(),
                        model: self.model.clone(),
                        temperature: self.temperature,
                    };
                    let generated =
                        generate_with_retry(generator.as_ref(), &generation, &self.retry).await?;
                    record_quietly(
                        self.audit.as_ref(),
                        ctx,
                        AuditAction::TextGenerated {
                            field: field.name.clone(),
                            attempts: generated.attempts,
                        },
                        None,
                        BTreeMap::new(),
                    )
                    .await;
                    if let Some(session) = &request.session_id {
                        self.generated
                            .insert(ctx, session, &cache_key, generated.text.clone())
                            .await;
                    }
                    generated.text
                }
            };

            replacements.insert_scalar(&field.name, &text);
            filled.push(field.name.clone());
        }
        Ok(filled)
    }

    async fn deliver(
        &self,
        ctx: &TenantContext,
        delivery: &EmailDelivery,
        file_name: &str,
        bytes: &[u8],
        content_hash: &str,
    ) -> Result<String, ServiceError> {
        let sender = self
            .email
            .as_ref()
            .ok_or(ServiceError::NotConfigured("Email delivery"))?;

        let message = EmailMessage {
            to: delivery.to.clone(),
            subject: delivery.subject.clone(),
            html: delivery.html.clone(),
            text: None,
            reply_to: delivery.reply_to.clone(),
            attachments: vec![Attachment::docx(file_name, bytes.to_vec())],
        };
        let message_id = sender.send(&message).await?;

        let mut metadata = BTreeMap::new();
        metadata.insert("message_id".to_string(), message_id.clone());
        record_quietly(
            self.audit.as_ref(),
            ctx,
            AuditAction::DocumentEmailed {
                recipients: delivery.to.len() as u32,
            },
            Some(content_hash.to_string()),
            metadata,
        )
        .await;
        Ok(message_id)
    }

    async fn update_case(
        &self,
        ctx: &TenantContext,
        case_id: &str,
        status: CaseStatus,
    ) -> Result<(), ServiceError> {
        let cases = self
            .cases
            .as_ref()
            .ok_or(ServiceError::NotConfigured("Case management"))?;
        cases.update_case_status(case_id, status).await?;

        record_quietly(
            self.audit.as_ref(),
            ctx,
            AuditAction::CaseStatusUpdated {
                case_id: case_id.to_string(),
                status: status.to_string(),
            },
            None,
            BTreeMap::new(),
        )
        .await;
        Ok(())
    }

    async fn record_merge_failure(&self, ctx: &TenantContext, template: &str, err: &MergeError) {
        let action = match err {
            MergeError::MacroDetected { part, .. } => AuditAction::MacroRejected {
                template: template.to_string(),
                part: part.clone(),
            },
            other => AuditAction::MergeFailed {
                code: other.code().to_string(),
            },
        };
        let mut metadata = BTreeMap::new();
        metadata.insert("template".to_string(), template.to_string());
        metadata.insert("reason".to_string(), err.to_string());
        record_quietly(self.audit.as_ref(), ctx, action, None, metadata).await;
    }
}

/// Names end up in storage paths: one plain path segment only
fn validate_file_name(name: &str) -> Result<(), ServiceError> {
    let trimmed = name.trim();
    if trimmed.is_empty()
        || trimmed != name
        || name.contains(|c: char| c == '/' || c == '\\')
        || name == "."
        || name == ".."
    {
        return Err(ServiceError::InvalidRequest(format!(
            "Invalid file name: {:?}",
            name
        )));
    }
    Ok(())
}

/// `letter.docx` + hash -> `letter-<first 12 hash chars>.docx`
fn default_output_name(template: &str, content_hash: &str) -> String {
    let stem = template
        .rsplit_once('.')
        .map_or(template, |(stem, _)| stem);
    let short = &content_hash[..content_hash.len().min(12)];
    format!("{}-{}.docx", stem, short)
}

fn generation_cache_key(field: &GeneratedField) -> String {
    let mut hasher = Sha256::new();
    hasher.update(field.prompt.as_bytes());
    if let Some(system) = &field.system_message {
        hasher.update([0]);
        hasher.update(system.as_bytes());
    }
    format!("generated:{}:{}", field.name, hex::encode(hasher.finalize()))
}

fn stats_metadata(stats: &RenderStats) -> BTreeMap<String, String> {
    let mut metadata = BTreeMap::new();
    metadata.insert("parts_rewritten".to_string(), stats.parts_rewritten.to_string());
    metadata.insert(
        "placeholders_replaced".to_string(),
        stats.placeholders_replaced.to_string(),
    );
    metadata.insert("lists_expanded".to_string(), stats.lists_expanded.to_string());
    metadata.insert("size_bytes".to_string(), stats.output_size_bytes.to_string());
    metadata
}
