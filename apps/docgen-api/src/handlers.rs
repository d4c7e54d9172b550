//! HTTP handlers for the Document Hub API

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    Json,
};
use docgen_core::{RenderOutcome, RenderRequest, TemplateCategory};
use shared_types::Role;
use std::sync::Arc;

use crate::error::ApiError;
use crate::models::*;
use crate::state::AppState;
use crate::tenant::Tenant;

const DOCX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

/// Health check endpoint
pub async fn health() -> &'static str {
    "OK"
}

fn parse_category(value: &str) -> Result<TemplateCategory, ApiError> {
    TemplateCategory::parse(value)
        .ok_or_else(|| ApiError::NotFound(format!("Unknown category: {}", value)))
}

/// List templates of a category
pub async fn list_templates(
    State(state): State<Arc<AppState>>,
    Tenant(ctx): Tenant,
    Path(category): Path<String>,
) -> Result<Json<TemplateListResponse>, ApiError> {
    let category = parse_category(&category)?;
    let templates = state.documents.list_templates(&ctx, category).await?;

    Ok(Json(TemplateListResponse {
        category: category.to_string(),
        templates,
    }))
}

/// Placeholder names a template expects
pub async fn template_fields(
    State(state): State<Arc<AppState>>,
    Tenant(ctx): Tenant,
    Path((category, name)): Path<(String, String)>,
) -> Result<Json<TemplateFieldsResponse>, ApiError> {
    let category = parse_category(&category)?;
    let fields = state
        .documents
        .template_fields(&ctx, category, &name)
        .await?;

    Ok(Json(TemplateFieldsResponse {
        template: name,
        fields: fields.into_iter().collect(),
    }))
}

/// Render a template into a new document
pub async fn render_document(
    State(state): State<Arc<AppState>>,
    Tenant(ctx): Tenant,
    Json(req): Json<RenderRequest>,
) -> Result<(StatusCode, Json<RenderOutcome>), ApiError> {
    let outcome = state.documents.render(&ctx, req).await?;

    tracing::info!(
        tenant = %ctx.tenant_id,
        output = %outcome.output_path,
        "Rendered document"
    );

    Ok((StatusCode::CREATED, Json(outcome)))
}

/// Download a rendered document
pub async fn get_document(
    State(state): State<Arc<AppState>>,
    Tenant(ctx): Tenant,
    Path((category, name)): Path<(String, String)>,
) -> Result<(StatusCode, [(header::HeaderName, String); 2], Vec<u8>), ApiError> {
    let category = parse_category(&category)?;
    let bytes = state.documents.fetch_output(&ctx, category, &name).await?;

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, DOCX_CONTENT_TYPE.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", name.replace('"', "")),
            ),
        ],
        bytes,
    ))
}

/// Recent audit events of the caller's tenant, with a chain integrity check
pub async fn audit_log(
    State(state): State<Arc<AppState>>,
    Tenant(ctx): Tenant,
    Query(query): Query<AuditQuery>,
) -> Result<Json<AuditLogResponse>, ApiError> {
    if ctx.role != Role::Admin {
        return Err(ApiError::Forbidden(format!(
            "role {} may not read the audit log",
            ctx.role
        )));
    }

    let verification = state.audit.verify_chain(&ctx.tenant_id).await?;
    let rows = state.audit.recent(&ctx.tenant_id, query.limit()).await?;

    Ok(Json(AuditLogResponse {
        tenant_id: ctx.tenant_id,
        chain_valid: verification.is_ok(),
        chain_error: verification.err(),
        events: rows.into_iter().map(AuditEntry::from).collect(),
    }))
}
