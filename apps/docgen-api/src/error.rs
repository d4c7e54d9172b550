//! Error types for the Document Hub API

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use docgen_core::{CaseError, EmailError, GenerationError, ServiceError, StorageError};
use docx_merge::ErrorCode;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error("Missing or invalid identity: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    /// HTTP status and stable machine code
    pub fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::Service(err) => service_status(err),
            ApiError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            ApiError::Forbidden(_) => (StatusCode::FORBIDDEN, "FORBIDDEN"),
            ApiError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "INVALID_REQUEST"),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ApiError::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "DATABASE_ERROR"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }
}

fn service_status(err: &ServiceError) -> (StatusCode, &'static str) {
    match err {
        ServiceError::Merge(merge) => match merge.code() {
            ErrorCode::TemplateNotFound => (StatusCode::NOT_FOUND, "TEMPLATE_NOT_FOUND"),
            ErrorCode::EmptyReplacements => (StatusCode::BAD_REQUEST, "EMPTY_REPLACEMENTS"),
            ErrorCode::MacroDetected => (StatusCode::UNPROCESSABLE_ENTITY, "MACRO_DETECTED"),
            ErrorCode::TemplateTooLarge => (StatusCode::PAYLOAD_TOO_LARGE, "TEMPLATE_TOO_LARGE"),
            ErrorCode::ParseFailure => (StatusCode::UNPROCESSABLE_ENTITY, "PARSE_FAILURE"),
            ErrorCode::WriteFailure => (StatusCode::INTERNAL_SERVER_ERROR, "WRITE_FAILURE"),
        },
        ServiceError::Storage(StorageError::NotFound(_)) => {
            (StatusCode::NOT_FOUND, "TEMPLATE_NOT_FOUND")
        }
        ServiceError::Storage(StorageError::InvalidPath(_)) => {
            (StatusCode::BAD_REQUEST, "INVALID_PATH")
        }
        ServiceError::Storage(StorageError::Io(_)) => {
            (StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_ERROR")
        }
        ServiceError::Generation(GenerationError::RateLimited { .. }) => {
            (StatusCode::SERVICE_UNAVAILABLE, "GENERATION_RATE_LIMITED")
        }
        ServiceError::Generation(GenerationError::Failed(_)) => {
            (StatusCode::BAD_GATEWAY, "GENERATION_FAILED")
        }
        ServiceError::Email(EmailError::InvalidRecipient(_) | EmailError::NoRecipients) => {
            (StatusCode::BAD_REQUEST, "INVALID_RECIPIENT")
        }
        ServiceError::Email(_) => (StatusCode::BAD_GATEWAY, "EMAIL_FAILED"),
        ServiceError::Case(CaseError::NotFound(_)) => (StatusCode::NOT_FOUND, "CASE_NOT_FOUND"),
        ServiceError::Case(_) => (StatusCode::BAD_GATEWAY, "CASE_BACKEND_ERROR"),
        ServiceError::Forbidden(_) => (StatusCode::FORBIDDEN, "FORBIDDEN"),
        ServiceError::QuotaExceeded { .. } => (StatusCode::TOO_MANY_REQUESTS, "QUOTA_EXCEEDED"),
        ServiceError::DuplicateRequest => (StatusCode::CONFLICT, "DUPLICATE_REQUEST"),
        ServiceError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "INVALID_REQUEST"),
        ServiceError::NotConfigured(_) => (StatusCode::NOT_IMPLEMENTED, "NOT_CONFIGURED"),
        ServiceError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        let message = if status.is_server_error() {
            tracing::error!("{}: {}", code, self);
            match &self {
                ApiError::Database(_) => "Database error".to_string(),
                ApiError::Internal(_) | ApiError::Service(ServiceError::Internal(_)) => {
                    "Internal error".to_string()
                }
                other => other.to_string(),
            }
        } else {
            self.to_string()
        };

        let body = Json(json!({
            "error": message,
            "code": code,
            "status": status.as_u16(),
        }));

        let mut response = (status, body).into_response();
        if let ApiError::Service(ServiceError::QuotaExceeded { retry_after }) = &self {
            let secs = retry_after.as_secs().max(1);
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docx_merge::MergeError;
    use shared_types::Role;
    use std::time::Duration;

    fn status(err: ServiceError) -> StatusCode {
        ApiError::from(err).status_and_code().0
    }

    #[test]
    fn test_merge_errors_map_to_client_statuses() {
        assert_eq!(
            status(
                MergeError::MacroDetected {
                    template: "t.docx".into(),
                    part: "word/vbaProject.bin".into(),
                }
                .into()
            ),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status(MergeError::EmptyReplacements.into()),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status(
                MergeError::TemplateTooLarge {
                    template: "t.docx".into(),
                    part: "t.docx".into(),
                    size: 10,
                    max: 5,
                }
                .into()
            ),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert_eq!(
            status(
                MergeError::WriteFailure {
                    path: "out.docx".into(),
                    reason: "disk full".into(),
                }
                .into()
            ),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_service_errors_map_to_statuses() {
        assert_eq!(
            status(StorageError::NotFound("x".into()).into()),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status(StorageError::InvalidPath("../x".into()).into()),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status(GenerationError::RateLimited { retry_after: None }.into()),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status(ServiceError::Forbidden(Role::Viewer)),
            StatusCode::FORBIDDEN
        );
        assert_eq!(status(ServiceError::DuplicateRequest), StatusCode::CONFLICT);
        assert_eq!(
            status(ServiceError::NotConfigured("Email delivery")),
            StatusCode::NOT_IMPLEMENTED
        );
    }

    #[test]
    fn test_quota_response_carries_retry_after() {
        let response = ApiError::from(ServiceError::QuotaExceeded {
            retry_after: Duration::from_secs(42),
        })
        .into_response();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            response.headers().get(header::RETRY_AFTER).unwrap(),
            "42"
        );
    }
}
