use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stable error codes surfaced to callers and audit records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    TemplateNotFound,
    EmptyReplacements,
    MacroDetected,
    TemplateTooLarge,
    ParseFailure,
    WriteFailure,
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let code = match self {
            ErrorCode::TemplateNotFound => "TEMPLATE_NOT_FOUND",
            ErrorCode::EmptyReplacements => "EMPTY_REPLACEMENTS",
            ErrorCode::MacroDetected => "MACRO_DETECTED",
            ErrorCode::TemplateTooLarge => "TEMPLATE_TOO_LARGE",
            ErrorCode::ParseFailure => "PARSE_FAILURE",
            ErrorCode::WriteFailure => "WRITE_FAILURE",
        };
        f.write_str(code)
    }
}

/// Terminal failures of a merge call. None are retried internally.
#[derive(Error, Debug)]
pub enum MergeError {
    #[error("Template not found or unreadable: {template}: {reason}")]
    TemplateNotFound { template: String, reason: String },

    #[error("Replacement map is empty")]
    EmptyReplacements,

    #[error("Template {template} contains forbidden macro part: {part}")]
    MacroDetected { template: String, part: String },

    #[error("Template {template} is too large: {part} is {size} bytes (max {max} bytes)")]
    TemplateTooLarge {
        template: String,
        part: String,
        size: u64,
        max: u64,
    },

    #[error("Failed to parse {part} in {template}: {reason}")]
    ParseFailure {
        template: String,
        part: String,
        reason: String,
    },

    #[error("Failed to write {path}: {reason}")]
    WriteFailure { path: String, reason: String },
}

impl MergeError {
    pub fn code(&self) -> ErrorCode {
        match self {
            MergeError::TemplateNotFound { .. } => ErrorCode::TemplateNotFound,
            MergeError::EmptyReplacements => ErrorCode::EmptyReplacements,
            MergeError::MacroDetected { .. } => ErrorCode::MacroDetected,
            MergeError::TemplateTooLarge { .. } => ErrorCode::TemplateTooLarge,
            MergeError::ParseFailure { .. } => ErrorCode::ParseFailure,
            MergeError::WriteFailure { .. } => ErrorCode::WriteFailure,
        }
    }

    /// Name of the failing part, where one is known
    pub fn part(&self) -> Option<&str> {
        match self {
            MergeError::MacroDetected { part, .. }
            | MergeError::TemplateTooLarge { part, .. }
            | MergeError::ParseFailure { part, .. } => Some(part),
            _ => None,
        }
    }

    pub(crate) fn parse(template: &str, part: &str, reason: impl std::fmt::Display) -> Self {
        MergeError::ParseFailure {
            template: template.to_string(),
            part: part.to_string(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn write(path: &str, reason: impl std::fmt::Display) -> Self {
        MergeError::WriteFailure {
            path: path.to_string(),
            reason: reason.to_string(),
        }
    }
}
