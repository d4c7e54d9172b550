//! Outbound email delivery
//!
//! Sends documents through the Resend API (https://api.resend.com/emails).

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum EmailError {
    #[error("Invalid recipient: {0}")]
    InvalidRecipient(String),

    #[error("Email has no recipients")]
    NoRecipients,

    #[error("Email service rejected the request: {0}")]
    Rejected(String),

    #[error("Email transport error: {0}")]
    Transport(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub filename: String,
    pub content_type: String,
    pub content: Vec<u8>,
}

impl Attachment {
    pub fn docx(filename: impl Into<String>, content: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            content_type: "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
                .to_string(),
            content,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct EmailMessage {
    pub to: Vec<String>,
    pub subject: String,
    pub html: String,
    pub text: Option<String>,
    pub reply_to: Option<String>,
    pub attachments: Vec<Attachment>,
}

impl EmailMessage {
    /// Reject messages that no provider would accept
    pub fn validate(&self) -> Result<(), EmailError> {
        if self.to.is_empty() {
            return Err(EmailError::NoRecipients);
        }
        for address in self.to.iter().chain(self.reply_to.iter()) {
            if !is_valid_email(address) {
                return Err(EmailError::InvalidRecipient(address.clone()));
            }
        }
        Ok(())
    }
}

/// `local@domain.tld` with no whitespace
pub fn is_valid_email(address: &str) -> bool {
    let Some((local, domain)) = address.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') || address.chars().any(char::is_whitespace) {
        return false;
    }
    match domain.rsplit_once('.') {
        Some((host, tld)) => !host.is_empty() && tld.len() >= 2,
        None => false,
    }
}

#[async_trait]
pub trait EmailSender: Send + Sync {
    /// Deliver the message, returning the provider's message id
    async fn send(&self, message: &EmailMessage) -> Result<String, EmailError>;
}

const RESEND_API_URL: &str = "https://api.resend.com/emails";

#[derive(Debug, Serialize)]
struct ResendPayload<'a> {
    from: &'a str,
    to: &'a [String],
    subject: &'a str,
    html: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_to: Option<&'a str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    attachments: Vec<ResendAttachment<'a>>,
}

#[derive(Debug, Serialize)]
struct ResendAttachment<'a> {
    filename: &'a str,
    content: String,
    content_type: &'a str,
}

#[derive(Debug, Deserialize)]
struct ResendSuccessResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ResendErrorResponse {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Resend API client
pub struct ResendClient {
    http: reqwest::Client,
    api_key: String,
    from_address: String,
    endpoint: String,
}

impl ResendClient {
    pub fn new(api_key: impl Into<String>, from_address: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: api_key.into(),
            from_address: from_address.into(),
            endpoint: RESEND_API_URL.to_string(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    fn payload<'a>(&'a self, message: &'a EmailMessage) -> ResendPayload<'a> {
        ResendPayload {
            from: &self.from_address,
            to: &message.to,
            subject: &message.subject,
            html: &message.html,
            text: message.text.as_deref(),
            reply_to: message.reply_to.as_deref(),
            attachments: message
                .attachments
                .iter()
                .map(|a| ResendAttachment {
                    filename: &a.filename,
                    content: BASE64.encode(&a.content),
                    content_type: &a.content_type,
                })
                .collect(),
        }
    }
}

#[async_trait]
impl EmailSender for ResendClient {
    async fn send(&self, message: &EmailMessage) -> Result<String, EmailError> {
        message.validate()?;

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&self.payload(message))
            .send()
            .await
            .map_err(|e| EmailError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return match response.json::<ResendSuccessResponse>().await {
                Ok(success) => {
                    info!(id = %success.id, recipients = message.to.len(), "Email sent via Resend");
                    Ok(success.id)
                }
                Err(e) => {
                    // Accepted but unreadable response; the mail is most likely queued
                    warn!("Resend response parse error: {}", e);
                    Ok("resend:unknown".to_string())
                }
            };
        }

        let error_text = response.text().await.unwrap_or_default();
        let detail = serde_json::from_str::<ResendErrorResponse>(&error_text)
            .ok()
            .and_then(|err| err.message.or(err.name))
            .unwrap_or_else(|| format!("HTTP {}: {}", status, error_text));
        warn!(status = status.as_u16(), "Resend error: {}", detail);

        Err(match status.as_u16() {
            401 | 403 => EmailError::Rejected("Email service authentication failed".to_string()),
            429 => EmailError::Rejected("Email rate limit exceeded".to_string()),
            _ => EmailError::Rejected(detail),
        })
    }
}
