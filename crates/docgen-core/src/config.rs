//! Hub configuration
//!
//! Loaded from a TOML file; every section is optional and falls back to its
//! defaults. Secrets usually come from the environment instead of the file:
//!
//! - `DOCGEN_STORAGE_ROOT` overrides `storage.root`
//! - `DOCGEN_LLM_API_KEY` overrides `generation.api_key`
//! - `DOCGEN_RESEND_API_KEY` overrides `email.api_key`

use anyhow::Context;
use docx_merge::MergeOptions;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::generation::RetryPolicy;
use crate::quota::QuotaConfig;

pub const ENV_STORAGE_ROOT: &str = "DOCGEN_STORAGE_ROOT";
pub const ENV_LLM_API_KEY: &str = "DOCGEN_LLM_API_KEY";
pub const ENV_RESEND_API_KEY: &str = "DOCGEN_RESEND_API_KEY";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    pub merge: MergeOptions,
    pub storage: StorageConfig,
    pub cache: CacheConfig,
    pub quota: QuotaConfig,
    pub generation: GenerationConfig,
    pub email: EmailConfig,
}

impl HubConfig {
    /// Load configuration from a TOML file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or the TOML is malformed
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_str(&content)
    }

    /// Parse configuration from a TOML string
    pub fn from_str(s: &str) -> anyhow::Result<Self> {
        toml::from_str(s).context("Failed to parse TOML configuration")
    }

    /// Apply `DOCGEN_*` environment overrides
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|name| std::env::var(name).ok())
    }

    fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(root) = non_empty(ENV_STORAGE_ROOT) {
            self.storage.root = PathBuf::from(root);
        }
        if let Some(key) = non_empty(ENV_LLM_API_KEY) {
            self.generation.api_key = Some(key);
        }
        if let Some(key) = non_empty(ENV_RESEND_API_KEY) {
            self.email.api_key = Some(key);
        }
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root directory; each tenant gets a subdirectory
    pub root: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("./data/storage"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub max_entries: u64,
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 10_000,
            ttl_secs: 30 * 60,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub endpoint: String,
    pub model: String,
    pub temperature: f32,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub backoff_multiplier: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1/chat/completions".to_string(),
            model: "gpt-4o-mini".to_string(),
            temperature: 0.2,
            api_key: None,
            max_attempts: 3,
            initial_delay_ms: 1000,
            backoff_multiplier: 2,
        }
    }
}

impl GenerationConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            multiplier: self.backoff_multiplier.max(1),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmailConfig {
    pub from_address: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            from_address: "Document Hub <noreply@localhost>".to_string(),
            api_key: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = HubConfig::from_str("").unwrap();
        assert_eq!(config, HubConfig::default());
        assert_eq!(config.merge.bullet_style, "ListBullet");
        assert_eq!(config.merge.max_template_bytes, 25 * 1024 * 1024);
        assert_eq!(config.generation.retry_policy(), RetryPolicy::default());
    }

    #[test]
    fn test_partial_sections() {
        let toml = r#"
            [merge]
            bullet_style = "ListParagraph"
            inline_list_separator = "; "

            [quota]
            limit = 5

            [storage]
            root = "/srv/docgen"
        "#;
        let config = HubConfig::from_str(toml).unwrap();

        assert_eq!(config.merge.bullet_style, "ListParagraph");
        assert_eq!(config.merge.inline_list_separator, "; ");
        assert_eq!(config.merge.max_part_bytes, 64 * 1024 * 1024);
        assert_eq!(config.quota.limit, 5);
        assert_eq!(config.quota.window_secs, 60);
        assert_eq!(config.storage.root, PathBuf::from("/srv/docgen"));
    }

    #[test]
    fn test_malformed_toml_is_an_error() {
        assert!(HubConfig::from_str("[merge\nbullet_style = 1").is_err());
        assert!(HubConfig::from_file("/nonexistent/docgen.toml").is_err());
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            (ENV_STORAGE_ROOT, "/mnt/tenants"),
            (ENV_LLM_API_KEY, "sk-test"),
            (ENV_RESEND_API_KEY, "  "),
        ]
        .into_iter()
        .collect();

        let config =
            HubConfig::default().with_overrides(|name| env.get(name).map(|v| v.to_string()));

        assert_eq!(config.storage.root, PathBuf::from("/mnt/tenants"));
        assert_eq!(config.generation.api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.email.api_key, None);
    }

    #[test]
    fn test_secrets_are_not_serialized() {
        let mut config = HubConfig::default();
        config.email.api_key = Some("re_secret".to_string());
        let rendered = toml::to_string(&config).unwrap();
        assert!(!rendered.contains("re_secret"));
    }
}
