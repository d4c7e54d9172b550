//! Case management collaborator

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CaseError {
    #[error("Case not found: {0}")]
    NotFound(String),

    #[error("Case management error: {0}")]
    Backend(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseStatus {
    Open,
    DocumentDrafted,
    Sent,
    Closed,
}

impl std::fmt::Display for CaseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CaseStatus::Open => write!(f, "open"),
            CaseStatus::DocumentDrafted => write!(f, "document_drafted"),
            CaseStatus::Sent => write!(f, "sent"),
            CaseStatus::Closed => write!(f, "closed"),
        }
    }
}

#[async_trait]
pub trait CaseManagement: Send + Sync {
    async fn get_case_status(&self, case_id: &str) -> Result<CaseStatus, CaseError>;

    async fn update_case_status(&self, case_id: &str, status: CaseStatus) -> Result<(), CaseError>;
}

/// Case store kept in process memory; used when no external system is wired in
#[derive(Debug, Default)]
pub struct InMemoryCases {
    cases: Mutex<HashMap<String, CaseStatus>>,
}

impl InMemoryCases {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&self, case_id: &str) -> Result<(), CaseError> {
        self.lock()?.insert(case_id.to_string(), CaseStatus::Open);
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, CaseStatus>>, CaseError> {
        self.cases
            .lock()
            .map_err(|_| CaseError::Backend("case store lock poisoned".to_string()))
    }
}

#[async_trait]
impl CaseManagement for InMemoryCases {
    async fn get_case_status(&self, case_id: &str) -> Result<CaseStatus, CaseError> {
        self.lock()?
            .get(case_id)
            .copied()
            .ok_or_else(|| CaseError::NotFound(case_id.to_string()))
    }

    async fn update_case_status(&self, case_id: &str, status: CaseStatus) -> Result<(), CaseError> {
        let mut cases = self.lock()?;
        let entry = cases
            .get_mut(case_id)
            .ok_or_else(|| CaseError::NotFound(case_id.to_string()))?;
        *entry = status;
        Ok(())
    }
}
