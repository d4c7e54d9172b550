//! Template and output storage
//!
//! The hub only needs five operations from a document store. Paths are
//! tenant-relative and use forward slashes: `/Templates/demand/letter.docx`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use shared_types::TenantContext;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Storage I/O error: {0}")]
    Io(String),
}

/// Document category; each has its own template, example and output folder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateCategory {
    Email,
    Demand,
    Foia,
    Mediation,
    BatchDocs,
}

impl TemplateCategory {
    pub const ALL: [TemplateCategory; 5] = [
        TemplateCategory::Email,
        TemplateCategory::Demand,
        TemplateCategory::Foia,
        TemplateCategory::Mediation,
        TemplateCategory::BatchDocs,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TemplateCategory::Email => "email",
            TemplateCategory::Demand => "demand",
            TemplateCategory::Foia => "foia",
            TemplateCategory::Mediation => "mediation",
            TemplateCategory::BatchDocs => "batch_docs",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(value.trim()))
    }
}

impl std::fmt::Display for TemplateCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Folder conventions shared by every storage backend
pub struct StorageLayout;

impl StorageLayout {
    pub fn template_folder(category: TemplateCategory) -> String {
        format!("/Templates/{}", category)
    }

    pub fn template_path(category: TemplateCategory, file: &str) -> String {
        format!("/Templates/{}/{}", category, file)
    }

    pub fn example_path(category: TemplateCategory, file: &str) -> String {
        format!("/Examples/{}/{}", category, file)
    }

    pub fn output_path(category: TemplateCategory, file: &str) -> String {
        format!("/Output/{}/{}", category, file)
    }
}

/// Tenant-scoped document store
#[async_trait]
pub trait TemplateStorage: Send + Sync {
    /// File names directly inside `folder`, sorted
    async fn list(&self, ctx: &TenantContext, folder: &str) -> Result<Vec<String>, StorageError>;

    async fn download(&self, ctx: &TenantContext, path: &str) -> Result<Vec<u8>, StorageError>;

    async fn upload(&self, ctx: &TenantContext, path: &str, bytes: &[u8])
        -> Result<(), StorageError>;

    async fn move_file(&self, ctx: &TenantContext, from: &str, to: &str)
        -> Result<(), StorageError>;

    async fn delete(&self, ctx: &TenantContext, path: &str) -> Result<(), StorageError>;
}

/// Filesystem store; each tenant lives under `<root>/<tenant_id>`
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a tenant-relative path onto disk, refusing anything that could escape
    fn resolve(&self, ctx: &TenantContext, path: &str) -> Result<PathBuf, StorageError> {
        let relative = path.trim_start_matches('/');
        if relative.is_empty() || relative.contains('\\') {
            return Err(StorageError::InvalidPath(path.to_string()));
        }

        let mut resolved = self.root.join(&ctx.tenant_id);
        for component in Path::new(relative).components() {
            match component {
                Component::Normal(part) => resolved.push(part),
                _ => return Err(StorageError::InvalidPath(path.to_string())),
            }
        }
        Ok(resolved)
    }
}

fn io_error(path: &str, err: std::io::Error) -> StorageError {
    if err.kind() == std::io::ErrorKind::NotFound {
        StorageError::NotFound(path.to_string())
    } else {
        StorageError::Io(format!("{}: {}", path, err))
    }
}

#[async_trait]
impl TemplateStorage for LocalStorage {
    async fn list(&self, ctx: &TenantContext, folder: &str) -> Result<Vec<String>, StorageError> {
        let dir = self.resolve(ctx, folder)?;
        let mut entries = tokio::fs::read_dir(&dir)
            .await
            .map_err(|e| io_error(folder, e))?;

        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|e| io_error(folder, e))? {
            let file_type = entry.file_type().await.map_err(|e| io_error(folder, e))?;
            if file_type.is_file() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }

    async fn download(&self, ctx: &TenantContext, path: &str) -> Result<Vec<u8>, StorageError> {
        let file = self.resolve(ctx, path)?;
        let bytes = tokio::fs::read(&file).await.map_err(|e| io_error(path, e))?;
        debug!(tenant = %ctx.tenant_id, path = %path, size = bytes.len(), "Downloaded");
        Ok(bytes)
    }

    async fn upload(
        &self,
        ctx: &TenantContext,
        path: &str,
        bytes: &[u8],
    ) -> Result<(), StorageError> {
        let file = self.resolve(ctx, path)?;
        if let Some(parent) = file.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| io_error(path, e))?;
        }
        tokio::fs::write(&file, bytes)
            .await
            .map_err(|e| io_error(path, e))?;
        debug!(tenant = %ctx.tenant_id, path = %path, size = bytes.len(), "Uploaded");
        Ok(())
    }

    async fn move_file(
        &self,
        ctx: &TenantContext,
        from: &str,
        to: &str,
    ) -> Result<(), StorageError> {
        let source = self.resolve(ctx, from)?;
        let target = self.resolve(ctx, to)?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| io_error(to, e))?;
        }
        tokio::fs::rename(&source, &target)
            .await
            .map_err(|e| io_error(from, e))
    }

    async fn delete(&self, ctx: &TenantContext, path: &str) -> Result<(), StorageError> {
        let file = self.resolve(ctx, path)?;
        tokio::fs::remove_file(&file)
            .await
            .map_err(|e| io_error(path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use shared_types::Role;

    fn ctx(tenant: &str) -> TenantContext {
        TenantContext::new(tenant, "user-1", Role::Attorney).unwrap()
    }

    #[test]
    fn test_layout_paths() {
        assert_eq!(
            StorageLayout::template_path(TemplateCategory::Demand, "letter.docx"),
            "/Templates/demand/letter.docx"
        );
        assert_eq!(
            StorageLayout::example_path(TemplateCategory::Foia, "sample.docx"),
            "/Examples/foia/sample.docx"
        );
        assert_eq!(
            StorageLayout::output_path(TemplateCategory::BatchDocs, "out.docx"),
            "/Output/batch_docs/out.docx"
        );
    }

    #[test]
    fn test_category_parse() {
        assert_eq!(TemplateCategory::parse("Mediation"), Some(TemplateCategory::Mediation));
        assert_eq!(TemplateCategory::parse("batch_docs"), Some(TemplateCategory::BatchDocs));
        assert_eq!(TemplateCategory::parse("invoices"), None);
    }

    #[test]
    fn test_resolve_rejects_traversal() {
        let storage = LocalStorage::new("/srv/docs");
        let ctx = ctx("firm-a");

        assert_eq!(
            storage.resolve(&ctx, "/Templates/demand/a.docx").unwrap(),
            PathBuf::from("/srv/docs/firm-a/Templates/demand/a.docx")
        );
        assert!(storage.resolve(&ctx, "/Templates/../../firm-b/x.docx").is_err());
        assert!(storage.resolve(&ctx, "/").is_err());
        assert!(storage.resolve(&ctx, "Templates\\x.docx").is_err());
    }

    #[tokio::test]
    async fn test_round_trip_and_tenant_isolation() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path());
        let a = ctx("firm-a");
        let b = ctx("firm-b");

        storage.upload(&a, "/Templates/demand/letter.docx", b"abc").await.unwrap();
        storage.upload(&a, "/Templates/demand/notice.docx", b"def").await.unwrap();

        assert_eq!(
            storage.list(&a, "/Templates/demand").await.unwrap(),
            vec!["letter.docx", "notice.docx"]
        );
        assert_eq!(
            storage.download(&a, "/Templates/demand/letter.docx").await.unwrap(),
            b"abc"
        );
        assert!(matches!(
            storage.download(&b, "/Templates/demand/letter.docx").await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_move_and_delete() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path());
        let a = ctx("firm-a");

        storage.upload(&a, "/Output/foia/draft.docx", b"x").await.unwrap();
        storage
            .move_file(&a, "/Output/foia/draft.docx", "/Output/foia/final/request.docx")
            .await
            .unwrap();
        assert!(storage.download(&a, "/Output/foia/draft.docx").await.is_err());

        storage.delete(&a, "/Output/foia/final/request.docx").await.unwrap();
        assert!(matches!(
            storage.delete(&a, "/Output/foia/final/request.docx").await,
            Err(StorageError::NotFound(_))
        ));
    }
}
