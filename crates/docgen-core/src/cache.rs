//! Per-session cache
//!
//! Replaces ambient per-user session state: values are keyed by tenant,
//! session and name, expire after a TTL, and the cache itself is handed to
//! whoever needs it.

use moka::future::Cache;
use shared_types::TenantContext;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct SessionKey {
    tenant_id: String,
    session_id: String,
    key: String,
}

/// TTL-bounded cache of values scoped to one user session
#[derive(Debug, Clone)]
pub struct SessionCache<V: Clone + Send + Sync + 'static> {
    inner: Cache<SessionKey, V>,
}

impl<V: Clone + Send + Sync + 'static> SessionCache<V> {
    pub fn new(max_capacity: u64, ttl: Duration) -> Self {
        Self {
            inner: Cache::builder()
                .max_capacity(max_capacity)
                .time_to_live(ttl)
                .support_invalidation_closures()
                .build(),
        }
    }

    fn key(ctx: &TenantContext, session_id: &str, key: &str) -> SessionKey {
        SessionKey {
            tenant_id: ctx.tenant_id.clone(),
            session_id: session_id.to_string(),
            key: key.to_string(),
        }
    }

    pub async fn insert(&self, ctx: &TenantContext, session_id: &str, key: &str, value: V) {
        self.inner
            .insert(Self::key(ctx, session_id, key), value)
            .await;
    }

    pub async fn get(&self, ctx: &TenantContext, session_id: &str, key: &str) -> Option<V> {
        self.inner.get(&Self::key(ctx, session_id, key)).await
    }

    pub async fn invalidate(&self, ctx: &TenantContext, session_id: &str, key: &str) {
        self.inner
            .invalidate(&Self::key(ctx, session_id, key))
            .await;
    }

    /// Drop every value of one session (e.g. on logout)
    pub fn invalidate_session(&self, ctx: &TenantContext, session_id: &str) {
        let tenant_id = ctx.tenant_id.clone();
        let session = session_id.to_string();
        if let Err(e) = self
            .inner
            .invalidate_entries_if(move |k, _| k.tenant_id == tenant_id && k.session_id == session)
        {
            warn!(
                tenant = %ctx.tenant_id,
                session = %session_id,
                error = %e,
                "Failed to invalidate session cache"
            );
        }
    }

    pub fn entry_count(&self) -> u64 {
        self.inner.entry_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_types::Role;

    fn ctx(tenant: &str) -> TenantContext {
        TenantContext::new(tenant, "user-1", Role::Paralegal).unwrap()
    }

    #[tokio::test]
    async fn test_values_are_scoped_by_tenant_and_session() {
        let cache: SessionCache<String> = SessionCache::new(100, Duration::from_secs(60));
        let a = ctx("firm-a");
        let b = ctx("firm-b");

        cache.insert(&a, "s1", "draft", "letter v1".to_string()).await;

        assert_eq!(cache.get(&a, "s1", "draft").await, Some("letter v1".to_string()));
        assert_eq!(cache.get(&a, "s2", "draft").await, None);
        assert_eq!(cache.get(&b, "s1", "draft").await, None);
    }

    #[tokio::test]
    async fn test_invalidate() {
        let cache: SessionCache<u32> = SessionCache::new(100, Duration::from_secs(60));
        let a = ctx("firm-a");

        cache.insert(&a, "s1", "x", 1).await;
        cache.insert(&a, "s1", "y", 2).await;
        cache.insert(&a, "s2", "x", 3).await;

        cache.invalidate(&a, "s1", "x").await;
        assert_eq!(cache.get(&a, "s1", "x").await, None);

        cache.invalidate_session(&a, "s1");
        assert_eq!(cache.get(&a, "s1", "y").await, None);
        assert_eq!(cache.get(&a, "s2", "x").await, Some(3));
    }

    #[tokio::test]
    async fn test_invalidate_session_failure_keeps_entries() {
        let cache: SessionCache<u32> = SessionCache {
            inner: Cache::builder().max_capacity(10).build(),
        };
        let a = ctx("firm-a");

        cache.insert(&a, "s1", "x", 1).await;
        cache.invalidate_session(&a, "s1");
        assert_eq!(cache.get(&a, "s1", "x").await, Some(1));
    }

    #[tokio::test]
    async fn test_entries_expire() {
        let cache: SessionCache<u32> = SessionCache::new(100, Duration::from_millis(50));
        let a = ctx("firm-a");

        cache.insert(&a, "s1", "x", 1).await;
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert_eq!(cache.get(&a, "s1", "x").await, None);
    }
}
