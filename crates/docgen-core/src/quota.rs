//! Per-tenant render quota
//!
//! Fixed window counter per tenant. Exceeding the limit blocks the tenant
//! for `block` before the counter starts over.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuotaConfig {
    /// Renders allowed per window
    pub limit: u32,
    /// Window length in seconds
    pub window_secs: u64,
    /// Block length in seconds once the limit is hit
    pub block_secs: u64,
}

impl Default for QuotaConfig {
    /// 60 renders per minute, 60s block
    fn default() -> Self {
        Self {
            limit: 60,
            window_secs: 60,
            block_secs: 60,
        }
    }
}

impl QuotaConfig {
    pub fn new(limit: u32, window_secs: u64, block_secs: u64) -> Self {
        Self {
            limit,
            window_secs,
            block_secs,
        }
    }

    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    pub fn block(&self) -> Duration {
        Duration::from_secs(self.block_secs)
    }
}

#[derive(Debug, Clone)]
struct QuotaEntry {
    count: u32,
    window_start: Instant,
    blocked_until: Option<Instant>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuotaDecision {
    Allowed,
    /// Limit reached within the window
    Limited { retry_after: Duration },
    /// Tenant is serving a block
    Blocked { blocked_for: Duration },
}

impl QuotaDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, QuotaDecision::Allowed)
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            QuotaDecision::Allowed => None,
            QuotaDecision::Limited { retry_after } => Some(*retry_after),
            QuotaDecision::Blocked { blocked_for } => Some(*blocked_for),
        }
    }
}

#[derive(Debug)]
pub struct QuotaLimiter {
    config: QuotaConfig,
    entries: Mutex<HashMap<String, QuotaEntry>>,
}

impl QuotaLimiter {
    pub fn new(config: QuotaConfig) -> Self {
        Self {
            config,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &QuotaConfig {
        &self.config
    }

    /// Count one render for `tenant_id` if allowed
    pub fn check(&self, tenant_id: &str) -> QuotaDecision {
        self.check_at(tenant_id, Instant::now())
    }

    fn check_at(&self, tenant_id: &str, now: Instant) -> QuotaDecision {
        let Ok(mut entries) = self.entries.lock() else {
            return QuotaDecision::Allowed;
        };

        let Some(entry) = entries.get_mut(tenant_id) else {
            entries.insert(
                tenant_id.to_string(),
                QuotaEntry {
                    count: 1,
                    window_start: now,
                    blocked_until: None,
                },
            );
            return QuotaDecision::Allowed;
        };

        if let Some(blocked_until) = entry.blocked_until {
            if now < blocked_until {
                return QuotaDecision::Blocked {
                    blocked_for: blocked_until - now,
                };
            }
            entry.blocked_until = None;
            entry.count = 0;
            entry.window_start = now;
        }

        if now.duration_since(entry.window_start) > self.config.window() {
            entry.count = 1;
            entry.window_start = now;
            return QuotaDecision::Allowed;
        }

        if entry.count >= self.config.limit {
            entry.blocked_until = Some(now + self.config.block());
            return QuotaDecision::Blocked {
                blocked_for: self.config.block(),
            };
        }

        entry.count += 1;
        QuotaDecision::Allowed
    }

    /// Same decision as `check` without counting
    pub fn peek(&self, tenant_id: &str) -> QuotaDecision {
        let now = Instant::now();
        let Ok(entries) = self.entries.lock() else {
            return QuotaDecision::Allowed;
        };
        let Some(entry) = entries.get(tenant_id) else {
            return QuotaDecision::Allowed;
        };

        if let Some(blocked_until) = entry.blocked_until {
            if now < blocked_until {
                return QuotaDecision::Blocked {
                    blocked_for: blocked_until - now,
                };
            }
            return QuotaDecision::Allowed;
        }

        let elapsed = now.duration_since(entry.window_start);
        if elapsed > self.config.window() {
            return QuotaDecision::Allowed;
        }
        if entry.count >= self.config.limit {
            return QuotaDecision::Limited {
                retry_after: self.config.window() - elapsed,
            };
        }
        QuotaDecision::Allowed
    }

    /// Renders left in the current window
    pub fn remaining(&self, tenant_id: &str) -> u32 {
        let now = Instant::now();
        let Ok(entries) = self.entries.lock() else {
            return self.config.limit;
        };
        match entries.get(tenant_id) {
            None => self.config.limit,
            Some(entry) if entry.blocked_until.is_some_and(|until| now < until) => 0,
            Some(entry) if now.duration_since(entry.window_start) > self.config.window() => {
                self.config.limit
            }
            Some(entry) => self.config.limit.saturating_sub(entry.count),
        }
    }

    /// Give back one render counted by `check` that produced nothing.
    /// A block already in force stays in force.
    pub fn refund(&self, tenant_id: &str) {
        if let Ok(mut entries) = self.entries.lock() {
            if let Some(entry) = entries.get_mut(tenant_id) {
                if entry.blocked_until.is_none() {
                    entry.count = entry.count.saturating_sub(1);
                }
            }
        }
    }

    /// Admin override
    pub fn reset(&self, tenant_id: &str) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.remove(tenant_id);
        }
    }

    /// Drop tenants whose window and block have both lapsed
    pub fn cleanup(&self) {
        let now = Instant::now();
        let window = self.config.window();
        if let Ok(mut entries) = self.entries.lock() {
            entries.retain(|_, entry| {
                if let Some(blocked_until) = entry.blocked_until {
                    if now < blocked_until {
                        return true;
                    }
                }
                now.duration_since(entry.window_start) <= window
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_allows_up_to_limit_then_blocks() {
        let limiter = QuotaLimiter::new(QuotaConfig::new(3, 60, 120));

        for _ in 0..3 {
            assert!(limiter.check("firm-a").is_allowed());
        }
        assert_eq!(limiter.remaining("firm-a"), 0);
        assert_eq!(
            limiter.check("firm-a"),
            QuotaDecision::Blocked {
                blocked_for: Duration::from_secs(120)
            }
        );
        assert!(matches!(limiter.check("firm-a"), QuotaDecision::Blocked { .. }));
    }

    #[test]
    fn test_tenants_are_independent() {
        let limiter = QuotaLimiter::new(QuotaConfig::new(1, 60, 60));

        assert!(limiter.check("firm-a").is_allowed());
        assert!(!limiter.check("firm-a").is_allowed());
        assert!(limiter.check("firm-b").is_allowed());
    }

    #[test]
    fn test_peek_does_not_count() {
        let limiter = QuotaLimiter::new(QuotaConfig::new(2, 60, 60));

        assert!(limiter.check("firm-a").is_allowed());
        assert!(limiter.peek("firm-a").is_allowed());
        assert!(limiter.peek("firm-a").is_allowed());
        assert_eq!(limiter.remaining("firm-a"), 1);

        assert!(limiter.check("firm-a").is_allowed());
        assert!(matches!(limiter.peek("firm-a"), QuotaDecision::Limited { .. }));
    }

    #[test]
    fn test_window_and_block_expire() {
        let limiter = QuotaLimiter::new(QuotaConfig::new(1, 10, 30));
        let start = Instant::now();

        assert!(limiter.check_at("firm-a", start).is_allowed());
        assert!(!limiter.check_at("firm-a", start + Duration::from_secs(1)).is_allowed());
        assert!(!limiter.check_at("firm-a", start + Duration::from_secs(20)).is_allowed());
        assert!(limiter.check_at("firm-a", start + Duration::from_secs(32)).is_allowed());
    }

    #[test]
    fn test_refund_returns_a_slot() {
        let limiter = QuotaLimiter::new(QuotaConfig::new(2, 60, 60));

        assert!(limiter.check("firm-a").is_allowed());
        assert!(limiter.check("firm-a").is_allowed());
        limiter.refund("firm-a");
        assert_eq!(limiter.remaining("firm-a"), 1);
        assert!(limiter.check("firm-a").is_allowed());

        // Refunds never unblock
        assert!(!limiter.check("firm-a").is_allowed());
        limiter.refund("firm-a");
        assert_eq!(limiter.remaining("firm-a"), 0);

        limiter.refund("firm-unknown");
        assert_eq!(limiter.remaining("firm-unknown"), 2);
    }

    #[test]
    fn test_reset() {
        let limiter = QuotaLimiter::new(QuotaConfig::new(1, 60, 60));
        limiter.check("firm-a");
        limiter.check("firm-a");
        limiter.reset("firm-a");
        assert!(limiter.check("firm-a").is_allowed());
        assert_eq!(limiter.remaining("firm-b"), 1);
    }
}
