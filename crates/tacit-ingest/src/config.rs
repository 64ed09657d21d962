//! Service configuration read from the environment.

use std::time::Duration;

use tacit_core::defaults::{
    BASE_DOMAIN, ENRICH_TIMEOUT_SECS, TENANT_CACHE_CAPACITY, TENANT_CACHE_TTL_SECS,
};

/// Audit writes are not allowed to stall the operation that emits them.
pub const AUDIT_TIMEOUT_SECS: u64 = 5;

/// Knobs shared by the resolver, gate, pipeline and recorder.
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Platform base domain; hosts under it resolve by subdomain.
    pub base_domain: String,
    pub tenant_cache_ttl: Duration,
    pub tenant_cache_capacity: usize,
    /// Bound on each enrichment provider call.
    pub enrich_timeout: Duration,
    pub audit_timeout: Duration,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            base_domain: BASE_DOMAIN.to_string(),
            tenant_cache_ttl: Duration::from_secs(TENANT_CACHE_TTL_SECS),
            tenant_cache_capacity: TENANT_CACHE_CAPACITY,
            enrich_timeout: Duration::from_secs(ENRICH_TIMEOUT_SECS),
            audit_timeout: Duration::from_secs(AUDIT_TIMEOUT_SECS),
        }
    }
}

impl IngestConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `TACIT_BASE_DOMAIN` | `tacit.localhost` |
    /// | `TACIT_TENANT_CACHE_TTL_SECS` | `60` |
    /// | `TACIT_ENRICH_TIMEOUT_SECS` | `30` |
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let secs = |name: &str, default: Duration| {
            std::env::var(name)
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs)
                .unwrap_or(default)
        };

        Self {
            base_domain: std::env::var("TACIT_BASE_DOMAIN")
                .ok()
                .map(|d| d.trim().to_lowercase())
                .filter(|d| !d.is_empty())
                .unwrap_or(defaults.base_domain),
            tenant_cache_ttl: secs("TACIT_TENANT_CACHE_TTL_SECS", defaults.tenant_cache_ttl),
            tenant_cache_capacity: defaults.tenant_cache_capacity,
            enrich_timeout: secs("TACIT_ENRICH_TIMEOUT_SECS", defaults.enrich_timeout),
            audit_timeout: defaults.audit_timeout,
        }
    }

    pub fn with_base_domain(mut self, domain: impl Into<String>) -> Self {
        self.base_domain = domain.into();
        self
    }

    pub fn with_tenant_cache_ttl(mut self, ttl: Duration) -> Self {
        self.tenant_cache_ttl = ttl;
        self
    }

    pub fn with_enrich_timeout(mut self, timeout: Duration) -> Self {
        self.enrich_timeout = timeout;
        self
    }
}
