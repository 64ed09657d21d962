//! Tenant resolution from a host header or an explicit tenant id.
//!
//! Resolution order:
//! 1. Parse the input into a [`TenantLookup`] (id, subdomain slug or custom
//!    domain)
//! 2. Cache lookup (LRU, entries expire after the configured TTL)
//! 3. Store lookup
//! 4. Only `ACTIVE` tenants resolve and get cached

use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, instrument};
use uuid::Uuid;

use tacit_core::{Error, Persistence, Result, Tenant, TenantLookup};

use crate::config::IngestConfig;

struct CachedTenant {
    tenant: Tenant,
    cached_at: Instant,
}

#[derive(Clone)]
pub struct TenantResolver {
    store: Arc<dyn Persistence>,
    base_domain: String,
    ttl: Duration,
    cache: Arc<Mutex<LruCache<TenantLookup, CachedTenant>>>,
}

impl TenantResolver {
    pub fn new(store: Arc<dyn Persistence>, config: &IngestConfig) -> Self {
        let capacity =
            NonZeroUsize::new(config.tenant_cache_capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            store,
            base_domain: config.base_domain.trim().to_lowercase(),
            ttl: config.tenant_cache_ttl,
            cache: Arc::new(Mutex::new(LruCache::new(capacity))),
        }
    }

    pub fn base_domain(&self) -> &str {
        &self.base_domain
    }

    /// Resolve `host_or_id` to an active tenant.
    ///
    /// Unknown, unparseable and inactive tenants all fail with
    /// `TenantNotFound`.
    #[instrument(skip(self), fields(subsystem = "ingest", component = "resolver", op = "resolve_tenant"))]
    pub async fn resolve_tenant(&self, host_or_id: &str) -> Result<Tenant> {
        let lookup = TenantLookup::parse(host_or_id, &self.base_domain)
            .ok_or_else(|| Error::TenantNotFound(host_or_id.to_string()))?;

        {
            let mut cache = self.cache.lock().await;
            let cached = cache
                .get(&lookup)
                .map(|entry| (entry.cached_at.elapsed() < self.ttl, entry.tenant.clone()));
            match cached {
                Some((true, tenant)) => {
                    debug!(lookup = %lookup, "Tenant cache hit");
                    return Ok(tenant);
                }
                Some((false, _)) => {
                    cache.pop(&lookup);
                }
                None => {}
            }
        }

        let found = match &lookup {
            TenantLookup::Id(id) => self.store.get_tenant(*id).await?,
            TenantLookup::Slug(slug) => self.store.find_tenant_by_slug(slug).await?,
            TenantLookup::Domain(domain) => self.store.find_tenant_by_domain(domain).await?,
        };

        let tenant = match found {
            Some(t) if t.is_active() => t,
            Some(t) => {
                debug!(lookup = %lookup, status = %t.status, "Tenant is not active");
                return Err(Error::TenantNotFound(host_or_id.to_string()));
            }
            None => return Err(Error::TenantNotFound(host_or_id.to_string())),
        };

        debug!(lookup = %lookup, tenant_id = %tenant.id, "Tenant resolved");
        self.cache.lock().await.put(
            lookup,
            CachedTenant {
                tenant: tenant.clone(),
                cached_at: Instant::now(),
            },
        );
        Ok(tenant)
    }

    /// Drop every cached entry for a tenant, e.g. after a status change.
    pub async fn invalidate(&self, tenant_id: Uuid) {
        let mut cache = self.cache.lock().await;
        let stale: Vec<TenantLookup> = cache
            .iter()
            .filter(|(_, entry)| entry.tenant.id == tenant_id)
            .map(|(key, _)| key.clone())
            .collect();
        for key in stale {
            cache.pop(&key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tacit_core::{NewTenant, PlanTier, TenantRepository, TenantStatus};
    use tacit_db::MemoryStore;

    async fn setup() -> (Arc<MemoryStore>, TenantResolver, Tenant) {
        let store = Arc::new(MemoryStore::new());
        let tenant = store
            .create_tenant(
                NewTenant::new("Acme", "acme", PlanTier::Starter).with_custom_domain("kb.acme.com"),
                Uuid::new_v4(),
            )
            .await
            .unwrap();
        let config = IngestConfig::default().with_base_domain("tacit.io");
        let resolver = TenantResolver::new(store.clone(), &config);
        (store, resolver, tenant)
    }

    #[tokio::test]
    async fn test_resolve_by_subdomain_domain_and_id() {
        let (_store, resolver, tenant) = setup().await;
        assert_eq!(resolver.resolve_tenant("acme.tacit.io").await.unwrap().id, tenant.id);
        assert_eq!(
            resolver.resolve_tenant("www.acme.tacit.io:443").await.unwrap().id,
            tenant.id
        );
        assert_eq!(resolver.resolve_tenant("KB.acme.com").await.unwrap().id, tenant.id);
        assert_eq!(
            resolver.resolve_tenant(&tenant.id.to_string()).await.unwrap().id,
            tenant.id
        );
    }

    #[tokio::test]
    async fn test_unknown_and_base_hosts_not_found() {
        let (_store, resolver, _) = setup().await;
        for host in ["nope.tacit.io", "tacit.io", "app.tacit.io", "other.org", ""] {
            assert!(
                matches!(resolver.resolve_tenant(host).await, Err(Error::TenantNotFound(_))),
                "{}",
                host
            );
        }
    }

    #[tokio::test]
    async fn test_same_host_twice_hits_cache() {
        let (store, resolver, tenant) = setup().await;
        let first = resolver.resolve_tenant("acme.tacit.io").await.unwrap();
        let second = resolver.resolve_tenant("acme.tacit.io").await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(first.id, tenant.id);
        assert_eq!(store.tenant_lookup_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cache_entry_expires() {
        let (store, resolver, _) = setup().await;
        resolver.resolve_tenant("acme.tacit.io").await.unwrap();
        tokio::time::advance(Duration::from_secs(61)).await;
        resolver.resolve_tenant("acme.tacit.io").await.unwrap();
        assert_eq!(store.tenant_lookup_count(), 2);
    }

    #[tokio::test]
    async fn test_suspended_tenant_not_resolved_after_invalidate() {
        let (store, resolver, tenant) = setup().await;
        resolver.resolve_tenant("acme.tacit.io").await.unwrap();
        store
            .set_tenant_status(tenant.id, TenantStatus::Suspended)
            .await
            .unwrap();
        resolver.invalidate(tenant.id).await;
        assert!(matches!(
            resolver.resolve_tenant("acme.tacit.io").await,
            Err(Error::TenantNotFound(_))
        ));
    }
}
