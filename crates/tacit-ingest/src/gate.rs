//! Access gate: tenant resolution, membership roles, plan features and
//! quotas.
//!
//! Every denial is logged at WARN and recorded as an `access.denied` audit
//! event. Denials for tenants that could not be resolved carry no tenant id.

use std::sync::Arc;

use serde_json::json;
use tracing::{debug, warn};
use uuid::Uuid;

use tacit_core::{
    actions, entities, Error, KnowledgeFilter, Membership, NewAuditEvent, Persistence, PlanLimits,
    PlanTier, Result, Role, Severity, TagFilter, Tenant,
};
use tacit_db::TenantScopedAccessor;

use crate::audit::AuditRecorder;
use crate::resolver::TenantResolver;

/// A plan-limited resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quota {
    Users,
    Items,
    Tags,
}

impl Quota {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Users => "users",
            Self::Items => "items",
            Self::Tags => "tags",
        }
    }

    fn limit(&self, limits: &PlanLimits) -> Option<i64> {
        match self {
            Self::Users => limits.max_users,
            Self::Items => limits.max_items,
            Self::Tags => limits.max_tags,
        }
    }
}

const TIERS: [PlanTier; 4] = [
    PlanTier::Free,
    PlanTier::Starter,
    PlanTier::Business,
    PlanTier::Enterprise,
];

/// Lowest tier above `current` whose default limit fits `needed`.
fn tier_for(quota: Quota, current: PlanTier, needed: i64) -> PlanTier {
    TIERS
        .into_iter()
        .filter(|t| *t > current)
        .find(|t| quota.limit(&PlanLimits::for_tier(*t)).map_or(true, |max| needed <= max))
        .unwrap_or(PlanTier::Enterprise)
}

#[derive(Clone)]
pub struct AccessGate {
    resolver: TenantResolver,
    store: Arc<dyn Persistence>,
    audit: AuditRecorder,
}

impl AccessGate {
    pub fn new(resolver: TenantResolver, store: Arc<dyn Persistence>, audit: AuditRecorder) -> Self {
        Self {
            resolver,
            store,
            audit,
        }
    }

    pub fn resolver(&self) -> &TenantResolver {
        &self.resolver
    }

    /// Resolve a tenant, auditing the failure when none matches.
    pub async fn resolve_tenant(&self, host_or_id: &str, actor_id: Option<Uuid>) -> Result<Tenant> {
        match self.resolver.resolve_tenant(host_or_id).await {
            Err(e @ Error::TenantNotFound(_)) => Err(self
                .deny(None, actor_id, e, json!({ "lookup": host_or_id }))
                .await),
            other => other,
        }
    }

    /// Check that `user_id` is a member of `tenant` with at least `min_role`.
    pub async fn authorize(&self, tenant: &Tenant, user_id: Uuid, min_role: Role) -> Result<Membership> {
        if !tenant.is_active() {
            let err = Error::TenantNotFound(tenant.slug.clone());
            return Err(self
                .deny(Some(tenant.id), Some(user_id), err, json!({ "status": tenant.status }))
                .await);
        }

        let membership = TenantScopedAccessor::new(Arc::clone(&self.store), tenant.id)
            .get_membership(user_id)
            .await?;

        match membership {
            None => {
                let err = Error::NotAuthorized(format!("user {} is not a member", user_id));
                Err(self
                    .deny(Some(tenant.id), Some(user_id), err, json!({ "required_role": min_role }))
                    .await)
            }
            Some(m) if !m.role.meets(min_role) => {
                let err = Error::InsufficientRole {
                    required: min_role,
                    actual: m.role,
                };
                Err(self
                    .deny(
                        Some(tenant.id),
                        Some(user_id),
                        err,
                        json!({ "required_role": min_role, "actual_role": m.role }),
                    )
                    .await)
            }
            Some(m) => {
                debug!(
                    subsystem = "ingest",
                    component = "gate",
                    tenant_id = %tenant.id,
                    actor_id = %user_id,
                    role = %m.role,
                    "Access granted"
                );
                Ok(m)
            }
        }
    }

    /// Check that the tenant's plan is `min_plan` or higher.
    pub async fn require_plan(
        &self,
        tenant: &Tenant,
        actor_id: Option<Uuid>,
        min_plan: PlanTier,
    ) -> Result<()> {
        if tenant.plan.at_least(min_plan) {
            return Ok(());
        }
        let err = Error::PlanUpgradeRequired {
            required: min_plan,
            current: tenant.plan,
        };
        Err(self
            .deny(Some(tenant.id), actor_id, err, json!({ "required_plan": min_plan }))
            .await)
    }

    /// Check that adding `additional` units of `quota` stays within the
    /// tenant's limits.
    pub async fn require_capacity(
        &self,
        tenant: &Tenant,
        actor_id: Option<Uuid>,
        quota: Quota,
        additional: i64,
    ) -> Result<()> {
        let Some(max) = quota.limit(&tenant.limits) else {
            return Ok(());
        };
        if additional <= 0 {
            return Ok(());
        }

        let scoped = TenantScopedAccessor::new(Arc::clone(&self.store), tenant.id);
        let used = match quota {
            Quota::Users => scoped.count_members().await?,
            Quota::Items => {
                scoped
                    .count_knowledge(KnowledgeFilter::default())
                    .await?
            }
            Quota::Tags => scoped.count_tags(TagFilter::default()).await?,
        };

        let needed = used + additional;
        if needed <= max {
            return Ok(());
        }
        let err = Error::PlanUpgradeRequired {
            required: tier_for(quota, tenant.plan, needed),
            current: tenant.plan,
        };
        Err(self
            .deny(
                Some(tenant.id),
                actor_id,
                err,
                json!({ "quota": quota.as_str(), "used": used, "limit": max, "requested": additional }),
            )
            .await)
    }

    async fn deny(
        &self,
        tenant_id: Option<Uuid>,
        actor_id: Option<Uuid>,
        err: Error,
        mut detail: serde_json::Value,
    ) -> Error {
        warn!(
            subsystem = "ingest",
            component = "gate",
            tenant_id = ?tenant_id,
            actor_id = ?actor_id,
            reason = %err,
            "Access denied"
        );
        detail["reason"] = json!(err.to_string());
        self.audit
            .record(
                NewAuditEvent::new(actions::ACCESS_DENIED, entities::REQUEST)
                    .maybe_tenant(tenant_id)
                    .maybe_actor(actor_id)
                    .detail(detail)
                    .severity(Severity::Warn),
            )
            .await;
        err
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_for_quota() {
        assert_eq!(tier_for(Quota::Items, PlanTier::Free, 101), PlanTier::Starter);
        assert_eq!(tier_for(Quota::Items, PlanTier::Free, 6_000), PlanTier::Business);
        assert_eq!(tier_for(Quota::Users, PlanTier::Business, 251), PlanTier::Enterprise);
        assert_eq!(tier_for(Quota::Tags, PlanTier::Enterprise, 1), PlanTier::Enterprise);
    }
}
