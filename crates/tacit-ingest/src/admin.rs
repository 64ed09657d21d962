//! Tenant lifecycle and membership administration.
//!
//! Status and settings changes invalidate the resolver cache so a suspended
//! tenant stops resolving immediately on this node.

use std::sync::Arc;

use serde_json::json;
use tracing::{info, instrument};
use uuid::Uuid;

use tacit_core::{
    actions, entities, Error, Membership, NewAuditEvent, NewMembership, NewTenant, Persistence,
    Result, Role, Tenant, TenantSettings, TenantStatus,
};
use tacit_db::TenantScopedAccessor;

use crate::audit::AuditRecorder;
use crate::gate::{AccessGate, Quota};

#[derive(Clone)]
pub struct TenantAdmin {
    store: Arc<dyn Persistence>,
    gate: AccessGate,
    audit: AuditRecorder,
}

impl TenantAdmin {
    pub fn new(store: Arc<dyn Persistence>, gate: AccessGate, audit: AuditRecorder) -> Self {
        Self { store, gate, audit }
    }

    fn scoped(&self, tenant_id: Uuid) -> TenantScopedAccessor {
        TenantScopedAccessor::new(Arc::clone(&self.store), tenant_id)
    }

    /// Create a tenant with `owner_id` as its OWNER member.
    #[instrument(skip(self, req), fields(subsystem = "ingest", component = "admin", op = "create_tenant", slug = %req.slug))]
    pub async fn create_tenant(&self, req: NewTenant, owner_id: Uuid) -> Result<Tenant> {
        let tenant = self.store.create_tenant(req, owner_id).await?;
        self.audit
            .record(
                NewAuditEvent::new(actions::TENANT_CREATED, entities::TENANT)
                    .tenant(tenant.id)
                    .actor(owner_id)
                    .entity(tenant.id)
                    .detail(json!({ "slug": tenant.slug, "plan": tenant.plan })),
            )
            .await;
        info!(tenant_id = %tenant.id, plan = %tenant.plan, "Tenant created");
        Ok(tenant)
    }

    #[instrument(skip(self), fields(subsystem = "ingest", component = "admin", op = "set_tenant_status"))]
    pub async fn set_tenant_status(
        &self,
        actor_id: Uuid,
        tenant_id: Uuid,
        status: TenantStatus,
    ) -> Result<Tenant> {
        let before = self
            .store
            .get_tenant(tenant_id)
            .await?
            .ok_or_else(|| Error::TenantNotFound(tenant_id.to_string()))?;
        let tenant = self.store.set_tenant_status(tenant_id, status).await?;
        self.gate.resolver().invalidate(tenant_id).await;

        self.audit
            .record(
                NewAuditEvent::new(actions::TENANT_STATUS_CHANGED, entities::TENANT)
                    .tenant(tenant_id)
                    .actor(actor_id)
                    .entity(tenant_id)
                    .detail(json!({ "from": before.status, "to": tenant.status })),
            )
            .await;
        info!(from = %before.status, to = %tenant.status, "Tenant status changed");
        Ok(tenant)
    }

    /// Replace the tenant's feature toggles. Takes effect on the next
    /// operation, including on ingests already resolved through the cache.
    #[instrument(skip(self, settings), fields(subsystem = "ingest", component = "admin", op = "update_settings"))]
    pub async fn update_settings(
        &self,
        tenant_id: Uuid,
        actor_id: Uuid,
        settings: TenantSettings,
    ) -> Result<Tenant> {
        let before = self
            .store
            .get_tenant(tenant_id)
            .await?
            .ok_or_else(|| Error::TenantNotFound(tenant_id.to_string()))?;
        let tenant = self.store.update_tenant_settings(tenant_id, settings).await?;
        self.gate.resolver().invalidate(tenant_id).await;

        self.audit
            .record(
                NewAuditEvent::new(actions::TENANT_SETTINGS_CHANGED, entities::TENANT)
                    .tenant(tenant_id)
                    .actor(actor_id)
                    .entity(tenant_id)
                    .detail(json!({ "from": before.settings, "to": tenant.settings })),
            )
            .await;
        info!(
            ai_summaries_enabled = tenant.settings.ai_summaries_enabled,
            auto_tagging = tenant.settings.auto_tagging,
            "Tenant settings changed"
        );
        Ok(tenant)
    }

    pub async fn list_members(&self, tenant_id: Uuid) -> Result<Vec<Membership>> {
        self.scoped(tenant_id).find_memberships(Default::default()).await
    }

    /// Add a member, subject to the plan's user quota.
    #[instrument(skip(self, tenant), fields(subsystem = "ingest", component = "admin", op = "add_member", tenant_id = %tenant.id))]
    pub async fn add_member(
        &self,
        tenant: &Tenant,
        actor_id: Uuid,
        user_id: Uuid,
        role: Role,
    ) -> Result<Membership> {
        self.gate
            .require_capacity(tenant, Some(actor_id), Quota::Users, 1)
            .await?;
        let membership = self
            .scoped(tenant.id)
            .add_member(NewMembership { user_id, role })
            .await?;
        self.audit
            .record(
                NewAuditEvent::new(actions::MEMBER_ADDED, entities::MEMBERSHIP)
                    .tenant(tenant.id)
                    .actor(actor_id)
                    .entity(user_id)
                    .detail(json!({ "role": role })),
            )
            .await;
        Ok(membership)
    }

    #[instrument(skip(self), fields(subsystem = "ingest", component = "admin", op = "change_role"))]
    pub async fn change_role(
        &self,
        tenant_id: Uuid,
        actor_id: Uuid,
        user_id: Uuid,
        role: Role,
    ) -> Result<Membership> {
        let scoped = self.scoped(tenant_id);
        let before = scoped
            .get_membership(user_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Member {} not found", user_id)))?;
        let membership = scoped.change_role(user_id, role).await?;
        self.audit
            .record(
                NewAuditEvent::new(actions::MEMBER_ROLE_CHANGED, entities::MEMBERSHIP)
                    .tenant(tenant_id)
                    .actor(actor_id)
                    .entity(user_id)
                    .detail(json!({ "from": before.role, "to": membership.role })),
            )
            .await;
        Ok(membership)
    }

    #[instrument(skip(self), fields(subsystem = "ingest", component = "admin", op = "remove_member"))]
    pub async fn remove_member(&self, tenant_id: Uuid, actor_id: Uuid, user_id: Uuid) -> Result<()> {
        self.scoped(tenant_id).remove_member(user_id).await?;
        self.audit
            .record(
                NewAuditEvent::new(actions::MEMBER_REMOVED, entities::MEMBERSHIP)
                    .tenant(tenant_id)
                    .actor(actor_id)
                    .entity(user_id),
            )
            .await;
        Ok(())
    }
}
