//! Tenant-scoped data access.
//!
//! A [`TenantScopedAccessor`] is built once per request from a store and a
//! resolved tenant id. Every method overwrites the tenant on the filter or
//! payload it forwards, so a caller-supplied tenant id is never honored.

use std::sync::Arc;

use tracing::{debug, warn};
use uuid::Uuid;

use tacit_core::{
    AuditEvent, AuditFilter, Error, KnowledgeCounter, KnowledgeFilter, KnowledgeItem,
    KnowledgePatch, KnowledgeStatus, Membership, MembershipFilter, NewAuditEvent,
    NewKnowledgeItem, NewMembership, Persistence, Result, Role, ScopedFilter, Tag, TagFilter,
    Vector,
};

/// Typed, tenant-bound facade over a [`Persistence`] store.
#[derive(Clone)]
pub struct TenantScopedAccessor {
    store: Arc<dyn Persistence>,
    tenant_id: Uuid,
}

impl std::fmt::Debug for TenantScopedAccessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TenantScopedAccessor")
            .field("tenant_id", &self.tenant_id)
            .finish_non_exhaustive()
    }
}

impl TenantScopedAccessor {
    pub fn new(store: Arc<dyn Persistence>, tenant_id: Uuid) -> Self {
        Self { store, tenant_id }
    }

    pub fn tenant_id(&self) -> Uuid {
        self.tenant_id
    }

    fn scoped<F: ScopedFilter>(&self, mut filter: F) -> F {
        if let Some(requested) = filter.tenant_id() {
            if requested != self.tenant_id {
                debug!(
                    subsystem = "db",
                    component = "scoped",
                    tenant_id = %self.tenant_id,
                    requested_tenant = %requested,
                    "Overriding caller-supplied tenant on filter"
                );
            }
        }
        filter.scope_to(self.tenant_id);
        filter
    }

    fn by_id(&self, id: Uuid) -> KnowledgeFilter {
        self.scoped(KnowledgeFilter::by_id(id))
    }

    // ─── Knowledge items ───────────────────────────────────────────────────

    /// Atomic base write (record plus tags). Never carries the embedding.
    pub async fn create_knowledge(&self, req: NewKnowledgeItem) -> Result<KnowledgeItem> {
        self.store.insert_knowledge(self.tenant_id, req).await
    }

    pub async fn find_knowledge(&self, filter: KnowledgeFilter) -> Result<Vec<KnowledgeItem>> {
        self.store.find_knowledge(&self.scoped(filter)).await
    }

    pub async fn count_knowledge(&self, filter: KnowledgeFilter) -> Result<i64> {
        self.store.count_knowledge(&self.scoped(filter)).await
    }

    /// Fetch one item of this tenant, deleted ones included.
    pub async fn get_knowledge(&self, id: Uuid) -> Result<KnowledgeItem> {
        self.store
            .find_knowledge(&self.by_id(id))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::NotFound(format!("Knowledge item {} not found", id)))
    }

    pub async fn update_knowledge(&self, id: Uuid, patch: KnowledgePatch) -> Result<KnowledgeItem> {
        if let Some(title) = &patch.title {
            if title.trim().is_empty() {
                return Err(Error::InvalidInput("Title cannot be empty".to_string()));
            }
        }
        let affected = self.store.update_knowledge(&self.by_id(id), &patch).await?;
        if affected == 0 && !patch.is_empty() {
            return Err(Error::NotFound(format!("Knowledge item {} not found", id)));
        }
        self.get_knowledge(id).await
    }

    /// Second phase of the two-phase write.
    pub async fn attach_embedding(&self, id: Uuid, embedding: &Vector) -> Result<()> {
        let affected = self
            .store
            .set_knowledge_embedding(&self.by_id(id), embedding)
            .await?;
        if affected == 0 {
            return Err(Error::NotFound(format!("Knowledge item {} not found", id)));
        }
        Ok(())
    }

    pub async fn record_counter(&self, id: Uuid, counter: KnowledgeCounter) -> Result<()> {
        let affected = self
            .store
            .increment_knowledge_counter(&self.by_id(id), counter)
            .await?;
        if affected == 0 {
            return Err(Error::NotFound(format!("Knowledge item {} not found", id)));
        }
        Ok(())
    }

    /// Soft delete: the row stays, status becomes `DELETED`.
    pub async fn soft_delete_knowledge(&self, id: Uuid) -> Result<()> {
        self.update_knowledge(
            id,
            KnowledgePatch {
                status: Some(KnowledgeStatus::Deleted),
                ..Default::default()
            },
        )
        .await
        .map(|_| ())
    }

    // ─── Tags ──────────────────────────────────────────────────────────────

    pub async fn find_tags(&self, filter: TagFilter) -> Result<Vec<Tag>> {
        self.store.find_tags(&self.scoped(filter)).await
    }

    pub async fn count_tags(&self, filter: TagFilter) -> Result<i64> {
        self.store.count_tags(&self.scoped(filter)).await
    }

    // ─── Memberships ───────────────────────────────────────────────────────

    /// Add a member. Ownership is only ever granted at tenant creation.
    pub async fn add_member(&self, req: NewMembership) -> Result<Membership> {
        if req.role == Role::Owner {
            return Err(Error::InvalidInput(
                "a tenant has exactly one owner, assigned at creation".to_string(),
            ));
        }
        self.store.insert_membership(self.tenant_id, req).await
    }

    pub async fn find_memberships(&self, filter: MembershipFilter) -> Result<Vec<Membership>> {
        self.store.find_memberships(&self.scoped(filter)).await
    }

    pub async fn get_membership(&self, user_id: Uuid) -> Result<Option<Membership>> {
        Ok(self
            .store
            .find_memberships(&self.scoped(MembershipFilter::for_user(user_id)))
            .await?
            .into_iter()
            .next())
    }

    pub async fn count_members(&self) -> Result<i64> {
        self.store
            .count_memberships(&self.scoped(MembershipFilter::default()))
            .await
    }

    /// Change a member's role. Promoting to OWNER and demoting the owner are
    /// rejected so the single-owner invariant holds.
    pub async fn change_role(&self, user_id: Uuid, role: Role) -> Result<Membership> {
        let current = self
            .get_membership(user_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Member {} not found", user_id)))?;

        if role == Role::Owner && current.role != Role::Owner {
            return Err(Error::InvalidInput(
                "ownership cannot be granted by role change".to_string(),
            ));
        }
        if current.role == Role::Owner && role != Role::Owner {
            return Err(Error::InvalidInput("cannot demote the tenant owner".to_string()));
        }

        self.store
            .update_membership_role(&self.scoped(MembershipFilter::for_user(user_id)), role)
            .await?;
        Ok(Membership { role, ..current })
    }

    pub async fn remove_member(&self, user_id: Uuid) -> Result<()> {
        let current = self
            .get_membership(user_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Member {} not found", user_id)))?;
        if current.role == Role::Owner {
            return Err(Error::InvalidInput("cannot remove the tenant owner".to_string()));
        }
        self.store
            .delete_memberships(&self.scoped(MembershipFilter::for_user(user_id)))
            .await?;
        Ok(())
    }

    // ─── Audit ─────────────────────────────────────────────────────────────

    pub async fn record_audit(&self, mut event: NewAuditEvent) -> Result<AuditEvent> {
        if event.tenant_id.is_some_and(|t| t != self.tenant_id) {
            warn!(
                subsystem = "db",
                component = "scoped",
                tenant_id = %self.tenant_id,
                action = %event.action,
                "Audit event carried a foreign tenant id; rescoped"
            );
        }
        event.tenant_id = Some(self.tenant_id);
        self.store.insert_audit_event(event).await
    }

    pub async fn find_audit_events(&self, filter: AuditFilter) -> Result<Vec<AuditEvent>> {
        self.store.find_audit_events(&self.scoped(filter)).await
    }
}
