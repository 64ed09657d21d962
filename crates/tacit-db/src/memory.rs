//! In-memory store for tests and local development.
//!
//! Mirrors the PostgreSQL semantics of `PgStore` (uniqueness, tenant
//! predicates, soft-delete visibility) over `HashMap`/`Vec` behind
//! `std::sync::RwLock`. Failure points can be switched on to exercise
//! error paths in callers.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pgvector::Vector;
use uuid::Uuid;

use tacit_core::{
    new_v7, validate_slug, AuditEvent, AuditFilter, AuditRepository, Error, KnowledgeCounter,
    KnowledgeFilter, KnowledgeItem, KnowledgePatch, KnowledgeRepository, Membership,
    MembershipFilter, MembershipRepository, NewAuditEvent, NewKnowledgeItem, NewMembership,
    NewTenant, PlanLimits, Result, Role, ScopedFilter, Tag, TagFilter, TagRepository, Tenant,
    TenantRepository, TenantSettings, TenantStatus,
};

/// Operations that can be made to fail on demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailPoint {
    KnowledgeInsert,
    EmbeddingUpdate,
    AuditInsert,
    TenantLookup,
}

#[derive(Default)]
struct State {
    tenants: HashMap<Uuid, Tenant>,
    memberships: Vec<Membership>,
    items: Vec<KnowledgeItem>,
    tags: HashMap<(Uuid, String), DateTime<Utc>>,
    audit: Vec<AuditEvent>,
}

/// In-memory implementation of every repository trait.
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<State>,
    failures: RwLock<HashSet<FailPoint>>,
    tenant_lookups: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `point` fail with a persistence error until switched off.
    pub fn set_failure(&self, point: FailPoint, enabled: bool) {
        if let Ok(mut failures) = self.failures.write() {
            if enabled {
                failures.insert(point);
            } else {
                failures.remove(&point);
            }
        }
    }

    /// Number of tenant lookups (by id, slug or domain) served so far.
    pub fn tenant_lookup_count(&self) -> usize {
        self.tenant_lookups.load(Ordering::SeqCst)
    }

    /// Every audit event, including system-wide ones. Test inspection only.
    pub fn all_audit_events(&self) -> Vec<AuditEvent> {
        self.read().map(|s| s.audit.clone()).unwrap_or_default()
    }

    fn check(&self, point: FailPoint) -> Result<()> {
        let failing = self
            .failures
            .read()
            .map(|f| f.contains(&point))
            .unwrap_or(false);
        if failing {
            Err(Error::Persistence(format!("injected failure: {:?}", point)))
        } else {
            Ok(())
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, State>> {
        self.state
            .read()
            .map_err(|_| Error::Internal("memory store lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, State>> {
        self.state
            .write()
            .map_err(|_| Error::Internal("memory store lock poisoned".to_string()))
    }

    fn lookup_tenant(&self, pred: impl Fn(&Tenant) -> bool) -> Result<Option<Tenant>> {
        self.tenant_lookups.fetch_add(1, Ordering::SeqCst);
        self.check(FailPoint::TenantLookup)?;
        Ok(self.read()?.tenants.values().find(|t| pred(t)).cloned())
    }
}

fn matching_items<'a>(
    items: &'a mut [KnowledgeItem],
    tenant_id: Uuid,
    filter: &'a KnowledgeFilter,
) -> impl Iterator<Item = &'a mut KnowledgeItem> {
    items
        .iter_mut()
        .filter(move |i| i.tenant_id == tenant_id && filter.matches(i))
}

#[async_trait]
impl TenantRepository for MemoryStore {
    async fn create_tenant(&self, req: NewTenant, owner_id: Uuid) -> Result<Tenant> {
        validate_slug(&req.slug).map_err(Error::InvalidInput)?;
        if req.name.trim().is_empty() {
            return Err(Error::InvalidInput("Tenant name cannot be empty".to_string()));
        }
        let domain = req.custom_domain.map(|d| d.to_lowercase());

        let mut state = self.write()?;
        let clash = state.tenants.values().any(|t| {
            t.slug == req.slug || (domain.is_some() && t.custom_domain == domain)
        });
        if clash {
            return Err(Error::InvalidInput(
                "tenant slug or domain already exists".to_string(),
            ));
        }

        let now = Utc::now();
        let tenant = Tenant {
            id: new_v7(),
            name: req.name.trim().to_string(),
            slug: req.slug,
            custom_domain: domain,
            plan: req.plan,
            limits: PlanLimits::for_tier(req.plan),
            status: req.status,
            settings: req.settings,
            created_at: now,
            updated_at: now,
        };
        state.tenants.insert(tenant.id, tenant.clone());
        state.memberships.push(Membership {
            id: new_v7(),
            tenant_id: tenant.id,
            user_id: owner_id,
            role: Role::Owner,
            created_at: now,
            updated_at: now,
        });
        Ok(tenant)
    }

    async fn get_tenant(&self, id: Uuid) -> Result<Option<Tenant>> {
        self.lookup_tenant(|t| t.id == id)
    }

    async fn find_tenant_by_slug(&self, slug: &str) -> Result<Option<Tenant>> {
        let slug = slug.to_lowercase();
        self.lookup_tenant(|t| t.slug == slug)
    }

    async fn find_tenant_by_domain(&self, domain: &str) -> Result<Option<Tenant>> {
        let domain = domain.to_lowercase();
        self.lookup_tenant(|t| t.custom_domain.as_deref() == Some(domain.as_str()))
    }

    async fn set_tenant_status(&self, id: Uuid, status: TenantStatus) -> Result<Tenant> {
        let mut state = self.write()?;
        let tenant = state
            .tenants
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("Tenant {} not found", id)))?;
        if !tenant.status.can_transition_to(status) {
            return Err(Error::InvalidInput(format!(
                "Tenant status cannot change from {} to {}",
                tenant.status, status
            )));
        }
        tenant.status = status;
        tenant.updated_at = Utc::now();
        Ok(tenant.clone())
    }

    async fn update_tenant_settings(&self, id: Uuid, settings: TenantSettings) -> Result<Tenant> {
        let mut state = self.write()?;
        let tenant = state
            .tenants
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("Tenant {} not found", id)))?;
        tenant.settings = settings;
        tenant.updated_at = Utc::now();
        Ok(tenant.clone())
    }
}

#[async_trait]
impl KnowledgeRepository for MemoryStore {
    async fn insert_knowledge(
        &self,
        tenant_id: Uuid,
        req: NewKnowledgeItem,
    ) -> Result<KnowledgeItem> {
        self.check(FailPoint::KnowledgeInsert)?;
        let mut state = self.write()?;
        if !state.tenants.contains_key(&tenant_id) {
            return Err(Error::Persistence(format!(
                "foreign key violation: tenant {}",
                tenant_id
            )));
        }

        let now = Utc::now();
        let mut tags = req.tags;
        tags.sort();
        tags.dedup();
        for tag in &tags {
            state.tags.entry((tenant_id, tag.clone())).or_insert(now);
        }

        let item = KnowledgeItem {
            id: new_v7(),
            tenant_id,
            title: req.title,
            content: req.content,
            summary: req.summary,
            embedding: None,
            action_items: req.action_items,
            source_type: req.source_type,
            source_metadata: req.source_metadata,
            created_by: req.created_by,
            status: req.status,
            view_count: 0,
            search_count: 0,
            tags,
            created_at: now,
            updated_at: now,
        };
        state.items.push(item.clone());
        Ok(item)
    }

    async fn find_knowledge(&self, filter: &KnowledgeFilter) -> Result<Vec<KnowledgeItem>> {
        let tenant_id = filter.require_tenant()?;
        let state = self.read()?;
        let mut items: Vec<KnowledgeItem> = state
            .items
            .iter()
            .filter(|i| i.tenant_id == tenant_id && filter.matches(i))
            .cloned()
            .collect();
        items.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        let offset = filter.offset.unwrap_or(0).max(0) as usize;
        let limit = filter.effective_limit() as usize;
        Ok(items.into_iter().skip(offset).take(limit).collect())
    }

    async fn count_knowledge(&self, filter: &KnowledgeFilter) -> Result<i64> {
        let tenant_id = filter.require_tenant()?;
        let state = self.read()?;
        Ok(state
            .items
            .iter()
            .filter(|i| i.tenant_id == tenant_id && filter.matches(i))
            .count() as i64)
    }

    async fn update_knowledge(
        &self,
        filter: &KnowledgeFilter,
        patch: &KnowledgePatch,
    ) -> Result<u64> {
        let tenant_id = filter.require_tenant()?;
        if patch.is_empty() {
            return Ok(0);
        }
        let mut state = self.write()?;
        let now = Utc::now();
        let mut affected = 0;
        for item in matching_items(&mut state.items, tenant_id, filter) {
            if let Some(title) = &patch.title {
                item.title = title.clone();
            }
            if let Some(status) = patch.status {
                item.status = status;
            }
            if let Some(summary) = &patch.summary {
                item.summary = Some(summary.clone());
            }
            if let Some(action_items) = &patch.action_items {
                item.action_items = Some(action_items.clone());
            }
            item.updated_at = now;
            affected += 1;
        }
        Ok(affected)
    }

    async fn set_knowledge_embedding(
        &self,
        filter: &KnowledgeFilter,
        embedding: &Vector,
    ) -> Result<u64> {
        let tenant_id = filter.require_tenant()?;
        self.check(FailPoint::EmbeddingUpdate)?;
        let mut state = self.write()?;
        let now = Utc::now();
        let mut affected = 0;
        for item in matching_items(&mut state.items, tenant_id, filter) {
            item.embedding = Some(embedding.clone());
            item.updated_at = now;
            affected += 1;
        }
        Ok(affected)
    }

    async fn increment_knowledge_counter(
        &self,
        filter: &KnowledgeFilter,
        counter: KnowledgeCounter,
    ) -> Result<u64> {
        let tenant_id = filter.require_tenant()?;
        let mut state = self.write()?;
        let mut affected = 0;
        for item in matching_items(&mut state.items, tenant_id, filter) {
            match counter {
                KnowledgeCounter::View => item.view_count += 1,
                KnowledgeCounter::Search => item.search_count += 1,
            }
            affected += 1;
        }
        Ok(affected)
    }
}

#[async_trait]
impl TagRepository for MemoryStore {
    async fn find_tags(&self, filter: &TagFilter) -> Result<Vec<Tag>> {
        let tenant_id = filter.require_tenant()?;
        let state = self.read()?;
        let mut tags: Vec<Tag> = state
            .tags
            .iter()
            .filter(|((t, _), _)| *t == tenant_id)
            .map(|((_, name), created_at)| Tag {
                tenant_id,
                name: name.clone(),
                usage_count: state
                    .items
                    .iter()
                    .filter(|i| i.tenant_id == tenant_id && i.tags.contains(name))
                    .count() as i64,
                created_at: *created_at,
            })
            .filter(|tag| filter.matches(tag))
            .collect();
        tags.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(tags)
    }

    async fn count_tags(&self, filter: &TagFilter) -> Result<i64> {
        Ok(self.find_tags(filter).await?.len() as i64)
    }
}

#[async_trait]
impl MembershipRepository for MemoryStore {
    async fn insert_membership(&self, tenant_id: Uuid, req: NewMembership) -> Result<Membership> {
        let mut state = self.write()?;
        let duplicate = state.memberships.iter().any(|m| {
            m.tenant_id == tenant_id
                && (m.user_id == req.user_id || (req.role == Role::Owner && m.role == Role::Owner))
        });
        if duplicate {
            return Err(Error::InvalidInput("membership already exists".to_string()));
        }
        let now = Utc::now();
        let membership = Membership {
            id: new_v7(),
            tenant_id,
            user_id: req.user_id,
            role: req.role,
            created_at: now,
            updated_at: now,
        };
        state.memberships.push(membership.clone());
        Ok(membership)
    }

    async fn find_memberships(&self, filter: &MembershipFilter) -> Result<Vec<Membership>> {
        let tenant_id = filter.require_tenant()?;
        let state = self.read()?;
        Ok(state
            .memberships
            .iter()
            .filter(|m| m.tenant_id == tenant_id && filter.matches(m))
            .cloned()
            .collect())
    }

    async fn count_memberships(&self, filter: &MembershipFilter) -> Result<i64> {
        Ok(self.find_memberships(filter).await?.len() as i64)
    }

    async fn update_membership_role(&self, filter: &MembershipFilter, role: Role) -> Result<u64> {
        let tenant_id = filter.require_tenant()?;
        let user_id = filter.require_user()?;
        let mut state = self.write()?;
        if role == Role::Owner
            && state
                .memberships
                .iter()
                .any(|m| m.tenant_id == tenant_id && m.role == Role::Owner && m.user_id != user_id)
        {
            return Err(Error::InvalidInput("tenant owner already exists".to_string()));
        }
        let now = Utc::now();
        let mut affected = 0;
        for m in state
            .memberships
            .iter_mut()
            .filter(|m| m.tenant_id == tenant_id && m.user_id == user_id)
        {
            m.role = role;
            m.updated_at = now;
            affected += 1;
        }
        Ok(affected)
    }

    async fn delete_memberships(&self, filter: &MembershipFilter) -> Result<u64> {
        let tenant_id = filter.require_tenant()?;
        let user_id = filter.require_user()?;
        let mut state = self.write()?;
        let before = state.memberships.len();
        state
            .memberships
            .retain(|m| !(m.tenant_id == tenant_id && m.user_id == user_id));
        Ok((before - state.memberships.len()) as u64)
    }
}

#[async_trait]
impl AuditRepository for MemoryStore {
    async fn insert_audit_event(&self, event: NewAuditEvent) -> Result<AuditEvent> {
        self.check(FailPoint::AuditInsert)?;
        let stored = AuditEvent {
            id: new_v7(),
            tenant_id: event.tenant_id,
            actor_id: event.actor_id,
            action: event.action,
            entity_type: event.entity_type,
            entity_id: event.entity_id,
            detail: event.detail,
            severity: event.severity,
            created_at: Utc::now(),
        };
        self.write()?.audit.push(stored.clone());
        Ok(stored)
    }

    async fn find_audit_events(&self, filter: &AuditFilter) -> Result<Vec<AuditEvent>> {
        let tenant_id = filter.require_tenant()?;
        let limit = filter
            .limit
            .unwrap_or(tacit_core::defaults::PAGE_LIMIT)
            .clamp(0, tacit_core::defaults::PAGE_LIMIT_MAX) as usize;
        let state = self.read()?;
        Ok(state
            .audit
            .iter()
            .rev()
            .filter(|e| e.tenant_id == Some(tenant_id) && filter.matches(e))
            .take(limit)
            .cloned()
            .collect())
    }
}
