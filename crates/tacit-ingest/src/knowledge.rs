//! Read and lifecycle operations on stored knowledge items.

use std::sync::Arc;

use serde_json::json;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use tacit_core::defaults::PAGE_LIMIT_MAX;
use tacit_core::{
    actions, entities, normalize_tag, Error, KnowledgeCounter, KnowledgeFilter, KnowledgeItem,
    KnowledgePatch, KnowledgeStatus, NewAuditEvent, Persistence, Result, Tag, TagFilter,
};
use tacit_db::TenantScopedAccessor;

use crate::audit::AuditRecorder;

#[derive(Clone)]
pub struct KnowledgeService {
    store: Arc<dyn Persistence>,
    audit: AuditRecorder,
}

impl KnowledgeService {
    pub fn new(store: Arc<dyn Persistence>, audit: AuditRecorder) -> Self {
        Self { store, audit }
    }

    fn scoped(&self, tenant_id: Uuid) -> TenantScopedAccessor {
        TenantScopedAccessor::new(Arc::clone(&self.store), tenant_id)
    }

    /// Fetch a live item. Deleted items are reported as missing.
    pub async fn get_item(&self, tenant_id: Uuid, id: Uuid) -> Result<KnowledgeItem> {
        let item = self.scoped(tenant_id).get_knowledge(id).await?;
        if item.status == KnowledgeStatus::Deleted {
            return Err(Error::NotFound(format!("Knowledge item {} not found", id)));
        }
        Ok(item)
    }

    /// Fetch an item for display and bump its view counter.
    pub async fn view_item(&self, tenant_id: Uuid, id: Uuid) -> Result<KnowledgeItem> {
        let mut item = self.get_item(tenant_id, id).await?;
        match self
            .scoped(tenant_id)
            .record_counter(id, KnowledgeCounter::View)
            .await
        {
            Ok(()) => item.view_count += 1,
            Err(e) => warn!(
                subsystem = "ingest",
                component = "knowledge",
                item_id = %id,
                error = %e,
                "View counter update failed"
            ),
        }
        Ok(item)
    }

    pub async fn list_items(&self, tenant_id: Uuid, mut filter: KnowledgeFilter) -> Result<Vec<KnowledgeItem>> {
        if let Some(tag) = filter.tag.take() {
            filter.tag = Some(normalize_tag(&tag).map_err(Error::InvalidInput)?);
        }
        if filter.limit.is_some_and(|l| l > PAGE_LIMIT_MAX) {
            filter.limit = Some(PAGE_LIMIT_MAX);
        }
        self.scoped(tenant_id).find_knowledge(filter).await
    }

    pub async fn count_items(&self, tenant_id: Uuid, filter: KnowledgeFilter) -> Result<i64> {
        self.scoped(tenant_id).count_knowledge(filter).await
    }

    /// Change title or status. Deletion goes through [`Self::delete_item`].
    #[instrument(
        skip(self, patch),
        fields(subsystem = "ingest", component = "knowledge", op = "update_item", tenant_id = %tenant_id, item_id = %id)
    )]
    pub async fn update_item(
        &self,
        tenant_id: Uuid,
        actor_id: Uuid,
        id: Uuid,
        patch: KnowledgePatch,
    ) -> Result<KnowledgeItem> {
        if patch.is_empty() {
            return Err(Error::InvalidInput("Nothing to update".to_string()));
        }
        if patch.status == Some(KnowledgeStatus::Deleted) {
            return Err(Error::InvalidInput(
                "Use delete to remove a knowledge item".to_string(),
            ));
        }
        if patch.title.as_deref().is_some_and(|t| t.trim().is_empty()) {
            return Err(Error::InvalidInput("Title cannot be empty".to_string()));
        }

        let before = self.get_item(tenant_id, id).await?;
        let updated = self.scoped(tenant_id).update_knowledge(id, patch).await?;

        let mut changed = Vec::new();
        if before.title != updated.title {
            changed.push("title");
        }
        if before.status != updated.status {
            changed.push("status");
        }
        self.audit
            .record(
                NewAuditEvent::new(actions::KNOWLEDGE_UPDATED, entities::KNOWLEDGE_ITEM)
                    .tenant(tenant_id)
                    .actor(actor_id)
                    .entity(id)
                    .detail(json!({ "changed": changed, "status": updated.status })),
            )
            .await;
        Ok(updated)
    }

    #[instrument(
        skip(self),
        fields(subsystem = "ingest", component = "knowledge", op = "delete_item", tenant_id = %tenant_id, item_id = %id)
    )]
    pub async fn delete_item(&self, tenant_id: Uuid, actor_id: Uuid, id: Uuid) -> Result<()> {
        let item = self.get_item(tenant_id, id).await?;
        self.scoped(tenant_id).soft_delete_knowledge(id).await?;
        self.audit
            .record(
                NewAuditEvent::new(actions::KNOWLEDGE_DELETED, entities::KNOWLEDGE_ITEM)
                    .tenant(tenant_id)
                    .actor(actor_id)
                    .entity(id)
                    .detail(json!({ "title": item.title })),
            )
            .await;
        debug!("Knowledge item deleted");
        Ok(())
    }

    /// Count a search hit on each returned item. Failures are logged only.
    pub async fn record_search_hits(&self, tenant_id: Uuid, ids: &[Uuid]) {
        let scoped = self.scoped(tenant_id);
        for id in ids {
            if let Err(e) = scoped.record_counter(*id, KnowledgeCounter::Search).await {
                warn!(
                    subsystem = "ingest",
                    component = "knowledge",
                    item_id = %id,
                    error = %e,
                    "Search counter update failed"
                );
            }
        }
    }

    pub async fn list_tags(&self, tenant_id: Uuid, prefix: Option<String>) -> Result<Vec<Tag>> {
        let prefix = prefix
            .map(|p| p.trim().trim_start_matches('#').to_lowercase())
            .filter(|p| !p.is_empty());
        self.scoped(tenant_id)
            .find_tags(TagFilter {
                prefix,
                ..Default::default()
            })
            .await
    }
}
