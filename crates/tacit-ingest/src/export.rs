//! Export of stored knowledge items to external document stores.

use std::sync::Arc;

use serde_json::json;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use tacit_core::{
    actions, entities, Error, ExportAdapter, ExportResult, KnowledgeStatus, NewAuditEvent,
    Persistence, Result, Severity,
};
use tacit_db::TenantScopedAccessor;

use crate::audit::AuditRecorder;

#[derive(Clone)]
pub struct ExportService {
    store: Arc<dyn Persistence>,
    audit: AuditRecorder,
}

impl ExportService {
    pub fn new(store: Arc<dyn Persistence>, audit: AuditRecorder) -> Self {
        Self { store, audit }
    }

    /// Push one item through `adapter`.
    ///
    /// Adapter failures come back as a failed [`ExportResult`], not an error;
    /// only a missing item or a store failure is an `Err`. Both outcomes are
    /// audited.
    #[instrument(
        skip(self, adapter),
        fields(subsystem = "ingest", component = "export", op = "export_item", tenant_id = %tenant_id, item_id = %item_id, adapter = adapter.name())
    )]
    pub async fn export_item(
        &self,
        tenant_id: Uuid,
        actor_id: Uuid,
        item_id: Uuid,
        adapter: &dyn ExportAdapter,
    ) -> Result<ExportResult> {
        let item = TenantScopedAccessor::new(Arc::clone(&self.store), tenant_id)
            .get_knowledge(item_id)
            .await?;
        if item.status == KnowledgeStatus::Deleted {
            return Err(Error::NotFound(format!("Knowledge item {} not found", item_id)));
        }

        let result = adapter
            .export_knowledge(&item.title, &item.content, &item.tags)
            .await;

        let event = if result.success {
            info!(external_id = ?result.external_id, url = ?result.url, "Knowledge exported");
            NewAuditEvent::new(actions::KNOWLEDGE_EXPORTED, entities::KNOWLEDGE_ITEM).detail(json!({
                "adapter": adapter.name(),
                "external_id": result.external_id,
                "url": result.url,
            }))
        } else {
            warn!(error = ?result.error, "Knowledge export failed");
            NewAuditEvent::new(actions::KNOWLEDGE_EXPORT_FAILED, entities::KNOWLEDGE_ITEM)
                .detail(json!({
                    "adapter": adapter.name(),
                    "external_id": result.external_id,
                    "error": result.error,
                }))
                .severity(Severity::Warn)
        };
        self.audit
            .record(event.tenant(tenant_id).actor(actor_id).entity(item_id))
            .await;

        Ok(result)
    }
}
