//! Knowledge ingestion and enrichment pipeline.
//!
//! `ingest` runs, in order:
//! 1. Input validation and tag normalization
//! 2. Tenant status and quota checks
//! 3. Enrichment (summary, embedding, action items), each call bounded by a
//!    timeout and replaced by a fallback on failure
//! 4. Atomic base write of the item and its tags
//! 5. Embedding attach as a separate write (failure is logged only)
//! 6. Audit event
//!
//! Nothing after a failed base write runs, so a failed ingest leaves neither
//! an item nor an audit event behind.

use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::json;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use tacit_core::content::truncate_chars;
use tacit_core::defaults::{ENRICH_MAX_INPUT_CHARS, FALLBACK_SUMMARY};
use tacit_core::{
    actions, derive_title, enrichment_input, entities, is_blank, normalize_content, normalize_tag,
    ActionItem, CaptureAdapter, ContentMessage, EnrichmentProvider, Error, KnowledgeItem, KnowledgePatch,
    KnowledgeStatus, NewAuditEvent, NewKnowledgeItem, Persistence, PlanTier, Result,
    SourceMetadata, SourceType, TagFilter, Tenant, ThreadRef, Vector,
};
use tacit_db::TenantScopedAccessor;

use crate::audit::AuditRecorder;
use crate::gate::{AccessGate, Quota};

/// Input of one ingestion.
#[derive(Debug, Clone)]
pub struct IngestRequest {
    pub title: String,
    pub content: Vec<ContentMessage>,
    pub source_type: SourceType,
    pub source_metadata: SourceMetadata,
    pub tags: Vec<String>,
    pub status: KnowledgeStatus,
}

impl IngestRequest {
    pub fn new(title: impl Into<String>, content: Vec<ContentMessage>, source_type: SourceType) -> Self {
        Self {
            title: title.into(),
            content,
            source_type,
            source_metadata: SourceMetadata::default(),
            tags: Vec::new(),
            status: KnowledgeStatus::Published,
        }
    }

    pub fn with_metadata(mut self, metadata: SourceMetadata) -> Self {
        self.source_metadata = metadata;
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    pub fn with_status(mut self, status: KnowledgeStatus) -> Self {
        self.status = status;
        self
    }
}

/// Enrichment outcome with fallbacks already applied.
#[derive(Debug, Default)]
struct Enrichment {
    summary: Option<String>,
    embedding: Option<Vector>,
    action_items: Option<Vec<ActionItem>>,
    fallbacks: Vec<&'static str>,
}

/// Normalize and deduplicate tag names. Any invalid name rejects the request.
pub fn normalize_tags(raw: &[String]) -> Result<Vec<String>> {
    let mut tags = BTreeSet::new();
    for tag in raw {
        tags.insert(normalize_tag(tag).map_err(Error::InvalidInput)?);
    }
    Ok(tags.into_iter().collect())
}

#[derive(Clone)]
pub struct IngestPipeline {
    store: Arc<dyn Persistence>,
    provider: Option<Arc<dyn EnrichmentProvider>>,
    gate: AccessGate,
    audit: AuditRecorder,
    enrich_timeout: Duration,
}

impl IngestPipeline {
    pub fn new(
        store: Arc<dyn Persistence>,
        provider: Option<Arc<dyn EnrichmentProvider>>,
        gate: AccessGate,
        audit: AuditRecorder,
        enrich_timeout: Duration,
    ) -> Self {
        Self {
            store,
            provider,
            gate,
            audit,
            enrich_timeout,
        }
    }

    fn scoped(&self, tenant_id: Uuid) -> TenantScopedAccessor {
        TenantScopedAccessor::new(Arc::clone(&self.store), tenant_id)
    }

    async fn active_tenant(&self, tenant_id: Uuid) -> Result<Tenant> {
        match self.store.get_tenant(tenant_id).await? {
            Some(tenant) if tenant.is_active() => Ok(tenant),
            _ => Err(Error::TenantNotFound(tenant_id.to_string())),
        }
    }

    /// Ingest conversation content as a new knowledge item.
    ///
    /// Enrichment failures never fail the ingest. Fails with `InvalidInput`
    /// for empty content or bad tags (an empty title is derived from the
    /// content), `TenantNotFound` for inactive tenants,
    /// `PlanUpgradeRequired` when a quota is full and `Persistence` when the
    /// base write fails.
    #[instrument(
        skip(self, request),
        fields(subsystem = "ingest", component = "pipeline", op = "ingest", tenant_id = %tenant_id, actor_id = %actor_id, message_count = request.content.len())
    )]
    pub async fn ingest(&self, tenant_id: Uuid, actor_id: Uuid, request: IngestRequest) -> Result<KnowledgeItem> {
        let start = Instant::now();

        if request.content.is_empty() || is_blank(&request.content) {
            return Err(Error::InvalidInput("Content cannot be empty".to_string()));
        }
        let title = match request.title.trim() {
            "" => derive_title(&request.content)
                .ok_or_else(|| Error::InvalidInput("Content cannot be empty".to_string()))?,
            given => given.to_string(),
        };
        let mut tags = normalize_tags(&request.tags)?;

        let tenant = self.active_tenant(tenant_id).await?;
        let scoped = self.scoped(tenant_id);
        self.gate
            .require_capacity(&tenant, Some(actor_id), Quota::Items, 1)
            .await?;
        let unseen = self.unseen_tags(&scoped, &tags).await?;
        self.gate
            .require_capacity(&tenant, Some(actor_id), Quota::Tags, unseen.len() as i64)
            .await?;

        let enrichment = match self.enrichment_provider(&tenant) {
            Some(provider) => self.enrich(provider.as_ref(), &title, &request.content).await,
            None => Enrichment::default(),
        };

        if tenant.settings.auto_tagging {
            self.add_auto_tags(
                &tenant,
                &scoped,
                &mut tags,
                &request.source_metadata,
                enrichment.action_items.as_deref().unwrap_or_default(),
            )
            .await;
        }

        let new_item = NewKnowledgeItem {
            title,
            content: request.content,
            summary: enrichment.summary,
            action_items: enrichment.action_items,
            source_type: request.source_type,
            source_metadata: request.source_metadata,
            created_by: actor_id,
            status: request.status,
            tags,
        };
        let mut item = match scoped.create_knowledge(new_item).await {
            Ok(item) => item,
            Err(e) => {
                error!(error = %e, "Knowledge base write failed");
                return Err(e);
            }
        };

        let embedded = match enrichment.embedding {
            Some(embedding) => self.attach_embedding(&scoped, &mut item, embedding).await,
            None => false,
        };

        self.audit
            .record(
                NewAuditEvent::new(actions::KNOWLEDGE_INGESTED, entities::KNOWLEDGE_ITEM)
                    .tenant(tenant_id)
                    .actor(actor_id)
                    .entity(item.id)
                    .detail(json!({
                        "source_type": item.source_type,
                        "message_count": item.content.len(),
                        "tags": item.tags,
                        "embedded": embedded,
                        "fallbacks": enrichment.fallbacks,
                    })),
            )
            .await;

        info!(
            item_id = %item.id,
            embedded,
            fallbacks = ?enrichment.fallbacks,
            duration_ms = start.elapsed().as_millis() as u64,
            "Knowledge ingested"
        );
        Ok(item)
    }

    /// Regenerate summary, action items and embedding for an existing item.
    ///
    /// Requires a STARTER plan or higher; the provider is never called for
    /// tenants below it.
    #[instrument(
        skip(self),
        fields(subsystem = "ingest", component = "pipeline", op = "reenrich", tenant_id = %tenant_id, actor_id = %actor_id, item_id = %item_id)
    )]
    pub async fn reenrich(&self, tenant_id: Uuid, actor_id: Uuid, item_id: Uuid) -> Result<KnowledgeItem> {
        let tenant = self.active_tenant(tenant_id).await?;
        self.gate
            .require_plan(&tenant, Some(actor_id), PlanTier::Starter)
            .await?;
        if !tenant.settings.ai_summaries_enabled {
            return Err(Error::InvalidInput(
                "AI enrichment is disabled for this tenant".to_string(),
            ));
        }
        let provider = self
            .provider
            .clone()
            .ok_or_else(|| Error::Config("No enrichment provider configured".to_string()))?;

        let scoped = self.scoped(tenant_id);
        let item = scoped.get_knowledge(item_id).await?;
        if item.status == KnowledgeStatus::Deleted {
            return Err(Error::NotFound(format!("Knowledge item {} not found", item_id)));
        }

        let enrichment = self.enrich(provider.as_ref(), &item.title, &item.content).await;
        let patch = KnowledgePatch {
            summary: enrichment.summary,
            action_items: enrichment.action_items,
            ..Default::default()
        };
        let mut updated = scoped.update_knowledge(item_id, patch).await?;
        let embedded = match enrichment.embedding {
            Some(embedding) => self.attach_embedding(&scoped, &mut updated, embedding).await,
            None => false,
        };

        self.audit
            .record(
                NewAuditEvent::new(actions::KNOWLEDGE_REENRICHED, entities::KNOWLEDGE_ITEM)
                    .tenant(tenant_id)
                    .actor(actor_id)
                    .entity(item_id)
                    .detail(json!({ "embedded": embedded, "fallbacks": enrichment.fallbacks })),
            )
            .await;
        info!(embedded, "Knowledge re-enriched");
        Ok(updated)
    }

    /// Capture a thread through `adapter` and ingest it. The title defaults to
    /// the root message.
    #[instrument(
        skip(self, adapter, tags),
        fields(subsystem = "ingest", component = "pipeline", op = "capture_and_ingest", tenant_id = %tenant_id, adapter = adapter.name(), thread_ref = %thread_ref)
    )]
    pub async fn capture_and_ingest(
        &self,
        tenant_id: Uuid,
        actor_id: Uuid,
        adapter: &dyn CaptureAdapter,
        thread_ref: &ThreadRef,
        tags: Vec<String>,
    ) -> Result<KnowledgeItem> {
        normalize_tags(&tags)?;
        self.active_tenant(tenant_id).await?;

        let thread = adapter.capture_thread(thread_ref).await?;
        debug!(message_count = thread.messages.len(), "Thread captured");

        let title = thread.default_title();
        let metadata = thread.source_metadata();
        let source_type = thread.platform;
        let request = IngestRequest::new(title, thread.into_content(), source_type)
            .with_metadata(metadata)
            .with_tags(tags);
        self.ingest(tenant_id, actor_id, request).await
    }

    fn enrichment_provider(&self, tenant: &Tenant) -> Option<Arc<dyn EnrichmentProvider>> {
        if !tenant.ai_enrichment_available() {
            debug!(plan = %tenant.plan, "AI enrichment not available to tenant; skipping");
            return None;
        }
        if self.provider.is_none() {
            debug!("No enrichment provider configured; skipping");
        }
        self.provider.clone()
    }

    async fn bounded<T>(&self, op: &str, call: impl Future<Output = Result<T>>) -> Result<T> {
        match tokio::time::timeout(self.enrich_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(Error::Enrichment(format!(
                "{} timed out after {}ms",
                op,
                self.enrich_timeout.as_millis()
            ))),
        }
    }

    /// Run the three provider calls concurrently and apply fallbacks.
    async fn enrich(
        &self,
        provider: &dyn EnrichmentProvider,
        title: &str,
        content: &[ContentMessage],
    ) -> Enrichment {
        let text = truncate_chars(&normalize_content(content), ENRICH_MAX_INPUT_CHARS);
        let input = enrichment_input(title, content);

        let (summary, embedding, action_items) = futures::join!(
            self.bounded("summarize", provider.summarize(title, &text)),
            self.bounded("embed", provider.embed(&input)),
            self.bounded("extract_action_items", provider.extract_action_items(&text)),
        );

        let mut enrichment = Enrichment::default();
        enrichment.summary = Some(match summary {
            Ok(summary) => summary,
            Err(e) => {
                warn!(provider = provider.name(), error = %e, fallback = FALLBACK_SUMMARY, "Summary failed; using fallback");
                enrichment.fallbacks.push("summary");
                FALLBACK_SUMMARY.to_string()
            }
        });
        enrichment.embedding = match embedding {
            Ok(vector) => Some(vector),
            Err(e) => {
                warn!(provider = provider.name(), error = %e, "Embedding failed; item will not be semantically searchable");
                enrichment.fallbacks.push("embedding");
                None
            }
        };
        enrichment.action_items = Some(match action_items {
            Ok(items) => items,
            Err(e) => {
                warn!(provider = provider.name(), error = %e, "Action item extraction failed; using empty list");
                enrichment.fallbacks.push("action_items");
                Vec::new()
            }
        });
        enrichment
    }

    async fn attach_embedding(
        &self,
        scoped: &TenantScopedAccessor,
        item: &mut KnowledgeItem,
        embedding: Vector,
    ) -> bool {
        match scoped.attach_embedding(item.id, &embedding).await {
            Ok(()) => {
                item.embedding = Some(embedding);
                true
            }
            Err(e) => {
                warn!(item_id = %item.id, error = %e, "Embedding attach failed; item stays text-only");
                false
            }
        }
    }

    async fn unseen_tags(&self, scoped: &TenantScopedAccessor, tags: &[String]) -> Result<Vec<String>> {
        if tags.is_empty() {
            return Ok(Vec::new());
        }
        let existing = scoped
            .find_tags(TagFilter {
                names: Some(tags.to_vec()),
                ..Default::default()
            })
            .await?;
        Ok(tags
            .iter()
            .filter(|t| !existing.iter().any(|e| e.name == **t))
            .cloned()
            .collect())
    }

    /// Derive tags from the channel name and action-item assignees. Derived
    /// tags that would exceed the tag quota are dropped.
    async fn add_auto_tags(
        &self,
        tenant: &Tenant,
        scoped: &TenantScopedAccessor,
        tags: &mut Vec<String>,
        metadata: &SourceMetadata,
        action_items: &[ActionItem],
    ) {
        let candidates: BTreeSet<String> = metadata
            .channel_name
            .iter()
            .chain(action_items.iter().filter_map(|i| i.assignee.as_ref()))
            .filter_map(|raw| normalize_tag(raw).ok())
            .filter(|t| !tags.contains(t))
            .collect();
        if candidates.is_empty() {
            return;
        }
        let candidates: Vec<String> = candidates.into_iter().collect();

        let unseen = match self.unseen_tags(scoped, &candidates).await {
            Ok(unseen) => unseen,
            Err(e) => {
                warn!(error = %e, "Auto-tag lookup failed; skipping derived tags");
                return;
            }
        };
        let mut room = match tenant.limits.max_tags {
            None => i64::MAX,
            Some(max) => {
                let used = scoped.count_tags(TagFilter::default()).await.unwrap_or(max);
                let pending = self.unseen_tags(scoped, tags).await.map_or(0, |u| u.len() as i64);
                max - used - pending
            }
        };
        for tag in candidates {
            if unseen.contains(&tag) {
                if room <= 0 {
                    debug!(tag = %tag, "Tag quota reached; dropping derived tag");
                    continue;
                }
                room -= 1;
            }
            tags.push(tag);
        }
        tags.sort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_tags_dedups_and_sorts() {
        let tags = normalize_tags(&["Ops".into(), "#ops".into(), "On Call".into()]).unwrap();
        assert_eq!(tags, vec!["on-call".to_string(), "ops".to_string()]);
    }

    #[test]
    fn test_normalize_tags_rejects_invalid() {
        assert!(matches!(
            normalize_tags(&["ok".into(), "bad!".into()]),
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            normalize_tags(&["   ".into()]),
            Err(Error::InvalidInput(_))
        ));
    }
}
