//! Ingestion pipeline behavior against the in-memory store and the mock
//! enrichment provider.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use tacit_core::defaults::FALLBACK_SUMMARY;
use tacit_core::{
    actions, AuditFilter, CaptureAdapter, CapturedThread, ContentMessage, EnrichmentProvider,
    Error, Integration, KnowledgeFilter, NewTenant, PlanTier, Result, SourceMetadata, SourceType,
    Tenant, TenantRepository, TenantSettings, ThreadMessage, ThreadRef,
};
use tacit_db::{FailPoint, MemoryStore, TenantScopedAccessor};
use tacit_inference::{MockBehavior, MockEnrichmentProvider};
use tacit_ingest::{IngestConfig, IngestRequest, Services};

struct Harness {
    store: Arc<MemoryStore>,
    provider: Arc<MockEnrichmentProvider>,
    services: Services,
    tenant: Tenant,
    owner: Uuid,
}

async fn harness(plan: PlanTier) -> Harness {
    harness_with(NewTenant::new("Acme", "acme", plan)).await
}

async fn harness_with(req: NewTenant) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let owner = Uuid::new_v4();
    let tenant = store.create_tenant(req, owner).await.unwrap();
    let provider = Arc::new(MockEnrichmentProvider::new());
    let config = IngestConfig::default().with_enrich_timeout(Duration::from_secs(30));
    let services = Services::new(
        store.clone(),
        Some(provider.clone() as Arc<dyn EnrichmentProvider>),
        &config,
    );
    Harness {
        store,
        provider,
        services,
        tenant,
        owner,
    }
}

fn request() -> IngestRequest {
    IngestRequest::new(
        "Deploy freeze",
        vec![
            ContentMessage::new("ana", "Freeze starts friday"),
            ContentMessage::new("ben", "TODO: announce in #eng"),
        ],
        SourceType::Manual,
    )
}

async fn audit_actions(h: &Harness, action: &str) -> usize {
    TenantScopedAccessor::new(h.store.clone(), h.tenant.id)
        .find_audit_events(AuditFilter::action(action))
        .await
        .unwrap()
        .len()
}

#[tokio::test]
async fn test_ingest_enriches_and_audits() {
    let h = harness(PlanTier::Starter).await;
    let item = h
        .services
        .pipeline
        .ingest(h.tenant.id, h.owner, request().with_tags(vec!["Ops".into()]))
        .await
        .unwrap();

    assert!(item.summary.as_deref().unwrap().starts_with("Summary of Deploy freeze"));
    assert!(item.has_embedding());
    let action_items = item.action_items.clone().unwrap();
    assert_eq!(action_items.len(), 1);
    assert_eq!(action_items[0].description, "announce in #eng");
    assert_eq!(item.tags, vec!["ops".to_string()]);
    assert_eq!(h.provider.total_calls(), 3);
    assert_eq!(audit_actions(&h, actions::KNOWLEDGE_INGESTED).await, 1);
}

#[tokio::test]
async fn test_free_plan_skips_provider() {
    let h = harness(PlanTier::Free).await;
    let item = h
        .services
        .pipeline
        .ingest(h.tenant.id, h.owner, request())
        .await
        .unwrap();
    assert!(item.summary.is_none());
    assert!(item.embedding.is_none());
    assert!(item.action_items.is_none());
    assert_eq!(h.provider.total_calls(), 0);
}

#[tokio::test]
async fn test_disabled_summaries_skip_provider() {
    let settings = TenantSettings {
        ai_summaries_enabled: false,
        auto_tagging: false,
    };
    let h = harness_with(NewTenant::new("Acme", "acme", PlanTier::Business).with_settings(settings)).await;
    h.services
        .pipeline
        .ingest(h.tenant.id, h.owner, request())
        .await
        .unwrap();
    assert_eq!(h.provider.total_calls(), 0);
}

#[tokio::test]
async fn test_unreachable_provider_still_ingests() {
    let h = harness(PlanTier::Starter).await;
    h.provider.set_all(MockBehavior::Fail);

    let item = h
        .services
        .pipeline
        .ingest(h.tenant.id, h.owner, request())
        .await
        .unwrap();

    assert_eq!(item.summary.as_deref(), Some(FALLBACK_SUMMARY));
    assert!(item.embedding.is_none());
    assert_eq!(item.action_items, Some(Vec::new()));

    let stored = TenantScopedAccessor::new(h.store.clone(), h.tenant.id)
        .get_knowledge(item.id)
        .await
        .unwrap();
    assert_eq!(stored.title, "Deploy freeze");

    let events = TenantScopedAccessor::new(h.store.clone(), h.tenant.id)
        .find_audit_events(AuditFilter::action(actions::KNOWLEDGE_INGESTED))
        .await
        .unwrap();
    assert_eq!(events[0].detail["fallbacks"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_enrichment_failures_are_independent() {
    let h = harness(PlanTier::Starter).await;
    h.provider.set_embed(MockBehavior::Fail);

    let item = h
        .services
        .pipeline
        .ingest(h.tenant.id, h.owner, request())
        .await
        .unwrap();

    assert_ne!(item.summary.as_deref(), Some(FALLBACK_SUMMARY));
    assert!(item.embedding.is_none());
    assert_eq!(item.action_items.unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_hanging_summary_times_out_to_fallback() {
    let h = harness(PlanTier::Starter).await;
    h.provider.set_summarize(MockBehavior::Hang);

    let item = h
        .services
        .pipeline
        .ingest(h.tenant.id, h.owner, request())
        .await
        .unwrap();

    assert_eq!(item.summary.as_deref(), Some(FALLBACK_SUMMARY));
    assert!(item.has_embedding());
}

#[tokio::test]
async fn test_base_write_failure_leaves_no_trace() {
    let h = harness(PlanTier::Starter).await;
    h.store.set_failure(FailPoint::KnowledgeInsert, true);

    let err = h
        .services
        .pipeline
        .ingest(h.tenant.id, h.owner, request())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Persistence(_)));

    h.store.set_failure(FailPoint::KnowledgeInsert, false);
    let count = TenantScopedAccessor::new(h.store.clone(), h.tenant.id)
        .count_knowledge(KnowledgeFilter::default())
        .await
        .unwrap();
    assert_eq!(count, 0);
    assert_eq!(audit_actions(&h, actions::KNOWLEDGE_INGESTED).await, 0);
}

#[tokio::test]
async fn test_embedding_attach_failure_keeps_item() {
    let h = harness(PlanTier::Starter).await;
    h.store.set_failure(FailPoint::EmbeddingUpdate, true);

    let item = h
        .services
        .pipeline
        .ingest(h.tenant.id, h.owner, request())
        .await
        .unwrap();
    assert!(item.embedding.is_none());
    assert!(item.summary.is_some());

    let events = TenantScopedAccessor::new(h.store.clone(), h.tenant.id)
        .find_audit_events(AuditFilter::action(actions::KNOWLEDGE_INGESTED))
        .await
        .unwrap();
    assert_eq!(events[0].detail["embedded"], false);
}

#[tokio::test]
async fn test_blank_content_rejected_before_enrichment() {
    let h = harness(PlanTier::Starter).await;
    let blank = IngestRequest::new(
        "Empty",
        vec![ContentMessage::new("ana", "   \n ")],
        SourceType::Manual,
    );
    let err = h
        .services
        .pipeline
        .ingest(h.tenant.id, h.owner, blank)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));

    let none = IngestRequest::new("Empty", Vec::new(), SourceType::Manual);
    assert!(matches!(
        h.services.pipeline.ingest(h.tenant.id, h.owner, none).await,
        Err(Error::InvalidInput(_))
    ));
    assert_eq!(h.provider.total_calls(), 0);
}

#[tokio::test]
async fn test_untitled_content_gets_derived_title() {
    let h = harness(PlanTier::Free).await;
    let untitled = IngestRequest::new(
        "  ",
        vec![
            ContentMessage::new("X", "\n"),
            ContentMessage::new("Y", "Cert renewal is manual\nsee wiki"),
        ],
        SourceType::Api,
    );
    let item = h
        .services
        .pipeline
        .ingest(h.tenant.id, h.owner, untitled)
        .await
        .unwrap();
    assert_eq!(item.title, "Cert renewal is manual");
    assert_eq!(item.content.len(), 2);
}

#[tokio::test]
async fn test_invalid_tag_rejected() {
    let h = harness(PlanTier::Starter).await;
    let err = h
        .services
        .pipeline
        .ingest(h.tenant.id, h.owner, request().with_tags(vec!["no way!".into()]))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));
}

#[tokio::test]
async fn test_tag_quota_requires_upgrade() {
    let h = harness(PlanTier::Free).await;
    let tags: Vec<String> = (0..21).map(|i| format!("tag-{}", i)).collect();
    let err = h
        .services
        .pipeline
        .ingest(h.tenant.id, h.owner, request().with_tags(tags))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::PlanUpgradeRequired {
            required: PlanTier::Starter,
            current: PlanTier::Free
        }
    ));
    assert_eq!(audit_actions(&h, actions::ACCESS_DENIED).await, 1);
}

#[tokio::test]
async fn test_auto_tagging_uses_channel_name() {
    let settings = TenantSettings {
        ai_summaries_enabled: true,
        auto_tagging: true,
    };
    let h = harness_with(NewTenant::new("Acme", "acme", PlanTier::Starter).with_settings(settings)).await;
    let metadata = SourceMetadata {
        channel_name: Some("Incidents".to_string()),
        ..Default::default()
    };
    let item = h
        .services
        .pipeline
        .ingest(h.tenant.id, h.owner, request().with_metadata(metadata))
        .await
        .unwrap();
    assert_eq!(item.tags, vec!["incidents".to_string()]);
}

#[tokio::test]
async fn test_reenrich_on_free_plan_never_calls_provider() {
    let h = harness(PlanTier::Free).await;
    let item = h
        .services
        .pipeline
        .ingest(h.tenant.id, h.owner, request())
        .await
        .unwrap();

    let err = h
        .services
        .pipeline
        .reenrich(h.tenant.id, h.owner, item.id)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::PlanUpgradeRequired {
            required: PlanTier::Starter,
            ..
        }
    ));
    assert_eq!(h.provider.total_calls(), 0);
    assert_eq!(audit_actions(&h, actions::ACCESS_DENIED).await, 1);
}

#[tokio::test]
async fn test_reenrich_replaces_fallbacks() {
    let h = harness(PlanTier::Starter).await;
    h.provider.set_all(MockBehavior::Fail);
    let item = h
        .services
        .pipeline
        .ingest(h.tenant.id, h.owner, request())
        .await
        .unwrap();
    assert_eq!(item.summary.as_deref(), Some(FALLBACK_SUMMARY));

    h.provider.set_all(MockBehavior::Succeed);
    let refreshed = h
        .services
        .pipeline
        .reenrich(h.tenant.id, h.owner, item.id)
        .await
        .unwrap();
    assert!(refreshed.summary.unwrap().starts_with("Summary of"));
    assert!(refreshed.embedding.is_some());
    assert_eq!(audit_actions(&h, actions::KNOWLEDGE_REENRICHED).await, 1);
}

struct StubCapture {
    thread: CapturedThread,
}

#[async_trait]
impl Integration for StubCapture {
    fn name(&self) -> &str {
        "stub"
    }
    async fn connect(&self) -> bool {
        true
    }
    async fn disconnect(&self) {}
    async fn test_connection(&self) -> Result<()> {
        Ok(())
    }
    fn is_connected(&self) -> bool {
        true
    }
}

#[async_trait]
impl CaptureAdapter for StubCapture {
    fn platform(&self) -> SourceType {
        SourceType::Slack
    }
    async fn capture_thread(&self, _thread_ref: &ThreadRef) -> Result<CapturedThread> {
        Ok(self.thread.clone())
    }
    async fn start_listening(&self) -> Result<()> {
        Ok(())
    }
    async fn stop_listening(&self) -> Result<()> {
        Ok(())
    }
    fn is_listening(&self) -> bool {
        false
    }
}

fn message(id: &str, author: &str, content: &str) -> ThreadMessage {
    ThreadMessage {
        id: id.to_string(),
        author: author.to_string(),
        content: content.to_string(),
        timestamp: Utc::now(),
        attachments: Vec::new(),
    }
}

#[tokio::test]
async fn test_capture_and_ingest() {
    let h = harness(PlanTier::Starter).await;
    let adapter = StubCapture {
        thread: CapturedThread {
            id: "1700000000.000100".to_string(),
            channel_id: "C1".to_string(),
            channel_name: Some("incidents".to_string()),
            root_author: "Alice".to_string(),
            messages: vec![
                message("1", "Alice", "DB failover at 02:00"),
                message("2", "Bob", "TODO: write postmortem"),
            ],
            captured_at: Utc::now(),
            platform: SourceType::Slack,
            platform_metadata: serde_json::json!({ "permalink": "https://acme.slack.com/p1" }),
        },
    };

    let item = h
        .services
        .pipeline
        .capture_and_ingest(
            h.tenant.id,
            h.owner,
            &adapter,
            &ThreadRef::new("C1", "1700000000.000100"),
            vec!["oncall".into()],
        )
        .await
        .unwrap();

    assert_eq!(item.title, "DB failover at 02:00");
    assert_eq!(item.source_type, SourceType::Slack);
    assert_eq!(item.source_metadata.channel_name.as_deref(), Some("incidents"));
    assert_eq!(
        item.source_metadata.permalink.as_deref(),
        Some("https://acme.slack.com/p1")
    );
    assert_eq!(item.content.len(), 2);
    assert_eq!(item.tags, vec!["oncall".to_string()]);
}

#[tokio::test]
async fn test_capture_for_missing_tenant_skips_adapter() {
    let h = harness(PlanTier::Starter).await;
    let adapter = StubCapture {
        thread: CapturedThread {
            id: "t".to_string(),
            channel_id: "C1".to_string(),
            channel_name: None,
            root_author: "Alice".to_string(),
            messages: vec![message("1", "Alice", "hello")],
            captured_at: Utc::now(),
            platform: SourceType::Slack,
            platform_metadata: serde_json::Value::Null,
        },
    };
    let err = h
        .services
        .pipeline
        .capture_and_ingest(Uuid::new_v4(), h.owner, &adapter, &ThreadRef::new("C1", "t"), Vec::new())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::TenantNotFound(_)));
}
