//! PostgreSQL round trips for `PgStore`.
//!
//! **IMPORTANT**: These tests require a PostgreSQL database with the
//! `vector` extension available. They are ignored by default:
//! `DATABASE_URL=... cargo test -p tacit-db -- --ignored`

use std::sync::Arc;

use tacit_db::{
    ContentMessage, KnowledgeFilter, KnowledgeStatus, NewKnowledgeItem, NewTenant, Persistence,
    PgStore, PlanTier, SourceMetadata, SourceType, TagFilter, TenantRepository,
    TenantScopedAccessor, TenantStatus, Vector, DEFAULT_TEST_DATABASE_URL,
};
use uuid::Uuid;

async fn setup_store() -> PgStore {
    dotenvy::dotenv().ok();
    let database_url =
        std::env::var("DATABASE_URL").unwrap_or_else(|_| DEFAULT_TEST_DATABASE_URL.to_string());
    let store = PgStore::connect(&database_url)
        .await
        .expect("Failed to connect to test database");
    store.migrate().await.expect("Failed to run migrations");
    store
}

fn unique_slug(prefix: &str) -> String {
    format!("{}-{}", prefix, &Uuid::new_v4().simple().to_string()[..12])
}

#[tokio::test]
#[ignore]
async fn test_two_phase_write_round_trip() {
    let store = setup_store().await;
    let tenant = store
        .create_tenant(
            NewTenant::new("PG Tenant", unique_slug("pg"), PlanTier::Business),
            Uuid::new_v4(),
        )
        .await
        .expect("create tenant");

    let pg: Arc<dyn Persistence> = Arc::new(store.clone());
    let scoped = TenantScopedAccessor::new(pg, tenant.id);

    let item = scoped
        .create_knowledge(NewKnowledgeItem {
            title: "T".to_string(),
            content: vec![ContentMessage::new("X", "Y")],
            summary: Some("short".to_string()),
            action_items: Some(vec![]),
            source_type: SourceType::Api,
            source_metadata: SourceMetadata::default(),
            created_by: Uuid::new_v4(),
            status: KnowledgeStatus::Published,
            tags: vec!["ops".to_string(), "infra".to_string()],
        })
        .await
        .expect("insert");

    let fetched = scoped.get_knowledge(item.id).await.expect("fetch");
    assert!(fetched.embedding.is_none());
    assert_eq!(fetched.tags, vec!["infra".to_string(), "ops".to_string()]);

    scoped
        .attach_embedding(item.id, &Vector::from(vec![0.25, 0.5, 0.75]))
        .await
        .expect("attach embedding");
    let fetched = scoped.get_knowledge(item.id).await.expect("fetch");
    assert_eq!(
        fetched.embedding.map(|v| v.to_vec()),
        Some(vec![0.25, 0.5, 0.75])
    );

    let tags = scoped.find_tags(TagFilter::default()).await.expect("tags");
    assert_eq!(tags.len(), 2);
    assert!(tags.iter().all(|t| t.usage_count == 1));
}

#[tokio::test]
#[ignore]
async fn test_foreign_tenant_filter_is_overridden() {
    let store = setup_store().await;
    let a = store
        .create_tenant(
            NewTenant::new("A", unique_slug("a"), PlanTier::Starter),
            Uuid::new_v4(),
        )
        .await
        .unwrap();
    let b = store
        .create_tenant(
            NewTenant::new("B", unique_slug("b"), PlanTier::Starter),
            Uuid::new_v4(),
        )
        .await
        .unwrap();

    let pg: Arc<dyn Persistence> = Arc::new(store.clone());
    let b_item = TenantScopedAccessor::new(pg.clone(), b.id)
        .create_knowledge(NewKnowledgeItem {
            title: "secret".to_string(),
            content: vec![ContentMessage::new("X", "Y")],
            summary: None,
            action_items: None,
            source_type: SourceType::Manual,
            source_metadata: SourceMetadata::default(),
            created_by: Uuid::new_v4(),
            status: KnowledgeStatus::Published,
            tags: vec![],
        })
        .await
        .unwrap();

    let rows = TenantScopedAccessor::new(pg, a.id)
        .find_knowledge(KnowledgeFilter {
            tenant_id: Some(b.id),
            ids: Some(vec![b_item.id]),
            ..Default::default()
        })
        .await
        .unwrap();
    assert!(rows.is_empty());
}

#[tokio::test]
#[ignore]
async fn test_tenant_lookup_and_status() {
    let store = setup_store().await;
    let slug = unique_slug("lookup");
    let domain = format!("{}.example.com", slug);
    let tenant = store
        .create_tenant(
            NewTenant::new("Lookup", slug.clone(), PlanTier::Free).with_custom_domain(&domain),
            Uuid::new_v4(),
        )
        .await
        .unwrap();

    let by_slug = store.find_tenant_by_slug(&slug).await.unwrap().unwrap();
    assert_eq!(by_slug.id, tenant.id);
    let by_domain = store
        .find_tenant_by_domain(&domain.to_uppercase())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(by_domain.id, tenant.id);

    let suspended = store
        .set_tenant_status(tenant.id, TenantStatus::Suspended)
        .await
        .unwrap();
    assert_eq!(suspended.status, TenantStatus::Suspended);
}
