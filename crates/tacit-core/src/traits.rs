//! Core traits for tacit abstractions.
//!
//! These traits define the interfaces that concrete implementations
//! must satisfy, enabling pluggable backends and testability.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::models::*;

// =============================================================================
// REPOSITORY TRAITS
// =============================================================================

/// Tenant records. Tenants are global, so this repository is not scoped.
#[async_trait]
pub trait TenantRepository: Send + Sync {
    /// Insert a tenant and its single OWNER membership in one transaction.
    async fn create_tenant(&self, req: NewTenant, owner_id: Uuid) -> Result<Tenant>;

    async fn get_tenant(&self, id: Uuid) -> Result<Option<Tenant>>;

    async fn find_tenant_by_slug(&self, slug: &str) -> Result<Option<Tenant>>;

    async fn find_tenant_by_domain(&self, domain: &str) -> Result<Option<Tenant>>;

    /// Persist a status change. Fails with `NotFound` for unknown ids.
    async fn set_tenant_status(&self, id: Uuid, status: TenantStatus) -> Result<Tenant>;

    async fn update_tenant_settings(&self, id: Uuid, settings: TenantSettings) -> Result<Tenant>;
}

/// Knowledge items. Reads and updates go through a tenant-carrying filter.
#[async_trait]
pub trait KnowledgeRepository: Send + Sync {
    /// Write the base record and its tags atomically. The embedding is never
    /// part of this write.
    async fn insert_knowledge(&self, tenant_id: Uuid, req: NewKnowledgeItem)
        -> Result<KnowledgeItem>;

    async fn find_knowledge(&self, filter: &KnowledgeFilter) -> Result<Vec<KnowledgeItem>>;

    async fn count_knowledge(&self, filter: &KnowledgeFilter) -> Result<i64>;

    /// Apply a patch to every matching row. Returns rows affected.
    async fn update_knowledge(&self, filter: &KnowledgeFilter, patch: &KnowledgePatch)
        -> Result<u64>;

    /// Second phase of the two-phase write: attach the vector column.
    async fn set_knowledge_embedding(
        &self,
        filter: &KnowledgeFilter,
        embedding: &crate::Vector,
    ) -> Result<u64>;

    async fn increment_knowledge_counter(
        &self,
        filter: &KnowledgeFilter,
        counter: KnowledgeCounter,
    ) -> Result<u64>;
}

/// Tenant-local tags. Tags are created as part of knowledge inserts.
#[async_trait]
pub trait TagRepository: Send + Sync {
    async fn find_tags(&self, filter: &TagFilter) -> Result<Vec<Tag>>;

    async fn count_tags(&self, filter: &TagFilter) -> Result<i64>;
}

#[async_trait]
pub trait MembershipRepository: Send + Sync {
    async fn insert_membership(&self, tenant_id: Uuid, req: NewMembership) -> Result<Membership>;

    async fn find_memberships(&self, filter: &MembershipFilter) -> Result<Vec<Membership>>;

    async fn count_memberships(&self, filter: &MembershipFilter) -> Result<i64>;

    async fn update_membership_role(&self, filter: &MembershipFilter, role: Role) -> Result<u64>;

    async fn delete_memberships(&self, filter: &MembershipFilter) -> Result<u64>;
}

/// Append-only audit log. There is no update or delete.
#[async_trait]
pub trait AuditRepository: Send + Sync {
    async fn insert_audit_event(&self, event: NewAuditEvent) -> Result<AuditEvent>;

    async fn find_audit_events(&self, filter: &AuditFilter) -> Result<Vec<AuditEvent>>;
}

/// Everything the core needs from a store.
pub trait Persistence:
    TenantRepository + KnowledgeRepository + TagRepository + MembershipRepository + AuditRepository
{
}

impl<T> Persistence for T where
    T: TenantRepository
        + KnowledgeRepository
        + TagRepository
        + MembershipRepository
        + AuditRepository
{
}

// =============================================================================
// INFERENCE TRAITS
// =============================================================================

/// Backend for generating embeddings.
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    /// Generate embeddings for the given texts.
    ///
    /// Returns a vector of embedding vectors, one per input text.
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<crate::Vector>>;

    /// Get the expected dimension of embedding vectors.
    fn dimension(&self) -> usize;

    /// Get the model name being used.
    fn model_name(&self) -> &str;
}

/// Backend for text generation (LLM).
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Generate text given a prompt.
    async fn generate(&self, prompt: &str) -> Result<String>;

    /// Generate text with system context.
    async fn generate_with_system(&self, system: &str, prompt: &str) -> Result<String>;

    /// Get the model name being used.
    fn model_name(&self) -> &str;
}

/// Combined inference backend supporting both embedding and generation.
#[async_trait]
pub trait InferenceBackend: EmbeddingBackend + GenerationBackend {
    /// Check if the backend is available and responding.
    async fn health_check(&self) -> Result<bool>;
}

/// The three enrichment capabilities used during ingestion.
///
/// Each call may fail independently; callers decide on fallbacks.
#[async_trait]
pub trait EnrichmentProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn summarize(&self, title: &str, text: &str) -> Result<String>;

    async fn embed(&self, text: &str) -> Result<crate::Vector>;

    async fn extract_action_items(&self, text: &str) -> Result<Vec<ActionItem>>;
}

// =============================================================================
// INTEGRATION TRAITS
// =============================================================================

/// Lifecycle shared by every integration adapter.
#[async_trait]
pub trait Integration: Send + Sync {
    /// Registry name, e.g. "slack" or "notion".
    fn name(&self) -> &str;

    /// Verify credentials and mark the adapter connected.
    async fn connect(&self) -> bool;

    async fn disconnect(&self);

    /// Probe the platform without changing connection state.
    async fn test_connection(&self) -> Result<()>;

    fn is_connected(&self) -> bool;
}

/// Pulls conversation threads out of a chat platform.
#[async_trait]
pub trait CaptureAdapter: Integration {
    fn platform(&self) -> SourceType;

    /// Fetch a whole thread, following pagination, normalized to plain text.
    async fn capture_thread(&self, thread_ref: &ThreadRef) -> Result<CapturedThread>;

    /// Start the live listener. Calling it again while running is a no-op.
    async fn start_listening(&self) -> Result<()>;

    async fn stop_listening(&self) -> Result<()>;

    fn is_listening(&self) -> bool;
}

/// Pushes a finished knowledge item into an external document store.
#[async_trait]
pub trait ExportAdapter: Integration {
    /// Create a page from the content. Never returns an error: failures are
    /// reported through `ExportResult::failed`.
    async fn export_knowledge(
        &self,
        title: &str,
        content: &[ContentMessage],
        tags: &[String],
    ) -> ExportResult;
}
