//! # tacit-ingest
//!
//! Tenant-facing services for tacit:
//! - `TenantResolver` and `AccessGate`: host resolution, roles, plans, quotas
//! - `IngestPipeline`: validation, enrichment with fallbacks, atomic write
//! - `KnowledgeService` and `ExportService`: item lifecycle and export
//! - `TenantAdmin`: tenant status and membership changes
//! - `AuditRecorder`: best-effort audit trail
//!
//! All tenant data access goes through `tacit_db::TenantScopedAccessor`.

pub mod admin;
pub mod audit;
pub mod config;
pub mod export;
pub mod gate;
pub mod knowledge;
pub mod pipeline;
pub mod resolver;

use std::sync::Arc;

use tacit_core::{EnrichmentProvider, Persistence};

pub use admin::TenantAdmin;
pub use audit::AuditRecorder;
pub use config::IngestConfig;
pub use export::ExportService;
pub use gate::{AccessGate, Quota};
pub use knowledge::KnowledgeService;
pub use pipeline::{normalize_tags, IngestPipeline, IngestRequest};
pub use resolver::TenantResolver;

/// Every service wired to one store and one enrichment provider.
#[derive(Clone)]
pub struct Services {
    pub gate: AccessGate,
    pub audit: AuditRecorder,
    pub pipeline: IngestPipeline,
    pub knowledge: KnowledgeService,
    pub export: ExportService,
    pub admin: TenantAdmin,
}

impl Services {
    pub fn new(
        store: Arc<dyn Persistence>,
        provider: Option<Arc<dyn EnrichmentProvider>>,
        config: &IngestConfig,
    ) -> Self {
        let audit = AuditRecorder::new(Arc::clone(&store), config.audit_timeout);
        let resolver = TenantResolver::new(Arc::clone(&store), config);
        let gate = AccessGate::new(resolver, Arc::clone(&store), audit.clone());
        let pipeline = IngestPipeline::new(
            Arc::clone(&store),
            provider,
            gate.clone(),
            audit.clone(),
            config.enrich_timeout,
        );
        Self {
            knowledge: KnowledgeService::new(Arc::clone(&store), audit.clone()),
            export: ExportService::new(Arc::clone(&store), audit.clone()),
            admin: TenantAdmin::new(store, gate.clone(), audit.clone()),
            pipeline,
            gate,
            audit,
        }
    }
}
