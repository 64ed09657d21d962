//! Audit recorder.
//!
//! Recording never fails from the caller's point of view: a write that errors
//! or exceeds its timeout is logged at WARN and dropped.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use tacit_core::{NewAuditEvent, Persistence};
use tacit_db::TenantScopedAccessor;

#[derive(Clone)]
pub struct AuditRecorder {
    store: Arc<dyn Persistence>,
    timeout: Duration,
}

impl AuditRecorder {
    pub fn new(store: Arc<dyn Persistence>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    /// Append an event and wait for the write (bounded by the timeout).
    ///
    /// Tenant events go through a scoped accessor; system-wide events (no
    /// tenant) are written directly.
    pub async fn record(&self, event: NewAuditEvent) {
        let action = event.action.clone();
        let tenant_id = event.tenant_id;

        let write = async {
            match tenant_id {
                Some(id) => {
                    TenantScopedAccessor::new(Arc::clone(&self.store), id)
                        .record_audit(event)
                        .await
                }
                None => self.store.insert_audit_event(event).await,
            }
        };

        match tokio::time::timeout(self.timeout, write).await {
            Ok(Ok(stored)) => {
                debug!(
                    subsystem = "ingest",
                    component = "audit",
                    action = %stored.action,
                    severity = %stored.severity,
                    "Audit event recorded"
                );
            }
            Ok(Err(e)) => {
                warn!(
                    subsystem = "ingest",
                    component = "audit",
                    action = %action,
                    tenant_id = ?tenant_id,
                    error = %e,
                    "Audit write failed"
                );
            }
            Err(_) => {
                warn!(
                    subsystem = "ingest",
                    component = "audit",
                    action = %action,
                    tenant_id = ?tenant_id,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Audit write timed out"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tacit_core::{
        actions, entities, AuditFilter, NewTenant, PlanTier, Severity, TenantRepository,
    };
    use tacit_db::{FailPoint, MemoryStore};
    use uuid::Uuid;

    #[tokio::test]
    async fn test_record_scoped_event() {
        let store = Arc::new(MemoryStore::new());
        let tenant = store
            .create_tenant(NewTenant::new("Acme", "acme", PlanTier::Free), Uuid::new_v4())
            .await
            .unwrap();
        let recorder = AuditRecorder::new(store.clone(), Duration::from_secs(1));

        recorder
            .record(
                NewAuditEvent::new(actions::KNOWLEDGE_DELETED, entities::KNOWLEDGE_ITEM)
                    .tenant(tenant.id)
                    .detail(json!({"reason": "duplicate"})),
            )
            .await;

        let events = TenantScopedAccessor::new(store, tenant.id)
            .find_audit_events(AuditFilter::action(actions::KNOWLEDGE_DELETED))
            .await
            .unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].detail["reason"], "duplicate");
    }

    #[tokio::test]
    async fn test_system_event_without_tenant() {
        let store = Arc::new(MemoryStore::new());
        let recorder = AuditRecorder::new(store.clone(), Duration::from_secs(1));
        recorder
            .record(
                NewAuditEvent::new(actions::ACCESS_DENIED, entities::REQUEST)
                    .severity(Severity::Warn),
            )
            .await;
        let all = store.all_audit_events();
        assert_eq!(all.len(), 1);
        assert!(all[0].tenant_id.is_none());
    }

    #[tokio::test]
    async fn test_write_failure_is_swallowed() {
        let store = Arc::new(MemoryStore::new());
        store.set_failure(FailPoint::AuditInsert, true);
        let recorder = AuditRecorder::new(store.clone(), Duration::from_secs(1));
        recorder
            .record(NewAuditEvent::new(actions::ACCESS_DENIED, entities::REQUEST))
            .await;
        assert!(store.all_audit_events().is_empty());
    }
}
