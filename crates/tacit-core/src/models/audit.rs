//! Append-only audit events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Severity {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "DEBUG" => Ok(Self::Debug),
            "INFO" => Ok(Self::Info),
            "WARN" | "WARNING" => Ok(Self::Warn),
            "ERROR" => Ok(Self::Error),
            _ => Err(format!("Invalid severity: {}", s)),
        }
    }
}

/// Action names recorded in the audit log.
pub mod actions {
    pub const KNOWLEDGE_INGESTED: &str = "knowledge.ingested";
    pub const KNOWLEDGE_REENRICHED: &str = "knowledge.reenriched";
    pub const KNOWLEDGE_UPDATED: &str = "knowledge.updated";
    pub const KNOWLEDGE_DELETED: &str = "knowledge.deleted";
    pub const KNOWLEDGE_EXPORTED: &str = "knowledge.exported";
    pub const KNOWLEDGE_EXPORT_FAILED: &str = "knowledge.export_failed";
    pub const ACCESS_DENIED: &str = "access.denied";
    pub const TENANT_CREATED: &str = "tenant.created";
    pub const TENANT_STATUS_CHANGED: &str = "tenant.status_changed";
    pub const TENANT_SETTINGS_CHANGED: &str = "tenant.settings_changed";
    pub const MEMBER_ADDED: &str = "membership.added";
    pub const MEMBER_ROLE_CHANGED: &str = "membership.role_changed";
    pub const MEMBER_REMOVED: &str = "membership.removed";
}

/// Entity type names recorded in the audit log.
pub mod entities {
    pub const KNOWLEDGE_ITEM: &str = "knowledge_item";
    pub const TENANT: &str = "tenant";
    pub const MEMBERSHIP: &str = "membership";
    pub const REQUEST: &str = "request";
}

/// One immutable audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: Uuid,
    /// `None` for system-wide events (e.g. unresolvable tenants).
    pub tenant_id: Option<Uuid>,
    pub actor_id: Option<Uuid>,
    pub action: String,
    pub entity_type: String,
    pub entity_id: Option<String>,
    pub detail: serde_json::Value,
    pub severity: Severity,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewAuditEvent {
    pub tenant_id: Option<Uuid>,
    pub actor_id: Option<Uuid>,
    pub action: String,
    pub entity_type: String,
    pub entity_id: Option<String>,
    pub detail: serde_json::Value,
    pub severity: Severity,
}

impl NewAuditEvent {
    /// An `INFO` event with no tenant, actor or detail.
    pub fn new(action: impl Into<String>, entity_type: impl Into<String>) -> Self {
        Self {
            tenant_id: None,
            actor_id: None,
            action: action.into(),
            entity_type: entity_type.into(),
            entity_id: None,
            detail: serde_json::Value::Object(Default::default()),
            severity: Severity::Info,
        }
    }

    pub fn tenant(mut self, tenant_id: Uuid) -> Self {
        self.tenant_id = Some(tenant_id);
        self
    }

    pub fn maybe_tenant(mut self, tenant_id: Option<Uuid>) -> Self {
        self.tenant_id = tenant_id;
        self
    }

    pub fn actor(mut self, actor_id: Uuid) -> Self {
        self.actor_id = Some(actor_id);
        self
    }

    pub fn maybe_actor(mut self, actor_id: Option<Uuid>) -> Self {
        self.actor_id = actor_id;
        self
    }

    pub fn entity(mut self, entity_id: impl ToString) -> Self {
        self.entity_id = Some(entity_id.to_string());
        self
    }

    pub fn detail(mut self, detail: serde_json::Value) -> Self {
        self.detail = detail;
        self
    }

    pub fn severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }
}

/// Filter for audit queries. `tenant_id` is overwritten by the accessor.
#[derive(Debug, Clone, Default)]
pub struct AuditFilter {
    pub tenant_id: Option<Uuid>,
    pub action: Option<String>,
    pub entity_id: Option<String>,
    pub min_severity: Option<Severity>,
    pub limit: Option<i64>,
}

impl AuditFilter {
    pub fn action(action: impl Into<String>) -> Self {
        Self {
            action: Some(action.into()),
            ..Default::default()
        }
    }

    pub fn matches(&self, e: &AuditEvent) -> bool {
        self.action.as_deref().map_or(true, |a| e.action == a)
            && self
                .entity_id
                .as_deref()
                .map_or(true, |id| e.entity_id.as_deref() == Some(id))
            && self.min_severity.map_or(true, |s| e.severity >= s)
    }
}
