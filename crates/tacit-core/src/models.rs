//! Core data models for tacit.
//!
//! These types are shared across all tacit crates and represent the core
//! domain entities.

pub mod audit;
pub mod knowledge;
pub mod tenant;
pub mod thread;

use uuid::Uuid;

use crate::error::{Error, Result};

pub use audit::{actions, entities, AuditEvent, AuditFilter, NewAuditEvent, Severity};
pub use knowledge::{
    normalize_tag, ActionItem, Attachment, ContentMessage, KnowledgeCounter, KnowledgeFilter,
    KnowledgeItem, KnowledgePatch, KnowledgeStatus, MembershipFilter, NewKnowledgeItem,
    SourceMetadata, SourceType, Tag, TagFilter,
};
pub use tenant::{
    validate_slug, Membership, NewMembership, NewTenant, PlanLimits, PlanTier, Role, Tenant,
    TenantSettings, TenantStatus,
};
pub use thread::{CapturedThread, ExportResult, ThreadMessage, ThreadNotification, ThreadRef};

/// A query filter over a tenant-owned entity.
///
/// Stores refuse to run a scoped query without a tenant, so an unscoped
/// filter can only fail, never leak.
pub trait ScopedFilter {
    fn tenant_id(&self) -> Option<Uuid>;

    /// Overwrite the tenant, whatever the caller put there.
    fn scope_to(&mut self, tenant_id: Uuid);

    fn require_tenant(&self) -> Result<Uuid> {
        self.tenant_id()
            .ok_or_else(|| Error::Internal("unscoped query on tenant-owned entity".to_string()))
    }
}

macro_rules! scoped_filter {
    ($($ty:ty),+) => {
        $(impl ScopedFilter for $ty {
            fn tenant_id(&self) -> Option<Uuid> {
                self.tenant_id
            }

            fn scope_to(&mut self, tenant_id: Uuid) {
                self.tenant_id = Some(tenant_id);
            }
        })+
    };
}

scoped_filter!(KnowledgeFilter, TagFilter, MembershipFilter, AuditFilter);

impl MembershipFilter {
    /// Mutations must name one user; a tenant-wide role change or delete is
    /// never intended.
    pub fn require_user(&self) -> Result<Uuid> {
        self.user_id
            .ok_or_else(|| Error::InvalidInput("membership mutation requires a user".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_to_overwrites_caller_tenant() {
        let other = Uuid::new_v4();
        let mine = Uuid::new_v4();
        let mut filter = KnowledgeFilter {
            tenant_id: Some(other),
            ..Default::default()
        };
        filter.scope_to(mine);
        assert_eq!(filter.require_tenant().unwrap(), mine);
    }

    #[test]
    fn test_unscoped_filter_rejected() {
        assert!(TagFilter::default().require_tenant().is_err());
    }

    #[test]
    fn test_membership_mutation_requires_user() {
        assert!(matches!(
            MembershipFilter::default().require_user(),
            Err(Error::InvalidInput(_))
        ));
        assert!(MembershipFilter::for_user(Uuid::nil()).require_user().is_ok());
    }
}
