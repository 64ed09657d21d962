//! Tenants, plans and memberships.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Subscription level gating feature availability.
///
/// Variants are declared in ascending order so `Ord` follows the tier ladder.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlanTier {
    #[default]
    Free,
    Starter,
    Business,
    Enterprise,
}

impl PlanTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Free => "FREE",
            Self::Starter => "STARTER",
            Self::Business => "BUSINESS",
            Self::Enterprise => "ENTERPRISE",
        }
    }

    /// True when this tier is `min` or higher.
    pub fn at_least(&self, min: PlanTier) -> bool {
        *self >= min
    }
}

impl std::fmt::Display for PlanTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PlanTier {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "FREE" => Ok(Self::Free),
            "STARTER" => Ok(Self::Starter),
            "BUSINESS" => Ok(Self::Business),
            "ENTERPRISE" => Ok(Self::Enterprise),
            _ => Err(format!("Invalid plan tier: {}", s)),
        }
    }
}

/// Lifecycle status of a tenant. Tenants are never physically deleted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TenantStatus {
    Active,
    Suspended,
    #[default]
    Pending,
    Cancelled,
}

impl TenantStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Suspended => "SUSPENDED",
            Self::Pending => "PENDING",
            Self::Cancelled => "CANCELLED",
        }
    }

    /// Whether a transition from `self` to `next` is allowed.
    ///
    /// `CANCELLED` is terminal.
    pub fn can_transition_to(&self, next: TenantStatus) -> bool {
        !matches!(self, Self::Cancelled) || next == Self::Cancelled
    }
}

impl std::fmt::Display for TenantStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TenantStatus {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "ACTIVE" => Ok(Self::Active),
            "SUSPENDED" => Ok(Self::Suspended),
            "PENDING" => Ok(Self::Pending),
            "CANCELLED" => Ok(Self::Cancelled),
            _ => Err(format!("Invalid tenant status: {}", s)),
        }
    }
}

/// Quotas attached to a tenant's plan. `None` means unlimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanLimits {
    pub max_users: Option<i64>,
    pub max_items: Option<i64>,
    pub max_tags: Option<i64>,
}

impl PlanLimits {
    /// Default limits for a plan tier.
    pub fn for_tier(tier: PlanTier) -> Self {
        match tier {
            PlanTier::Free => Self {
                max_users: Some(5),
                max_items: Some(100),
                max_tags: Some(20),
            },
            PlanTier::Starter => Self {
                max_users: Some(25),
                max_items: Some(5_000),
                max_tags: Some(200),
            },
            PlanTier::Business => Self {
                max_users: Some(250),
                max_items: Some(100_000),
                max_tags: Some(2_000),
            },
            PlanTier::Enterprise => Self {
                max_users: None,
                max_items: None,
                max_tags: None,
            },
        }
    }
}

impl Default for PlanLimits {
    fn default() -> Self {
        Self::for_tier(PlanTier::Free)
    }
}

fn default_true() -> bool {
    true
}

/// Per-tenant feature toggles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantSettings {
    /// AI summaries, embeddings and action items on ingestion.
    #[serde(default = "default_true")]
    pub ai_summaries_enabled: bool,
    /// Derive tags from action-item assignees and channel names.
    #[serde(default)]
    pub auto_tagging: bool,
}

impl Default for TenantSettings {
    fn default() -> Self {
        Self {
            ai_summaries_enabled: true,
            auto_tagging: false,
        }
    }
}

/// An organization with isolated data and its own plan/quota.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tenant {
    pub id: Uuid,
    pub name: String,
    /// Subdomain label, unique across the deployment.
    pub slug: String,
    /// Fully qualified custom domain, if the tenant routes through one.
    pub custom_domain: Option<String>,
    pub plan: PlanTier,
    pub limits: PlanLimits,
    pub status: TenantStatus,
    pub settings: TenantSettings,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Tenant {
    pub fn is_active(&self) -> bool {
        self.status == TenantStatus::Active
    }

    /// Whether ingestion may call the enrichment provider for this tenant.
    pub fn ai_enrichment_available(&self) -> bool {
        self.plan.at_least(PlanTier::Starter) && self.settings.ai_summaries_enabled
    }
}

/// Request for creating a tenant together with its owner membership.
#[derive(Debug, Clone)]
pub struct NewTenant {
    pub name: String,
    pub slug: String,
    pub custom_domain: Option<String>,
    pub plan: PlanTier,
    pub status: TenantStatus,
    pub settings: TenantSettings,
}

impl NewTenant {
    /// Active tenant on the given plan with default settings.
    pub fn new(name: impl Into<String>, slug: impl Into<String>, plan: PlanTier) -> Self {
        Self {
            name: name.into(),
            slug: slug.into(),
            custom_domain: None,
            plan,
            status: TenantStatus::Active,
            settings: TenantSettings::default(),
        }
    }

    pub fn with_custom_domain(mut self, domain: impl Into<String>) -> Self {
        self.custom_domain = Some(domain.into().to_lowercase());
        self
    }

    pub fn with_settings(mut self, settings: TenantSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_status(mut self, status: TenantStatus) -> Self {
        self.status = status;
        self
    }
}

/// Validate a tenant slug: 2-63 chars, lowercase alphanumeric and hyphens,
/// no leading/trailing hyphen, and not a reserved subdomain.
pub fn validate_slug(slug: &str) -> std::result::Result<(), String> {
    if slug.len() < 2 || slug.len() > 63 {
        return Err("Slug must be between 2 and 63 characters".to_string());
    }
    if !slug
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        return Err("Slug may only contain lowercase letters, digits and hyphens".to_string());
    }
    if slug.starts_with('-') || slug.ends_with('-') {
        return Err("Slug cannot start or end with a hyphen".to_string());
    }
    if crate::defaults::RESERVED_SUBDOMAINS.contains(&slug) {
        return Err(format!("Slug '{}' is reserved", slug));
    }
    Ok(())
}

/// Role of a user inside one tenant.
///
/// Declared from least to most privileged so `Ord` is the privilege order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Viewer,
    Member,
    Moderator,
    Admin,
    Owner,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Viewer => "VIEWER",
            Self::Member => "MEMBER",
            Self::Moderator => "MODERATOR",
            Self::Admin => "ADMIN",
            Self::Owner => "OWNER",
        }
    }

    /// True when this role satisfies an operation requiring `min`.
    pub fn meets(&self, min: Role) -> bool {
        *self >= min
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "VIEWER" => Ok(Self::Viewer),
            "MEMBER" => Ok(Self::Member),
            "MODERATOR" => Ok(Self::Moderator),
            "ADMIN" => Ok(Self::Admin),
            "OWNER" => Ok(Self::Owner),
            _ => Err(format!("Invalid role: {}", s)),
        }
    }
}

/// Link between a cross-tenant user identity and one tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Membership {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub user_id: Uuid,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Payload for adding a member. The tenant comes from the scoped accessor.
#[derive(Debug, Clone)]
pub struct NewMembership {
    pub user_id: Uuid,
    pub role: Role,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_tier_ordering() {
        assert!(PlanTier::Enterprise.at_least(PlanTier::Business));
        assert!(PlanTier::Starter.at_least(PlanTier::Starter));
        assert!(!PlanTier::Free.at_least(PlanTier::Starter));
    }

    #[test]
    fn test_plan_tier_parse_round_trip() {
        for tier in [
            PlanTier::Free,
            PlanTier::Starter,
            PlanTier::Business,
            PlanTier::Enterprise,
        ] {
            assert_eq!(tier.as_str().parse::<PlanTier>().unwrap(), tier);
        }
        assert!("platinum".parse::<PlanTier>().is_err());
    }

    #[test]
    fn test_role_meets() {
        assert!(Role::Owner.meets(Role::Admin));
        assert!(Role::Member.meets(Role::Member));
        assert!(!Role::Viewer.meets(Role::Member));
        assert!(!Role::Moderator.meets(Role::Admin));
    }

    #[test]
    fn test_role_serde_uppercase() {
        let json = serde_json::to_string(&Role::Moderator).unwrap();
        assert_eq!(json, "\"MODERATOR\"");
        let parsed: Role = serde_json::from_str("\"VIEWER\"").unwrap();
        assert_eq!(parsed, Role::Viewer);
    }

    #[test]
    fn test_cancelled_is_terminal() {
        assert!(TenantStatus::Active.can_transition_to(TenantStatus::Suspended));
        assert!(TenantStatus::Suspended.can_transition_to(TenantStatus::Active));
        assert!(!TenantStatus::Cancelled.can_transition_to(TenantStatus::Active));
        assert!(TenantStatus::Cancelled.can_transition_to(TenantStatus::Cancelled));
    }

    #[test]
    fn test_plan_limits_enterprise_unlimited() {
        let limits = PlanLimits::for_tier(PlanTier::Enterprise);
        assert!(limits.max_items.is_none());
        assert_eq!(PlanLimits::for_tier(PlanTier::Free).max_items, Some(100));
    }

    #[test]
    fn test_settings_default_from_empty_json() {
        let settings: TenantSettings = serde_json::from_str("{}").unwrap();
        assert!(settings.ai_summaries_enabled);
        assert!(!settings.auto_tagging);
    }

    #[test]
    fn test_validate_slug() {
        assert!(validate_slug("acme").is_ok());
        assert!(validate_slug("acme-labs-2").is_ok());
        assert!(validate_slug("a").is_err());
        assert!(validate_slug("Acme").is_err());
        assert!(validate_slug("-acme").is_err());
        assert!(validate_slug("www").is_err());
        assert!(validate_slug("acme.io").is_err());
    }
}
