//! Knowledge items, tags and their request/filter types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::Vector;

/// Where a knowledge item came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SourceType {
    Slack,
    Teams,
    Manual,
    Api,
    Import,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Slack => "SLACK",
            Self::Teams => "TEAMS",
            Self::Manual => "MANUAL",
            Self::Api => "API",
            Self::Import => "IMPORT",
        }
    }
}

impl std::fmt::Display for SourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SourceType {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "SLACK" => Ok(Self::Slack),
            "TEAMS" => Ok(Self::Teams),
            "MANUAL" => Ok(Self::Manual),
            "API" => Ok(Self::Api),
            "IMPORT" => Ok(Self::Import),
            _ => Err(format!("Invalid source type: {}", s)),
        }
    }
}

/// Publication state of a knowledge item. `Deleted` is a soft delete.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum KnowledgeStatus {
    Draft,
    #[default]
    Published,
    Archived,
    Deleted,
}

impl KnowledgeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "DRAFT",
            Self::Published => "PUBLISHED",
            Self::Archived => "ARCHIVED",
            Self::Deleted => "DELETED",
        }
    }
}

impl std::fmt::Display for KnowledgeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for KnowledgeStatus {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "DRAFT" => Ok(Self::Draft),
            "PUBLISHED" => Ok(Self::Published),
            "ARCHIVED" => Ok(Self::Archived),
            "DELETED" => Ok(Self::Deleted),
            _ => Err(format!("Invalid knowledge status: {}", s)),
        }
    }
}

/// Generic attachment reference carried through from a chat platform.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<i64>,
}

/// One message of archived conversation content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentMessage {
    pub author: String,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

impl ContentMessage {
    pub fn new(author: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            author: author.into(),
            text: text.into(),
            timestamp: Utc::now(),
            attachments: Vec::new(),
        }
    }
}

/// Platform coordinates of the captured conversation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permalink: Option<String>,
}

/// A follow-up extracted from a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionItem {
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<String>,
}

/// The persisted, enriched record of one archived conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeItem {
    pub id: Uuid,
    /// Owning tenant (exclusive).
    pub tenant_id: Uuid,
    pub title: String,
    pub content: Vec<ContentMessage>,
    pub summary: Option<String>,
    /// Attached in a separate write after the base record exists.
    #[serde(skip)]
    pub embedding: Option<Vector>,
    pub action_items: Option<Vec<ActionItem>>,
    pub source_type: SourceType,
    pub source_metadata: SourceMetadata,
    pub created_by: Uuid,
    pub status: KnowledgeStatus,
    pub view_count: i64,
    pub search_count: i64,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl KnowledgeItem {
    pub fn has_embedding(&self) -> bool {
        self.embedding.is_some()
    }
}

/// Base record written by the pipeline. Never carries the embedding.
#[derive(Debug, Clone)]
pub struct NewKnowledgeItem {
    pub title: String,
    pub content: Vec<ContentMessage>,
    pub summary: Option<String>,
    pub action_items: Option<Vec<ActionItem>>,
    pub source_type: SourceType,
    pub source_metadata: SourceMetadata,
    pub created_by: Uuid,
    pub status: KnowledgeStatus,
    pub tags: Vec<String>,
}

/// Partial update for a knowledge item. Only `Some` fields are written.
#[derive(Debug, Clone, Default)]
pub struct KnowledgePatch {
    pub title: Option<String>,
    pub status: Option<KnowledgeStatus>,
    pub summary: Option<String>,
    pub action_items: Option<Vec<ActionItem>>,
}

impl KnowledgePatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.status.is_none()
            && self.summary.is_none()
            && self.action_items.is_none()
    }
}

/// Counter bumped by read paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KnowledgeCounter {
    View,
    Search,
}

/// Filter for knowledge item queries.
///
/// `tenant_id` is always overwritten by the tenant-scoped accessor.
/// Repositories reject filters without a tenant.
#[derive(Debug, Clone, Default)]
pub struct KnowledgeFilter {
    pub tenant_id: Option<Uuid>,
    pub ids: Option<Vec<Uuid>>,
    pub status: Option<KnowledgeStatus>,
    pub source_type: Option<SourceType>,
    pub created_by: Option<Uuid>,
    pub tag: Option<String>,
    /// Include soft-deleted items when no explicit status is given.
    pub include_deleted: bool,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl KnowledgeFilter {
    pub fn by_id(id: Uuid) -> Self {
        Self {
            ids: Some(vec![id]),
            include_deleted: true,
            ..Default::default()
        }
    }

    /// Effective page size, clamped to the configured maximum.
    pub fn effective_limit(&self) -> i64 {
        self.limit
            .unwrap_or(crate::defaults::PAGE_LIMIT)
            .clamp(0, crate::defaults::PAGE_LIMIT_MAX)
    }

    /// Whether an item passes every non-tenant predicate of this filter.
    pub fn matches(&self, item: &KnowledgeItem) -> bool {
        if let Some(ids) = &self.ids {
            if !ids.contains(&item.id) {
                return false;
            }
        }
        match self.status {
            Some(status) if item.status != status => return false,
            None if !self.include_deleted && item.status == KnowledgeStatus::Deleted => {
                return false
            }
            _ => {}
        }
        if let Some(source) = self.source_type {
            if item.source_type != source {
                return false;
            }
        }
        if let Some(creator) = self.created_by {
            if item.created_by != creator {
                return false;
            }
        }
        if let Some(tag) = &self.tag {
            if !item.tags.iter().any(|t| t.eq_ignore_ascii_case(tag)) {
                return false;
            }
        }
        true
    }
}

/// A tenant-local label attached to knowledge items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub tenant_id: Uuid,
    pub name: String,
    pub usage_count: i64,
    pub created_at: DateTime<Utc>,
}

/// Filter for tag queries. `tenant_id` is overwritten by the accessor.
#[derive(Debug, Clone, Default)]
pub struct TagFilter {
    pub tenant_id: Option<Uuid>,
    pub names: Option<Vec<String>>,
    pub prefix: Option<String>,
}

impl TagFilter {
    pub fn matches(&self, tag: &Tag) -> bool {
        if let Some(names) = &self.names {
            if !names.iter().any(|n| n.eq_ignore_ascii_case(&tag.name)) {
                return false;
            }
        }
        if let Some(prefix) = &self.prefix {
            if !tag.name.starts_with(&prefix.to_lowercase()) {
                return false;
            }
        }
        true
    }
}

/// Normalize a tag name: trim, lowercase, internal whitespace to hyphens.
///
/// Returns an error message if the result is empty, too long or contains
/// characters other than alphanumerics, `-`, `_` and `/`.
pub fn normalize_tag(raw: &str) -> std::result::Result<String, String> {
    let name = raw
        .trim()
        .trim_start_matches('#')
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
        .to_lowercase();

    if name.is_empty() {
        return Err("Tag name cannot be empty".to_string());
    }
    if name.chars().count() > crate::defaults::TAG_MAX_LEN {
        return Err(format!(
            "Tag name must be {} characters or less",
            crate::defaults::TAG_MAX_LEN
        ));
    }
    if let Some(bad) = name
        .chars()
        .find(|c| !c.is_alphanumeric() && *c != '-' && *c != '_' && *c != '/')
    {
        return Err(format!("Tag contains invalid character '{}'", bad));
    }
    Ok(name)
}

/// Filter for membership queries. `tenant_id` is overwritten by the accessor.
#[derive(Debug, Clone, Default)]
pub struct MembershipFilter {
    pub tenant_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    pub role: Option<crate::Role>,
}

impl MembershipFilter {
    pub fn for_user(user_id: Uuid) -> Self {
        Self {
            user_id: Some(user_id),
            ..Default::default()
        }
    }

    pub fn matches(&self, m: &crate::Membership) -> bool {
        self.user_id.map_or(true, |u| m.user_id == u) && self.role.map_or(true, |r| m.role == r)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(status: KnowledgeStatus, tags: &[&str]) -> KnowledgeItem {
        KnowledgeItem {
            id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            title: "Deploy freeze".to_string(),
            content: vec![ContentMessage::new("ana", "freeze starts friday")],
            summary: None,
            embedding: None,
            action_items: None,
            source_type: SourceType::Slack,
            source_metadata: SourceMetadata::default(),
            created_by: Uuid::new_v4(),
            status,
            view_count: 0,
            search_count: 0,
            tags: tags.iter().map(|t| t.to_string()).collect(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_filter_hides_deleted_by_default() {
        let filter = KnowledgeFilter::default();
        assert!(filter.matches(&item(KnowledgeStatus::Published, &[])));
        assert!(!filter.matches(&item(KnowledgeStatus::Deleted, &[])));

        let by_id = KnowledgeFilter::by_id(Uuid::nil());
        assert!(by_id.include_deleted);
    }

    #[test]
    fn test_filter_explicit_status_wins() {
        let filter = KnowledgeFilter {
            status: Some(KnowledgeStatus::Deleted),
            ..Default::default()
        };
        assert!(filter.matches(&item(KnowledgeStatus::Deleted, &[])));
        assert!(!filter.matches(&item(KnowledgeStatus::Draft, &[])));
    }

    #[test]
    fn test_filter_tag_case_insensitive() {
        let filter = KnowledgeFilter {
            tag: Some("Incident".to_string()),
            ..Default::default()
        };
        assert!(filter.matches(&item(KnowledgeStatus::Published, &["incident"])));
        assert!(!filter.matches(&item(KnowledgeStatus::Published, &["release"])));
    }

    #[test]
    fn test_effective_limit_clamped() {
        let filter = KnowledgeFilter {
            limit: Some(10_000),
            ..Default::default()
        };
        assert_eq!(filter.effective_limit(), crate::defaults::PAGE_LIMIT_MAX);
        assert_eq!(
            KnowledgeFilter::default().effective_limit(),
            crate::defaults::PAGE_LIMIT
        );
    }

    #[test]
    fn test_normalize_tag() {
        assert_eq!(normalize_tag("  #On Call ").unwrap(), "on-call");
        assert_eq!(normalize_tag("infra/k8s").unwrap(), "infra/k8s");
        assert!(normalize_tag("   ").is_err());
        assert!(normalize_tag("drop;table").is_err());
        assert!(normalize_tag(&"x".repeat(65)).is_err());
    }

    #[test]
    fn test_source_type_parse() {
        assert_eq!("slack".parse::<SourceType>().unwrap(), SourceType::Slack);
        assert!("email".parse::<SourceType>().is_err());
    }

    #[test]
    fn test_embedding_not_serialized() {
        let mut it = item(KnowledgeStatus::Published, &[]);
        it.embedding = Some(Vector::from(vec![0.1, 0.2]));
        let json = serde_json::to_value(&it).unwrap();
        assert!(json.get("embedding").is_none());
    }
}
