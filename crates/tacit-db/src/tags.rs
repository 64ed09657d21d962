//! Tag repository implementation.

use async_trait::async_trait;
use sqlx::Row;

use tacit_core::{Result, ScopedFilter, Tag, TagFilter, TagRepository};

use crate::{escape_like, PgStore};

/// Lowercased names and an escaped prefix pattern, ready for binding.
fn filter_params(filter: &TagFilter) -> (Option<Vec<String>>, Option<String>) {
    let names = filter
        .names
        .as_ref()
        .map(|names| names.iter().map(|n| n.to_lowercase()).collect());
    let prefix = filter
        .prefix
        .as_ref()
        .map(|p| format!("{}%", escape_like(&p.to_lowercase())));
    (names, prefix)
}

#[async_trait]
impl TagRepository for PgStore {
    async fn find_tags(&self, filter: &TagFilter) -> Result<Vec<Tag>> {
        let tenant_id = filter.require_tenant()?;
        let (names, prefix) = filter_params(filter);

        let rows = sqlx::query(
            r#"
            SELECT t.tenant_id, t.name, t.created_at, COUNT(kt.item_id) AS usage_count
            FROM tag t
            LEFT JOIN knowledge_tag kt ON kt.tenant_id = t.tenant_id AND kt.tag_name = t.name
            WHERE t.tenant_id = $1
              AND ($2::text[] IS NULL OR t.name = ANY($2))
              AND ($3::text IS NULL OR t.name LIKE $3 ESCAPE '\')
            GROUP BY t.tenant_id, t.name, t.created_at
            ORDER BY t.name
            "#,
        )
        .bind(tenant_id)
        .bind(names)
        .bind(prefix)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(Tag {
                    tenant_id: row.try_get("tenant_id")?,
                    name: row.try_get("name")?,
                    usage_count: row.try_get("usage_count")?,
                    created_at: row.try_get("created_at")?,
                })
            })
            .collect()
    }

    async fn count_tags(&self, filter: &TagFilter) -> Result<i64> {
        let tenant_id = filter.require_tenant()?;
        let (names, prefix) = filter_params(filter);

        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM tag t
            WHERE t.tenant_id = $1
              AND ($2::text[] IS NULL OR t.name = ANY($2))
              AND ($3::text IS NULL OR t.name LIKE $3 ESCAPE '\')
            "#,
        )
        .bind(tenant_id)
        .bind(names)
        .bind(prefix)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_params_escape_prefix() {
        let filter = TagFilter {
            names: Some(vec!["Ops".to_string()]),
            prefix: Some("on_".to_string()),
            ..Default::default()
        };
        let (names, prefix) = filter_params(&filter);
        assert_eq!(names, Some(vec!["ops".to_string()]));
        assert_eq!(prefix.as_deref(), Some("on\\_%"));
    }
}
