//! Knowledge item repository implementation.
//!
//! Every statement shares one predicate whose first parameter is the tenant
//! id taken from the filter; a filter without a tenant is rejected before
//! any SQL runs.

use async_trait::async_trait;
use chrono::Utc;
use pgvector::Vector;
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::query::Query;
use sqlx::types::Json;
use sqlx::{Postgres, Row};
use tracing::debug;
use uuid::Uuid;

use tacit_core::{
    new_v7, ActionItem, ContentMessage, KnowledgeCounter, KnowledgeFilter, KnowledgeItem,
    KnowledgePatch, KnowledgeRepository, NewKnowledgeItem, Result, ScopedFilter, SourceMetadata,
};

use crate::{parse_column, PgStore};

const ITEM_COLUMNS: &str = r#"
    k.id, k.tenant_id, k.title, k.content, k.summary, k.embedding, k.action_items,
    k.source_type, k.source_metadata, k.created_by, k.status, k.view_count,
    k.search_count, k.created_at, k.updated_at,
    ARRAY(SELECT kt.tag_name FROM knowledge_tag kt
          WHERE kt.item_id = k.id ORDER BY kt.tag_name) AS tags
"#;

/// Parameters $1..$7.
const ITEM_PREDICATE: &str = r#"
    k.tenant_id = $1
    AND ($2::uuid[] IS NULL OR k.id = ANY($2))
    AND ($3::text IS NULL OR k.status = $3)
    AND ($3::text IS NOT NULL OR $4::bool OR k.status <> 'DELETED')
    AND ($5::text IS NULL OR k.source_type = $5)
    AND ($6::uuid IS NULL OR k.created_by = $6)
    AND ($7::text IS NULL OR EXISTS (
        SELECT 1 FROM knowledge_tag kt WHERE kt.item_id = k.id AND kt.tag_name = lower($7)
    ))
"#;

fn bind_filter<'q>(
    query: Query<'q, Postgres, PgArguments>,
    tenant_id: Uuid,
    filter: &KnowledgeFilter,
) -> Query<'q, Postgres, PgArguments> {
    query
        .bind(tenant_id)
        .bind(filter.ids.clone())
        .bind(filter.status.map(|s| s.as_str()))
        .bind(filter.include_deleted)
        .bind(filter.source_type.map(|s| s.as_str()))
        .bind(filter.created_by)
        .bind(filter.tag.clone())
}

fn item_from_row(row: &PgRow) -> Result<KnowledgeItem> {
    let content: Json<Vec<ContentMessage>> = row.try_get("content")?;
    let action_items: Option<Json<Vec<ActionItem>>> = row.try_get("action_items")?;
    let source_metadata: Json<SourceMetadata> = row.try_get("source_metadata")?;
    let source_type: String = row.try_get("source_type")?;
    let status: String = row.try_get("status")?;
    Ok(KnowledgeItem {
        id: row.try_get("id")?,
        tenant_id: row.try_get("tenant_id")?,
        title: row.try_get("title")?,
        content: content.0,
        summary: row.try_get("summary")?,
        embedding: row.try_get::<Option<Vector>, _>("embedding")?,
        action_items: action_items.map(|j| j.0),
        source_type: parse_column(&source_type, "source_type")?,
        source_metadata: source_metadata.0,
        created_by: row.try_get("created_by")?,
        status: parse_column(&status, "status")?,
        view_count: row.try_get("view_count")?,
        search_count: row.try_get("search_count")?,
        tags: row.try_get("tags")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[async_trait]
impl KnowledgeRepository for PgStore {
    async fn insert_knowledge(
        &self,
        tenant_id: Uuid,
        req: NewKnowledgeItem,
    ) -> Result<KnowledgeItem> {
        let now = Utc::now();
        let id = new_v7();
        let mut tags = req.tags;
        tags.sort();
        tags.dedup();

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO knowledge_item (id, tenant_id, title, content, summary, action_items,
                                        source_type, source_metadata, created_by, status,
                                        created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $11)
            "#,
        )
        .bind(id)
        .bind(tenant_id)
        .bind(&req.title)
        .bind(Json(&req.content))
        .bind(&req.summary)
        .bind(req.action_items.as_ref().map(Json))
        .bind(req.source_type.as_str())
        .bind(Json(&req.source_metadata))
        .bind(req.created_by)
        .bind(req.status.as_str())
        .bind(now)
        .execute(&mut *tx)
        .await?;

        for tag in &tags {
            sqlx::query(
                "INSERT INTO tag (tenant_id, name, created_at) VALUES ($1, $2, $3) \
                 ON CONFLICT DO NOTHING",
            )
            .bind(tenant_id)
            .bind(tag)
            .bind(now)
            .execute(&mut *tx)
            .await?;

            sqlx::query(
                "INSERT INTO knowledge_tag (tenant_id, item_id, tag_name) VALUES ($1, $2, $3) \
                 ON CONFLICT DO NOTHING",
            )
            .bind(tenant_id)
            .bind(id)
            .bind(tag)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        debug!(
            subsystem = "db",
            component = "knowledge",
            op = "insert",
            tenant_id = %tenant_id,
            item_id = %id,
            tag_count = tags.len(),
            "Knowledge item inserted"
        );

        Ok(KnowledgeItem {
            id,
            tenant_id,
            title: req.title,
            content: req.content,
            summary: req.summary,
            embedding: None,
            action_items: req.action_items,
            source_type: req.source_type,
            source_metadata: req.source_metadata,
            created_by: req.created_by,
            status: req.status,
            view_count: 0,
            search_count: 0,
            tags,
            created_at: now,
            updated_at: now,
        })
    }

    async fn find_knowledge(&self, filter: &KnowledgeFilter) -> Result<Vec<KnowledgeItem>> {
        let tenant_id = filter.require_tenant()?;
        let sql = format!(
            "SELECT {} FROM knowledge_item k WHERE {} \
             ORDER BY k.created_at DESC, k.id DESC LIMIT $8 OFFSET $9",
            ITEM_COLUMNS, ITEM_PREDICATE
        );
        let rows = bind_filter(sqlx::query(&sql), tenant_id, filter)
            .bind(filter.effective_limit())
            .bind(filter.offset.unwrap_or(0).max(0))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(item_from_row).collect()
    }

    async fn count_knowledge(&self, filter: &KnowledgeFilter) -> Result<i64> {
        let tenant_id = filter.require_tenant()?;
        let sql = format!(
            "SELECT COUNT(*) FROM knowledge_item k WHERE {}",
            ITEM_PREDICATE
        );
        let row = bind_filter(sqlx::query(&sql), tenant_id, filter)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get(0)?)
    }

    async fn update_knowledge(
        &self,
        filter: &KnowledgeFilter,
        patch: &KnowledgePatch,
    ) -> Result<u64> {
        let tenant_id = filter.require_tenant()?;
        if patch.is_empty() {
            return Ok(0);
        }
        let sql = format!(
            r#"
            UPDATE knowledge_item k SET
                title = COALESCE($8::text, title),
                status = COALESCE($9::text, status),
                summary = COALESCE($10::text, summary),
                action_items = COALESCE($11::jsonb, action_items),
                updated_at = $12
            WHERE {}
            "#,
            ITEM_PREDICATE
        );
        let result = bind_filter(sqlx::query(&sql), tenant_id, filter)
            .bind(patch.title.clone())
            .bind(patch.status.map(|s| s.as_str()))
            .bind(patch.summary.clone())
            .bind(patch.action_items.as_ref().map(Json))
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn set_knowledge_embedding(
        &self,
        filter: &KnowledgeFilter,
        embedding: &Vector,
    ) -> Result<u64> {
        let tenant_id = filter.require_tenant()?;
        let sql = format!(
            "UPDATE knowledge_item k SET embedding = $8, updated_at = $9 WHERE {}",
            ITEM_PREDICATE
        );
        let result = bind_filter(sqlx::query(&sql), tenant_id, filter)
            .bind(embedding.clone())
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn increment_knowledge_counter(
        &self,
        filter: &KnowledgeFilter,
        counter: KnowledgeCounter,
    ) -> Result<u64> {
        let tenant_id = filter.require_tenant()?;
        let column = match counter {
            KnowledgeCounter::View => "view_count",
            KnowledgeCounter::Search => "search_count",
        };
        let sql = format!(
            "UPDATE knowledge_item k SET {col} = {col} + 1 WHERE {pred}",
            col = column,
            pred = ITEM_PREDICATE
        );
        let result = bind_filter(sqlx::query(&sql), tenant_id, filter)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
