//! Append-only audit event storage.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::types::Json;
use sqlx::Row;

use tacit_core::{
    new_v7, AuditEvent, AuditFilter, AuditRepository, NewAuditEvent, Result, ScopedFilter,
    Severity,
};

use crate::{parse_column, PgStore};

/// Severity names at or above `min`, for an `= ANY` predicate.
fn severities_at_or_above(min: Severity) -> Vec<String> {
    [
        Severity::Debug,
        Severity::Info,
        Severity::Warn,
        Severity::Error,
    ]
    .into_iter()
    .filter(|s| *s >= min)
    .map(|s| s.as_str().to_string())
    .collect()
}

#[async_trait]
impl AuditRepository for PgStore {
    async fn insert_audit_event(&self, event: NewAuditEvent) -> Result<AuditEvent> {
        let stored = AuditEvent {
            id: new_v7(),
            tenant_id: event.tenant_id,
            actor_id: event.actor_id,
            action: event.action,
            entity_type: event.entity_type,
            entity_id: event.entity_id,
            detail: event.detail,
            severity: event.severity,
            created_at: Utc::now(),
        };

        sqlx::query(
            r#"
            INSERT INTO audit_event (id, tenant_id, actor_id, action, entity_type, entity_id,
                                     detail, severity, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(stored.id)
        .bind(stored.tenant_id)
        .bind(stored.actor_id)
        .bind(&stored.action)
        .bind(&stored.entity_type)
        .bind(&stored.entity_id)
        .bind(Json(&stored.detail))
        .bind(stored.severity.as_str())
        .bind(stored.created_at)
        .execute(&self.pool)
        .await?;

        Ok(stored)
    }

    async fn find_audit_events(&self, filter: &AuditFilter) -> Result<Vec<AuditEvent>> {
        let tenant_id = filter.require_tenant()?;
        let rows = sqlx::query(
            r#"
            SELECT id, tenant_id, actor_id, action, entity_type, entity_id, detail,
                   severity, created_at
            FROM audit_event
            WHERE tenant_id = $1
              AND ($2::text IS NULL OR action = $2)
              AND ($3::text IS NULL OR entity_id = $3)
              AND ($4::text[] IS NULL OR severity = ANY($4))
            ORDER BY created_at DESC, id DESC
            LIMIT $5
            "#,
        )
        .bind(tenant_id)
        .bind(filter.action.clone())
        .bind(filter.entity_id.clone())
        .bind(filter.min_severity.map(severities_at_or_above))
        .bind(
            filter
                .limit
                .unwrap_or(tacit_core::defaults::PAGE_LIMIT)
                .clamp(0, tacit_core::defaults::PAGE_LIMIT_MAX),
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let severity: String = row.try_get("severity")?;
                let detail: Json<serde_json::Value> = row.try_get("detail")?;
                Ok(AuditEvent {
                    id: row.try_get("id")?,
                    tenant_id: row.try_get("tenant_id")?,
                    actor_id: row.try_get("actor_id")?,
                    action: row.try_get("action")?,
                    entity_type: row.try_get("entity_type")?,
                    entity_id: row.try_get("entity_id")?,
                    detail: detail.0,
                    severity: parse_column(&severity, "severity")?,
                    created_at: row.try_get("created_at")?,
                })
            })
            .collect()
    }
}
