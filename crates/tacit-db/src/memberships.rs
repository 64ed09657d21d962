//! Membership repository implementation.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::PgRow;
use sqlx::Row;
use uuid::Uuid;

use tacit_core::{
    new_v7, Membership, MembershipFilter, MembershipRepository, NewMembership, Result, Role,
    ScopedFilter,
};

use crate::{map_unique_violation, parse_column, PgStore};

fn membership_from_row(row: &PgRow) -> Result<Membership> {
    let role: String = row.try_get("role")?;
    Ok(Membership {
        id: row.try_get("id")?,
        tenant_id: row.try_get("tenant_id")?,
        user_id: row.try_get("user_id")?,
        role: parse_column(&role, "role")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[async_trait]
impl MembershipRepository for PgStore {
    async fn insert_membership(&self, tenant_id: Uuid, req: NewMembership) -> Result<Membership> {
        let now = Utc::now();
        let membership = Membership {
            id: new_v7(),
            tenant_id,
            user_id: req.user_id,
            role: req.role,
            created_at: now,
            updated_at: now,
        };

        sqlx::query(
            r#"
            INSERT INTO membership (id, tenant_id, user_id, role, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $5)
            "#,
        )
        .bind(membership.id)
        .bind(tenant_id)
        .bind(membership.user_id)
        .bind(membership.role.as_str())
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| map_unique_violation(e, "membership"))?;

        Ok(membership)
    }

    async fn find_memberships(&self, filter: &MembershipFilter) -> Result<Vec<Membership>> {
        let tenant_id = filter.require_tenant()?;
        let rows = sqlx::query(
            r#"
            SELECT id, tenant_id, user_id, role, created_at, updated_at
            FROM membership
            WHERE tenant_id = $1
              AND ($2::uuid IS NULL OR user_id = $2)
              AND ($3::text IS NULL OR role = $3)
            ORDER BY created_at, id
            "#,
        )
        .bind(tenant_id)
        .bind(filter.user_id)
        .bind(filter.role.map(|r| r.as_str()))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(membership_from_row).collect()
    }

    async fn count_memberships(&self, filter: &MembershipFilter) -> Result<i64> {
        let tenant_id = filter.require_tenant()?;
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM membership
            WHERE tenant_id = $1
              AND ($2::uuid IS NULL OR user_id = $2)
              AND ($3::text IS NULL OR role = $3)
            "#,
        )
        .bind(tenant_id)
        .bind(filter.user_id)
        .bind(filter.role.map(|r| r.as_str()))
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn update_membership_role(&self, filter: &MembershipFilter, role: Role) -> Result<u64> {
        let tenant_id = filter.require_tenant()?;
        let user_id = filter.require_user()?;
        let result = sqlx::query(
            "UPDATE membership SET role = $3, updated_at = $4 WHERE tenant_id = $1 AND user_id = $2",
        )
        .bind(tenant_id)
        .bind(user_id)
        .bind(role.as_str())
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|e| map_unique_violation(e, "tenant owner"))?;
        Ok(result.rows_affected())
    }

    async fn delete_memberships(&self, filter: &MembershipFilter) -> Result<u64> {
        let tenant_id = filter.require_tenant()?;
        let user_id = filter.require_user()?;
        let result = sqlx::query("DELETE FROM membership WHERE tenant_id = $1 AND user_id = $2")
            .bind(tenant_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
