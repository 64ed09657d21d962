//! Tenant repository implementation.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::Row;
use tracing::info;
use uuid::Uuid;

use tacit_core::{
    new_v7, validate_slug, Error, NewTenant, PlanLimits, Result, Role, Tenant, TenantRepository,
    TenantSettings, TenantStatus,
};

use crate::{map_unique_violation, parse_column, PgStore};

const TENANT_COLUMNS: &str = "id, name, slug, custom_domain, plan, max_users, max_items, \
                              max_tags, status, settings, created_at, updated_at";

fn tenant_from_row(row: &PgRow) -> Result<Tenant> {
    let plan: String = row.try_get("plan")?;
    let status: String = row.try_get("status")?;
    let settings: Json<TenantSettings> = row.try_get("settings")?;
    Ok(Tenant {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        slug: row.try_get("slug")?,
        custom_domain: row.try_get("custom_domain")?,
        plan: parse_column(&plan, "plan")?,
        limits: PlanLimits {
            max_users: row.try_get("max_users")?,
            max_items: row.try_get("max_items")?,
            max_tags: row.try_get("max_tags")?,
        },
        status: parse_column(&status, "status")?,
        settings: settings.0,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

impl PgStore {
    async fn fetch_tenant_where(&self, predicate: &str, value: &str) -> Result<Option<Tenant>> {
        let sql = format!("SELECT {} FROM tenant WHERE {}", TENANT_COLUMNS, predicate);
        let row = sqlx::query(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(tenant_from_row).transpose()
    }
}

#[async_trait]
impl TenantRepository for PgStore {
    async fn create_tenant(&self, req: NewTenant, owner_id: Uuid) -> Result<Tenant> {
        validate_slug(&req.slug).map_err(Error::InvalidInput)?;
        if req.name.trim().is_empty() {
            return Err(Error::InvalidInput("Tenant name cannot be empty".to_string()));
        }

        let now = Utc::now();
        let limits = PlanLimits::for_tier(req.plan);
        let tenant = Tenant {
            id: new_v7(),
            name: req.name.trim().to_string(),
            slug: req.slug,
            custom_domain: req.custom_domain.map(|d| d.to_lowercase()),
            plan: req.plan,
            limits,
            status: req.status,
            settings: req.settings,
            created_at: now,
            updated_at: now,
        };

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO tenant (id, name, slug, custom_domain, plan, max_users, max_items,
                                max_tags, status, settings, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $11)
            "#,
        )
        .bind(tenant.id)
        .bind(&tenant.name)
        .bind(&tenant.slug)
        .bind(&tenant.custom_domain)
        .bind(tenant.plan.as_str())
        .bind(limits.max_users)
        .bind(limits.max_items)
        .bind(limits.max_tags)
        .bind(tenant.status.as_str())
        .bind(Json(&tenant.settings))
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_unique_violation(e, "tenant slug or domain"))?;

        sqlx::query(
            r#"
            INSERT INTO membership (id, tenant_id, user_id, role, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $5)
            "#,
        )
        .bind(new_v7())
        .bind(tenant.id)
        .bind(owner_id)
        .bind(Role::Owner.as_str())
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        info!(
            subsystem = "db",
            component = "tenants",
            op = "create",
            tenant_id = %tenant.id,
            slug = %tenant.slug,
            plan = %tenant.plan,
            "Tenant created"
        );
        Ok(tenant)
    }

    async fn get_tenant(&self, id: Uuid) -> Result<Option<Tenant>> {
        let sql = format!("SELECT {} FROM tenant WHERE id = $1", TENANT_COLUMNS);
        let row = sqlx::query(&sql).bind(id).fetch_optional(&self.pool).await?;
        row.as_ref().map(tenant_from_row).transpose()
    }

    async fn find_tenant_by_slug(&self, slug: &str) -> Result<Option<Tenant>> {
        self.fetch_tenant_where("slug = lower($1)", slug).await
    }

    async fn find_tenant_by_domain(&self, domain: &str) -> Result<Option<Tenant>> {
        self.fetch_tenant_where("custom_domain = lower($1)", domain)
            .await
    }

    async fn set_tenant_status(&self, id: Uuid, status: TenantStatus) -> Result<Tenant> {
        let mut tx = self.pool.begin().await?;

        let current: Option<String> =
            sqlx::query_scalar("SELECT status FROM tenant WHERE id = $1 FOR UPDATE")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;
        let current: TenantStatus = match current {
            Some(s) => parse_column(&s, "status")?,
            None => return Err(Error::NotFound(format!("Tenant {} not found", id))),
        };
        if !current.can_transition_to(status) {
            return Err(Error::InvalidInput(format!(
                "Tenant status cannot change from {} to {}",
                current, status
            )));
        }

        let sql = format!(
            "UPDATE tenant SET status = $2, updated_at = $3 WHERE id = $1 RETURNING {}",
            TENANT_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(id)
            .bind(status.as_str())
            .bind(Utc::now())
            .fetch_one(&mut *tx)
            .await?;
        tx.commit().await?;

        tenant_from_row(&row)
    }

    async fn update_tenant_settings(&self, id: Uuid, settings: TenantSettings) -> Result<Tenant> {
        let sql = format!(
            "UPDATE tenant SET settings = $2, updated_at = $3 WHERE id = $1 RETURNING {}",
            TENANT_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(id)
            .bind(Json(&settings))
            .bind(Utc::now())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Tenant {} not found", id)))?;
        tenant_from_row(&row)
    }
}
