//! Per-request tenant and identity resolution.
//!
//! Identity comes from `X-Tacit-User` (authentication happens upstream). The
//! tenant comes from `X-Tacit-Tenant` when present, otherwise from `Host`.

use axum::extract::{Request, State};
use axum::http::header::HOST;
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;
use uuid::Uuid;

use tacit_core::{Error, Tenant};

use crate::error::ApiError;
use crate::AppState;

pub const USER_HEADER: &str = "x-tacit-user";
pub const TENANT_HEADER: &str = "x-tacit-tenant";

/// Resolved caller, available to handlers as a request extension.
#[derive(Debug, Clone)]
pub struct TenantContext {
    pub tenant: Tenant,
    pub user_id: Uuid,
}

fn header(headers: &HeaderMap, name: impl axum::http::header::AsHeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub async fn tenant_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let headers = request.headers();
    let user_id = header(headers, USER_HEADER)
        .ok_or_else(|| ApiError::Unauthorized("Missing X-Tacit-User header".to_string()))?
        .parse::<Uuid>()
        .map_err(|_| ApiError::Unauthorized("Invalid X-Tacit-User header".to_string()))?;
    let lookup = header(headers, TENANT_HEADER)
        .or_else(|| header(headers, HOST))
        .ok_or_else(|| Error::TenantNotFound("no host".to_string()))?;

    let tenant = state
        .services
        .gate
        .resolve_tenant(&lookup, Some(user_id))
        .await?;

    request
        .extensions_mut()
        .insert(TenantContext { tenant, user_id });
    Ok(next.run(request).await)
}
