//! Route handlers.

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::{Extension, Json};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};
use uuid::Uuid;

use tacit_core::{
    ContentMessage, Error, ExportResult, KnowledgeItem, KnowledgeStatus, Role, SourceMetadata,
    SourceType, Tag, ThreadNotification, ThreadRef,
};
use tacit_ingest::IngestRequest;
use tacit_integrations::verify_slack_signature;

use crate::error::ApiError;
use crate::middleware::TenantContext;
use crate::AppState;

type ApiResult<T> = Result<T, ApiError>;

pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

#[derive(Debug, Deserialize)]
pub struct MessageBody {
    pub author: String,
    pub text: String,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct IngestBody {
    /// Derived from the first line of content when omitted.
    #[serde(default)]
    pub title: String,
    pub content: Vec<MessageBody>,
    #[serde(default)]
    pub source_type: Option<SourceType>,
    #[serde(default)]
    pub source_metadata: Option<SourceMetadata>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub status: Option<KnowledgeStatus>,
}

impl IngestBody {
    fn into_request(self) -> ApiResult<IngestRequest> {
        if self.status == Some(KnowledgeStatus::Deleted) {
            return Err(Error::InvalidInput("Cannot ingest a deleted item".to_string()).into());
        }
        let content = self
            .content
            .into_iter()
            .map(|m| ContentMessage {
                timestamp: m.timestamp.unwrap_or_else(Utc::now),
                ..ContentMessage::new(m.author, m.text)
            })
            .collect();
        Ok(IngestRequest::new(
            self.title,
            content,
            self.source_type.unwrap_or(SourceType::Api),
        )
        .with_metadata(self.source_metadata.unwrap_or_default())
        .with_tags(self.tags)
        .with_status(self.status.unwrap_or_default()))
    }
}

pub async fn ingest_knowledge(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Json(body): Json<IngestBody>,
) -> ApiResult<(StatusCode, Json<KnowledgeItem>)> {
    state
        .services
        .gate
        .authorize(&ctx.tenant, ctx.user_id, Role::Member)
        .await?;
    let item = state
        .services
        .pipeline
        .ingest(ctx.tenant.id, ctx.user_id, body.into_request()?)
        .await?;
    Ok((StatusCode::CREATED, Json(item)))
}

pub async fn get_knowledge(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<KnowledgeItem>> {
    state
        .services
        .gate
        .authorize(&ctx.tenant, ctx.user_id, Role::Viewer)
        .await?;
    Ok(Json(state.services.knowledge.view_item(ctx.tenant.id, id).await?))
}

pub async fn reenrich_knowledge(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<KnowledgeItem>> {
    state
        .services
        .gate
        .authorize(&ctx.tenant, ctx.user_id, Role::Moderator)
        .await?;
    let item = state
        .services
        .pipeline
        .reenrich(ctx.tenant.id, ctx.user_id, id)
        .await?;
    Ok(Json(item))
}

pub async fn export_knowledge(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Path((id, target)): Path<(Uuid, String)>,
) -> ApiResult<(StatusCode, Json<ExportResult>)> {
    state
        .services
        .gate
        .authorize(&ctx.tenant, ctx.user_id, Role::Admin)
        .await?;
    let adapter = state
        .adapters
        .export(&target)
        .ok_or_else(|| Error::NotFound(format!("Unknown export target: {}", target)))?;
    let result = state
        .services
        .export
        .export_item(ctx.tenant.id, ctx.user_id, id, adapter.as_ref())
        .await?;
    let status = if result.success {
        StatusCode::OK
    } else {
        StatusCode::BAD_GATEWAY
    };
    Ok((status, Json(result)))
}

#[derive(Debug, Deserialize)]
pub struct CaptureBody {
    /// `channel/thread`
    pub thread: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

pub async fn capture_thread(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Path(platform): Path<String>,
    Json(body): Json<CaptureBody>,
) -> ApiResult<(StatusCode, Json<KnowledgeItem>)> {
    state
        .services
        .gate
        .authorize(&ctx.tenant, ctx.user_id, Role::Member)
        .await?;
    let adapter = state
        .adapters
        .capture(&platform)
        .ok_or_else(|| Error::NotFound(format!("Unknown capture platform: {}", platform)))?;
    let thread_ref: ThreadRef = body.thread.parse().map_err(Error::InvalidInput)?;
    let item = state
        .services
        .pipeline
        .capture_and_ingest(ctx.tenant.id, ctx.user_id, adapter.as_ref(), &thread_ref, body.tags)
        .await?;
    Ok((StatusCode::CREATED, Json(item)))
}

#[derive(Debug, Deserialize)]
pub struct TagsQuery {
    pub prefix: Option<String>,
}

pub async fn list_tags(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Query(query): Query<TagsQuery>,
) -> ApiResult<Json<Vec<Tag>>> {
    state
        .services
        .gate
        .authorize(&ctx.tenant, ctx.user_id, Role::Viewer)
        .await?;
    Ok(Json(
        state
            .services
            .knowledge
            .list_tags(ctx.tenant.id, query.prefix)
            .await?,
    ))
}

/// Slack Events API callback.
///
/// Answers the URL verification handshake and turns threaded message events
/// into listener notifications.
pub async fn slack_events(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<Value>> {
    let secret = state
        .slack_signing_secret
        .as_deref()
        .ok_or_else(|| Error::NotFound("Slack webhook is not configured".to_string()))?;
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string()
    };
    verify_slack_signature(
        secret,
        &header("x-slack-request-timestamp"),
        &body,
        &header("x-slack-signature"),
    )
    .map_err(|e| {
        warn!(subsystem = "api", component = "slack_webhook", error = %e, "Rejected Slack callback");
        ApiError::Unauthorized("Invalid Slack signature".to_string())
    })?;

    let payload: Value = serde_json::from_slice(&body)
        .map_err(|e| Error::InvalidInput(format!("Invalid Slack payload: {}", e)))?;

    match payload["type"].as_str() {
        Some("url_verification") => Ok(Json(json!({ "challenge": payload["challenge"] }))),
        Some("event_callback") => {
            let event = &payload["event"];
            let thread = event["thread_ts"].as_str().or_else(|| event["ts"].as_str());
            if let (Some(channel), Some(thread), Some(tx)) =
                (event["channel"].as_str(), thread, state.notifications.as_ref())
            {
                let notification = ThreadNotification {
                    adapter: "slack".to_string(),
                    thread_ref: ThreadRef::new(channel, thread),
                    observed_at: Utc::now(),
                };
                if tx.try_send(notification).is_err() {
                    warn!(subsystem = "api", component = "slack_webhook", "Notification channel full; event dropped");
                }
            }
            Ok(Json(json!({ "ok": true })))
        }
        other => {
            debug!(subsystem = "api", component = "slack_webhook", kind = ?other, "Ignoring Slack callback");
            Ok(Json(json!({ "ok": true })))
        }
    }
}
