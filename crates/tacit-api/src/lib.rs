//! # tacit-api
//!
//! Thin HTTP surface over `tacit-ingest`: tenant middleware, ingest, capture
//! and export routes, and the Slack events webhook.

pub mod config;
pub mod error;
pub mod middleware;
pub mod routes;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tokio::sync::mpsc;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use tacit_core::ThreadNotification;
use tacit_ingest::Services;
use tacit_integrations::AdapterRegistry;

pub use config::AppConfig;
pub use error::ApiError;
pub use middleware::{tenant_middleware, TenantContext};

/// Conversation payloads are text; 10 MB is generous.
const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub services: Services,
    pub adapters: Arc<AdapterRegistry>,
    /// Slack signing secret; the webhook route is disabled without it.
    pub slack_signing_secret: Option<String>,
    /// Sink for thread activity reported by platform webhooks.
    pub notifications: Option<mpsc::Sender<ThreadNotification>>,
}

pub fn router(state: AppState) -> Router {
    let tenant_routes = Router::new()
        .route("/api/v1/knowledge", post(routes::ingest_knowledge))
        .route("/api/v1/knowledge/:id", get(routes::get_knowledge))
        .route(
            "/api/v1/knowledge/:id/reenrich",
            post(routes::reenrich_knowledge),
        )
        .route(
            "/api/v1/knowledge/:id/export/:target",
            post(routes::export_knowledge),
        )
        .route("/api/v1/capture/:platform", post(routes::capture_thread))
        .route("/api/v1/tags", get(routes::list_tags))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            tenant_middleware,
        ));

    Router::new()
        .route("/health", get(routes::health))
        .route("/api/v1/webhooks/slack", post(routes::slack_events))
        .merge(tenant_routes)
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(CatchPanicLayer::new())
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .with_state(state)
}
