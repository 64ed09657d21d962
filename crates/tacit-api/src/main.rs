use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tacit_api::{router, AppConfig, AppState};
use tacit_core::defaults::LISTEN_CHANNEL_CAPACITY;
use tacit_core::{Persistence, ThreadNotification};
use tacit_db::{MemoryStore, PgStore};
use tacit_inference::{build_provider, InferenceConfig};
use tacit_ingest::Services;
use tacit_integrations::{AdapterRegistry, SlackConfig};

/// Install the global subscriber. The returned guard flushes the file writer
/// and must live as long as the process.
fn init_tracing(config: &AppConfig) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "tacit_api=debug,tacit_ingest=info,tower_http=info".into());
    let registry = tracing_subscriber::registry().with(env_filter);
    let json = config.log_format == "json";

    if let Some(path) = &config.log_file {
        let path = std::path::Path::new(path);
        let dir = path.parent().unwrap_or(std::path::Path::new("."));
        let file_name = path
            .file_name()
            .and_then(|f| f.to_str())
            .unwrap_or("tacit-api.log");
        let (writer, guard) =
            tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, file_name));
        if json {
            registry
                .with(tracing_subscriber::fmt::layer().json().with_writer(writer))
                .init();
        } else {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(writer)
                        .with_ansi(config.log_ansi.unwrap_or(false)),
                )
                .init();
        }
        Some(guard)
    } else {
        if json {
            registry.with(tracing_subscriber::fmt::layer().json()).init();
        } else {
            let mut layer = tracing_subscriber::fmt::layer();
            if let Some(ansi) = config.log_ansi {
                layer = layer.with_ansi(ansi);
            }
            registry.with(layer).init();
        }
        None
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = AppConfig::from_env()?;
    let _log_guard = init_tracing(&config);
    info!(
        log_format = %config.log_format,
        log_file = config.log_file.as_deref().unwrap_or("(stdout)"),
        "Logging initialized"
    );

    let store: Arc<dyn Persistence> = match &config.database_url {
        Some(url) => {
            info!("Connecting to database...");
            let store = PgStore::connect(url).await?;
            store.migrate().await?;
            let health = store.health();
            info!(pool_size = health.size, "Database ready");
            Arc::new(store)
        }
        None => {
            warn!("DATABASE_URL not set; using the in-memory store (data is lost on exit)");
            Arc::new(MemoryStore::new())
        }
    };

    let provider = match InferenceConfig::from_env().and_then(|c| build_provider(&c)) {
        Ok(provider) => Some(provider),
        Err(e) => {
            warn!(error = %e, "Enrichment provider unavailable; ingesting without AI enrichment");
            None
        }
    };

    let (tx, mut rx) = mpsc::channel::<ThreadNotification>(LISTEN_CHANNEL_CAPACITY);
    let adapters = Arc::new(AdapterRegistry::from_env(Some(tx.clone()))?);
    let connected = adapters.connect_all().await;
    info!(connected = ?connected, "Integrations connected");

    tokio::spawn(async move {
        while let Some(notification) = rx.recv().await {
            info!(
                subsystem = "api",
                adapter = %notification.adapter,
                thread_ref = %notification.thread_ref,
                "Thread activity observed"
            );
        }
    });

    let state = AppState {
        services: Services::new(store, provider, &config.ingest),
        adapters: Arc::clone(&adapters),
        slack_signing_secret: SlackConfig::from_env().and_then(|c| c.signing_secret),
        notifications: Some(tx),
    };

    info!(addr = %config.bind, base_domain = %config.ingest.base_domain, "Starting server");
    let listener = tokio::net::TcpListener::bind(config.bind).await?;
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
        })
        .await?;

    adapters.shutdown().await;
    Ok(())
}
