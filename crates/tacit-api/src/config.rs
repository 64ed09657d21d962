//! Server configuration read from the environment.

use std::net::SocketAddr;

use tacit_core::defaults::BIND_ADDR;
use tacit_core::{Error, Result};
use tacit_ingest::IngestConfig;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind: SocketAddr,
    /// `None` runs on the in-memory store.
    pub database_url: Option<String>,
    pub ingest: IngestConfig,
    pub log_format: String,
    pub log_file: Option<String>,
    pub log_ansi: Option<bool>,
}

impl AppConfig {
    /// Read configuration from environment variables.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `TACIT_BIND` | `0.0.0.0:3000` |
    /// | `DATABASE_URL` | unset (in-memory store) |
    /// | `LOG_FORMAT` | `text` (`json` for structured output) |
    /// | `LOG_FILE` | unset (stdout) |
    /// | `LOG_ANSI` | auto |
    ///
    /// Tenant resolution and enrichment knobs come from [`IngestConfig::from_env`].
    pub fn from_env() -> Result<Self> {
        let bind = std::env::var("TACIT_BIND").unwrap_or_else(|_| BIND_ADDR.to_string());
        let bind: SocketAddr = bind
            .parse()
            .map_err(|_| Error::Config(format!("TACIT_BIND is not a socket address: {}", bind)))?;

        Ok(Self {
            bind,
            database_url: std::env::var("DATABASE_URL")
                .ok()
                .filter(|url| !url.trim().is_empty()),
            ingest: IngestConfig::from_env(),
            log_format: std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string()),
            log_file: std::env::var("LOG_FILE").ok(),
            log_ansi: std::env::var("LOG_ANSI")
                .ok()
                .map(|v| v == "true" || v == "1"),
        })
    }
}
