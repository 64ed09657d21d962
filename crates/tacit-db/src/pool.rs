//! Postgres pool construction and health reporting.

use std::time::{Duration, Instant};

use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::{debug, info, warn};

use tacit_core::{Error, Result};

pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;
pub const DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 600;

const ENV_MAX_CONNECTIONS: &str = "TACIT_DB_MAX_CONNECTIONS";
const ENV_ACQUIRE_TIMEOUT: &str = "TACIT_DB_ACQUIRE_TIMEOUT_SECS";

/// Sizing and timeouts for the shared pool.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    /// Upper bound on waiting for a free connection. A request that exceeds
    /// it fails with `Error::Persistence` instead of queueing forever.
    pub acquire_timeout: Duration,
    pub idle_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: DEFAULT_MAX_CONNECTIONS,
            min_connections: 1,
            acquire_timeout: Duration::from_secs(DEFAULT_ACQUIRE_TIMEOUT_SECS),
            idle_timeout: Duration::from_secs(DEFAULT_IDLE_TIMEOUT_SECS),
        }
    }
}

fn env_number<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

impl PoolConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overridden by `TACIT_DB_MAX_CONNECTIONS` and
    /// `TACIT_DB_ACQUIRE_TIMEOUT_SECS`. Unparsable values are ignored.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_connections: env_number(ENV_MAX_CONNECTIONS).unwrap_or(defaults.max_connections),
            acquire_timeout: env_number(ENV_ACQUIRE_TIMEOUT)
                .map(Duration::from_secs)
                .unwrap_or(defaults.acquire_timeout),
            ..defaults
        }
    }

    pub fn max_connections(mut self, n: u32) -> Self {
        self.max_connections = n;
        self
    }

    pub fn min_connections(mut self, n: u32) -> Self {
        self.min_connections = n;
        self
    }

    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }
}

/// Point-in-time connection counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolHealth {
    pub size: u32,
    pub idle: usize,
}

impl PoolHealth {
    pub fn of(pool: &PgPool) -> Self {
        Self {
            size: pool.size(),
            idle: pool.num_idle(),
        }
    }

    /// Every open connection is checked out.
    pub fn is_saturated(&self) -> bool {
        self.size > 0 && self.idle == 0
    }
}

/// Connect using [`PoolConfig::from_env`].
pub async fn create_pool(database_url: &str) -> Result<PgPool> {
    create_pool_with_config(database_url, PoolConfig::from_env()).await
}

pub async fn create_pool_with_config(database_url: &str, config: PoolConfig) -> Result<PgPool> {
    let started = Instant::now();
    debug!(
        subsystem = "db",
        component = "pool",
        op = "connect",
        max_connections = config.max_connections,
        acquire_timeout_secs = config.acquire_timeout.as_secs(),
        "Opening connection pool"
    );

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(config.acquire_timeout)
        .idle_timeout(config.idle_timeout)
        .connect(database_url)
        .await
        .map_err(|e| Error::Persistence(format!("pool connect failed: {}", e)))?;

    let health = PoolHealth::of(&pool);
    info!(
        subsystem = "db",
        component = "pool",
        op = "connect",
        pool_size = health.size,
        pool_idle = health.idle,
        duration_ms = started.elapsed().as_millis() as u64,
        "Connection pool ready"
    );
    Ok(pool)
}

/// Log pool counts; warns when the pool is saturated.
pub fn log_pool_health(pool: &PgPool) -> PoolHealth {
    let health = PoolHealth::of(pool);
    if health.is_saturated() {
        warn!(
            subsystem = "db",
            component = "pool",
            pool_size = health.size,
            "No idle connections left in pool"
        );
    } else {
        debug!(
            subsystem = "db",
            component = "pool",
            pool_size = health.size,
            pool_idle = health.idle,
            "Pool health"
        );
    }
    health
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_overrides() {
        let config = PoolConfig::new()
            .max_connections(20)
            .min_connections(5)
            .acquire_timeout(Duration::from_secs(3));

        assert_eq!(config.max_connections, 20);
        assert_eq!(config.min_connections, 5);
        assert_eq!(config.acquire_timeout, Duration::from_secs(3));
        assert_eq!(
            config.idle_timeout,
            Duration::from_secs(DEFAULT_IDLE_TIMEOUT_SECS)
        );
    }

    #[test]
    fn test_saturation() {
        assert!(PoolHealth { size: 4, idle: 0 }.is_saturated());
        assert!(!PoolHealth { size: 4, idle: 1 }.is_saturated());
        assert!(!PoolHealth { size: 0, idle: 0 }.is_saturated());
    }
}
