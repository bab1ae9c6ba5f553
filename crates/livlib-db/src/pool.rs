//! Connection pool for the fragment store.
//!
//! The pool is shared by the HTTP handlers and the analysis worker; each
//! link recompute holds one connection for the length of its transaction.

use std::time::{Duration, Instant};

use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::{info, warn};

use livlib_core::{Error, Result};

/// Sizing and wait limits for [`connect_pool`].
#[derive(Debug, Clone, PartialEq)]
pub struct PoolConfig {
    pub max_connections: u32,
    /// How long a caller waits for a free connection.
    pub acquire_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 10,
            acquire_timeout: Duration::from_secs(30),
        }
    }
}

impl PoolConfig {
    /// `DATABASE_MAX_CONNECTIONS` and `DATABASE_CONNECT_TIMEOUT` (seconds).
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(n) = std::env::var("DATABASE_MAX_CONNECTIONS")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            config = config.with_max_connections(n);
        }
        if let Some(secs) = std::env::var("DATABASE_CONNECT_TIMEOUT")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            config = config.with_acquire_timeout(Duration::from_secs(secs));
        }
        config
    }

    pub fn with_max_connections(mut self, n: u32) -> Self {
        self.max_connections = n.max(1);
        self
    }

    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }
}

/// Open a pool against `database_url`.
pub async fn connect_pool(database_url: &str, config: &PoolConfig) -> Result<PgPool> {
    let start = Instant::now();
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(config.acquire_timeout)
        .connect(database_url)
        .await
        .map_err(Error::Database)?;

    info!(
        subsystem = "database",
        component = "pool",
        max_connections = config.max_connections,
        duration_ms = start.elapsed().as_millis() as u64,
        "Fragment store connected"
    );
    Ok(pool)
}

/// Log pool occupancy, warning when every connection is checked out.
pub fn log_pool_metrics(pool: &PgPool) {
    let size = pool.size();
    let idle = pool.num_idle() as u32;
    if size > 0 && idle == 0 {
        warn!(subsystem = "database", component = "pool", pool_size = size, "No idle connections left");
    } else {
        info!(subsystem = "database", component = "pool", pool_size = size, pool_idle = idle, "Pool occupancy");
    }
}
