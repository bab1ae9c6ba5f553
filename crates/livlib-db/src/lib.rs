//! # livlib-db
//!
//! PostgreSQL storage layer for the Living Library fragment pipeline.
//!
//! This crate provides:
//! - Connection pool management
//! - Fragment, link, and audit repositories
//! - Full-text search with a generated tsvector column
//! - Vector search with pgvector
//! - An in-memory store implementing the same traits for tests
//!
//! ## Example
//!
//! ```rust,ignore
//! use livlib_db::{Database, FragmentRepository, CreateFragmentRequest};
//!
//! let db = Database::connect("postgres://localhost/livlib").await?;
//! let fragment = db.fragments.insert(owner, CreateFragmentRequest {
//!     title: "First snow".to_string(),
//!     body: "The street went quiet overnight.".to_string(),
//!     ..Default::default()
//! }).await?;
//! ```

pub mod audit;
pub mod filter;
pub mod fragments;
pub mod links;
pub mod memory;
pub mod pool;
pub mod search;

// Note: always compiled so integration tests in other crates can use it
pub mod test_fixtures;

// Re-export core types
pub use livlib_core::*;

pub use audit::PgAuditLog;
pub use filter::{FragmentFilterQueryBuilder, QueryParam};
pub use fragments::PgFragmentRepository;
pub use links::PgLinkRepository;
pub use memory::InMemoryStore;
pub use pool::{connect_pool, log_pool_metrics, PoolConfig};
pub use search::{PgTextSearch, PgVectorSearch};

/// Combined database context with all repositories.
#[derive(Clone)]
pub struct Database {
    /// The underlying connection pool.
    pub pool: sqlx::Pool<sqlx::Postgres>,
    pub fragments: PgFragmentRepository,
    pub links: PgLinkRepository,
    /// pgvector nearest-neighbour search.
    pub vectors: PgVectorSearch,
    /// Full-text search provider.
    pub text: PgTextSearch,
    pub audit: PgAuditLog,
}

impl Database {
    /// Create a new Database instance from a connection pool.
    pub fn new(pool: sqlx::Pool<sqlx::Postgres>) -> Self {
        Self {
            fragments: PgFragmentRepository::new(pool.clone()),
            links: PgLinkRepository::new(pool.clone()),
            vectors: PgVectorSearch::new(pool.clone()),
            text: PgTextSearch::new(pool.clone()),
            audit: PgAuditLog::new(pool.clone()),
            pool,
        }
    }

    /// Create a new Database instance by connecting to the given URL.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = connect_pool(url, &PoolConfig::default()).await?;
        Ok(Self::new(pool))
    }

    /// Create with custom pool configuration.
    pub async fn connect_with_config(url: &str, config: PoolConfig) -> Result<Self> {
        let pool = connect_pool(url, &config).await?;
        Ok(Self::new(pool))
    }

    /// Run pending migrations.
    #[cfg(feature = "migrations")]
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Database(sqlx::Error::Migrate(Box::new(e))))?;
        Ok(())
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &sqlx::Pool<sqlx::Postgres> {
        &self.pool
    }
}
