//! Link repository implementation.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row};
use tracing::{debug, instrument};
use uuid::Uuid;

use livlib_core::uuid_utils::advisory_lock_key;
use livlib_core::{new_v7, Error, Link, LinkRepository, NewLink, Result};

fn row_to_link(row: &PgRow) -> Result<Link> {
    let link_type: String = row.get("link_type");
    Ok(Link {
        id: row.get("id"),
        source_id: row.get("source_id"),
        target_id: row.get("target_id"),
        link_type: link_type.parse().map_err(Error::Internal)?,
        score: row.get("score"),
        reason: row.get("reason"),
        created_at_utc: row.get("created_at_utc"),
    })
}

/// PostgreSQL implementation of LinkRepository.
#[derive(Clone)]
pub struct PgLinkRepository {
    pool: Pool<Postgres>,
}

impl PgLinkRepository {
    /// Create a new PgLinkRepository with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LinkRepository for PgLinkRepository {
    #[instrument(
        skip(self, links),
        fields(subsystem = "database", component = "links", op = "replace", fragment_id = %source_id, link_count = links.len())
    )]
    async fn replace_for_fragment(&self, source_id: Uuid, links: Vec<NewLink>) -> Result<Vec<Link>> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        // Serializes concurrent recomputes of the same fragment until commit
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(advisory_lock_key(source_id))
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;

        let deleted = sqlx::query("DELETE FROM fragment_link WHERE source_id = $1 OR target_id = $1")
            .bind(source_id)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?
            .rows_affected();

        let mut created = Vec::with_capacity(links.len());
        for link in links {
            let row = sqlx::query(
                "INSERT INTO fragment_link (id, source_id, target_id, link_type, score, reason, created_at_utc)
                 VALUES ($1, $2, $3, $4, $5, $6, $7)
                 ON CONFLICT (source_id, target_id, link_type) DO NOTHING
                 RETURNING id, source_id, target_id, link_type, score, reason, created_at_utc",
            )
            .bind(new_v7())
            .bind(source_id)
            .bind(link.target_id)
            .bind(link.link_type.as_str())
            .bind(link.score.clamp(0.0, 1.0))
            .bind(&link.reason)
            .bind(now)
            .fetch_optional(&mut *tx)
            .await
            .map_err(Error::Database)?;

            if let Some(row) = row {
                created.push(row_to_link(&row)?);
            }
        }

        tx.commit().await.map_err(Error::Database)?;

        debug!(
            deleted,
            result_count = created.len(),
            "Replaced fragment links"
        );
        Ok(created)
    }

    async fn outgoing(&self, fragment_id: Uuid) -> Result<Vec<Link>> {
        let rows = sqlx::query(
            "SELECT id, source_id, target_id, link_type, score, reason, created_at_utc
             FROM fragment_link
             WHERE source_id = $1
             ORDER BY score DESC, target_id",
        )
        .bind(fragment_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        rows.iter().map(row_to_link).collect()
    }

    async fn incoming(&self, fragment_id: Uuid) -> Result<Vec<Link>> {
        let rows = sqlx::query(
            "SELECT id, source_id, target_id, link_type, score, reason, created_at_utc
             FROM fragment_link
             WHERE target_id = $1
             ORDER BY score DESC, source_id",
        )
        .bind(fragment_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        rows.iter().map(row_to_link).collect()
    }
}
