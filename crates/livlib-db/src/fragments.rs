//! Fragment repository implementation.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use livlib_core::{
    new_v7, CreateFragmentRequest, Error, Fragment, FragmentAnalysis, FragmentRepository,
    FragmentStatus, Result, Vector,
};

/// Columns selected for every fragment read, aliased as `f`.
pub(crate) const FRAGMENT_COLUMNS: &str = "f.id, f.user_id, f.title, f.body, f.tags, f.themes, \
     f.emotions, f.location, f.event_at, f.visibility, f.status, f.embedding, \
     f.analysis_attempts, f.failure_reason, f.created_at_utc, f.updated_at_utc";

/// Map a row selected with [`FRAGMENT_COLUMNS`] to a [`Fragment`].
pub(crate) fn row_to_fragment(row: &PgRow) -> Result<Fragment> {
    let visibility: String = row.get("visibility");
    let status: String = row.get("status");
    Ok(Fragment {
        id: row.get("id"),
        user_id: row.get("user_id"),
        title: row.get("title"),
        body: row.get("body"),
        tags: row.get("tags"),
        themes: row.get("themes"),
        emotions: row.get("emotions"),
        location: row.get("location"),
        event_at: row.get("event_at"),
        visibility: visibility.parse().map_err(Error::Internal)?,
        status: status.parse().map_err(Error::Internal)?,
        embedding: row.get::<Option<Vector>, _>("embedding"),
        analysis_attempts: row.get("analysis_attempts"),
        failure_reason: row.get("failure_reason"),
        created_at_utc: row.get("created_at_utc"),
        updated_at_utc: row.get("updated_at_utc"),
    })
}

/// PostgreSQL implementation of FragmentRepository.
#[derive(Clone)]
pub struct PgFragmentRepository {
    pool: Pool<Postgres>,
}

impl PgFragmentRepository {
    /// Create a new PgFragmentRepository with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl FragmentRepository for PgFragmentRepository {
    #[instrument(skip(self, req), fields(subsystem = "database", component = "fragments", op = "insert"))]
    async fn insert(&self, owner: Uuid, req: CreateFragmentRequest) -> Result<Fragment> {
        let req = req.validate()?;
        let id = new_v7();
        let now = Utc::now();

        let row = sqlx::query(&format!(
            "INSERT INTO fragment AS f
                 (id, user_id, title, body, tags, location, event_at, visibility, status,
                  created_at_utc, updated_at_utc)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 'PROCESSING', $9, $9)
             RETURNING {}",
            FRAGMENT_COLUMNS
        ))
        .bind(id)
        .bind(owner)
        .bind(&req.title)
        .bind(&req.body)
        .bind(&req.tags)
        .bind(&req.location)
        .bind(req.event_at)
        .bind(req.visibility.as_str())
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;

        debug!(fragment_id = %id, "Fragment stored for analysis");
        row_to_fragment(&row)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Fragment>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM fragment f WHERE f.id = $1",
            FRAGMENT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        row.as_ref().map(row_to_fragment).transpose()
    }

    #[instrument(skip(self, analysis), fields(subsystem = "database", component = "fragments", op = "mark_ready", fragment_id = %id))]
    async fn mark_ready(&self, id: Uuid, analysis: FragmentAnalysis) -> Result<Fragment> {
        let row = sqlx::query(&format!(
            "UPDATE fragment AS f
             SET status = 'READY', embedding = $2, themes = $3, emotions = $4,
                 failure_reason = NULL, updated_at_utc = $5
             WHERE f.id = $1 AND f.status = 'PROCESSING'
             RETURNING {}",
            FRAGMENT_COLUMNS
        ))
        .bind(id)
        .bind(&analysis.embedding)
        .bind(&analysis.themes)
        .bind(&analysis.emotions)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        match row {
            Some(row) => row_to_fragment(&row),
            None => Err(Error::Conflict(format!(
                "fragment {} is no longer PROCESSING",
                id
            ))),
        }
    }

    async fn mark_failed(&self, id: Uuid, reason: &str) -> Result<()> {
        let result = sqlx::query(
            "UPDATE fragment
             SET status = 'FAILED', embedding = NULL, themes = '{}', emotions = '{}',
                 failure_reason = $2, updated_at_utc = $3
             WHERE id = $1",
        )
        .bind(id)
        .bind(reason)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(Error::FragmentNotFound(id));
        }
        Ok(())
    }

    #[instrument(skip(self), fields(subsystem = "database", component = "fragments", op = "claim"))]
    async fn claim_for_analysis(
        &self,
        limit: i64,
        max_attempts: i32,
        lease: Duration,
    ) -> Result<Vec<Fragment>> {
        let now = Utc::now();
        // SKIP LOCKED lets concurrent workers claim disjoint batches
        let rows = sqlx::query(&format!(
            "UPDATE fragment AS f
             SET analysis_attempts = f.analysis_attempts + 1, updated_at_utc = $3
             WHERE f.id IN (
                 SELECT id FROM fragment
                 WHERE status = 'PROCESSING' AND analysis_attempts < $2
                   AND (analysis_attempts = 0 OR updated_at_utc <= $4)
                 ORDER BY created_at_utc
                 LIMIT $1
                 FOR UPDATE SKIP LOCKED
             )
             RETURNING {}",
            FRAGMENT_COLUMNS
        ))
        .bind(limit)
        .bind(max_attempts)
        .bind(now)
        .bind(now - lease)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        debug!(result_count = rows.len(), "Claimed fragments for analysis");
        rows.iter().map(row_to_fragment).collect()
    }

    async fn record_attempt_failure(
        &self,
        id: Uuid,
        reason: &str,
        max_attempts: i32,
    ) -> Result<FragmentStatus> {
        let status: Option<String> = sqlx::query_scalar(
            "UPDATE fragment
             SET status = CASE WHEN analysis_attempts >= $3 THEN 'FAILED' ELSE status END,
                 failure_reason = $2,
                 updated_at_utc = $4
             WHERE id = $1 AND status = 'PROCESSING'
             RETURNING status",
        )
        .bind(id)
        .bind(reason)
        .bind(max_attempts)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        match status {
            Some(s) => s.parse().map_err(Error::Internal),
            None => Err(Error::FragmentNotFound(id)),
        }
    }

    #[instrument(skip(self), fields(subsystem = "database", component = "fragments", op = "fail_abandoned"))]
    async fn fail_abandoned(
        &self,
        max_attempts: i32,
        lease: Duration,
        reason: &str,
    ) -> Result<Vec<Uuid>> {
        let now = Utc::now();
        let ids: Vec<Uuid> = sqlx::query_scalar(
            "UPDATE fragment
             SET status = 'FAILED', embedding = NULL, themes = '{}', emotions = '{}',
                 failure_reason = $2, updated_at_utc = $3
             WHERE id IN (
                 SELECT id FROM fragment
                 WHERE status = 'PROCESSING' AND analysis_attempts >= $1
                   AND updated_at_utc <= $4
                 FOR UPDATE SKIP LOCKED
             )
             RETURNING id",
        )
        .bind(max_attempts)
        .bind(reason)
        .bind(now)
        .bind(now - lease)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        if !ids.is_empty() {
            warn!(count = ids.len(), "Failed fragments abandoned during analysis");
        }
        Ok(ids)
    }

    #[instrument(skip(self, source), fields(subsystem = "database", component = "fragments", op = "rule_candidates", fragment_id = %source.id))]
    async fn rule_candidates(&self, source: &Fragment, window: Duration) -> Result<Vec<Fragment>> {
        let event_time = source.event_time();
        let rows = sqlx::query(&format!(
            "SELECT {} FROM fragment f
             WHERE f.status = 'READY'
               AND f.id <> $1
               AND (f.user_id = $2 OR f.visibility = 'PUBLIC')
               AND (
                   (cardinality($3::text[]) > 0 AND f.tags && $3::text[])
                   OR COALESCE(f.event_at, f.created_at_utc) BETWEEN $4 AND $5
                   OR ($6::text IS NOT NULL
                       AND lower(btrim(f.location)) = lower(btrim($6::text)))
               )
             ORDER BY f.created_at_utc DESC",
            FRAGMENT_COLUMNS
        ))
        .bind(source.id)
        .bind(source.user_id)
        .bind(&source.tags)
        .bind(event_time - window)
        .bind(event_time + window)
        .bind(&source.location)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        rows.iter().map(row_to_fragment).collect()
    }

    async fn recent_ready_for_user(&self, user_id: Uuid, limit: i64) -> Result<Vec<Fragment>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM fragment f
             WHERE f.user_id = $1 AND f.status = 'READY'
             ORDER BY f.created_at_utc DESC
             LIMIT $2",
            FRAGMENT_COLUMNS
        ))
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        rows.iter().map(row_to_fragment).collect()
    }
}
