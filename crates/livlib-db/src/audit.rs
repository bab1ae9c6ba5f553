//! Audit log persistence.

use async_trait::async_trait;
use sqlx::{Pool, Postgres};

use livlib_core::{new_v7, AuditRecord, AuditSink, Error, Result};

/// Appends audit records to the `audit_log` table.
#[derive(Clone)]
pub struct PgAuditLog {
    pool: Pool<Postgres>,
}

impl PgAuditLog {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditSink for PgAuditLog {
    async fn record(&self, record: AuditRecord) -> Result<()> {
        sqlx::query(
            "INSERT INTO audit_log (id, actor_id, fragment_id, action, link_count, recorded_at_utc)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(new_v7())
        .bind(record.actor_id)
        .bind(record.fragment_id)
        .bind(&record.action)
        .bind(record.link_count)
        .bind(record.recorded_at_utc)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }
}
