//! Vector and full-text retrieval over the fragment table.
//!
//! - Vector search uses pgvector's cosine distance operator (`<=>`)
//! - Full-text search uses `websearch_to_tsquery()` against the generated
//!   `tsv` column (title weight A, body weight B)
//! - `ts_rank_cd(..., 32)` normalizes relevance into `[0, 1)`

use std::time::Instant;

use async_trait::async_trait;
use sqlx::{Pool, Postgres, Row};
use tracing::{debug, instrument};

use livlib_core::{
    Error, LexicalHit, LexicalSearch, Result, ScoredFragment, SearchFilters, VectorQuery,
    VectorSearch,
};

use crate::filter::FragmentFilterQueryBuilder;
use crate::fragments::{row_to_fragment, FRAGMENT_COLUMNS};

/// pgvector-backed nearest-neighbour search.
#[derive(Clone)]
pub struct PgVectorSearch {
    pool: Pool<Postgres>,
}

impl PgVectorSearch {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl VectorSearch for PgVectorSearch {
    #[instrument(skip(self, query), fields(subsystem = "search", component = "vector", op = "search", limit = query.limit))]
    async fn search_by_vector(&self, query: &VectorQuery) -> Result<Vec<ScoredFragment>> {
        let start = Instant::now();

        // $1 is the query vector, filter params follow
        let (filter_clause, filter_params) =
            FragmentFilterQueryBuilder::new(&query.filters, 1).build();
        let mut next_param = filter_params.len() + 2;

        let threshold_clause = if query.min_similarity.is_some() {
            let clause = format!("AND 1.0 - (f.embedding <=> $1::vector) > ${}", next_param);
            next_param += 1;
            clause
        } else {
            String::new()
        };

        let sql = format!(
            "SELECT {}, 1.0 - (f.embedding <=> $1::vector) AS similarity
             FROM fragment f
             WHERE f.status = 'READY'
               AND f.embedding IS NOT NULL
               AND {}
               {}
             ORDER BY f.embedding <=> $1::vector, f.created_at_utc DESC
             LIMIT ${}",
            FRAGMENT_COLUMNS, filter_clause, threshold_clause, next_param
        );

        let mut q = sqlx::query(&sql).bind(&query.vector);
        for param in &filter_params {
            q = param.bind(q);
        }
        if let Some(min) = query.min_similarity {
            q = q.bind(min as f64);
        }
        q = q.bind(query.limit);

        let rows = q.fetch_all(&self.pool).await.map_err(Error::Database)?;

        let results = rows
            .iter()
            .map(|row| {
                Ok(ScoredFragment {
                    fragment: row_to_fragment(row)?,
                    score: row.get::<f64, _>("similarity") as f32,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        debug!(
            result_count = results.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Vector search complete"
        );
        Ok(results)
    }
}

/// PostgreSQL full-text search over fragments.
#[derive(Clone)]
pub struct PgTextSearch {
    pool: Pool<Postgres>,
}

impl PgTextSearch {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LexicalSearch for PgTextSearch {
    #[instrument(skip(self, query, filters), fields(subsystem = "search", component = "fts", op = "search", limit))]
    async fn search_text(
        &self,
        query: &str,
        filters: &SearchFilters,
        limit: i64,
    ) -> Result<Vec<LexicalHit>> {
        let start = Instant::now();

        let (filter_clause, filter_params) = FragmentFilterQueryBuilder::new(filters, 1).build();

        // FAILED fragments never surface; PROCESSING ones are searchable by text
        let sql = format!(
            "SELECT {}, ts_rank_cd(f.tsv, q, 32) AS rank
             FROM fragment f, websearch_to_tsquery('english', $1) q
             WHERE f.tsv @@ q
               AND f.status <> 'FAILED'
               AND {}
             ORDER BY rank DESC, f.created_at_utc DESC
             LIMIT ${}",
            FRAGMENT_COLUMNS,
            filter_clause,
            filter_params.len() + 2
        );

        let mut q = sqlx::query(&sql).bind(query);
        for param in &filter_params {
            q = param.bind(q);
        }
        q = q.bind(limit);

        let rows = q.fetch_all(&self.pool).await.map_err(Error::Database)?;

        let hits = rows
            .iter()
            .map(|row| {
                Ok(LexicalHit {
                    fragment: row_to_fragment(row)?,
                    relevance: row.get::<Option<f32>, _>("rank"),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        debug!(
            result_count = hits.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Full-text search complete"
        );
        Ok(hits)
    }
}
