//! Hybrid retrieval combining vector similarity and full-text relevance.
//!
//! Both retrieval methods run concurrently. Results are merged additively:
//! a vector hit contributes `similarity * weights.vector`, a lexical hit
//! contributes `lexical * weights.fulltext`, and a fragment found by both
//! gets the sum. When one method fails the other still answers and the
//! response carries a warning; only when both fail does the search fail.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use livlib_core::{
    defaults, EmbeddingBackend, Error, HybridWeights, LexicalHit, LexicalSearch, Result,
    ScoredFragment, SearchFilters, Vector, VectorQuery, VectorSearch,
};

/// How lexical hits are turned into a `[0, 1]` score before blending.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum LexicalScoring {
    /// `1 - i/n` for hit `i` of `n`, ignoring backend relevance values.
    #[default]
    RankProxy,
    /// The backend's normalized relevance; falls back to the rank proxy for
    /// hits without one.
    BackendRelevance,
}

impl FromStr for LexicalScoring {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "rank_proxy" | "rank" => Ok(Self::RankProxy),
            "backend_relevance" | "relevance" => Ok(Self::BackendRelevance),
            _ => Err(format!("Invalid lexical scoring: {}", s)),
        }
    }
}

/// Which retrieval methods contributed to a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalMode {
    Hybrid,
    VectorOnly,
    LexicalOnly,
}

/// Configuration for hybrid search.
#[derive(Debug, Clone)]
pub struct HybridSearchConfig {
    pub weights: HybridWeights,
    pub lexical_scoring: LexicalScoring,
    /// Upper bound on the query embedding call.
    pub provider_timeout: Duration,
    /// Each method fetches `limit * candidate_multiplier` before merging.
    pub candidate_multiplier: i64,
}

impl Default for HybridSearchConfig {
    fn default() -> Self {
        Self {
            weights: HybridWeights::default(),
            lexical_scoring: LexicalScoring::default(),
            provider_timeout: Duration::from_secs(defaults::PROVIDER_TIMEOUT_SECS),
            candidate_multiplier: defaults::SEARCH_CANDIDATE_MULTIPLIER,
        }
    }
}

impl HybridSearchConfig {
    /// Load from `SEARCH_VECTOR_WEIGHT`, `SEARCH_FULLTEXT_WEIGHT`,
    /// `SEARCH_LEXICAL_SCORING` and `OPENAI_TIMEOUT`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let env_f32 = |key: &str, fallback: f32| {
            std::env::var(key)
                .ok()
                .and_then(|v| v.parse::<f32>().ok())
                .unwrap_or(fallback)
        };
        Self {
            weights: HybridWeights::new(
                env_f32("SEARCH_VECTOR_WEIGHT", defaults.weights.vector),
                env_f32("SEARCH_FULLTEXT_WEIGHT", defaults.weights.fulltext),
            ),
            lexical_scoring: std::env::var("SEARCH_LEXICAL_SCORING")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.lexical_scoring),
            provider_timeout: std::env::var("OPENAI_TIMEOUT")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.provider_timeout),
            ..defaults
        }
    }

    pub fn with_weights(mut self, weights: HybridWeights) -> Self {
        self.weights = weights;
        self
    }

    pub fn with_lexical_scoring(mut self, scoring: LexicalScoring) -> Self {
        self.lexical_scoring = scoring;
        self
    }

    pub fn with_provider_timeout(mut self, timeout: Duration) -> Self {
        self.provider_timeout = timeout;
        self
    }
}

/// Ranked results plus degradation information.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct HybridResponse {
    pub results: Vec<ScoredFragment>,
    pub mode: RetrievalMode,
    /// Human-readable notes about degraded retrieval; empty when both
    /// methods answered.
    pub warnings: Vec<String>,
}

/// Score lexical hits in backend order.
pub fn lexical_scores(hits: &[LexicalHit], scoring: LexicalScoring) -> Vec<f32> {
    let n = hits.len() as f32;
    hits.iter()
        .enumerate()
        .map(|(i, hit)| {
            let rank_proxy = 1.0 - i as f32 / n;
            match scoring {
                LexicalScoring::RankProxy => rank_proxy,
                LexicalScoring::BackendRelevance => {
                    hit.relevance.unwrap_or(rank_proxy).clamp(0.0, 1.0)
                }
            }
        })
        .collect()
}

/// Merge both result lists into one ranking.
///
/// Ordered by combined score descending, ties broken by newer `created_at`
/// then id. Truncation to `limit` happens after the merge.
pub fn merge_results(
    vector_hits: Vec<ScoredFragment>,
    lexical_hits: Vec<LexicalHit>,
    weights: HybridWeights,
    scoring: LexicalScoring,
    limit: usize,
) -> Vec<ScoredFragment> {
    let mut merged: HashMap<Uuid, ScoredFragment> = HashMap::new();

    for hit in vector_hits {
        let score = hit.score * weights.vector;
        merged
            .entry(hit.fragment.id)
            .and_modify(|existing| existing.score = existing.score.max(score))
            .or_insert(ScoredFragment {
                fragment: hit.fragment,
                score,
            });
    }

    let scores = lexical_scores(&lexical_hits, scoring);
    for (hit, lexical) in lexical_hits.into_iter().zip(scores) {
        let contribution = lexical * weights.fulltext;
        match merged.get_mut(&hit.fragment.id) {
            Some(existing) => existing.score += contribution,
            None => {
                merged.insert(
                    hit.fragment.id,
                    ScoredFragment {
                        fragment: hit.fragment,
                        score: contribution,
                    },
                );
            }
        }
    }

    let mut results: Vec<ScoredFragment> = merged.into_values().collect();
    results.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| b.fragment.created_at_utc.cmp(&a.fragment.created_at_utc))
            .then_with(|| a.fragment.id.cmp(&b.fragment.id))
    });
    results.truncate(limit);
    results
}

/// Coordinates concurrent vector and lexical retrieval.
#[derive(Clone)]
pub struct HybridSearchCoordinator {
    embedder: Arc<dyn EmbeddingBackend>,
    vectors: Arc<dyn VectorSearch>,
    lexical: Arc<dyn LexicalSearch>,
    config: HybridSearchConfig,
}

impl HybridSearchCoordinator {
    pub fn new(
        embedder: Arc<dyn EmbeddingBackend>,
        vectors: Arc<dyn VectorSearch>,
        lexical: Arc<dyn LexicalSearch>,
    ) -> Self {
        Self {
            embedder,
            vectors,
            lexical,
            config: HybridSearchConfig::default(),
        }
    }

    pub fn with_config(mut self, config: HybridSearchConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &HybridSearchConfig {
        &self.config
    }

    /// Embed a query, bounded by the provider timeout.
    pub async fn embed_query(&self, query: &str) -> Result<Vector> {
        let texts = [query.to_string()];
        let embedded = tokio::time::timeout(
            self.config.provider_timeout,
            self.embedder.embed_texts(&texts),
        )
        .await
        .map_err(|_| {
            Error::ProviderUnavailable(format!(
                "embedding timed out after {}s",
                self.config.provider_timeout.as_secs_f32()
            ))
        })??;

        embedded.into_iter().next().ok_or_else(|| {
            Error::ProviderUnavailable("embedding provider returned no vector".to_string())
        })
    }

    async fn vector_side(
        &self,
        query: &str,
        filters: &SearchFilters,
        fetch: i64,
    ) -> Result<Vec<ScoredFragment>> {
        let start = Instant::now();
        let vector = self.embed_query(query).await?;
        let hits = self
            .vectors
            .search_by_vector(&VectorQuery {
                vector,
                filters: filters.clone(),
                limit: fetch,
                min_similarity: None,
            })
            .await?;
        debug!(
            semantic_hits = hits.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Semantic retrieval complete"
        );
        Ok(hits)
    }

    async fn lexical_side(
        &self,
        query: &str,
        filters: &SearchFilters,
        fetch: i64,
    ) -> Result<Vec<LexicalHit>> {
        let start = Instant::now();
        let hits = self.lexical.search_text(query, filters, fetch).await?;
        debug!(
            fts_hits = hits.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "FTS retrieval complete"
        );
        Ok(hits)
    }

    /// Run both retrieval methods and merge their results.
    #[instrument(skip(self, query, filters), fields(
        subsystem = "search",
        component = "hybrid_search",
        op = "search",
        vector_weight = self.config.weights.vector,
        fulltext_weight = self.config.weights.fulltext,
    ))]
    pub async fn search(
        &self,
        query: &str,
        filters: &SearchFilters,
        limit: i64,
    ) -> Result<HybridResponse> {
        let start = Instant::now();
        let query = query.trim();
        if query.is_empty() {
            return Err(Error::InvalidInput("query must not be empty".to_string()));
        }
        if limit < 1 {
            return Err(Error::InvalidInput("limit must be at least 1".to_string()));
        }
        let limit = limit.min(defaults::PAGE_LIMIT_MAX);
        let weights = self.config.weights;
        weights.validate()?;

        let fetch = limit * self.config.candidate_multiplier.max(1);
        let use_vector = weights.vector > 0.0;
        let use_lexical = weights.fulltext > 0.0;

        // None means the method is disabled by a zero weight
        let (vector_result, lexical_result) = tokio::join!(
            async {
                if use_vector {
                    Some(self.vector_side(query, filters, fetch).await)
                } else {
                    None
                }
            },
            async {
                if use_lexical {
                    Some(self.lexical_side(query, filters, fetch).await)
                } else {
                    None
                }
            }
        );

        let mut warnings = Vec::new();
        let mut failures = Vec::new();

        let vector_hits = match vector_result {
            Some(Ok(hits)) => Some(hits),
            Some(Err(e)) => {
                warn!(error = %e, "Semantic retrieval failed, falling back to lexical results");
                warnings.push(
                    "Semantic search is temporarily unavailable; showing keyword matches only."
                        .to_string(),
                );
                failures.push(format!("vector: {}", e));
                None
            }
            None => None,
        };

        let lexical_hits = match lexical_result {
            Some(Ok(hits)) => Some(hits),
            Some(Err(e)) => {
                warn!(error = %e, "Lexical retrieval failed, falling back to semantic results");
                warnings.push(
                    "Keyword search is temporarily unavailable; showing semantic matches only."
                        .to_string(),
                );
                failures.push(format!("lexical: {}", e));
                None
            }
            None => None,
        };

        let mode = match (&vector_hits, &lexical_hits) {
            (Some(_), Some(_)) => RetrievalMode::Hybrid,
            (Some(_), None) => RetrievalMode::VectorOnly,
            (None, Some(_)) => RetrievalMode::LexicalOnly,
            (None, None) => {
                return Err(Error::SearchUnavailable(failures.join("; ")));
            }
        };

        let vector_count = vector_hits.as_ref().map_or(0, Vec::len);
        let lexical_count = lexical_hits.as_ref().map_or(0, Vec::len);

        let results = merge_results(
            vector_hits.unwrap_or_default(),
            lexical_hits.unwrap_or_default(),
            weights,
            self.config.lexical_scoring,
            limit as usize,
        );

        info!(
            ?mode,
            semantic_hits = vector_count,
            fts_hits = lexical_count,
            result_count = results.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Hybrid search completed"
        );

        Ok(HybridResponse {
            results,
            mode,
            warnings,
        })
    }
}
