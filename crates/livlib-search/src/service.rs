//! Viewer-scoped search operations.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, instrument};
use uuid::Uuid;

use livlib_core::{
    defaults, Error, FragmentRepository, Result, ScoredFragment, SearchFilters, VectorQuery,
    VectorSearch,
};

use crate::access::load_readable;
use crate::advanced::{
    compute_analytics, suggest_refinements, AdvancedSearchOptions, AdvancedSearchResponse,
};
use crate::clustering::cluster_results;
use crate::hybrid::{HybridResponse, HybridSearchCoordinator};

/// Search entry points used by the HTTP layer.
#[derive(Clone)]
pub struct SearchService {
    hybrid: HybridSearchCoordinator,
    fragments: Arc<dyn FragmentRepository>,
    vectors: Arc<dyn VectorSearch>,
}

impl SearchService {
    pub fn new(
        hybrid: HybridSearchCoordinator,
        fragments: Arc<dyn FragmentRepository>,
        vectors: Arc<dyn VectorSearch>,
    ) -> Self {
        Self {
            hybrid,
            fragments,
            vectors,
        }
    }

    pub fn hybrid(&self) -> &HybridSearchCoordinator {
        &self.hybrid
    }

    /// Hybrid search scoped to what `viewer` may see. Anonymous viewers see
    /// PUBLIC fragments only.
    #[instrument(skip(self, query, filters), fields(subsystem = "search", component = "service", op = "semantic_search"))]
    pub async fn semantic_search(
        &self,
        viewer: Option<Uuid>,
        query: &str,
        filters: SearchFilters,
        limit: i64,
    ) -> Result<HybridResponse> {
        let filters = SearchFilters {
            viewer_id: viewer,
            ..filters
        };
        self.hybrid.search(query, &filters, limit).await
    }

    /// Fragments most similar to an existing one, excluding itself.
    #[instrument(skip(self), fields(subsystem = "search", component = "service", op = "find_similar", fragment_id = %fragment_id))]
    pub async fn find_similar(
        &self,
        viewer: Uuid,
        fragment_id: Uuid,
        limit: i64,
    ) -> Result<Vec<ScoredFragment>> {
        let start = Instant::now();
        if limit < 1 {
            return Err(Error::InvalidInput("limit must be at least 1".to_string()));
        }
        let source = load_readable(self.fragments.as_ref(), viewer, fragment_id).await?;
        let vector = source.embedding.ok_or(Error::NotReady(fragment_id))?;

        let results = self
            .vectors
            .search_by_vector(&VectorQuery {
                vector,
                filters: SearchFilters::for_viewer(viewer).excluding(fragment_id),
                limit: limit.min(defaults::PAGE_LIMIT_MAX),
                min_similarity: None,
            })
            .await?;

        debug!(
            result_count = results.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Similar fragments found"
        );
        Ok(results)
    }

    /// Hybrid search plus clusters, suggestions and analytics.
    #[instrument(skip(self, query, filters, options), fields(subsystem = "search", component = "service", op = "advanced_search"))]
    pub async fn advanced_search(
        &self,
        viewer: Option<Uuid>,
        query: &str,
        filters: SearchFilters,
        options: AdvancedSearchOptions,
    ) -> Result<AdvancedSearchResponse> {
        let start = Instant::now();
        let response = self
            .semantic_search(viewer, query, filters, options.limit)
            .await?;
        let results = response.results;

        let (clusters, individual_results) = if options.include_clusters {
            let clustering = cluster_results(&results);
            (clustering.clusters, clustering.individual_results)
        } else {
            (vec![], results.clone())
        };
        let suggestions = if options.include_suggestions {
            suggest_refinements(query, &results)
        } else {
            vec![]
        };
        let analytics = options
            .include_analytics
            .then(|| compute_analytics(&results));

        info!(
            result_count = results.len(),
            cluster_count = clusters.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Advanced search completed"
        );

        Ok(AdvancedSearchResponse {
            query: query.trim().to_string(),
            results,
            clusters,
            individual_results,
            suggestions,
            analytics,
            mode: response.mode,
            warnings: response.warnings,
        })
    }
}
