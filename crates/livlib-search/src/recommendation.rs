//! Fragment recommendations.
//!
//! `Live` recommends PUBLIC fragments of other users nearest to the centroid
//! of the reader's recent READY fragments. `Fixture` serves a static list,
//! for demos and tests.

use std::sync::Arc;

use tracing::{debug, instrument};
use uuid::Uuid;

use livlib_core::{
    defaults, Error, Fragment, FragmentRepository, Recommendation, Result, SearchFilters, Vector,
    VectorQuery, VectorSearch,
};

/// Where recommendations come from.
#[derive(Clone)]
pub enum RecommendationSource {
    Live(LiveRecommender),
    Fixture(Vec<Recommendation>),
}

impl RecommendationSource {
    pub async fn recommend(&self, user: Uuid, limit: i64) -> Result<Vec<Recommendation>> {
        if limit < 1 {
            return Err(Error::InvalidInput("limit must be at least 1".to_string()));
        }
        let limit = limit.min(defaults::PAGE_LIMIT_MAX);
        match self {
            Self::Live(live) => live.recommend(user, limit).await,
            Self::Fixture(items) => Ok(items
                .iter()
                .filter(|r| r.fragment.user_id != user)
                .take(limit as usize)
                .cloned()
                .collect()),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Live(_) => "live",
            Self::Fixture(_) => "fixture",
        }
    }
}

/// Centroid-based recommender over stored embeddings.
#[derive(Clone)]
pub struct LiveRecommender {
    fragments: Arc<dyn FragmentRepository>,
    vectors: Arc<dyn VectorSearch>,
    seed_limit: i64,
}

impl LiveRecommender {
    pub fn new(fragments: Arc<dyn FragmentRepository>, vectors: Arc<dyn VectorSearch>) -> Self {
        Self {
            fragments,
            vectors,
            seed_limit: defaults::RECOMMENDATION_SEED_LIMIT,
        }
    }

    pub fn with_seed_limit(mut self, seed_limit: i64) -> Self {
        self.seed_limit = seed_limit;
        self
    }

    #[instrument(skip(self), fields(subsystem = "search", component = "recommendations", op = "recommend"))]
    async fn recommend(&self, user: Uuid, limit: i64) -> Result<Vec<Recommendation>> {
        let seeds = self
            .fragments
            .recent_ready_for_user(user, self.seed_limit)
            .await?;
        let Some(centroid) = centroid(&seeds)? else {
            debug!("No analysed fragments to seed recommendations");
            return Ok(vec![]);
        };

        let mut filters = SearchFilters::default();
        filters.exclude_ids = seeds.iter().map(|f| f.id).collect();

        // Over-fetch since the reader's own public fragments are dropped
        let hits = self
            .vectors
            .search_by_vector(&VectorQuery {
                vector: centroid,
                filters,
                limit: limit * 2,
                min_similarity: None,
            })
            .await?;

        let recommendations: Vec<Recommendation> = hits
            .into_iter()
            .filter(|hit| hit.fragment.user_id != user)
            .take(limit as usize)
            .map(|hit| Recommendation {
                reason: reason_for(&hit.fragment, &seeds),
                score: hit.score,
                fragment: hit.fragment,
            })
            .collect();

        debug!(
            seed_count = seeds.len(),
            result_count = recommendations.len(),
            "Built recommendations"
        );
        Ok(recommendations)
    }
}

/// Mean of the seeds' embeddings; `None` when no seed has one.
fn centroid(seeds: &[Fragment]) -> Result<Option<Vector>> {
    let mut sum: Vec<f32> = Vec::new();
    let mut count = 0usize;
    for embedding in seeds.iter().filter_map(|f| f.embedding.as_ref()) {
        let values = embedding.as_slice();
        if sum.is_empty() {
            sum = vec![0.0; values.len()];
        } else if values.len() != sum.len() {
            return Err(Error::DimensionMismatch {
                expected: sum.len(),
                actual: values.len(),
            });
        }
        for (acc, v) in sum.iter_mut().zip(values) {
            *acc += v;
        }
        count += 1;
    }
    if count == 0 {
        return Ok(None);
    }
    Ok(Some(Vector::from(
        sum.into_iter().map(|v| v / count as f32).collect::<Vec<f32>>(),
    )))
}

fn reason_for(fragment: &Fragment, seeds: &[Fragment]) -> String {
    let shared = fragment.themes.iter().find(|theme| {
        seeds
            .iter()
            .any(|s| s.themes.iter().any(|t| t.eq_ignore_ascii_case(theme)))
    });
    match shared {
        Some(theme) => format!("Shares your interest in {}", theme),
        None => "Similar to your recent fragments".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use livlib_core::Visibility;
    use livlib_db::memory::InMemoryStore;
    use livlib_db::test_fixtures::FragmentFixture;

    #[test]
    fn test_centroid_is_mean() {
        let owner = Uuid::new_v4();
        let seeds = vec![
            FragmentFixture::new(owner).ready_with(vec![1.0, 0.0]).build(),
            FragmentFixture::new(owner).ready_with(vec![0.0, 1.0]).build(),
            FragmentFixture::new(owner).build(),
        ];
        let c = centroid(&seeds).unwrap().unwrap();
        assert_eq!(c.to_vec(), vec![0.5, 0.5]);
    }

    #[test]
    fn test_centroid_rejects_mixed_dimensions() {
        let owner = Uuid::new_v4();
        let seeds = vec![
            FragmentFixture::new(owner).ready_with(vec![1.0, 0.0]).build(),
            FragmentFixture::new(owner).ready_with(vec![1.0]).build(),
        ];
        assert!(matches!(
            centroid(&seeds),
            Err(Error::DimensionMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn test_live_recommends_public_fragments_of_others() {
        let store = Arc::new(InMemoryStore::new());
        let reader = Uuid::new_v4();
        let author = Uuid::new_v4();

        store
            .seed(
                FragmentFixture::new(reader)
                    .themes(&["Sea"])
                    .ready_with(vec![1.0, 0.0])
                    .build(),
            )
            .await;
        // older than the single seed, so only the owner check keeps it out
        store
            .seed(
                FragmentFixture::new(reader)
                    .visibility(Visibility::Public)
                    .created_at(chrono::Utc::now() - chrono::Duration::days(1))
                    .ready_with(vec![1.0, 0.0])
                    .build(),
            )
            .await;
        let match_ = FragmentFixture::new(author)
            .themes(&["sea", "Boats"])
            .visibility(Visibility::Public)
            .ready_with(vec![0.9, 0.1])
            .build();
        let private = FragmentFixture::new(author)
            .ready_with(vec![1.0, 0.0])
            .build();
        store.seed(match_.clone()).await;
        store.seed(private).await;

        let source = RecommendationSource::Live(
            LiveRecommender::new(store.clone(), store.clone()).with_seed_limit(1),
        );
        let recs = source.recommend(reader, 5).await.unwrap();
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].fragment.id, match_.id);
        assert_eq!(recs[0].reason, "Shares your interest in sea");
    }

    #[tokio::test]
    async fn test_live_without_seeds_is_empty() {
        let store = Arc::new(InMemoryStore::new());
        let source = RecommendationSource::Live(LiveRecommender::new(store.clone(), store));
        assert!(source.recommend(Uuid::new_v4(), 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_fixture_source() {
        let reader = Uuid::new_v4();
        let rec = |owner: Uuid| Recommendation {
            fragment: FragmentFixture::new(owner)
                .visibility(Visibility::Public)
                .build(),
            score: 1.0,
            reason: "Editor's pick".to_string(),
        };
        let source = RecommendationSource::Fixture(vec![
            rec(Uuid::new_v4()),
            rec(reader),
            rec(Uuid::new_v4()),
        ]);
        let recs = source.recommend(reader, 10).await.unwrap();
        assert_eq!(recs.len(), 2);
        assert!(recs.iter().all(|r| r.fragment.user_id != reader));
        assert_eq!(source.kind(), "fixture");
        assert!(source.recommend(reader, 0).await.is_err());
    }
}
