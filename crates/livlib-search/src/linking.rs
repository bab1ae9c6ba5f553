//! Link materialization: recomputing and persisting a fragment's typed
//! relationships.
//!
//! A recompute replaces every link touching the fragment with the union of
//! a semantic pass (nearest embeddings above a threshold) and a rule pass
//! (shared tags, nearby event times, same location). The replacement is
//! atomic in the link repository; the audit record is written afterwards
//! and its failure never undoes the recompute.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use livlib_core::{
    defaults, AuditRecord, AuditSink, Error, Fragment, FragmentRepository, FragmentStatus, Link,
    LinkRepository, LinkType, NewLink, Result, SearchFilters, VectorQuery, VectorSearch,
};

use crate::access::load_visible;
use crate::rules::evaluate_rules;

/// Audit action recorded after each recompute.
pub const RECOMPUTE_AUDIT_ACTION: &str = "links.recompute";

/// Tuning for link recomputation.
#[derive(Debug, Clone)]
pub struct LinkingConfig {
    /// Exclusive lower bound on similarity for SEMANTIC links.
    pub semantic_threshold: f32,
    pub semantic_top_k: i64,
    pub time_window_days: i64,
}

impl Default for LinkingConfig {
    fn default() -> Self {
        Self {
            semantic_threshold: defaults::SEMANTIC_LINK_THRESHOLD,
            semantic_top_k: defaults::SEMANTIC_LINK_TOP_K,
            time_window_days: defaults::LINK_TIME_WINDOW_DAYS,
        }
    }
}

impl LinkingConfig {
    /// Load from `LINK_SEMANTIC_THRESHOLD`, `LINK_SEMANTIC_TOP_K` and
    /// `LINK_TIME_WINDOW_DAYS`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            semantic_threshold: std::env::var("LINK_SEMANTIC_THRESHOLD")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.semantic_threshold),
            semantic_top_k: std::env::var("LINK_SEMANTIC_TOP_K")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.semantic_top_k),
            time_window_days: std::env::var("LINK_TIME_WINDOW_DAYS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.time_window_days),
        }
    }

    pub fn with_semantic_threshold(mut self, threshold: f32) -> Self {
        self.semantic_threshold = threshold;
        self
    }

    pub fn with_semantic_top_k(mut self, top_k: i64) -> Self {
        self.semantic_top_k = top_k;
        self
    }

    pub fn with_time_window_days(mut self, days: i64) -> Self {
        self.time_window_days = days;
        self
    }

    pub fn time_window(&self) -> Duration {
        Duration::days(self.time_window_days)
    }
}

/// Result of a recompute.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct RecomputeOutcome {
    pub fragment_id: Uuid,
    pub links_created: usize,
    pub links: Vec<Link>,
}

/// Recomputes and serves materialized links.
#[derive(Clone)]
pub struct LinkMaterializer {
    fragments: Arc<dyn FragmentRepository>,
    vectors: Arc<dyn VectorSearch>,
    links: Arc<dyn LinkRepository>,
    audit: Arc<dyn AuditSink>,
    config: LinkingConfig,
}

impl LinkMaterializer {
    pub fn new(
        fragments: Arc<dyn FragmentRepository>,
        vectors: Arc<dyn VectorSearch>,
        links: Arc<dyn LinkRepository>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            fragments,
            vectors,
            links,
            audit,
            config: LinkingConfig::default(),
        }
    }

    pub fn with_config(mut self, config: LinkingConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &LinkingConfig {
        &self.config
    }

    /// Replace every link touching `fragment_id` with a freshly computed set.
    ///
    /// Access is checked before readiness so a foreign private fragment never
    /// reveals its status.
    #[instrument(skip(self), fields(
        subsystem = "search",
        component = "linking",
        op = "recompute",
        fragment_id = %fragment_id,
        actor_id = %actor,
    ))]
    pub async fn recompute_links(&self, actor: Uuid, fragment_id: Uuid) -> Result<RecomputeOutcome> {
        let start = Instant::now();
        let source = load_visible(self.fragments.as_ref(), actor, fragment_id).await?;
        if source.status != FragmentStatus::Ready || source.embedding.is_none() {
            return Err(Error::NotReady(fragment_id));
        }

        let mut candidates = self.semantic_links(&source).await?;
        let semantic_count = candidates.len();
        candidates.extend(self.rule_links(&source).await?);
        let planned = dedupe_and_sort(candidates);

        let links = self
            .links
            .replace_for_fragment(fragment_id, planned)
            .await?;

        let record = AuditRecord {
            actor_id: actor,
            fragment_id,
            action: RECOMPUTE_AUDIT_ACTION.to_string(),
            link_count: links.len() as i64,
            recorded_at_utc: Utc::now(),
        };
        if let Err(e) = self.audit.record(record).await {
            warn!(error = %e, "Failed to write audit record for link recompute");
        }

        info!(
            semantic_links = semantic_count,
            result_count = links.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Recomputed fragment links"
        );

        Ok(RecomputeOutcome {
            fragment_id,
            links_created: links.len(),
            links,
        })
    }

    /// Outgoing links of a fragment, after the same access check as a
    /// recompute.
    #[instrument(skip(self), fields(subsystem = "search", component = "linking", op = "links_for", fragment_id = %fragment_id))]
    pub async fn links_for(&self, actor: Uuid, fragment_id: Uuid) -> Result<Vec<Link>> {
        load_visible(self.fragments.as_ref(), actor, fragment_id).await?;
        let links = self.links.outgoing(fragment_id).await?;
        debug!(result_count = links.len(), "Loaded fragment links");
        Ok(links)
    }

    async fn semantic_links(&self, source: &Fragment) -> Result<Vec<NewLink>> {
        let Some(vector) = source.embedding.clone() else {
            return Ok(vec![]);
        };
        let hits = self
            .vectors
            .search_by_vector(&VectorQuery {
                vector,
                filters: SearchFilters::for_viewer(source.user_id).excluding(source.id),
                limit: self.config.semantic_top_k,
                min_similarity: Some(self.config.semantic_threshold),
            })
            .await?;

        Ok(hits
            .into_iter()
            .filter(|hit| hit.score > self.config.semantic_threshold)
            .map(|hit| NewLink {
                target_id: hit.fragment.id,
                link_type: LinkType::Semantic,
                score: hit.score.clamp(0.0, 1.0),
                reason: format!("{:.0}% semantic similarity", hit.score * 100.0),
            })
            .collect())
    }

    async fn rule_links(&self, source: &Fragment) -> Result<Vec<NewLink>> {
        let window = self.config.time_window();
        let candidates = self
            .fragments
            .rule_candidates(source, window)
            .await?;
        debug!(candidate_count = candidates.len(), "Evaluating link rules");

        Ok(candidates
            .iter()
            .filter(|c| c.id != source.id && c.is_owner_or_public(source.user_id))
            .flat_map(|c| evaluate_rules(source, c, window))
            .collect())
    }
}

/// One link per `(target, type)`, in a stable order.
fn dedupe_and_sort(links: Vec<NewLink>) -> Vec<NewLink> {
    let mut seen = HashSet::new();
    let mut unique: Vec<NewLink> = links
        .into_iter()
        .filter(|l| seen.insert((l.target_id, l.link_type)))
        .collect();
    unique.sort_by(|a, b| {
        a.link_type
            .cmp(&b.link_type)
            .then_with(|| b.score.total_cmp(&a.score))
            .then_with(|| a.target_id.cmp(&b.target_id))
    });
    unique
}
