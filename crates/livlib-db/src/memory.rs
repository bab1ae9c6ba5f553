//! In-memory implementation of every storage trait.
//!
//! Backs pipeline and HTTP tests that run without PostgreSQL, and local
//! development with `DATABASE_URL=memory`. Semantics follow the SQL
//! implementations: same visibility scope, same status rules, same
//! replace-all link semantics.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use livlib_core::{
    new_v7, rank_by_similarity, AuditRecord, AuditSink, CreateFragmentRequest, Error, Fragment,
    FragmentAnalysis, FragmentRepository, FragmentStatus, LexicalHit, LexicalSearch, Link,
    LinkRepository, NewLink, Result, ScoredFragment, SearchFilters, VectorQuery, VectorSearch,
    Visibility,
};

#[derive(Default)]
struct State {
    fragments: HashMap<Uuid, Fragment>,
    links: Vec<Link>,
    audit: Vec<AuditRecord>,
}

/// Shared in-memory store. Clones share the same state.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<RwLock<State>>,
    fail_vector: Arc<AtomicBool>,
    fail_lexical: Arc<AtomicBool>,
    fail_audit: Arc<AtomicBool>,
    link_writes: Arc<AtomicUsize>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a fully formed fragment as-is, replacing any with the same id.
    pub async fn seed(&self, fragment: Fragment) {
        let mut state = self.state.write().await;
        state.fragments.insert(fragment.id, fragment);
    }

    /// Make vector search return a database error.
    pub fn fail_vector_search(&self, fail: bool) {
        self.fail_vector.store(fail, Ordering::SeqCst);
    }

    /// Make lexical search return a database error.
    pub fn fail_lexical_search(&self, fail: bool) {
        self.fail_lexical.store(fail, Ordering::SeqCst);
    }

    /// Make audit writes fail.
    pub fn fail_audit(&self, fail: bool) {
        self.fail_audit.store(fail, Ordering::SeqCst);
    }

    /// Number of `replace_for_fragment` calls that reached the store.
    pub fn link_write_count(&self) -> usize {
        self.link_writes.load(Ordering::SeqCst)
    }

    /// Every stored link.
    pub async fn all_links(&self) -> Vec<Link> {
        self.state.read().await.links.clone()
    }

    pub async fn audit_records(&self) -> Vec<AuditRecord> {
        self.state.read().await.audit.clone()
    }
}

fn unavailable(what: &str) -> Error {
    Error::Database(sqlx::Error::Protocol(format!("{} backend unavailable", what)))
}

/// Case-insensitive trimmed equality for locations.
fn same_location(a: &Option<String>, b: &Option<String>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => {
            let (a, b) = (a.trim(), b.trim());
            !a.is_empty() && a.to_lowercase() == b.to_lowercase()
        }
        _ => false,
    }
}

/// Term-frequency relevance; title matches weigh double.
fn text_score(query_terms: &[String], fragment: &Fragment) -> f32 {
    let title = fragment.title.to_lowercase();
    let body = fragment.body.to_lowercase();
    query_terms
        .iter()
        .map(|term| {
            let mut score = 0.0;
            if title.contains(term.as_str()) {
                score += 2.0;
            }
            if body.contains(term.as_str()) {
                score += 1.0;
            }
            score
        })
        .sum()
}

#[async_trait]
impl FragmentRepository for InMemoryStore {
    async fn insert(&self, owner: Uuid, req: CreateFragmentRequest) -> Result<Fragment> {
        let req = req.validate()?;
        let now = Utc::now();
        let fragment = Fragment {
            id: new_v7(),
            user_id: owner,
            title: req.title,
            body: req.body,
            tags: req.tags,
            themes: Vec::new(),
            emotions: Vec::new(),
            location: req.location,
            event_at: req.event_at,
            visibility: req.visibility,
            status: FragmentStatus::Processing,
            embedding: None,
            analysis_attempts: 0,
            failure_reason: None,
            created_at_utc: now,
            updated_at_utc: now,
        };
        self.state
            .write()
            .await
            .fragments
            .insert(fragment.id, fragment.clone());
        Ok(fragment)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Fragment>> {
        Ok(self.state.read().await.fragments.get(&id).cloned())
    }

    async fn mark_ready(&self, id: Uuid, analysis: FragmentAnalysis) -> Result<Fragment> {
        let mut state = self.state.write().await;
        let fragment = state
            .fragments
            .get_mut(&id)
            .ok_or(Error::FragmentNotFound(id))?;
        if fragment.status != FragmentStatus::Processing {
            return Err(Error::Conflict(format!(
                "fragment {} is no longer PROCESSING",
                id
            )));
        }
        fragment.status = FragmentStatus::Ready;
        fragment.embedding = Some(analysis.embedding);
        fragment.themes = analysis.themes;
        fragment.emotions = analysis.emotions;
        fragment.failure_reason = None;
        fragment.updated_at_utc = Utc::now();
        Ok(fragment.clone())
    }

    async fn mark_failed(&self, id: Uuid, reason: &str) -> Result<()> {
        let mut state = self.state.write().await;
        let fragment = state
            .fragments
            .get_mut(&id)
            .ok_or(Error::FragmentNotFound(id))?;
        fragment.status = FragmentStatus::Failed;
        fragment.embedding = None;
        fragment.themes.clear();
        fragment.emotions.clear();
        fragment.failure_reason = Some(reason.to_string());
        fragment.updated_at_utc = Utc::now();
        Ok(())
    }

    async fn claim_for_analysis(
        &self,
        limit: i64,
        max_attempts: i32,
        lease: Duration,
    ) -> Result<Vec<Fragment>> {
        let now = Utc::now();
        let lease_expired_before = now - lease;
        let mut state = self.state.write().await;
        let mut pending: Vec<&mut Fragment> = state
            .fragments
            .values_mut()
            .filter(|f| {
                f.status == FragmentStatus::Processing
                    && f.analysis_attempts < max_attempts
                    && (f.analysis_attempts == 0 || f.updated_at_utc <= lease_expired_before)
            })
            .collect();
        pending.sort_by_key(|f| (f.created_at_utc, f.id));

        Ok(pending
            .into_iter()
            .take(limit.max(0) as usize)
            .map(|f| {
                f.analysis_attempts += 1;
                f.updated_at_utc = now;
                f.clone()
            })
            .collect())
    }

    async fn record_attempt_failure(
        &self,
        id: Uuid,
        reason: &str,
        max_attempts: i32,
    ) -> Result<FragmentStatus> {
        let mut state = self.state.write().await;
        let fragment = state
            .fragments
            .get_mut(&id)
            .filter(|f| f.status == FragmentStatus::Processing)
            .ok_or(Error::FragmentNotFound(id))?;
        if fragment.analysis_attempts >= max_attempts {
            fragment.status = FragmentStatus::Failed;
        }
        fragment.failure_reason = Some(reason.to_string());
        fragment.updated_at_utc = Utc::now();
        Ok(fragment.status)
    }

    async fn fail_abandoned(
        &self,
        max_attempts: i32,
        lease: Duration,
        reason: &str,
    ) -> Result<Vec<Uuid>> {
        let now = Utc::now();
        let lease_expired_before = now - lease;
        let mut state = self.state.write().await;
        let mut failed = Vec::new();
        for f in state.fragments.values_mut().filter(|f| {
            f.status == FragmentStatus::Processing
                && f.analysis_attempts >= max_attempts
                && f.updated_at_utc <= lease_expired_before
        }) {
            f.status = FragmentStatus::Failed;
            f.embedding = None;
            f.themes.clear();
            f.emotions.clear();
            f.failure_reason = Some(reason.to_string());
            f.updated_at_utc = now;
            failed.push(f.id);
        }
        Ok(failed)
    }

    async fn rule_candidates(&self, source: &Fragment, window: Duration) -> Result<Vec<Fragment>> {
        let state = self.state.read().await;
        let event_time = source.event_time();
        let mut candidates: Vec<Fragment> = state
            .fragments
            .values()
            .filter(|f| f.status == FragmentStatus::Ready && f.id != source.id)
            .filter(|f| f.user_id == source.user_id || f.visibility == Visibility::Public)
            .filter(|f| {
                let shares_tag = f.tags.iter().any(|t| source.tags.contains(t));
                let delta = (f.event_time() - event_time).abs();
                shares_tag || delta <= window || same_location(&f.location, &source.location)
            })
            .cloned()
            .collect();
        candidates.sort_by(|a, b| b.created_at_utc.cmp(&a.created_at_utc));
        Ok(candidates)
    }

    async fn recent_ready_for_user(&self, user_id: Uuid, limit: i64) -> Result<Vec<Fragment>> {
        let state = self.state.read().await;
        let mut recent: Vec<Fragment> = state
            .fragments
            .values()
            .filter(|f| f.user_id == user_id && f.status == FragmentStatus::Ready)
            .cloned()
            .collect();
        recent.sort_by(|a, b| b.created_at_utc.cmp(&a.created_at_utc));
        recent.truncate(limit.max(0) as usize);
        Ok(recent)
    }
}

#[async_trait]
impl VectorSearch for InMemoryStore {
    async fn search_by_vector(&self, query: &VectorQuery) -> Result<Vec<ScoredFragment>> {
        if self.fail_vector.load(Ordering::SeqCst) {
            return Err(unavailable("vector"));
        }

        let state = self.state.read().await;
        let mut eligible: Vec<&Fragment> = state
            .fragments
            .values()
            .filter(|f| f.status == FragmentStatus::Ready && query.filters.matches(f))
            .collect();
        // Newer first so equal similarities keep that order
        eligible.sort_by(|a, b| {
            b.created_at_utc
                .cmp(&a.created_at_utc)
                .then_with(|| b.id.cmp(&a.id))
        });

        let candidates = eligible
            .into_iter()
            .filter_map(|f| f.embedding.as_ref().map(|e| (f, e.as_slice())));
        let ranked = rank_by_similarity(
            query.vector.as_slice(),
            candidates,
            query.limit.max(0) as usize,
            query.min_similarity.unwrap_or(f32::NEG_INFINITY),
        )?;

        Ok(ranked
            .into_iter()
            .map(|(f, score)| ScoredFragment {
                fragment: f.clone(),
                score,
            })
            .collect())
    }
}

#[async_trait]
impl LexicalSearch for InMemoryStore {
    async fn search_text(
        &self,
        query: &str,
        filters: &SearchFilters,
        limit: i64,
    ) -> Result<Vec<LexicalHit>> {
        if self.fail_lexical.load(Ordering::SeqCst) {
            return Err(unavailable("lexical"));
        }

        let terms: Vec<String> = query
            .split_whitespace()
            .map(|t| {
                t.trim_matches(|c: char| !c.is_alphanumeric())
                    .to_lowercase()
            })
            .filter(|t| !t.is_empty())
            .collect();

        let state = self.state.read().await;
        let mut hits: Vec<(f32, &Fragment)> = state
            .fragments
            .values()
            .filter(|f| f.status != FragmentStatus::Failed && filters.matches(f))
            .map(|f| (text_score(&terms, f), f))
            .filter(|(score, _)| *score > 0.0)
            .collect();
        hits.sort_by(|a, b| {
            b.0.total_cmp(&a.0)
                .then_with(|| b.1.created_at_utc.cmp(&a.1.created_at_utc))
        });
        hits.truncate(limit.max(0) as usize);

        Ok(hits
            .into_iter()
            .map(|(score, f)| LexicalHit {
                fragment: f.clone(),
                relevance: Some(score / (score + 1.0)),
            })
            .collect())
    }
}

#[async_trait]
impl LinkRepository for InMemoryStore {
    async fn replace_for_fragment(&self, source_id: Uuid, links: Vec<NewLink>) -> Result<Vec<Link>> {
        self.link_writes.fetch_add(1, Ordering::SeqCst);

        // The write guard makes delete + insert atomic
        let mut state = self.state.write().await;
        state
            .links
            .retain(|l| l.source_id != source_id && l.target_id != source_id);

        let now = Utc::now();
        let mut created: Vec<Link> = Vec::with_capacity(links.len());
        for link in links {
            let duplicate = created
                .iter()
                .any(|c| c.target_id == link.target_id && c.link_type == link.link_type);
            if duplicate || link.target_id == source_id {
                continue;
            }
            created.push(Link {
                id: new_v7(),
                source_id,
                target_id: link.target_id,
                link_type: link.link_type,
                score: link.score.clamp(0.0, 1.0),
                reason: link.reason,
                created_at_utc: now,
            });
        }
        state.links.extend(created.iter().cloned());
        Ok(created)
    }

    async fn outgoing(&self, fragment_id: Uuid) -> Result<Vec<Link>> {
        let state = self.state.read().await;
        let mut links: Vec<Link> = state
            .links
            .iter()
            .filter(|l| l.source_id == fragment_id)
            .cloned()
            .collect();
        links.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.target_id.cmp(&b.target_id))
        });
        Ok(links)
    }

    async fn incoming(&self, fragment_id: Uuid) -> Result<Vec<Link>> {
        let state = self.state.read().await;
        let mut links: Vec<Link> = state
            .links
            .iter()
            .filter(|l| l.target_id == fragment_id)
            .cloned()
            .collect();
        links.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.source_id.cmp(&b.source_id))
        });
        Ok(links)
    }
}

#[async_trait]
impl AuditSink for InMemoryStore {
    async fn record(&self, record: AuditRecord) -> Result<()> {
        if self.fail_audit.load(Ordering::SeqCst) {
            return Err(unavailable("audit"));
        }
        self.state.write().await.audit.push(record);
        Ok(())
    }
}
