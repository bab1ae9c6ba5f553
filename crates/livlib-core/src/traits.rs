//! Core traits for the fragment pipeline.
//!
//! These traits define the interfaces that concrete implementations
//! must satisfy, enabling pluggable backends and testability. The Postgres
//! implementations live in `livlib-db`, provider adapters in
//! `livlib-inference`.

use async_trait::async_trait;
use chrono::Duration;
use uuid::Uuid;

use crate::error::Result;
use crate::models::*;

// =============================================================================
// FRAGMENT REPOSITORY
// =============================================================================

/// Repository for fragment storage and lifecycle transitions.
#[async_trait]
pub trait FragmentRepository: Send + Sync {
    /// Insert a validated fragment in PROCESSING state.
    async fn insert(&self, owner: Uuid, req: CreateFragmentRequest) -> Result<Fragment>;

    /// Fetch a fragment by id, `None` when it does not exist.
    async fn get(&self, id: Uuid) -> Result<Option<Fragment>>;

    /// Store analysis output and move the fragment to READY.
    async fn mark_ready(&self, id: Uuid, analysis: FragmentAnalysis) -> Result<Fragment>;

    /// Move the fragment to FAILED, clearing any partial analysis output.
    async fn mark_failed(&self, id: Uuid, reason: &str) -> Result<()>;

    /// Claim up to `limit` PROCESSING fragments that have attempts left.
    ///
    /// Each claimed fragment has its attempt counter incremented. Concurrent
    /// claimers never receive the same fragment. A fragment that was already
    /// attempted is only reclaimed once `lease` has passed since its last
    /// update.
    async fn claim_for_analysis(
        &self,
        limit: i64,
        max_attempts: i32,
        lease: Duration,
    ) -> Result<Vec<Fragment>>;

    /// Record a failed analysis attempt.
    ///
    /// The fragment becomes FAILED once `max_attempts` is reached, otherwise it
    /// stays PROCESSING for another try. Returns the resulting status.
    async fn record_attempt_failure(
        &self,
        id: Uuid,
        reason: &str,
        max_attempts: i32,
    ) -> Result<FragmentStatus>;

    /// Move PROCESSING fragments whose last allowed attempt never reported
    /// back to FAILED with `reason`, once `lease` has passed since their last
    /// update. Returns the ids that were failed.
    async fn fail_abandoned(
        &self,
        max_attempts: i32,
        lease: Duration,
        reason: &str,
    ) -> Result<Vec<Uuid>>;

    /// Every READY fragment visible to the source's owner that matches a link
    /// rule: a shared tag, an event time inside `window`, or the same location.
    async fn rule_candidates(&self, source: &Fragment, window: Duration) -> Result<Vec<Fragment>>;

    /// The user's most recent READY fragments, newest first.
    async fn recent_ready_for_user(&self, user_id: Uuid, limit: i64) -> Result<Vec<Fragment>>;
}

// =============================================================================
// RETRIEVAL
// =============================================================================

/// Nearest-neighbour search over fragment embeddings.
#[async_trait]
pub trait VectorSearch: Send + Sync {
    /// READY fragments passing `query.filters`, scored by cosine similarity,
    /// sorted by descending score.
    async fn search_by_vector(&self, query: &VectorQuery) -> Result<Vec<ScoredFragment>>;
}

/// Full-text search over fragment title and body.
#[async_trait]
pub trait LexicalSearch: Send + Sync {
    /// Hits in backend rank order, best first.
    async fn search_text(
        &self,
        query: &str,
        filters: &SearchFilters,
        limit: i64,
    ) -> Result<Vec<LexicalHit>>;
}

// =============================================================================
// LINKS & AUDIT
// =============================================================================

/// Repository for materialized links.
#[async_trait]
pub trait LinkRepository: Send + Sync {
    /// Atomically replace every link touching `source_id` with `links`.
    ///
    /// Deletes links where the fragment is source or target, then inserts the
    /// new set, all in one transaction serialized per fragment.
    async fn replace_for_fragment(&self, source_id: Uuid, links: Vec<NewLink>)
        -> Result<Vec<Link>>;

    /// Links from this fragment, best score first.
    async fn outgoing(&self, fragment_id: Uuid) -> Result<Vec<Link>>;

    /// Links to this fragment, best score first.
    async fn incoming(&self, fragment_id: Uuid) -> Result<Vec<Link>>;
}

/// Destination for audit records.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, record: AuditRecord) -> Result<()>;
}

// =============================================================================
// PROVIDER TRAITS
// =============================================================================

/// Backend for generating text embeddings.
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    /// Generate embeddings for the given texts.
    ///
    /// Returns a vector of embedding vectors, one per input text.
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vector>>;

    /// Get the expected dimension of embedding vectors.
    fn dimension(&self) -> usize;

    /// Get the model name being used.
    fn model_name(&self) -> &str;
}

/// Backend that derives themes and emotions from fragment text.
#[async_trait]
pub trait ContentClassifier: Send + Sync {
    async fn classify(&self, text: &str) -> Result<Classification>;
}
