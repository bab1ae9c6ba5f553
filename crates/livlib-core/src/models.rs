//! Core data models for the fragment pipeline.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::defaults;
use crate::error::{Error, Result};

pub use pgvector::Vector;

// =============================================================================
// ENUMS
// =============================================================================

/// Who may see a fragment.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Visibility {
    /// Owner only (default)
    #[default]
    Private,
    /// Anyone holding the id, never listed in search
    Unlisted,
    /// Listed in search and eligible as a link target for everyone
    Public,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Private => "PRIVATE",
            Self::Unlisted => "UNLISTED",
            Self::Public => "PUBLIC",
        }
    }
}

impl std::fmt::Display for Visibility {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Visibility {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "PRIVATE" => Ok(Self::Private),
            "UNLISTED" => Ok(Self::Unlisted),
            "PUBLIC" => Ok(Self::Public),
            _ => Err(format!("Invalid visibility: {}", s)),
        }
    }
}

/// Analysis state of a fragment.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FragmentStatus {
    /// Waiting for embedding and classification
    #[default]
    Processing,
    /// Embedded and classified
    Ready,
    /// Analysis failed; terminal until a manual retry
    Failed,
}

impl FragmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Processing => "PROCESSING",
            Self::Ready => "READY",
            Self::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for FragmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for FragmentStatus {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "PROCESSING" => Ok(Self::Processing),
            "READY" => Ok(Self::Ready),
            "FAILED" => Ok(Self::Failed),
            _ => Err(format!("Invalid fragment status: {}", s)),
        }
    }
}

/// Kind of relationship between two fragments.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, utoipa::ToSchema,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LinkType {
    /// Embedding similarity above threshold
    Semantic,
    /// At least one tag in common
    SharedTag,
    /// Events within the configured time window
    SameTimewindow,
    /// Same location text
    SameLocation,
}

impl LinkType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Semantic => "SEMANTIC",
            Self::SharedTag => "SHARED_TAG",
            Self::SameTimewindow => "SAME_TIMEWINDOW",
            Self::SameLocation => "SAME_LOCATION",
        }
    }
}

impl std::fmt::Display for LinkType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for LinkType {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "SEMANTIC" => Ok(Self::Semantic),
            "SHARED_TAG" => Ok(Self::SharedTag),
            "SAME_TIMEWINDOW" => Ok(Self::SameTimewindow),
            "SAME_LOCATION" => Ok(Self::SameLocation),
            _ => Err(format!("Invalid link type: {}", s)),
        }
    }
}

// =============================================================================
// FRAGMENTS
// =============================================================================

/// A user-authored journal entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct Fragment {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub body: String,
    /// Free-form tags, lowercased and de-duplicated
    pub tags: Vec<String>,
    /// AI-derived themes; the first entry is the dominant theme
    pub themes: Vec<String>,
    /// AI-derived emotions
    pub emotions: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    /// When the experience happened, if different from when it was written
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_at: Option<DateTime<Utc>>,
    pub visibility: Visibility,
    pub status: FragmentStatus,
    #[serde(skip)]
    pub embedding: Option<Vector>,
    pub analysis_attempts: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    pub created_at_utc: DateTime<Utc>,
    pub updated_at_utc: DateTime<Utc>,
}

impl Fragment {
    /// Owners see everything; everyone else sees PUBLIC fragments.
    pub fn is_owner_or_public(&self, viewer: Uuid) -> bool {
        self.user_id == viewer || self.visibility == Visibility::Public
    }

    /// Direct reads additionally allow UNLISTED fragments.
    pub fn is_readable_by(&self, viewer: Uuid) -> bool {
        self.is_owner_or_public(viewer) || self.visibility == Visibility::Unlisted
    }

    /// Timestamp used by time-window rules.
    pub fn event_time(&self) -> DateTime<Utc> {
        self.event_at.unwrap_or(self.created_at_utc)
    }

    /// Text sent to the embedding provider, truncated on a char boundary.
    pub fn embedding_input(&self, max_chars: usize) -> String {
        let combined = if self.title.trim().is_empty() {
            self.body.clone()
        } else {
            format!("{}\n\n{}", self.title.trim(), self.body)
        };
        truncate_chars(&combined, max_chars)
    }

    /// Check the status/embedding/classification invariants.
    pub fn check_invariants(&self) -> Result<()> {
        if self.embedding.is_some() && self.status != FragmentStatus::Ready {
            return Err(Error::Internal(format!(
                "fragment {} has an embedding while {}",
                self.id, self.status
            )));
        }
        if self.status != FragmentStatus::Ready
            && (!self.themes.is_empty() || !self.emotions.is_empty())
        {
            return Err(Error::Internal(format!(
                "fragment {} has classification while {}",
                self.id, self.status
            )));
        }
        Ok(())
    }
}

/// Request for creating a new fragment.
#[derive(Debug, Clone, Default, Serialize, Deserialize, utoipa::ToSchema)]
pub struct CreateFragmentRequest {
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub visibility: Visibility,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub event_at: Option<DateTime<Utc>>,
}

impl CreateFragmentRequest {
    /// Validate and normalize the request at the system boundary.
    pub fn validate(mut self) -> Result<Self> {
        self.title = self.title.trim().to_string();
        if self.title.chars().count() > defaults::TITLE_MAX_CHARS {
            return Err(Error::InvalidInput(format!(
                "title exceeds {} characters",
                defaults::TITLE_MAX_CHARS
            )));
        }
        if self.body.trim().is_empty() {
            return Err(Error::InvalidInput("body must not be empty".to_string()));
        }
        if let Some(tag) = self
            .tags
            .iter()
            .find(|t| t.trim().chars().count() > defaults::TAG_MAX_CHARS)
        {
            return Err(Error::InvalidInput(format!(
                "tag '{}' exceeds {} characters",
                tag.trim(),
                defaults::TAG_MAX_CHARS
            )));
        }
        self.tags = normalize_tags(self.tags);
        self.location = self
            .location
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty());
        Ok(self)
    }
}

/// Output of background analysis, applied when a fragment becomes READY.
#[derive(Debug, Clone)]
pub struct FragmentAnalysis {
    pub embedding: Vector,
    pub themes: Vec<String>,
    pub emotions: Vec<String>,
}

/// Themes and emotions produced by the classifier.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    #[serde(default)]
    pub themes: Vec<String>,
    #[serde(default)]
    pub emotions: Vec<String>,
}

impl Classification {
    /// Trim and de-duplicate labels, keeping the classifier's order.
    pub fn normalized(self) -> Self {
        Self {
            themes: normalize_labels(self.themes),
            emotions: normalize_labels(self.emotions),
        }
    }
}

// =============================================================================
// LINKS
// =============================================================================

/// A persisted, typed, scored relationship between two fragments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct Link {
    pub id: Uuid,
    pub source_id: Uuid,
    pub target_id: Uuid,
    pub link_type: LinkType,
    /// Score in [0, 1]
    pub score: f32,
    pub reason: String,
    pub created_at_utc: DateTime<Utc>,
}

/// A link computed by a recompute pass, before it is persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct NewLink {
    pub target_id: Uuid,
    pub link_type: LinkType,
    pub score: f32,
    pub reason: String,
}

/// Audit entry emitted after a link recompute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub actor_id: Uuid,
    pub fragment_id: Uuid,
    pub action: String,
    pub link_count: i64,
    pub recorded_at_utc: DateTime<Utc>,
}

// =============================================================================
// SEARCH TYPES
// =============================================================================

/// Visibility scope and attribute filters shared by every retrieval method.
#[derive(Debug, Clone, Default, Serialize, Deserialize, utoipa::ToSchema)]
pub struct SearchFilters {
    /// Caller identity; `None` restricts results to PUBLIC fragments
    #[serde(default)]
    pub viewer_id: Option<Uuid>,
    /// Restrict to the viewer's own fragments
    #[serde(default)]
    pub owner_only: bool,
    /// Match fragments carrying any of these tags
    #[serde(default)]
    pub tags: Vec<String>,
    /// Match fragments carrying any of these themes
    #[serde(default)]
    pub themes: Vec<String>,
    /// Match fragments carrying any of these emotions
    #[serde(default)]
    pub emotions: Vec<String>,
    #[serde(default)]
    pub created_after: Option<DateTime<Utc>>,
    #[serde(default)]
    pub created_before: Option<DateTime<Utc>>,
    /// Fragments never returned (e.g. the source of a find-similar query)
    #[serde(default)]
    pub exclude_ids: Vec<Uuid>,
}

impl SearchFilters {
    /// Filters scoped to what `viewer` may see.
    pub fn for_viewer(viewer: Uuid) -> Self {
        Self {
            viewer_id: Some(viewer),
            ..Default::default()
        }
    }

    pub fn excluding(mut self, id: Uuid) -> Self {
        self.exclude_ids.push(id);
        self
    }

    /// Whether the fragment passes the scope and attribute filters.
    ///
    /// In-memory backends call this directly; SQL backends translate the same
    /// rules into WHERE clauses.
    pub fn matches(&self, fragment: &Fragment) -> bool {
        if self.exclude_ids.contains(&fragment.id) {
            return false;
        }

        let in_scope = match self.viewer_id {
            Some(viewer) if self.owner_only => fragment.user_id == viewer,
            Some(viewer) => fragment.is_owner_or_public(viewer),
            None => fragment.visibility == Visibility::Public,
        };
        if !in_scope {
            return false;
        }

        if !self.tags.is_empty() && !overlaps_ci(&self.tags, &fragment.tags) {
            return false;
        }
        if !self.themes.is_empty() && !overlaps_ci(&self.themes, &fragment.themes) {
            return false;
        }
        if !self.emotions.is_empty() && !overlaps_ci(&self.emotions, &fragment.emotions) {
            return false;
        }
        if let Some(after) = self.created_after {
            if fragment.created_at_utc < after {
                return false;
            }
        }
        if let Some(before) = self.created_before {
            if fragment.created_at_utc > before {
                return false;
            }
        }
        true
    }
}

/// A vector similarity query.
#[derive(Debug, Clone)]
pub struct VectorQuery {
    pub vector: Vector,
    pub filters: SearchFilters,
    pub limit: i64,
    /// Exclusive lower bound on cosine similarity
    pub min_similarity: Option<f32>,
}

/// One lexical search hit, in backend rank order.
#[derive(Debug, Clone)]
pub struct LexicalHit {
    pub fragment: Fragment,
    /// Backend relevance normalized to [0, 1], when the backend has one
    pub relevance: Option<f32>,
}

/// A fragment with its retrieval score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct ScoredFragment {
    pub fragment: Fragment,
    pub score: f32,
}

/// Blend weights for hybrid retrieval.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct HybridWeights {
    pub vector: f32,
    pub fulltext: f32,
}

impl Default for HybridWeights {
    fn default() -> Self {
        Self {
            vector: defaults::HYBRID_VECTOR_WEIGHT,
            fulltext: defaults::HYBRID_FULLTEXT_WEIGHT,
        }
    }
}

impl HybridWeights {
    pub fn new(vector: f32, fulltext: f32) -> Self {
        Self { vector, fulltext }
    }

    pub fn validate(&self) -> Result<()> {
        let valid = |w: f32| w.is_finite() && w >= 0.0;
        if !valid(self.vector) || !valid(self.fulltext) {
            return Err(Error::InvalidInput(
                "hybrid weights must be finite and non-negative".to_string(),
            ));
        }
        if self.vector == 0.0 && self.fulltext == 0.0 {
            return Err(Error::InvalidInput(
                "at least one hybrid weight must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Inclusive creation-date range of a cluster's members.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct TimeSpan {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeSpan {
    /// Smallest span containing every timestamp, `None` when there are none.
    pub fn covering(times: impl IntoIterator<Item = DateTime<Utc>>) -> Option<Self> {
        times.into_iter().fold(None, |span, t| match span {
            None => Some(Self { start: t, end: t }),
            Some(s) => Some(Self {
                start: s.start.min(t),
                end: s.end.max(t),
            }),
        })
    }
}

/// A runtime grouping of search results. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct SearchCluster {
    pub id: String,
    pub title: String,
    pub description: String,
    pub fragments: Vec<ScoredFragment>,
    pub common_themes: Vec<String>,
    pub common_emotions: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_span: Option<TimeSpan>,
    pub significance: f32,
}

/// A fragment recommended to a reader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct Recommendation {
    pub fragment: Fragment,
    pub score: f32,
    pub reason: String,
}

// =============================================================================
// NORMALIZATION HELPERS
// =============================================================================

/// Lowercase, trim, and de-duplicate tags, keeping first-seen order.
pub fn normalize_tags(tags: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    tags.into_iter()
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .filter(|t| seen.insert(t.clone()))
        .collect()
}

/// Trim and de-duplicate labels case-insensitively, keeping the first casing.
pub fn normalize_labels(labels: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    labels
        .into_iter()
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty())
        .filter(|l| seen.insert(l.to_lowercase()))
        .collect()
}

/// Truncate to at most `max_chars` characters.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

fn overlaps_ci(wanted: &[String], present: &[String]) -> bool {
    wanted
        .iter()
        .any(|w| present.iter().any(|p| p.eq_ignore_ascii_case(w)))
}
