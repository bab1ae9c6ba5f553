//! Centralized default constants for the Living Library pipeline.
//!
//! Every crate references these constants instead of defining its own magic
//! numbers. Environment-driven config structs fall back to these values.

// =============================================================================
// FRAGMENTS
// =============================================================================

/// Maximum fragment title length in characters.
pub const TITLE_MAX_CHARS: usize = 80;

/// Maximum tag length in characters.
pub const TAG_MAX_CHARS: usize = 64;

// =============================================================================
// EMBEDDING
// =============================================================================

/// Default embedding model name (OpenAI-compatible endpoint).
pub const EMBED_MODEL: &str = "text-embedding-3-small";

/// Default embedding vector dimension for text-embedding-3-small.
pub const EMBED_DIMENSION: usize = 1536;

/// Maximum characters sent to the embedding provider per document.
pub const EMBED_MAX_CHARS: usize = 8000;

/// Default classification model name.
pub const GEN_MODEL: &str = "gpt-4o-mini";

/// Upper bound for a single embedding or classification call, in seconds.
pub const PROVIDER_TIMEOUT_SECS: u64 = 30;

// =============================================================================
// HYBRID SEARCH
// =============================================================================

/// Blend weight applied to vector similarity scores.
pub const HYBRID_VECTOR_WEIGHT: f32 = 0.7;

/// Blend weight applied to lexical relevance scores.
pub const HYBRID_FULLTEXT_WEIGHT: f32 = 0.3;

/// Each retrieval method fetches `limit * multiplier` candidates before merging.
pub const SEARCH_CANDIDATE_MULTIPLIER: i64 = 2;

/// Default page size for search endpoints.
pub const PAGE_LIMIT_SEARCH: i64 = 20;

/// Hard cap on requested search page size.
pub const PAGE_LIMIT_MAX: i64 = 100;

/// Default number of neighbours returned by find-similar.
pub const SIMILAR_LIMIT: i64 = 10;

// =============================================================================
// CLUSTERING
// =============================================================================

/// Result sets smaller than this are never clustered.
pub const CLUSTER_MIN_RESULTS: usize = 3;

/// Minimum members for a bucket to become a cluster.
pub const CLUSTER_MIN_MEMBERS: usize = 2;

/// Number of common themes/emotions reported per cluster.
pub const CLUSTER_COMMON_LIMIT: usize = 3;

/// Member count at which the size factor of significance saturates.
pub const CLUSTER_SIZE_SATURATION: f32 = 10.0;

/// Label of the cluster bucket for fragments without themes.
pub const GENERAL_BUCKET: &str = "general";

// =============================================================================
// LINKING
// =============================================================================

/// Minimum cosine similarity (exclusive) for a SEMANTIC link.
pub const SEMANTIC_LINK_THRESHOLD: f32 = 0.75;

/// Maximum SEMANTIC links created per fragment.
pub const SEMANTIC_LINK_TOP_K: i64 = 10;

/// Window for SAME_TIMEWINDOW links, in days.
pub const LINK_TIME_WINDOW_DAYS: i64 = 7;

// =============================================================================
// BACKGROUND ANALYSIS
// =============================================================================

/// Attempts before a fragment stuck in PROCESSING is marked FAILED.
pub const ANALYSIS_MAX_ATTEMPTS: i32 = 3;

/// Poll interval of the analysis worker when the queue is empty.
pub const ANALYSIS_POLL_INTERVAL_MS: u64 = 5_000;

/// Maximum fragments analysed concurrently per worker.
pub const ANALYSIS_MAX_CONCURRENT: usize = 4;

/// Seconds before an attempted fragment may be claimed again.
pub const ANALYSIS_CLAIM_LEASE_SECS: i64 = 300;

/// Failure reason for fragments whose final attempt never reported back.
pub const ANALYSIS_ABANDONED_REASON: &str = "analysis abandoned";

/// Capacity of the worker event broadcast channel.
pub const EVENT_BUS_CAPACITY: usize = 256;

// =============================================================================
// RECOMMENDATIONS
// =============================================================================

/// Number of recent fragments used to build a user's taste centroid.
pub const RECOMMENDATION_SEED_LIMIT: i64 = 10;

/// Default number of recommendations returned.
pub const RECOMMENDATION_LIMIT: i64 = 10;

// =============================================================================
// SERVER
// =============================================================================

/// Default HTTP port.
pub const SERVER_PORT: u16 = 3000;

/// Header carrying the caller identity asserted by the upstream gateway.
pub const USER_ID_HEADER: &str = "x-user-id";
