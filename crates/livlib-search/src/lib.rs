//! # livlib-search
//!
//! Retrieval and relationship building for the Living Library.
//!
//! This crate provides:
//! - Hybrid search blending pgvector similarity with full-text relevance,
//!   degrading to a single method when the other fails
//! - Runtime clustering of search results by dominant theme
//! - Link materialization (semantic, shared tag, time window, location)
//! - Find-similar, advanced search and recommendations
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use livlib_search::{HybridSearchCoordinator, SearchFilters};
//!
//! let hybrid = HybridSearchCoordinator::new(embedder, db.vectors.clone(), db.text.clone());
//! let response = hybrid
//!     .search("walks by the river", &SearchFilters::for_viewer(user_id), 20)
//!     .await?;
//! for hit in response.results {
//!     println!("{:.3} {}", hit.score, hit.fragment.title);
//! }
//! ```

pub mod access;
pub mod advanced;
pub mod clustering;
pub mod hybrid;
pub mod linking;
pub mod recommendation;
pub mod rules;
pub mod service;

// Re-export core types
pub use livlib_core::*;

pub use advanced::{
    AdvancedSearchOptions, AdvancedSearchResponse, LabelCount, SearchAnalytics,
};
pub use clustering::{cluster_results, ClusteringResult};
pub use hybrid::{
    merge_results, HybridResponse, HybridSearchConfig, HybridSearchCoordinator, LexicalScoring,
    RetrievalMode,
};
pub use linking::{LinkMaterializer, LinkingConfig, RecomputeOutcome};
pub use recommendation::{LiveRecommender, RecommendationSource};
pub use rules::evaluate_rules;
pub use service::SearchService;
