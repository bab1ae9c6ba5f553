//! # livlib-core
//!
//! Core types, traits, and abstractions for the Living Library fragment
//! pipeline.
//!
//! This crate provides the entities (fragments, links, clusters), the error
//! taxonomy, the repository and provider traits that concrete backends
//! implement, and the cosine similarity engine every other crate builds on.

pub mod defaults;
pub mod error;
pub mod models;
pub mod similarity;
pub mod traits;
pub mod uuid_utils;

// Re-export commonly used types at crate root
pub use error::{Error, Result};
pub use models::*;
pub use similarity::{cosine_similarity, rank_by_similarity};
pub use traits::*;
pub use uuid_utils::new_v7;
