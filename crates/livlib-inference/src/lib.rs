//! # livlib-inference
//!
//! Embedding and classification providers for the fragment pipeline.
//!
//! This crate provides:
//! - An OpenAI-compatible backend implementing both
//!   [`EmbeddingBackend`](livlib_core::EmbeddingBackend) and
//!   [`ContentClassifier`](livlib_core::ContentClassifier)
//! - Classifier prompt and reply parsing
//! - A deterministic mock backend (feature `mock`)
//!
//! # Example
//!
//! ```rust,no_run
//! use livlib_inference::OpenAIBackend;
//! use livlib_core::EmbeddingBackend;
//!
//! #[tokio::main]
//! async fn main() {
//!     let backend = OpenAIBackend::from_env().unwrap();
//!     let texts = vec!["A quiet morning by the lake".to_string()];
//!     let embeddings = backend.embed_texts(&texts).await.unwrap();
//! }
//! ```

pub mod classify;
pub mod openai;

// Mock inference backend for testing
#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use openai::{OpenAIBackend, OpenAIConfig};
