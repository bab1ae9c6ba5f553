//! # livlib-jobs
//!
//! Background analysis for newly written fragments.
//!
//! This crate provides:
//! - Claiming of PROCESSING fragments with `FOR UPDATE SKIP LOCKED`
//! - Embedding and theme/emotion classification under a provider timeout
//! - Link recomputation once a fragment is READY
//! - Bounded retries, after which a fragment is marked FAILED
//!
//! ## Example
//!
//! ```ignore
//! use livlib_jobs::{AnalysisWorker, FragmentAnalyzer, WorkerConfig};
//!
//! let analyzer = FragmentAnalyzer::new(fragments.clone(), embedder, classifier, linker);
//! let handle = AnalysisWorker::new(fragments, analyzer, WorkerConfig::from_env()).start();
//!
//! let mut events = handle.events();
//! while let Ok(event) = events.recv().await {
//!     println!("Event: {:?}", event);
//! }
//!
//! handle.shutdown().await?;
//! ```

pub mod analyzer;
pub mod worker;

pub use analyzer::{AnalysisOutcome, FragmentAnalyzer};
pub use worker::{AnalysisWorker, WorkerConfig, WorkerEvent, WorkerHandle};
