//! # Adaptive Query
//!
//! Adaptive query processing for retrieval-augmented applications. A query is
//! gated, classified, routed through a rule-based decision engine, rewritten
//! and then retrieved iteratively until the results are good enough.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use adaptive_query::prelude::*;
//!
//! # tokio_test::block_on(async {
//! let backend = FnRetriever::new(|query: String| async move {
//!     Ok(vec![ScoredResult::new(format!("notes on {query}"), 0.9, "memory")])
//! });
//! let service = AdaptiveQueryService::builder()
//!     .with_config(PipelineConfig::default())
//!     .with_retriever(Arc::new(backend))
//!     .build()
//!     .await
//!     .unwrap();
//!
//! service.start().await.unwrap();
//! let outcome = service
//!     .process_query("demo", "redis 持久化 配置", 5, ProcessOptions::default())
//!     .await
//!     .unwrap();
//! println!("{}: {} results", outcome.final_query, outcome.results.len());
//! service.stop().await.unwrap();
//! # });
//! ```
//!
//! ## Architecture
//!
//! - **adaptive-query-core**: error type, data model, component traits and
//!   configuration
//! - **adaptive-query-pipeline**: the pipeline components, the component
//!   registry and [`AdaptiveQueryService`](pipeline::service::AdaptiveQueryService)

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

use tracing_subscriber::EnvFilter;

pub use adaptive_query_core as core;
pub use adaptive_query_pipeline as pipeline;

/// Prelude module for convenient imports.
///
/// This module re-exports the most commonly used types and traits
/// from both crates.
pub mod prelude {
    pub use adaptive_query_pipeline::prelude::*;

    pub use crate::init_tracing;
}

/// Version information for the adaptive query framework.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default filter used when `RUST_LOG` is not set.
pub const DEFAULT_LOG_FILTER: &str = "adaptive_query=info,adaptive_query_pipeline=info";

/// Install a `tracing` subscriber that honors `RUST_LOG`.
///
/// Falls back to [`DEFAULT_LOG_FILTER`]. Returns `false` if a global
/// subscriber was already installed.
pub fn init_tracing() -> bool {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .is_ok();
    if installed {
        tracing::info!(version = VERSION, "Adaptive query tracing initialized");
    }
    installed
}
