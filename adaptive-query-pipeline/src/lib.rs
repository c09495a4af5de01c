//! Adaptive query processing pipeline.
//!
//! This crate implements every stage of the adaptive query pipeline on top of
//! the traits in `adaptive-query-core`:
//!
//! - **Retrieval gate**: skips retrieval for acknowledgements, meta questions
//!   and other queries that need no external context
//! - **Intent classifier**: buckets a query by intent and domain and scores
//!   its complexity
//! - **Decision engine**: picks a processing strategy from priority-ordered
//!   rules and learns rule weights from feedback
//! - **Task planner**: turns an intent into a validated task plan
//! - **Rewrite pipeline**: keyword extraction, noise removal and query
//!   restructuring
//! - **Iterative retriever**: retrieves, scores and refines until the results
//!   are good enough
//! - **Component registry**: lifecycle, capability lookup and health
//!   monitoring for pluggable components
//!
//! # Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use adaptive_query_core::traits::FnRetriever;
//! use adaptive_query_core::types::ScoredResult;
//! use adaptive_query_pipeline::prelude::*;
//!
//! # tokio_test::block_on(async {
//! let backend = FnRetriever::new(|query: String| async move {
//!     Ok(vec![ScoredResult::new(format!("about {query}"), 0.9, "memory")])
//! });
//! let service = AdaptiveQueryService::builder()
//!     .with_retriever(Arc::new(backend))
//!     .build()
//!     .await
//!     .unwrap();
//! service.start().await.unwrap();
//!
//! let outcome = service
//!     .process_query("session", "如何配置nginx反向代理", 5, ProcessOptions::default())
//!     .await
//!     .unwrap();
//! println!("{} -> {} results", outcome.final_query, outcome.results.len());
//! service.stop().await.unwrap();
//! # });
//! ```
//!
//! # Architecture
//!
//! ```text
//! Query → Gate ─(skip)→ empty outcome
//!           ↓
//!       Context → Classifier → Decision → Planner
//!           ↓
//!       Rewrite → task hints → Iterative retriever ⇄ ContextRetriever
//!           ↓
//!       Stats, session context, StateStore
//! ```

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod classifier;
pub mod context;
pub mod decision;
pub mod gate;
pub mod iterative;
pub mod planner;
pub mod registry;
pub mod rewrite;
pub mod service;
pub mod utils;

/// Re-export commonly used types and traits.
pub mod prelude {
    pub use crate::classifier::{ClassifierStats, IntentClassifier};
    pub use crate::context::{SessionContextLayer, SessionLimits};
    pub use crate::decision::{DecisionEngine, DecisionRule, DecisionStats, RuleCondition};
    pub use crate::gate::{GateDecision, RetrievalGate};
    pub use crate::iterative::{IterativeRetriever, IterativeStats, QualityEvaluator};
    pub use crate::planner::{PlannerStats, TaskPlanner};
    pub use crate::registry::{ComponentInfo, ComponentRegistry, HealthMonitor};
    pub use crate::rewrite::{RewritePipeline, RewriteStats};
    pub use crate::service::{
        AdaptiveQueryService, AdaptiveQueryServiceBuilder, PipelineStats, ProcessOptions,
        QueryOutcome, ServiceStats,
    };

    pub use adaptive_query_core::prelude::*;
}

/// Crate version, reported by every built-in component.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name.
pub const NAME: &str = env!("CARGO_PKG_NAME");
