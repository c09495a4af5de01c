//! # Adaptive Query Core
//!
//! Core traits, types, and configuration for the adaptive query pipeline.
//!
//! The pipeline sits between a user's natural-language query and an opaque
//! retrieval backend. This crate holds everything the stages share:
//!
//! - **Data model**: `QueryIntent`, `ProcessingDecision`, `TaskPlan`,
//!   `RewriteResult`, `QualityAssessment`, `ComponentHealth`
//! - **Traits**: the `Component` lifecycle, its optional roles, and the
//!   retrieval and state-store collaborators
//! - **Configuration**: per-stage configuration with validation, layered
//!   file and environment loading, hot-update merging, and feature flags
//! - **Error handling**: a single error type with retry classification
//!
//! ## Quick Start
//!
//! ```rust
//! use adaptive_query_core::prelude::*;
//!
//! let intent = QueryIntent::new("why does my api fail", IntentType::Debugging, Domain::Backend)
//!     .with_complexity(0.4);
//! assert!(!intent.is_complex(0.7));
//!
//! let config = PipelineConfig::default();
//! assert!(config.validate().is_ok());
//! ```
//!
//! ## Architecture
//!
//! Components implement [`traits::Component`] and opt into roles by
//! overriding its `as_*` accessors. The registry inspects those accessors once
//! and caches the result, so a component may play several roles.

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Re-export commonly used types and traits
pub mod prelude;

// Core modules
pub mod config;
pub mod error;
pub mod traits;
pub mod types;

// Re-export key types at crate root for convenience
pub use error::{AdaptiveQueryError, Result};
pub use types::{
    Domain, IntentType, ProcessingDecision, QualityAssessment, QueryIntent, RewriteResult,
    ScoredResult, TaskPlan,
};

// Re-export traits for convenience
pub use traits::*;

/// Version information for the core library.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Name of the core library.
pub const NAME: &str = env!("CARGO_PKG_NAME");
