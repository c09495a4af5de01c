//! Core data types for the adaptive query pipeline.
//!
//! This module contains the data model shared by every stage: query intents,
//! decisions and task plans, rewrite results, retrieval quality assessments,
//! and component health.

pub mod decision;
pub mod health;
pub mod intent;
pub mod retrieval;
pub mod rewrite;

// Re-export all types for convenience
pub use decision::*;
pub use health::*;
pub use intent::*;
pub use retrieval::*;
pub use rewrite::*;
