//! Query rewriting.
//!
//! The [`RewritePipeline`] runs [`StageProcessor`]s over a query in priority
//! order: keyword extraction, noise reduction, then context enrichment. Each
//! stage can be toggled individually.

pub mod pipeline;
pub mod stages;

// Re-export all rewrite types for convenience
pub use pipeline::*;
pub use stages::*;
