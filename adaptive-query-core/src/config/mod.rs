//! Configuration types for the adaptive query pipeline.
//!
//! Each pluggable stage has its own serializable, validatable configuration.
//! [`PipelineConfig`] aggregates them and handles layered loading.

pub mod components;
pub mod flags;
pub mod pipeline;
pub mod rewrite;

// Re-export all config types for convenience
pub use components::*;
pub use flags::*;
pub use pipeline::*;
pub use rewrite::*;
