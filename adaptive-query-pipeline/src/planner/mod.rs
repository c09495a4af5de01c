//! Task planning.
//!
//! Turns a classified intent into a [`TaskPlan`](adaptive_query_core::types::TaskPlan)
//! by scoring planning rules and instantiating their task templates.

pub mod cache;
pub mod task_planner;
pub mod templates;

// Re-export the planner types for convenience
pub use cache::*;
pub use task_planner::*;
pub use templates::*;
