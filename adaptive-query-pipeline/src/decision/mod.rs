//! Rule-based strategy selection.
//!
//! A [`DecisionEngine`] holds an ordered set of [`DecisionRule`]s. Each rule
//! pairs a condition on the classified intent with an action that builds a
//! coarse task plan and names the strategies to apply.

pub mod engine;
pub mod rules;

// Re-export the main types for convenience
pub use engine::*;
pub use rules::*;
