//! Pluggable component hosting.
//!
//! The [`ComponentRegistry`] owns the lifecycle of every registered
//! [`adaptive_query_core::traits::Component`] and runs a [`HealthMonitor`]
//! while the components are started.

pub mod component_registry;
pub mod health;

// Re-export the main types for convenience
pub use component_registry::*;
pub use health::*;
