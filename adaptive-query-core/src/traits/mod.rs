//! Core traits for the adaptive query pipeline.
//!
//! These traits define the seams of the system: the component lifecycle and
//! its optional roles, and the external retrieval and state collaborators.

pub mod component;
pub mod retrieval;

// Re-export all traits for convenience
pub use component::*;
pub use retrieval::*;
