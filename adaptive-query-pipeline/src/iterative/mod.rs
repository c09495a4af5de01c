//! Iterative retrieval.
//!
//! The [`IterativeRetriever`] calls the external retriever, scores the result
//! set with a [`adaptive_query_core::traits::QualityEngine`], and applies the
//! engine's best suggestion until the results are good enough.

pub mod evaluator;
pub mod retriever;

pub use evaluator::*;
pub use retriever::*;
