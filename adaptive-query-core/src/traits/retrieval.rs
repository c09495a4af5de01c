//! Seams to the external retrieval and persistence collaborators.
//!
//! The pipeline never inspects how retrieval works. It calls
//! [`ContextRetriever::retrieve`] with a query string and scores whatever comes
//! back.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;

use crate::types::{ScoredResult, TerminationReason};
use crate::{Domain, IntentType, Result};

/// The external retrieval collaborator.
///
/// # Examples
///
/// ```rust
/// use adaptive_query_core::traits::{ContextRetriever, FnRetriever};
/// use adaptive_query_core::types::ScoredResult;
///
/// # tokio_test::block_on(async {
/// let retriever = FnRetriever::new(|query: String| async move {
///     Ok(vec![ScoredResult::new(format!("doc about {query}"), 0.9, "memory")])
/// });
/// let results = retriever.retrieve("rust").await.unwrap();
/// assert_eq!(results.len(), 1);
/// # });
/// ```
#[async_trait]
pub trait ContextRetriever: Send + Sync {
    /// Retrieve scored results for a query.
    async fn retrieve(&self, query: &str) -> Result<Vec<ScoredResult>>;

    /// Retriever name used in logs.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// Adapts an async closure into a [`ContextRetriever`].
pub struct FnRetriever<F> {
    f: F,
}

impl<F> FnRetriever<F> {
    /// Wrap a closure.
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F> std::fmt::Debug for FnRetriever<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnRetriever").finish_non_exhaustive()
    }
}

#[async_trait]
impl<F, Fut> ContextRetriever for FnRetriever<F>
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Vec<ScoredResult>>> + Send + 'static,
{
    async fn retrieve(&self, query: &str) -> Result<Vec<ScoredResult>> {
        (self.f)(query.to_string()).await
    }

    fn name(&self) -> &'static str {
        "fn_retriever"
    }
}

/// Summary of one processed query handed to the state store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryRecord {
    /// Session the query belongs to.
    pub session_id: String,
    /// Query as received.
    pub query: String,
    /// Query used for the final retrieval.
    pub final_query: String,
    /// Intent bucket, if classification succeeded.
    pub intent_type: Option<IntentType>,
    /// Domain, if classification succeeded.
    pub domain: Option<Domain>,
    /// Decision id, if a decision was made.
    pub decision_id: Option<String>,
    /// Overall quality of the returned results.
    pub overall_score: f32,
    /// Number of results returned.
    pub result_count: usize,
    /// Why the retrieval loop stopped, `None` when retrieval was skipped.
    pub termination_reason: Option<TerminationReason>,
    /// When the query finished.
    pub timestamp: DateTime<Utc>,
}

/// The external session persistence collaborator.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Persist a processed query.
    async fn store_state(&self, record: &QueryRecord) -> Result<()>;
}
