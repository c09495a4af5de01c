//! Pluggable component traits.
//!
//! Every component hosted by the registry implements [`Component`], the
//! minimal lifecycle surface. Components may additionally play one or more
//! roles (intent analyzer, strategy selector, ...). Roles are exposed through
//! the `as_*` accessors, which the registry inspects once at registration
//! time and caches.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use strum::{AsRefStr, Display, EnumIter, EnumString};

use crate::types::{
    ComponentHealth, Feedback, ImprovementSuggestion, ProcessingDecision, QualityAssessment,
    QueryContext, QueryIntent, RewriteResult, ScoredResult,
};
use crate::{Domain, Result};

/// Free-form configuration handed to [`Component::initialize`].
pub type ComponentConfig = HashMap<String, serde_json::Value>;

/// Optional roles a component can play.
///
/// The declaration order is the start order used by the registry.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
    EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Capability {
    /// Builds per-session context.
    ContextLayer,
    /// Classifies queries.
    IntentAnalyzer,
    /// Chooses a processing strategy.
    StrategySelector,
    /// Rewrites queries.
    RewriteStrategy,
    /// Scores retrieval results.
    QualityEngine,
    /// Learns from feedback.
    FeedbackLearner,
}

/// Minimal lifecycle surface of a pluggable component.
#[async_trait]
pub trait Component: Send + Sync + std::fmt::Debug {
    /// Unique component name.
    fn name(&self) -> &str;

    /// Component version.
    fn version(&self) -> &str;

    /// Apply a configuration. Called again on hot updates.
    async fn initialize(&self, config: &ComponentConfig) -> Result<()>;

    /// Start the component.
    async fn start(&self) -> Result<()>;

    /// Stop the component.
    async fn stop(&self) -> Result<()>;

    /// Report current health.
    async fn health_check(&self) -> ComponentHealth;

    /// Intent analyzer role.
    fn as_intent_analyzer(self: Arc<Self>) -> Option<Arc<dyn IntentAnalyzer>> {
        None
    }

    /// Strategy selector role.
    fn as_strategy_selector(self: Arc<Self>) -> Option<Arc<dyn StrategySelector>> {
        None
    }

    /// Context layer role.
    fn as_context_layer(self: Arc<Self>) -> Option<Arc<dyn ContextLayer>> {
        None
    }

    /// Rewrite strategy role.
    fn as_rewrite_strategy(self: Arc<Self>) -> Option<Arc<dyn RewriteStrategy>> {
        None
    }

    /// Quality engine role.
    fn as_quality_engine(self: Arc<Self>) -> Option<Arc<dyn QualityEngine>> {
        None
    }

    /// Feedback learner role.
    fn as_feedback_learner(self: Arc<Self>) -> Option<Arc<dyn FeedbackLearner>> {
        None
    }
}

/// Maps raw query text to a [`QueryIntent`].
#[async_trait]
pub trait IntentAnalyzer: Send + Sync {
    /// Classify a query.
    async fn analyze(&self, query: &str) -> Result<QueryIntent>;
}

/// Chooses a processing strategy for an intent.
#[async_trait]
pub trait StrategySelector: Send + Sync {
    /// Produce a decision for an intent.
    async fn decide(&self, intent: &QueryIntent) -> Result<ProcessingDecision>;
}

/// Builds and updates per-session context.
#[async_trait]
pub trait ContextLayer: Send + Sync {
    /// Context for the next query of a session.
    async fn build_context(&self, session_id: &str, query: &str) -> Result<QueryContext>;

    /// Remember a processed query.
    async fn record(&self, session_id: &str, query: &str, domain: Option<Domain>) -> Result<()>;
}

/// Rewrites a query to improve retrieval.
#[async_trait]
pub trait RewriteStrategy: Send + Sync {
    /// Rewrite a query.
    async fn rewrite(&self, query: &str) -> Result<RewriteResult>;
}

/// Scores retrieval results and proposes improvements.
#[async_trait]
pub trait QualityEngine: Send + Sync {
    /// Assess a result set for a query.
    async fn assess(&self, query: &str, results: &[ScoredResult]) -> QualityAssessment;

    /// Improvement suggestions for an assessment, unordered.
    fn suggest(&self, assessment: &QualityAssessment) -> Vec<ImprovementSuggestion>;

    /// Whether another iteration is worthwhile. `iteration` is zero based.
    async fn should_continue(&self, assessment: &QualityAssessment, iteration: usize) -> bool;
}

/// Consumes feedback about past decisions.
#[async_trait]
pub trait FeedbackLearner: Send + Sync {
    /// Record feedback.
    async fn record_feedback(&self, feedback: &Feedback) -> Result<()>;
}

/// Roles detected on a component.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Capabilities(Vec<Capability>);

impl Capabilities {
    /// Inspect a component once and collect the roles it plays.
    pub fn detect<C: Component + ?Sized>(component: &Arc<C>) -> Self {
        let mut caps = Vec::new();
        if Arc::clone(component).as_context_layer().is_some() {
            caps.push(Capability::ContextLayer);
        }
        if Arc::clone(component).as_intent_analyzer().is_some() {
            caps.push(Capability::IntentAnalyzer);
        }
        if Arc::clone(component).as_strategy_selector().is_some() {
            caps.push(Capability::StrategySelector);
        }
        if Arc::clone(component).as_rewrite_strategy().is_some() {
            caps.push(Capability::RewriteStrategy);
        }
        if Arc::clone(component).as_quality_engine().is_some() {
            caps.push(Capability::QualityEngine);
        }
        if Arc::clone(component).as_feedback_learner().is_some() {
            caps.push(Capability::FeedbackLearner);
        }
        Self(caps)
    }

    /// Whether the component plays `capability`.
    pub fn contains(&self, capability: Capability) -> bool {
        self.0.contains(&capability)
    }

    /// The highest-priority role, `None` for generic components.
    pub fn primary(&self) -> Option<Capability> {
        self.0.iter().min().copied()
    }

    /// Whether no role was detected.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over detected roles in start order.
    pub fn iter(&self) -> impl Iterator<Item = Capability> + '_ {
        self.0.iter().copied()
    }
}
