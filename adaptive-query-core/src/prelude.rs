//! Prelude module for convenient imports.
//!
//! ```rust
//! use adaptive_query_core::prelude::*;
//! ```

pub use crate::config::{
    ClassifierConfig, DecisionConfig, FeatureFlags, IterativeConfig, PipelineConfig,
    PlannerConfig, RegistryConfig, RetrievalGateConfig, RewriteConfig, ServiceConfig,
};
pub use crate::error::{AdaptiveQueryError, Result};
pub use crate::traits::{
    Capability, Component, ComponentConfig, ContextLayer, ContextRetriever, FeedbackLearner,
    FnRetriever, IntentAnalyzer, QualityEngine, QueryRecord, RewriteStrategy, StateStore,
    StrategySelector,
};
pub use crate::types::{
    ComponentHealth, Domain, Entity, Feedback, HealthStatus, ImprovementSuggestion, IntentType,
    IterativeSearchResult, Keyword, ProcessingDecision, QualityAssessment, QueryContext,
    QueryIntent, RewriteResult, ScoredResult, Task, TaskPlan, TaskType, TerminationReason,
};
