//! Per-component configuration.
//!
//! Every struct here is `serde`-loadable with defaults for missing fields, so
//! partial configuration files and hot-update patches only need to name the
//! fields they change.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use strum::{AsRefStr, Display, EnumIter, EnumString};

use crate::{AdaptiveQueryError, Result};

fn check_unit(name: &str, value: f32) -> Result<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(AdaptiveQueryError::configuration(format!(
            "{name} must be within [0, 1], got {value}"
        )))
    }
}

fn check_positive(name: &str, value: usize) -> Result<()> {
    if value == 0 {
        Err(AdaptiveQueryError::configuration(format!(
            "{name} must be greater than 0"
        )))
    } else {
        Ok(())
    }
}

/// Configuration for the intent classifier.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Whether classification is enabled.
    pub enabled: bool,
    /// Component name reported in metadata and the registry.
    pub name: String,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            name: "intent_classifier".to_string(),
        }
    }
}

impl ClassifierConfig {
    /// Enable or disable the classifier.
    #[must_use]
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(AdaptiveQueryError::configuration(
                "Classifier name cannot be empty",
            ));
        }
        Ok(())
    }
}

/// Configuration for the decision engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DecisionConfig {
    /// Whether decisions are enabled.
    pub enabled: bool,
    /// Maximum decisions kept in history.
    pub history_limit: usize,
    /// Complexity above which the scoring bonus applies.
    pub complexity_threshold: f32,
    /// Multiplier applied to rule scores for complex queries.
    pub complexity_bonus: f32,
    /// Confidence of the default decision.
    pub default_confidence: f32,
    /// Success rate above which a rule is boosted.
    pub boost_success_rate: f32,
    /// Success rate below which a rule is penalized.
    pub penalty_success_rate: f32,
    /// Weight given to boosted rules.
    pub boost_weight: f32,
    /// Weight given to penalized rules.
    pub penalty_weight: f32,
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            history_limit: 100,
            complexity_threshold: 0.7,
            complexity_bonus: 1.1,
            default_confidence: 0.6,
            boost_success_rate: 0.8,
            penalty_success_rate: 0.5,
            boost_weight: 1.2,
            penalty_weight: 0.8,
        }
    }
}

impl DecisionConfig {
    /// Enable or disable the engine.
    #[must_use]
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Set the history limit.
    #[must_use]
    pub fn with_history_limit(mut self, history_limit: usize) -> Self {
        self.history_limit = history_limit;
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        check_positive("history_limit", self.history_limit)?;
        check_unit("complexity_threshold", self.complexity_threshold)?;
        check_unit("default_confidence", self.default_confidence)?;
        check_unit("boost_success_rate", self.boost_success_rate)?;
        check_unit("penalty_success_rate", self.penalty_success_rate)?;
        if self.penalty_success_rate > self.boost_success_rate {
            return Err(AdaptiveQueryError::configuration(
                "penalty_success_rate cannot exceed boost_success_rate",
            ));
        }
        if self.complexity_bonus <= 0.0 || self.boost_weight <= 0.0 || self.penalty_weight <= 0.0 {
            return Err(AdaptiveQueryError::configuration(
                "Scoring multipliers must be positive",
            ));
        }
        Ok(())
    }
}

/// Configuration for the task planner.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PlannerConfig {
    /// Whether planning is enabled.
    pub enabled: bool,
    /// Maximum tasks allowed in one plan.
    pub max_tasks_per_plan: usize,
    /// Plan timeout in seconds.
    pub default_timeout_secs: u64,
    /// Plan retry budget.
    pub max_retries: u32,
    /// Whether rules may produce parallel plans.
    pub enable_parallel: bool,
    /// Plan cache time to live in seconds.
    pub cache_ttl_secs: u64,
    /// Maximum cached plans.
    pub cache_capacity: usize,
    /// Maximum plans kept in history.
    pub history_limit: usize,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_tasks_per_plan: 10,
            default_timeout_secs: 30,
            max_retries: 3,
            enable_parallel: true,
            cache_ttl_secs: 300,
            cache_capacity: 256,
            history_limit: 100,
        }
    }
}

impl PlannerConfig {
    /// Set the maximum number of tasks per plan.
    #[must_use]
    pub fn with_max_tasks(mut self, max_tasks_per_plan: usize) -> Self {
        self.max_tasks_per_plan = max_tasks_per_plan;
        self
    }

    /// Enable or disable parallel plans.
    #[must_use]
    pub fn with_parallel(mut self, enable_parallel: bool) -> Self {
        self.enable_parallel = enable_parallel;
        self
    }

    /// Plan cache time to live.
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        check_positive("max_tasks_per_plan", self.max_tasks_per_plan)?;
        check_positive("cache_capacity", self.cache_capacity)?;
        check_positive("history_limit", self.history_limit)?;
        if self.default_timeout_secs == 0 {
            return Err(AdaptiveQueryError::configuration(
                "default_timeout_secs must be greater than 0",
            ));
        }
        Ok(())
    }
}

/// Configuration for the iterative retriever.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct IterativeConfig {
    /// Whether iteration is enabled. When disabled a single retrieval is made.
    pub enabled: bool,
    /// Maximum retrieval iterations.
    pub max_iterations: usize,
    /// Overall score that ends the search successfully.
    pub quality_threshold: f32,
    /// Minimum gain for a search to count as improved in statistics.
    pub improvement_threshold: f32,
    /// Deadline for the whole search in milliseconds.
    pub timeout_ms: u64,
    /// Result count below which `insufficient_results` is raised.
    pub min_results_required: usize,
}

impl Default for IterativeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_iterations: 3,
            quality_threshold: 0.6,
            improvement_threshold: 0.05,
            timeout_ms: 30_000,
            min_results_required: 3,
        }
    }
}

impl IterativeConfig {
    /// Enable or disable iteration.
    #[must_use]
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Set the maximum number of iterations.
    #[must_use]
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Set the quality threshold.
    #[must_use]
    pub fn with_quality_threshold(mut self, quality_threshold: f32) -> Self {
        self.quality_threshold = quality_threshold;
        self
    }

    /// Set the search deadline.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Search deadline.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        check_positive("max_iterations", self.max_iterations)?;
        check_unit("quality_threshold", self.quality_threshold)?;
        check_unit("improvement_threshold", self.improvement_threshold)?;
        if self.timeout_ms == 0 {
            return Err(AdaptiveQueryError::configuration(
                "timeout_ms must be greater than 0",
            ));
        }
        Ok(())
    }
}

/// Rules the retrieval gate can evaluate.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
    EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum GateRuleKind {
    /// "ok", "got it", ...
    StatusConfirmation,
    /// "thanks", "great", emoji, ...
    EmotionalFeedback,
    /// Questions about the assistant itself.
    MetaQuery,
    /// "test", "ping", single characters, ...
    SimpleTest,
    /// "say again", "repeat", ...
    RepeatRequest,
    /// Very short queries that are not technical tokens.
    UltraShortQuery,
    /// Fallback that always retrieves.
    Default,
}

/// Configuration for the retrieval gate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetrievalGateConfig {
    /// Whether the gate is consulted. A disabled gate always retrieves.
    pub enabled: bool,
    /// A rule decides only when its confidence is strictly above this.
    pub confidence_threshold: f32,
    /// Enabled rules. Evaluation order is by rule priority.
    pub rules: Vec<GateRuleKind>,
}

impl Default for RetrievalGateConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            confidence_threshold: 0.6,
            rules: vec![
                GateRuleKind::StatusConfirmation,
                GateRuleKind::EmotionalFeedback,
                GateRuleKind::MetaQuery,
                GateRuleKind::SimpleTest,
                GateRuleKind::RepeatRequest,
                GateRuleKind::UltraShortQuery,
                GateRuleKind::Default,
            ],
        }
    }
}

impl RetrievalGateConfig {
    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        check_unit("confidence_threshold", self.confidence_threshold)
    }
}

/// Configuration for the component registry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RegistryConfig {
    /// Health poll interval in seconds.
    pub health_check_interval_secs: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            health_check_interval_secs: 30,
        }
    }
}

impl RegistryConfig {
    /// Health poll interval.
    pub fn health_check_interval(&self) -> Duration {
        Duration::from_secs(self.health_check_interval_secs)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.health_check_interval_secs == 0 {
            return Err(AdaptiveQueryError::configuration(
                "health_check_interval_secs must be greater than 0",
            ));
        }
        Ok(())
    }
}

/// Configuration for the query service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServiceConfig {
    /// Service name used in logs.
    pub name: String,
    /// When disabled the service rewrites and retrieves without classification.
    pub adaptive: bool,
    /// Whether decision task hints add intent and domain terms to the query.
    pub apply_task_hints: bool,
    /// Complexity above which the result limit is raised.
    pub complexity_threshold: f32,
    /// Multiplier applied to the limit for complex queries.
    pub complex_limit_factor: f32,
    /// Limit used when the caller passes zero.
    pub default_limit: usize,
    /// Maximum entries in the performance history.
    pub history_limit: usize,
    /// Recent queries kept per session.
    pub session_window: usize,
    /// Maximum tracked sessions.
    pub max_sessions: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "adaptive_query_service".to_string(),
            adaptive: true,
            apply_task_hints: true,
            complexity_threshold: 0.7,
            complex_limit_factor: 1.5,
            default_limit: 10,
            history_limit: 100,
            session_window: 10,
            max_sessions: 1000,
        }
    }
}

impl ServiceConfig {
    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        check_unit("complexity_threshold", self.complexity_threshold)?;
        check_positive("default_limit", self.default_limit)?;
        check_positive("history_limit", self.history_limit)?;
        check_positive("session_window", self.session_window)?;
        check_positive("max_sessions", self.max_sessions)?;
        if self.complex_limit_factor < 1.0 {
            return Err(AdaptiveQueryError::configuration(
                "complex_limit_factor must be at least 1.0",
            ));
        }
        Ok(())
    }
}
