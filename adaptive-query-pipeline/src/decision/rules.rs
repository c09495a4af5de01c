//! Decision rules.
//!
//! A rule pairs a condition on the intent with an action that builds the task
//! plan and strategy list. Conditions are a closed set of common checks plus a
//! closure escape hatch; actions are closures so callers can register their
//! own rules next to the built-in ones.

use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

use adaptive_query_core::types::{Domain, IntentType, QueryIntent, Task, TaskPlan, TaskType};
use adaptive_query_core::{AdaptiveQueryError, Result};

/// Predicate used by [`RuleCondition::Custom`].
pub type RulePredicate = Arc<dyn Fn(&QueryIntent) -> bool + Send + Sync>;

/// Action that turns a matching intent into a plan.
pub type RuleAction = Arc<dyn Fn(&QueryIntent) -> Result<RuleOutcome> + Send + Sync>;

/// When a rule applies.
#[derive(Clone)]
pub enum RuleCondition {
    /// The intent bucket equals the given one.
    IntentIs(IntentType),
    /// The domain equals the given one.
    DomainIs(Domain),
    /// Complexity is strictly above the threshold.
    ComplexityAbove(f32),
    /// Arbitrary predicate.
    Custom(RulePredicate),
}

impl RuleCondition {
    /// Evaluate the condition.
    pub fn matches(&self, intent: &QueryIntent) -> bool {
        match self {
            Self::IntentIs(expected) => intent.intent_type == *expected,
            Self::DomainIs(expected) => intent.domain == *expected,
            Self::ComplexityAbove(threshold) => intent.complexity > *threshold,
            Self::Custom(predicate) => predicate(intent),
        }
    }
}

impl fmt::Debug for RuleCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IntentIs(intent) => f.debug_tuple("IntentIs").field(intent).finish(),
            Self::DomainIs(domain) => f.debug_tuple("DomainIs").field(domain).finish(),
            Self::ComplexityAbove(t) => f.debug_tuple("ComplexityAbove").field(t).finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// What a rule action produces.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleOutcome {
    /// Plan to execute.
    pub task_plan: TaskPlan,
    /// Strategy names.
    pub selected_strategies: Vec<String>,
}

/// A named `(condition, action, priority, confidence)` tuple.
#[derive(Clone)]
pub struct DecisionRule {
    /// Unique rule id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// What the rule is for.
    pub description: String,
    /// Base priority in `[0, 1]`.
    pub priority: f32,
    /// Confidence attached to decisions made by this rule.
    pub confidence: f32,
    /// When the rule applies.
    pub condition: RuleCondition,
    action: RuleAction,
}

impl fmt::Debug for DecisionRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecisionRule")
            .field("id", &self.id)
            .field("priority", &self.priority)
            .field("confidence", &self.confidence)
            .field("condition", &self.condition)
            .finish_non_exhaustive()
    }
}

impl DecisionRule {
    /// Create a rule.
    pub fn new<S, F>(id: S, priority: f32, confidence: f32, condition: RuleCondition, action: F) -> Self
    where
        S: Into<String>,
        F: Fn(&QueryIntent) -> Result<RuleOutcome> + Send + Sync + 'static,
    {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            description: String::new(),
            priority,
            confidence,
            condition,
            action: Arc::new(action),
        }
    }

    /// Set the display name.
    #[must_use]
    pub fn with_name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = name.into();
        self
    }

    /// Set the description.
    #[must_use]
    pub fn with_description<S: Into<String>>(mut self, description: S) -> Self {
        self.description = description.into();
        self
    }

    /// Whether the rule applies to an intent.
    pub fn matches(&self, intent: &QueryIntent) -> bool {
        self.condition.matches(intent)
    }

    /// Base score before adaptive weighting.
    pub fn base_score(&self) -> f32 {
        self.priority * self.confidence
    }

    /// Run the action. Plans without tasks are rejected.
    pub fn build(&self, intent: &QueryIntent) -> Result<RuleOutcome> {
        let outcome = (self.action)(intent)?;
        if outcome.task_plan.is_empty() {
            return Err(AdaptiveQueryError::invalid_plan(format!(
                "rule {} produced a plan without tasks",
                self.id
            )));
        }
        Ok(outcome)
    }
}

/// Plan settings shared by the built-in rules.
struct PlanShape {
    parallel: bool,
    max_retries: u32,
    timeout_seconds: u64,
    priority: u32,
}

fn plan(tasks: Vec<Task>, shape: &PlanShape) -> TaskPlan {
    let mut plan = TaskPlan::new(format!("plan_{}", Uuid::new_v4()), tasks);
    plan.parallel = shape.parallel;
    plan.max_retries = shape.max_retries;
    plan.timeout_seconds = shape.timeout_seconds;
    plan.priority = shape.priority;
    plan
}

fn outcome(tasks: Vec<Task>, shape: &PlanShape, strategies: &[&str]) -> RuleOutcome {
    RuleOutcome {
        task_plan: plan(tasks, shape),
        selected_strategies: strategies.iter().map(ToString::to_string).collect(),
    }
}

fn enhance(id: &str, priority: u32) -> Task {
    Task::new(id, TaskType::Enhance, "semantic_enhancer", priority)
}

fn filter(id: &str, priority: u32) -> Task {
    Task::new(id, TaskType::Filter, "noise_filter", priority)
}

fn adapt(id: &str, priority: u32) -> Task {
    Task::new(id, TaskType::Adapt, "domain_adapter", priority)
}

/// Decision used when no rule applies or the chosen rule fails.
pub fn default_outcome() -> RuleOutcome {
    outcome(
        vec![enhance("default_task_1", 1).with_parameter("strategy", "basic")],
        &PlanShape {
            parallel: false,
            max_retries: 3,
            timeout_seconds: 30,
            priority: 1,
        },
        &["basic_enhancement"],
    )
}

/// The built-in rule set, in tie-break order.
pub fn builtin_rules() -> Vec<DecisionRule> {
    vec![
        DecisionRule::new(
            "debug_rule",
            0.9,
            0.8,
            RuleCondition::IntentIs(IntentType::Debugging),
            |_| {
                Ok(outcome(
                    vec![
                        enhance("debug_enhance", 1)
                            .with_parameter("strategy", "debug_focused")
                            .with_parameter("priority", "high"),
                        filter("debug_filter", 2).with_parameter("strategy", "debug_noise_removal"),
                    ],
                    &PlanShape {
                        parallel: false,
                        max_retries: 2,
                        timeout_seconds: 20,
                        priority: 2,
                    },
                    &["debug_enhancement", "error_analysis"],
                ))
            },
        )
        .with_name("Debugging")
        .with_description("Error-focused enhancement followed by debug noise removal"),
        DecisionRule::new(
            "procedural_rule",
            0.8,
            0.7,
            RuleCondition::IntentIs(IntentType::Procedural),
            |_| {
                Ok(outcome(
                    vec![
                        enhance("step_enhance", 1)
                            .with_parameter("strategy", "step_by_step")
                            .with_parameter("detail_level", "high"),
                        adapt("procedure_adapt", 2).with_parameter("focus", "procedural_knowledge"),
                    ],
                    &PlanShape {
                        parallel: true,
                        max_retries: 3,
                        timeout_seconds: 25,
                        priority: 1,
                    },
                    &["step_enhancement", "tutorial_search"],
                ))
            },
        )
        .with_name("Procedural")
        .with_description("Step-by-step enhancement with procedural adaptation"),
        DecisionRule::new(
            "conceptual_rule",
            0.7,
            0.6,
            RuleCondition::IntentIs(IntentType::Conceptual),
            |_| {
                Ok(outcome(
                    vec![
                        enhance("concept_enhance", 1)
                            .with_parameter("strategy", "conceptual_expansion"),
                        adapt("theory_adapt", 2).with_parameter("focus", "theoretical_knowledge"),
                    ],
                    &PlanShape {
                        parallel: true,
                        max_retries: 2,
                        timeout_seconds: 30,
                        priority: 1,
                    },
                    &["concept_enhancement", "definition_search"],
                ))
            },
        )
        .with_name("Conceptual")
        .with_description("Concept expansion with theoretical adaptation"),
        DecisionRule::new(
            "technical_rule",
            0.6,
            0.5,
            RuleCondition::IntentIs(IntentType::Technical),
            |intent| {
                Ok(outcome(
                    vec![
                        enhance("tech_enhance", 1).with_parameter("strategy", "technical_terms"),
                        adapt("tech_adapt", 2).with_parameter("domain", intent.domain.as_ref()),
                    ],
                    &PlanShape {
                        parallel: true,
                        max_retries: 3,
                        timeout_seconds: 35,
                        priority: 1,
                    },
                    &["technical_enhancement", "implementation_search"],
                ))
            },
        )
        .with_name("Technical")
        .with_description("Technical term enhancement adapted to the query domain"),
        DecisionRule::new(
            "complex_rule",
            0.95,
            0.85,
            RuleCondition::ComplexityAbove(0.7),
            |_| {
                Ok(outcome(
                    vec![
                        enhance("complex_enhance", 1)
                            .with_parameter("strategy", "comprehensive")
                            .with_parameter("depth", "high"),
                        filter("complex_filter", 2)
                            .with_parameter("strategy", "advanced_noise_removal"),
                        adapt("complex_adapt", 3)
                            .with_parameter("multi_domain", true)
                            .with_parameter("depth", "high"),
                    ],
                    &PlanShape {
                        parallel: false,
                        max_retries: 3,
                        timeout_seconds: 45,
                        priority: 3,
                    },
                    &[
                        "comprehensive_enhancement",
                        "multi_faceted_search",
                        "complex_analysis",
                    ],
                ))
            },
        )
        .with_name("Complex")
        .with_description("Multi-stage processing for complex queries"),
    ]
}
