//! Decision and task plan types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use strum::{AsRefStr, Display, EnumString};

use super::intent::QueryIntent;

/// What a task does to the query.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TaskType {
    /// Add context or terms.
    Enhance,
    /// Remove noise.
    Filter,
    /// Adapt to a domain.
    Adapt,
}

/// Retry budget attached to a task template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum retry attempts.
    pub max_retries: u32,
    /// Multiplier applied to the delay after each attempt.
    pub backoff_factor: f32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
}

impl RetryPolicy {
    /// Create a retry policy with a delay in milliseconds.
    pub fn new(max_retries: u32, backoff_factor: f32, initial_delay_ms: u64) -> Self {
        Self {
            max_retries,
            backoff_factor,
            initial_delay: Duration::from_millis(initial_delay_ms),
        }
    }

    /// Delay before retry number `attempt` (zero based), rounded to whole
    /// milliseconds.
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_precision_loss,
        clippy::cast_sign_loss
    )]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = f64::from(self.backoff_factor.max(1.0))
            .powi(attempt.try_into().unwrap_or(i32::MAX));
        let millis = (self.initial_delay.as_millis() as f64 * factor).round();
        Duration::from_millis(millis.min(u64::MAX as f64) as u64)
    }
}

/// One processing step inside a [`TaskPlan`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Unique id within the plan.
    pub id: String,
    /// Task kind.
    #[serde(rename = "type")]
    pub task_type: TaskType,
    /// Component expected to run the task.
    pub target_component: String,
    /// Free-form parameters for the target component.
    pub parameters: HashMap<String, serde_json::Value>,
    /// Higher runs earlier when ordering is free.
    pub priority: u32,
    /// Ids of tasks that must finish first.
    pub dependencies: Vec<String>,
    /// Optional retry budget.
    pub retry_policy: Option<RetryPolicy>,
    /// Estimated execution time.
    pub estimated_time: Option<Duration>,
}

impl Task {
    /// Create a task without parameters or dependencies.
    pub fn new<I, C>(id: I, task_type: TaskType, target_component: C, priority: u32) -> Self
    where
        I: Into<String>,
        C: Into<String>,
    {
        Self {
            id: id.into(),
            task_type,
            target_component: target_component.into(),
            parameters: HashMap::new(),
            priority,
            dependencies: Vec::new(),
            retry_policy: None,
            estimated_time: None,
        }
    }

    /// Add a parameter.
    #[must_use]
    pub fn with_parameter<K: Into<String>, V: Into<serde_json::Value>>(
        mut self,
        key: K,
        value: V,
    ) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    /// Add a dependency on another task id.
    #[must_use]
    pub fn with_dependency<S: Into<String>>(mut self, id: S) -> Self {
        self.dependencies.push(id.into());
        self
    }
}

/// An ordered or parallel set of tasks with retry and timeout budgets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskPlan {
    /// Plan id.
    pub plan_id: String,
    /// Tasks in the plan.
    pub tasks: Vec<Task>,
    /// Task ids in execution order.
    pub execution_order: Vec<String>,
    /// Whether tasks may run concurrently.
    pub parallel: bool,
    /// Retry budget for the whole plan.
    pub max_retries: u32,
    /// Timeout for the whole plan.
    pub timeout_seconds: u64,
    /// Plan priority.
    pub priority: u32,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Planner metadata.
    pub metadata: HashMap<String, serde_json::Value>,
}

impl TaskPlan {
    /// Create a plan whose execution order follows task order.
    pub fn new<S: Into<String>>(plan_id: S, tasks: Vec<Task>) -> Self {
        let execution_order = tasks.iter().map(|t| t.id.clone()).collect();
        Self {
            plan_id: plan_id.into(),
            tasks,
            execution_order,
            parallel: false,
            max_retries: 0,
            timeout_seconds: 0,
            priority: 0,
            created_at: Utc::now(),
            metadata: HashMap::new(),
        }
    }

    /// Look up a task by id.
    pub fn task(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    /// Whether the plan has no tasks.
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

/// The chosen processing strategy for one query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingDecision {
    /// Decision id.
    pub decision_id: String,
    /// The intent the decision was made for.
    pub intent: QueryIntent,
    /// Plan to execute.
    pub task_plan: TaskPlan,
    /// Names of the chosen strategies.
    pub selected_strategies: Vec<String>,
    /// Confidence of the chosen rule.
    pub confidence: f32,
    /// Human readable explanation.
    pub reasoning: String,
    /// Rule that produced the decision; `None` for the default decision.
    pub rule_id: Option<String>,
    /// Creation time.
    pub timestamp: DateTime<Utc>,
    /// Engine metadata.
    pub metadata: HashMap<String, serde_json::Value>,
}

/// Outcome reported back for a past decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feedback {
    /// Decision the feedback is about.
    pub decision_id: String,
    /// Whether the decision led to a satisfying result.
    pub success: bool,
    /// Optional score in `[0, 1]`.
    pub score: Option<f32>,
    /// Free-form comment.
    pub comment: Option<String>,
}

impl Feedback {
    /// Feedback marking a decision as failed.
    pub fn failure<S: Into<String>>(decision_id: S) -> Self {
        Self {
            decision_id: decision_id.into(),
            success: false,
            score: None,
            comment: None,
        }
    }

    /// Feedback marking a decision as successful.
    pub fn success<S: Into<String>>(decision_id: S) -> Self {
        Self {
            decision_id: decision_id.into(),
            success: true,
            score: None,
            comment: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_execution_order_follows_tasks() {
        let plan = TaskPlan::new(
            "p",
            vec![
                Task::new("a", TaskType::Enhance, "semantic_enhancer", 1),
                Task::new("b", TaskType::Filter, "noise_filter", 2).with_dependency("a"),
            ],
        );
        assert_eq!(plan.execution_order, vec!["a", "b"]);
        assert_eq!(plan.task("b").unwrap().dependencies, vec!["a"]);
        assert!(!plan.is_empty());
    }

    #[test]
    fn test_retry_delay_backoff() {
        let policy = RetryPolicy::new(3, 2.0, 10);
        assert_eq!(policy.delay_for(0), Duration::from_millis(10));
        assert_eq!(policy.delay_for(2), Duration::from_millis(40));
    }

    #[test]
    fn test_retry_delay_fractional_factor() {
        let policy = RetryPolicy::new(5, 1.5, 100);
        assert_eq!(policy.delay_for(1), Duration::from_millis(150));
        assert_eq!(policy.delay_for(3), Duration::from_millis(338));
        // factors below one never shrink the delay
        assert_eq!(RetryPolicy::new(2, 0.5, 30).delay_for(4), Duration::from_millis(30));
    }
}
