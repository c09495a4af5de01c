//! Template-based task planner.

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use adaptive_query_core::config::{PlannerConfig, merge_overrides};
use adaptive_query_core::traits::{Component, ComponentConfig};
use adaptive_query_core::types::{
    ComponentHealth, HealthStatus, QueryIntent, Task, TaskPlan, TaskType,
};
use adaptive_query_core::{AdaptiveQueryError, Result};

use super::cache::{PlanCache, PlanCacheStats};
use super::templates::{PlanningRule, TaskTemplate, builtin_planning_rules, builtin_templates};

/// Planner statistics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PlannerStats {
    /// Plans requested, cache hits included.
    pub total_plans: u64,
    /// Plans built from a rule and validated.
    pub successful_plans: u64,
    /// Plans that fell back to the default plan.
    pub default_plans: u64,
    /// `successful_plans / total_plans`.
    pub success_rate: f64,
    /// Mean planning time.
    pub average_planning_time: Duration,
    /// Times each rule was applied.
    pub rule_usage: HashMap<String, u64>,
    /// Registered planning rules.
    pub rule_count: usize,
    /// Registered task templates.
    pub template_count: usize,
    /// Plan cache statistics.
    pub cache: PlanCacheStats,
}

/// Builds task plans from planning rules and task templates.
///
/// The best rule for an intent is the one with the highest applicability
/// score; its template sequence becomes the task list. Plans are cached by
/// intent profile. A plan that fails validation is replaced by a minimal
/// default plan, so planning never fails for an enabled planner.
#[derive(Debug)]
pub struct TaskPlanner {
    name: String,
    config: RwLock<PlannerConfig>,
    running: AtomicBool,
    rules: RwLock<Vec<PlanningRule>>,
    templates: RwLock<HashMap<String, TaskTemplate>>,
    cache: RwLock<Arc<PlanCache>>,
    stats: RwLock<PlannerStats>,
    history: RwLock<VecDeque<TaskPlan>>,
}

impl Default for TaskPlanner {
    fn default() -> Self {
        Self::new(PlannerConfig::default())
    }
}

impl TaskPlanner {
    /// Create a planner with the built-in rules and templates.
    pub fn new(config: PlannerConfig) -> Self {
        let cache = Arc::new(PlanCache::new(config.cache_ttl(), config.cache_capacity));
        Self {
            name: "task_planner".to_string(),
            config: RwLock::new(config),
            running: AtomicBool::new(false),
            rules: RwLock::new(builtin_planning_rules()),
            templates: RwLock::new(builtin_templates()),
            cache: RwLock::new(cache),
            stats: RwLock::new(PlannerStats::default()),
            history: RwLock::new(VecDeque::new()),
        }
    }

    /// Build a plan for an intent.
    #[instrument(skip(self, intent), fields(intent = %intent.intent_type, domain = %intent.domain))]
    pub async fn plan(&self, intent: &QueryIntent) -> Result<TaskPlan> {
        let config = self.config.read().await.clone();
        if !config.enabled {
            return Err(AdaptiveQueryError::disabled(&self.name));
        }

        let start = Instant::now();
        let cache = Arc::clone(&*self.cache.read().await);
        let key = PlanCache::key_for(intent);
        if let Some(plan) = cache.get(&key).await {
            self.finish(start, None).await;
            return Ok(plan);
        }

        let Some(rule) = self.select_rule(intent).await else {
            debug!("No planning rule applies, using default plan");
            let plan = self.default_plan(intent);
            self.finish(start, Some(PlanOutcome::Default)).await;
            return Ok(plan);
        };

        let plan = self.build_plan(intent, &rule, &config).await;
        if let Err(e) = validate_plan(&plan, config.max_tasks_per_plan) {
            warn!(rule = %rule.id, error = %e, "Generated plan is invalid, using default plan");
            let plan = self.default_plan(intent);
            self.finish(start, Some(PlanOutcome::Default)).await;
            return Ok(plan);
        }

        cache.put(key, plan.clone()).await;
        {
            let mut history = self.history.write().await;
            history.push_back(plan.clone());
            while history.len() > config.history_limit {
                history.pop_front();
            }
        }
        self.finish(start, Some(PlanOutcome::Rule(rule.id))).await;
        info!(plan = %plan.plan_id, tasks = plan.tasks.len(), parallel = plan.parallel, "Plan created");
        Ok(plan)
    }

    async fn select_rule(&self, intent: &QueryIntent) -> Option<PlanningRule> {
        let rules = self.rules.read().await;
        let mut best: Option<(&PlanningRule, f32)> = None;
        for rule in rules.iter() {
            let score = rule.score(intent);
            let better = match best {
                None => score > 0.0,
                Some((current, best_score)) => {
                    score > best_score
                        || ((score - best_score).abs() < f32::EPSILON
                            && rule.priority > current.priority)
                }
            };
            if better {
                best = Some((rule, score));
            }
        }
        best.map(|(rule, score)| {
            debug!(rule = %rule.id, score, "Planning rule selected");
            rule.clone()
        })
    }

    async fn build_plan(
        &self,
        intent: &QueryIntent,
        rule: &PlanningRule,
        config: &PlannerConfig,
    ) -> TaskPlan {
        let templates = self.templates.read().await;
        let tasks: Vec<Task> = rule
            .task_sequence
            .iter()
            .enumerate()
            .filter_map(|(index, name)| match templates.get(name) {
                Some(template) => Some(task_from_template(template, index, rule)),
                None => {
                    warn!(template = %name, rule = %rule.id, "Unknown task template skipped");
                    None
                }
            })
            .collect();
        drop(templates);

        let short_id = Uuid::new_v4().simple().to_string();
        let mut plan = TaskPlan::new(
            format!("plan_{}_{}", Utc::now().timestamp(), &short_id[..8]),
            tasks,
        );
        plan.parallel = rule.parallel && config.enable_parallel;
        plan.max_retries = config.max_retries;
        plan.timeout_seconds = config.default_timeout_secs;
        plan.priority = rule.priority;
        plan.metadata
            .insert("planner_name".to_string(), self.name.clone().into());
        plan.metadata
            .insert("rule_applied".to_string(), rule.id.clone().into());
        plan.metadata
            .insert("complexity".to_string(), f64::from(intent.complexity).into());
        plan.metadata
            .insert("estimated_tasks".to_string(), rule.task_sequence.len().into());
        plan
    }

    fn default_plan(&self, intent: &QueryIntent) -> TaskPlan {
        let task = Task::new(
            "task_basic_enhancement_0",
            TaskType::Enhance,
            "basic_enhancement",
            50,
        )
        .with_parameter("domain", intent.domain.as_ref());
        let mut plan = TaskPlan::new(format!("default_plan_{}", Uuid::new_v4()), vec![task]);
        plan.max_retries = 1;
        plan.timeout_seconds = 10;
        plan.priority = 50;
        plan.metadata
            .insert("planner_name".to_string(), self.name.clone().into());
        plan.metadata
            .insert("plan_type".to_string(), "default".into());
        plan
    }

    async fn finish(&self, start: Instant, outcome: Option<PlanOutcome>) {
        let elapsed = start.elapsed();
        let mut stats = self.stats.write().await;
        stats.total_plans += 1;
        let total = u32::try_from(stats.total_plans).unwrap_or(u32::MAX);
        stats.average_planning_time = (stats.average_planning_time * (total - 1) + elapsed) / total;
        match outcome {
            Some(PlanOutcome::Rule(rule_id)) => {
                stats.successful_plans += 1;
                *stats.rule_usage.entry(rule_id).or_insert(0) += 1;
            }
            Some(PlanOutcome::Default) => stats.default_plans += 1,
            None => {}
        }
    }

    /// Check a plan against this planner's task limit.
    pub async fn validate_plan(&self, plan: &TaskPlan) -> Result<()> {
        let max_tasks = self.config.read().await.max_tasks_per_plan;
        validate_plan(plan, max_tasks)
    }

    /// Return a copy of the plan with a dependency-respecting execution order
    /// in which ready tasks run highest priority first.
    pub fn optimize_plan(&self, plan: &TaskPlan) -> Result<TaskPlan> {
        let mut optimized = plan.clone();
        optimized.execution_order = execution_order(plan)?;
        Ok(optimized)
    }

    /// Recently built plans, oldest first.
    pub async fn plan_history(&self) -> Vec<TaskPlan> {
        self.history.read().await.iter().cloned().collect()
    }

    /// Statistics snapshot.
    #[allow(clippy::cast_precision_loss)]
    pub async fn stats(&self) -> PlannerStats {
        let mut stats = self.stats.read().await.clone();
        stats.success_rate = if stats.total_plans == 0 {
            0.0
        } else {
            stats.successful_plans as f64 / stats.total_plans as f64
        };
        stats.rule_count = self.rules.read().await.len();
        stats.template_count = self.templates.read().await.len();
        stats.cache = self.cache.read().await.stats().await;
        stats
    }
}

enum PlanOutcome {
    Rule(String),
    Default,
}

fn task_from_template(template: &TaskTemplate, index: usize, rule: &PlanningRule) -> Task {
    let mut task = Task::new(
        format!("task_{}_{index}", template.name),
        template.task_type,
        template.name.clone(),
        template.default_priority,
    );
    task.parameters = template.parameters.clone();
    task.parameters
        .extend(rule.config.iter().map(|(k, v)| (k.clone(), v.clone())));
    task.retry_policy = Some(template.retry_policy.clone());
    task.estimated_time = Some(template.estimated_time);
    task
}

/// Reject empty plans, plans over `max_tasks`, duplicate task ids, dependencies
/// on unknown tasks and dependency cycles.
pub fn validate_plan(plan: &TaskPlan, max_tasks: usize) -> Result<()> {
    if plan.tasks.is_empty() {
        return Err(AdaptiveQueryError::invalid_plan(
            "plan must contain at least one task",
        ));
    }
    if plan.tasks.len() > max_tasks {
        return Err(AdaptiveQueryError::invalid_plan(format!(
            "plan contains too many tasks: {} > {max_tasks}",
            plan.tasks.len()
        )));
    }

    let mut ids = HashSet::new();
    for task in &plan.tasks {
        if !ids.insert(task.id.as_str()) {
            return Err(AdaptiveQueryError::invalid_plan(format!(
                "duplicate task id: {}",
                task.id
            )));
        }
    }
    for task in &plan.tasks {
        if let Some(dep) = task.dependencies.iter().find(|d| !ids.contains(d.as_str())) {
            return Err(AdaptiveQueryError::invalid_plan(format!(
                "task {} has unresolved dependency: {dep}",
                task.id
            )));
        }
    }

    execution_order(plan).map(|_| ())
}

/// Kahn's algorithm over task dependencies; among ready tasks the highest
/// priority goes first, then plan order.
fn execution_order(plan: &TaskPlan) -> Result<Vec<String>> {
    let index: HashMap<&str, usize> = plan
        .tasks
        .iter()
        .enumerate()
        .map(|(i, t)| (t.id.as_str(), i))
        .collect();

    let mut in_degree = vec![0usize; plan.tasks.len()];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); plan.tasks.len()];
    for (i, task) in plan.tasks.iter().enumerate() {
        for dep in &task.dependencies {
            let Some(&d) = index.get(dep.as_str()) else {
                return Err(AdaptiveQueryError::invalid_plan(format!(
                    "task {} has unresolved dependency: {dep}",
                    task.id
                )));
            };
            in_degree[i] += 1;
            dependents[d].push(i);
        }
    }

    let mut ready: BinaryHeap<(u32, Reverse<usize>)> = in_degree
        .iter()
        .enumerate()
        .filter(|(_, degree)| **degree == 0)
        .map(|(i, _)| (plan.tasks[i].priority, Reverse(i)))
        .collect();

    let mut order = Vec::with_capacity(plan.tasks.len());
    while let Some((_, Reverse(i))) = ready.pop() {
        order.push(plan.tasks[i].id.clone());
        for &next in &dependents[i] {
            in_degree[next] -= 1;
            if in_degree[next] == 0 {
                ready.push((plan.tasks[next].priority, Reverse(next)));
            }
        }
    }

    if order.len() != plan.tasks.len() {
        return Err(AdaptiveQueryError::invalid_plan(
            "task dependencies contain a cycle",
        ));
    }
    Ok(order)
}

#[async_trait]
impl Component for TaskPlanner {
    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> &str {
        crate::VERSION
    }

    async fn initialize(&self, config: &ComponentConfig) -> Result<()> {
        let mut current = self.config.write().await;
        let updated: PlannerConfig = merge_overrides(&*current, config)?;
        updated.validate()?;
        if updated.cache_ttl_secs != current.cache_ttl_secs
            || updated.cache_capacity != current.cache_capacity
        {
            *self.cache.write().await =
                Arc::new(PlanCache::new(updated.cache_ttl(), updated.cache_capacity));
        }
        *current = updated;
        Ok(())
    }

    async fn start(&self) -> Result<()> {
        self.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    #[allow(clippy::cast_precision_loss)]
    async fn health_check(&self) -> ComponentHealth {
        let stats = self.stats().await;
        let health = if self.config.read().await.enabled {
            ComponentHealth::healthy("task planner ready")
        } else {
            ComponentHealth::new(HealthStatus::Degraded, "task planner disabled")
        };
        health
            .with_metric("total_plans", stats.total_plans as f64)
            .with_metric("success_rate", stats.success_rate)
            .with_metric("cache_hit_rate", stats.cache.hit_rate())
    }
}
