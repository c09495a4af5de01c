//! Rule-based decision engine.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use adaptive_query_core::config::{DecisionConfig, merge_overrides};
use adaptive_query_core::traits::{Component, ComponentConfig, FeedbackLearner, StrategySelector};
use adaptive_query_core::types::{
    ComponentHealth, Domain, Feedback, HealthStatus, IntentType, ProcessingDecision, QueryIntent,
};
use adaptive_query_core::{AdaptiveQueryError, Result};

use super::rules::{DecisionRule, RuleOutcome, builtin_rules, default_outcome};

/// Usage statistics for one rule.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RuleStats {
    /// Times the rule was selected.
    pub usage_count: u64,
    /// Selections whose action succeeded and were not reported as failed.
    pub success_count: u64,
    /// Mean time spent building the decision.
    pub average_time: Duration,
    /// Last selection.
    pub last_used: Option<DateTime<Utc>>,
}

impl RuleStats {
    /// Empirical success rate, zero before first use.
    #[allow(clippy::cast_precision_loss)]
    pub fn success_rate(&self) -> f32 {
        if self.usage_count == 0 {
            0.0
        } else {
            self.success_count as f32 / self.usage_count as f32
        }
    }
}

/// Aggregate decision statistics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DecisionStats {
    /// Decisions made.
    pub total_decisions: u64,
    /// Decisions that fell back to the default.
    pub default_decisions: u64,
    /// Decisions per intent bucket.
    pub by_intent: HashMap<IntentType, u64>,
    /// Decisions per domain.
    pub by_domain: HashMap<Domain, u64>,
    /// Mean decision time.
    pub average_decision_time: Duration,
    /// Per-rule statistics keyed by rule id.
    pub rule_stats: HashMap<String, RuleStats>,
}

#[derive(Debug, Clone)]
struct WeightedRule {
    rule: DecisionRule,
    weight: f32,
}

/// Selects a processing strategy for each intent.
///
/// The engine must be started before it accepts decisions. Among the rules
/// whose condition matches, the one with the highest
/// `priority * confidence * weight` wins (with a bonus for complex queries);
/// ties go to the earliest registered rule. When nothing matches, or the
/// winning rule's action fails, a default single-task decision is returned.
///
/// # Examples
///
/// ```rust
/// use adaptive_query_pipeline::decision::DecisionEngine;
/// use adaptive_query_core::traits::Component;
/// use adaptive_query_core::types::{Domain, IntentType, QueryIntent};
///
/// # tokio_test::block_on(async {
/// let engine = DecisionEngine::default();
/// engine.start().await.unwrap();
///
/// let intent = QueryIntent::new("why does it crash", IntentType::Debugging, Domain::Backend);
/// let decision = engine.decide(&intent).await.unwrap();
/// assert_eq!(decision.rule_id.as_deref(), Some("debug_rule"));
/// # });
/// ```
#[derive(Debug)]
pub struct DecisionEngine {
    name: String,
    config: RwLock<DecisionConfig>,
    started: AtomicBool,
    rules: RwLock<Vec<WeightedRule>>,
    stats: RwLock<DecisionStats>,
    history: RwLock<VecDeque<ProcessingDecision>>,
}

impl Default for DecisionEngine {
    fn default() -> Self {
        Self::new(DecisionConfig::default())
    }
}

impl DecisionEngine {
    /// Create an engine with the built-in rules.
    pub fn new(config: DecisionConfig) -> Self {
        Self::with_rules(config, builtin_rules())
    }

    /// Create an engine with a custom rule set.
    pub fn with_rules(config: DecisionConfig, rules: Vec<DecisionRule>) -> Self {
        Self {
            name: "decision_engine".to_string(),
            config: RwLock::new(config),
            started: AtomicBool::new(false),
            rules: RwLock::new(
                rules
                    .into_iter()
                    .map(|rule| WeightedRule { rule, weight: 1.0 })
                    .collect(),
            ),
            stats: RwLock::new(DecisionStats::default()),
            history: RwLock::new(VecDeque::new()),
        }
    }

    /// Whether the engine accepts decisions.
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// Register an additional rule.
    pub async fn register_rule(&self, rule: DecisionRule) -> Result<()> {
        let mut rules = self.rules.write().await;
        if rules.iter().any(|r| r.rule.id == rule.id) {
            return Err(AdaptiveQueryError::already_registered(rule.id));
        }
        info!(rule = %rule.id, "Registered decision rule");
        rules.push(WeightedRule { rule, weight: 1.0 });
        Ok(())
    }

    /// Produce a decision for an intent.
    #[instrument(skip(self, intent), fields(intent = %intent.intent_type, domain = %intent.domain))]
    pub async fn decide(&self, intent: &QueryIntent) -> Result<ProcessingDecision> {
        let config = self.config.read().await.clone();
        if !config.enabled {
            return Err(AdaptiveQueryError::disabled(&self.name));
        }
        if !self.is_started() {
            return Err(AdaptiveQueryError::not_started(&self.name));
        }

        let start = Instant::now();
        let selected = self.select_rule(intent, &config).await;

        let (decision, rule_result) = match selected {
            Some((rule, score)) => match rule.build(intent) {
                Ok(outcome) => {
                    debug!(rule = %rule.id, score, "Rule selected");
                    (Self::rule_decision(intent, &rule, outcome, score), Some((rule.id, true)))
                }
                Err(e) => {
                    warn!(rule = %rule.id, error = %e, "Rule action failed, using default decision");
                    let reason = format!("Rule '{}' failed ({e}); using default strategy", rule.id);
                    (
                        Self::default_decision(intent, &config, reason),
                        Some((rule.id, false)),
                    )
                }
            },
            None => {
                debug!("No rule matched, using default decision");
                let reason = "No applicable rule matched; using default strategy".to_string();
                (Self::default_decision(intent, &config, reason), None)
            }
        };

        self.record(&decision, rule_result, start.elapsed(), config.history_limit)
            .await;
        Ok(decision)
    }

    async fn select_rule(
        &self,
        intent: &QueryIntent,
        config: &DecisionConfig,
    ) -> Option<(DecisionRule, f32)> {
        let rules = self.rules.read().await;
        let mut best: Option<(&WeightedRule, f32)> = None;
        for entry in rules.iter().filter(|r| r.rule.matches(intent)) {
            let mut score = entry.rule.base_score() * entry.weight;
            if intent.complexity > config.complexity_threshold {
                score *= config.complexity_bonus;
            }
            if best.is_none_or(|(_, best_score)| score > best_score) {
                best = Some((entry, score));
            }
        }
        best.map(|(entry, score)| (entry.rule.clone(), score))
    }

    fn rule_decision(
        intent: &QueryIntent,
        rule: &DecisionRule,
        outcome: RuleOutcome,
        score: f32,
    ) -> ProcessingDecision {
        let mut metadata = HashMap::new();
        metadata.insert("decision_type".to_string(), "rule_based".into());
        metadata.insert("rule_score".to_string(), f64::from(score).into());
        ProcessingDecision {
            decision_id: format!("decision_{}", Uuid::new_v4()),
            intent: intent.clone(),
            task_plan: outcome.task_plan,
            selected_strategies: outcome.selected_strategies,
            confidence: rule.confidence,
            reasoning: format!(
                "Selected rule '{}' ({}) with confidence {:.2} for {} intent in {} domain",
                rule.id, rule.name, rule.confidence, intent.intent_type, intent.domain
            ),
            rule_id: Some(rule.id.clone()),
            timestamp: Utc::now(),
            metadata,
        }
    }

    fn default_decision(
        intent: &QueryIntent,
        config: &DecisionConfig,
        reasoning: String,
    ) -> ProcessingDecision {
        let outcome = default_outcome();
        let mut metadata = HashMap::new();
        metadata.insert("decision_type".to_string(), "default".into());
        ProcessingDecision {
            decision_id: format!("decision_{}", Uuid::new_v4()),
            intent: intent.clone(),
            task_plan: outcome.task_plan,
            selected_strategies: outcome.selected_strategies,
            confidence: config.default_confidence,
            reasoning,
            rule_id: None,
            timestamp: Utc::now(),
            metadata,
        }
    }

    async fn record(
        &self,
        decision: &ProcessingDecision,
        rule_result: Option<(String, bool)>,
        elapsed: Duration,
        history_limit: usize,
    ) {
        {
            let mut stats = self.stats.write().await;
            stats.total_decisions += 1;
            let total = u32::try_from(stats.total_decisions).unwrap_or(u32::MAX);
            stats.average_decision_time =
                (stats.average_decision_time * (total - 1) + elapsed) / total;
            *stats.by_intent.entry(decision.intent.intent_type).or_insert(0) += 1;
            *stats.by_domain.entry(decision.intent.domain).or_insert(0) += 1;
            if decision.rule_id.is_none() {
                stats.default_decisions += 1;
            }
            if let Some((rule_id, success)) = rule_result {
                let rule_stats = stats.rule_stats.entry(rule_id).or_default();
                rule_stats.usage_count += 1;
                if success {
                    rule_stats.success_count += 1;
                }
                let uses = u32::try_from(rule_stats.usage_count).unwrap_or(u32::MAX);
                rule_stats.average_time = (rule_stats.average_time * (uses - 1) + elapsed) / uses;
                rule_stats.last_used = Some(decision.timestamp);
            }
        }

        let mut history = self.history.write().await;
        history.push_back(decision.clone());
        while history.len() > history_limit {
            history.pop_front();
        }
    }

    /// Recompute adaptive rule weights from historical success rates.
    ///
    /// Rules above the boost success rate get the boost weight, rules below
    /// the penalty rate get the penalty weight; unused rules keep theirs.
    /// Returns the weight of every rule after the update.
    pub async fn optimize_strategy(&self) -> HashMap<String, f32> {
        let config = self.config.read().await.clone();
        let stats = self.stats.read().await.rule_stats.clone();
        let mut rules = self.rules.write().await;
        for entry in rules.iter_mut() {
            let Some(rule_stats) = stats.get(&entry.rule.id) else {
                continue;
            };
            if rule_stats.usage_count == 0 {
                continue;
            }
            let rate = rule_stats.success_rate();
            let previous = entry.weight;
            if rate > config.boost_success_rate {
                entry.weight = config.boost_weight;
            } else if rate < config.penalty_success_rate {
                entry.weight = config.penalty_weight;
            }
            if (previous - entry.weight).abs() > f32::EPSILON {
                info!(rule = %entry.rule.id, rate, weight = entry.weight, "Rule weight updated");
            }
        }
        rules
            .iter()
            .map(|r| (r.rule.id.clone(), r.weight))
            .collect()
    }

    /// Snapshot of the decision statistics.
    pub async fn stats(&self) -> DecisionStats {
        self.stats.read().await.clone()
    }

    /// Recent decisions, oldest first.
    pub async fn decision_history(&self) -> Vec<ProcessingDecision> {
        self.history.read().await.iter().cloned().collect()
    }

    /// Mark a past decision as failed or successful.
    ///
    /// A failure reverses the success counted when the rule's action ran, so
    /// the optimizer sees the real success rate.
    pub async fn record_outcome(&self, feedback: &Feedback) -> Result<()> {
        let rule_id = self
            .history
            .read()
            .await
            .iter()
            .find(|d| d.decision_id == feedback.decision_id)
            .map(|d| d.rule_id.clone())
            .ok_or_else(|| {
                AdaptiveQueryError::not_found(format!("decision {}", feedback.decision_id))
            })?;

        let Some(rule_id) = rule_id else {
            return Ok(());
        };
        if !feedback.success {
            let mut stats = self.stats.write().await;
            if let Some(rule_stats) = stats.rule_stats.get_mut(&rule_id) {
                rule_stats.success_count = rule_stats.success_count.saturating_sub(1);
            }
            debug!(rule = %rule_id, decision = %feedback.decision_id, "Recorded failed decision");
        }
        Ok(())
    }
}

#[async_trait]
impl StrategySelector for DecisionEngine {
    async fn decide(&self, intent: &QueryIntent) -> Result<ProcessingDecision> {
        DecisionEngine::decide(self, intent).await
    }
}

#[async_trait]
impl FeedbackLearner for DecisionEngine {
    async fn record_feedback(&self, feedback: &Feedback) -> Result<()> {
        self.record_outcome(feedback).await
    }
}

#[async_trait]
impl Component for DecisionEngine {
    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> &str {
        crate::VERSION
    }

    async fn initialize(&self, config: &ComponentConfig) -> Result<()> {
        let mut current = self.config.write().await;
        let updated = merge_overrides(&*current, config)?;
        updated.validate()?;
        *current = updated;
        Ok(())
    }

    async fn start(&self) -> Result<()> {
        if self
            .started
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(AdaptiveQueryError::already_started(&self.name));
        }
        let rules = self.rules.read().await.len();
        info!(rules, "Decision engine started");
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        if self.started.swap(false, Ordering::SeqCst) {
            info!("Decision engine stopped");
        }
        Ok(())
    }

    #[allow(clippy::cast_precision_loss)]
    async fn health_check(&self) -> ComponentHealth {
        let stats = self.stats.read().await;
        let health = if !self.is_started() {
            ComponentHealth::unhealthy("decision engine not started")
        } else if !self.config.read().await.enabled {
            ComponentHealth::new(HealthStatus::Degraded, "decision engine disabled")
        } else {
            ComponentHealth::healthy("decision engine running")
        };
        health
            .with_metric("total_decisions", stats.total_decisions as f64)
            .with_metric("default_decisions", stats.default_decisions as f64)
    }

    fn as_strategy_selector(self: Arc<Self>) -> Option<Arc<dyn StrategySelector>> {
        Some(self)
    }

    fn as_feedback_learner(self: Arc<Self>) -> Option<Arc<dyn FeedbackLearner>> {
        Some(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::rules::RuleCondition;
    use pretty_assertions::assert_eq;

    async fn started_engine() -> DecisionEngine {
        let engine = DecisionEngine::default();
        engine.start().await.unwrap();
        engine
    }

    fn intent(intent_type: IntentType, complexity: f32) -> QueryIntent {
        QueryIntent::new("query", intent_type, Domain::Programming).with_complexity(complexity)
    }

    #[tokio::test]
    async fn test_lifecycle_errors() {
        let engine = DecisionEngine::default();
        assert!(matches!(
            engine.decide(&intent(IntentType::Technical, 0.1)).await,
            Err(AdaptiveQueryError::NotStarted { .. })
        ));
        engine.start().await.unwrap();
        assert!(matches!(
            engine.start().await,
            Err(AdaptiveQueryError::AlreadyStarted { .. })
        ));
        engine.stop().await.unwrap();
        engine.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_disabled_engine() {
        let engine = DecisionEngine::new(DecisionConfig::default().with_enabled(false));
        engine.start().await.unwrap();
        assert!(matches!(
            engine.decide(&intent(IntentType::Technical, 0.1)).await,
            Err(AdaptiveQueryError::Disabled { .. })
        ));
    }

    #[tokio::test]
    async fn test_complex_rule_beats_intent_rule() {
        let engine = started_engine().await;
        let decision = engine
            .decide(&intent(IntentType::Procedural, 0.8))
            .await
            .unwrap();
        assert_eq!(decision.rule_id.as_deref(), Some("complex_rule"));
        assert!(!decision.task_plan.parallel);
        assert_eq!(decision.task_plan.timeout_seconds, 45);
        assert_eq!(decision.task_plan.tasks.len(), 3);
    }

    #[tokio::test]
    async fn test_default_decision_when_nothing_matches() {
        let engine = DecisionEngine::with_rules(DecisionConfig::default(), Vec::new());
        engine.start().await.unwrap();
        let decision = engine
            .decide(&intent(IntentType::Technical, 0.1))
            .await
            .unwrap();
        assert_eq!(decision.rule_id, None);
        assert!((decision.confidence - 0.6).abs() < 1e-6);
        assert_eq!(decision.task_plan.tasks.len(), 1);
        assert_eq!(engine.stats().await.default_decisions, 1);
    }

    #[tokio::test]
    async fn test_failing_action_falls_back() {
        let failing = DecisionRule::new(
            "failing",
            1.0,
            1.0,
            RuleCondition::IntentIs(IntentType::Technical),
            |_| Err(AdaptiveQueryError::internal("boom")),
        );
        let engine = DecisionEngine::with_rules(DecisionConfig::default(), vec![failing]);
        engine.start().await.unwrap();
        let decision = engine
            .decide(&intent(IntentType::Technical, 0.1))
            .await
            .unwrap();
        assert_eq!(decision.rule_id, None);
        assert!(decision.reasoning.contains("failing"));

        let stats = engine.stats().await;
        assert_eq!(stats.rule_stats["failing"].usage_count, 1);
        assert_eq!(stats.rule_stats["failing"].success_count, 0);
    }

    #[tokio::test]
    async fn test_history_is_bounded() {
        let engine = DecisionEngine::new(DecisionConfig::default().with_history_limit(3));
        engine.start().await.unwrap();
        for _ in 0..5 {
            engine
                .decide(&intent(IntentType::Debugging, 0.1))
                .await
                .unwrap();
        }
        assert_eq!(engine.decision_history().await.len(), 3);
        assert_eq!(engine.stats().await.total_decisions, 5);
    }

    #[tokio::test]
    async fn test_optimize_boosts_and_penalizes() {
        let engine = started_engine().await;
        for _ in 0..4 {
            engine
                .decide(&intent(IntentType::Debugging, 0.1))
                .await
                .unwrap();
        }
        let mut conceptual = Vec::new();
        for _ in 0..2 {
            conceptual.push(
                engine
                    .decide(&intent(IntentType::Conceptual, 0.1))
                    .await
                    .unwrap(),
            );
        }
        for decision in &conceptual {
            engine
                .record_feedback(&Feedback::failure(&decision.decision_id))
                .await
                .unwrap();
        }

        let weights = engine.optimize_strategy().await;
        assert!((weights["debug_rule"] - 1.2).abs() < 1e-6);
        assert!((weights["conceptual_rule"] - 0.8).abs() < 1e-6);
        assert!((weights["procedural_rule"] - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_duplicate_rule_rejected() {
        let engine = DecisionEngine::default();
        let duplicate = builtin_rules().remove(0);
        assert!(matches!(
            engine.register_rule(duplicate).await,
            Err(AdaptiveQueryError::AlreadyRegistered { .. })
        ));
    }

    #[tokio::test]
    async fn test_unknown_feedback_rejected() {
        let engine = started_engine().await;
        assert!(
            engine
                .record_feedback(&Feedback::failure("decision_missing"))
                .await
                .is_err()
        );
    }
}
