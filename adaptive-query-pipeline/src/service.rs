//! The adaptive query service.
//!
//! [`AdaptiveQueryService`] wires every stage together behind a single
//! `process_query` entry point:
//!
//! 1. reject empty queries
//! 2. ask the [`RetrievalGate`] whether retrieval is needed at all
//! 3. build the session context
//! 4. classify, decide and plan (classification failures degrade to a plain
//!    rewrite and retrieve; decision failures continue without a decision)
//! 5. rewrite the query and apply the decision's task hints
//! 6. run the iterative search with a complexity-adjusted limit
//! 7. record statistics, session context and the state-store record

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

use adaptive_query_core::config::{
    FLAG_ADAPTIVE, FLAG_ITERATIVE, FLAG_RETRIEVAL_GATE, FLAG_REWRITE, FeatureFlags, PipelineConfig,
    ServiceConfig,
};
use adaptive_query_core::traits::{
    Component, ComponentConfig, ContextLayer, ContextRetriever, FeedbackLearner, QueryRecord,
    StateStore,
};
use adaptive_query_core::types::{
    Domain, Feedback, IntentType, IterativeSearchResult, ProcessingDecision, QualityAssessment,
    QueryContext, QueryIntent, RewriteResult, ScoredResult, TaskPlan, TaskType,
};
use adaptive_query_core::{AdaptiveQueryError, Result};

use crate::classifier::{ClassifierStats, IntentClassifier};
use crate::context::{SessionContextLayer, SessionLimits};
use crate::decision::{DecisionEngine, DecisionRule, DecisionStats};
use crate::gate::{GateDecision, RetrievalGate};
use crate::iterative::{IterativeRetriever, IterativeStats, QualityEvaluator};
use crate::planner::{PlannerStats, TaskPlanner};
use crate::registry::{ComponentInfo, ComponentRegistry};
use crate::rewrite::{RewritePipeline, RewriteStats};

/// Per-request switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessOptions {
    /// Skip the retrieval gate and always retrieve.
    pub bypass_gate: bool,
    /// Run the rewrite pipeline.
    pub rewrite: bool,
    /// Run the iterative loop instead of a single retrieval.
    pub iterative: bool,
}

impl Default for ProcessOptions {
    fn default() -> Self {
        Self {
            bypass_gate: false,
            rewrite: true,
            iterative: true,
        }
    }
}

impl ProcessOptions {
    /// Always retrieve, whatever the gate would say.
    #[must_use]
    pub fn bypass_gate(mut self) -> Self {
        self.bypass_gate = true;
        self
    }

    /// Enable or disable rewriting for this request.
    #[must_use]
    pub fn with_rewrite(mut self, rewrite: bool) -> Self {
        self.rewrite = rewrite;
        self
    }

    /// Enable or disable the iterative loop for this request.
    #[must_use]
    pub fn with_iterative(mut self, iterative: bool) -> Self {
        self.iterative = iterative;
        self
    }
}

/// Everything produced while processing one query.
#[derive(Debug, Clone, Serialize)]
pub struct QueryOutcome {
    /// Session the query belongs to.
    pub session_id: String,
    /// Query as received.
    pub original_query: String,
    /// Query used for the best retrieval.
    pub final_query: String,
    /// Results, truncated to the effective limit.
    pub results: Vec<ScoredResult>,
    /// Quality of the results.
    pub assessment: QualityAssessment,
    /// Retrieval gate verdict.
    pub gate: GateDecision,
    /// Whether the retriever was called.
    pub retrieved: bool,
    /// Session context the query was processed in.
    pub context: QueryContext,
    /// Classification, `None` when skipped or failed.
    pub intent: Option<QueryIntent>,
    /// Decision, `None` when skipped or failed.
    pub decision: Option<ProcessingDecision>,
    /// Task plan from the planner.
    pub plan: Option<TaskPlan>,
    /// Rewrite result, `None` when rewriting was skipped.
    pub rewrite: Option<RewriteResult>,
    /// Iterative search summary, `None` when retrieval was skipped.
    pub search: Option<IterativeSearchResult>,
    /// Effective result limit.
    pub limit: usize,
    /// Total time.
    pub processing_time: Duration,
}

/// One entry of the bounded performance history.
#[derive(Debug, Clone, Serialize)]
pub struct PerformanceRecord {
    /// When the query finished.
    pub timestamp: DateTime<Utc>,
    /// Query as received.
    pub query: String,
    /// Intent bucket, if classified.
    pub intent_type: Option<IntentType>,
    /// Domain, if classified.
    pub domain: Option<Domain>,
    /// Total time.
    pub processing_time: Duration,
    /// Overall quality of the returned results.
    pub overall_score: f32,
    /// Whether the search reached its quality threshold.
    pub success: bool,
}

/// Service-level statistics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ServiceStats {
    /// Queries accepted.
    pub total_queries: u64,
    /// Queries answered without retrieval by the gate.
    pub gated_queries: u64,
    /// Queries that went through classification and decision.
    pub adaptive_queries: u64,
    /// Queries whose classification failed.
    pub degraded_queries: u64,
    /// Queries whose retrieval failed.
    pub failed_queries: u64,
    /// Queries answered with retrieved results.
    pub retrieved_queries: u64,
    /// Count per intent bucket.
    pub intent_distribution: HashMap<IntentType, u64>,
    /// Count per domain.
    pub domain_distribution: HashMap<Domain, u64>,
    /// Count per selected strategy.
    pub strategy_usage: HashMap<String, u64>,
    /// Running mean processing time of successful queries.
    pub average_processing_time: Duration,
    /// Running mean overall quality of retrieved results.
    pub average_quality: f32,
    /// Bounded history, oldest first.
    pub performance_history: VecDeque<PerformanceRecord>,
}

/// Statistics of the service and every stage.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineStats {
    /// Service counters.
    pub service: ServiceStats,
    /// Intent classifier.
    pub classifier: ClassifierStats,
    /// Decision engine.
    pub decision: DecisionStats,
    /// Task planner.
    pub planner: PlannerStats,
    /// Rewrite pipeline.
    pub rewrite: RewriteStats,
    /// Iterative retriever.
    pub iterative: IterativeStats,
}

const INTENT_TERMS: &[(IntentType, &[&str])] = &[
    (IntentType::Debugging, &["调试", "问题排查", "错误分析"]),
    (IntentType::Procedural, &["步骤", "教程", "操作指南"]),
    (IntentType::Conceptual, &["概念", "原理", "理论"]),
    (IntentType::Technical, &["实现", "技术方案", "代码"]),
];

const DOMAIN_TERMS: &[(Domain, &[&str])] = &[
    (Domain::Architecture, &["架构设计", "系统设计"]),
    (Domain::Database, &["数据库设计", "SQL优化"]),
    (Domain::Frontend, &["前端开发", "用户界面"]),
    (Domain::Backend, &["后端开发", "服务端"]),
    (Domain::Devops, &["运维", "部署", "自动化"]),
    (Domain::Programming, &["编程", "代码", "算法"]),
];

fn terms_for<K: PartialEq + Copy>(
    table: &[(K, &'static [&'static str])],
    key: K,
) -> &'static [&'static str] {
    table
        .iter()
        .find(|(k, _)| *k == key)
        .map(|(_, terms)| *terms)
        .unwrap_or_default()
}

/// Append the terms implied by the decision's tasks, skipping any term the
/// query already contains.
pub fn apply_task_hints(
    query: &str,
    intent: &QueryIntent,
    decision: &ProcessingDecision,
) -> String {
    let mut hinted = query.trim().to_string();
    for task in &decision.task_plan.tasks {
        let terms: &[&str] = match task.task_type {
            TaskType::Enhance => terms_for(INTENT_TERMS, intent.intent_type),
            TaskType::Adapt => terms_for(DOMAIN_TERMS, intent.domain),
            TaskType::Filter => &[],
        };
        for term in terms {
            if !hinted.contains(term) {
                hinted.push(' ');
                hinted.push_str(term);
            }
        }
    }
    hinted
}

/// Result limit for a query: the caller's limit (or the default when zero),
/// raised by `complex_limit_factor` for complex intents.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub fn effective_limit(
    config: &ServiceConfig,
    limit: usize,
    intent: Option<&QueryIntent>,
) -> usize {
    let base = if limit == 0 { config.default_limit } else { limit };
    match intent {
        Some(intent) if intent.complexity > config.complexity_threshold => {
            (base as f32 * config.complex_limit_factor).ceil() as usize
        }
        _ => base,
    }
}

/// Builder for [`AdaptiveQueryService`].
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
/// use adaptive_query_core::traits::FnRetriever;
/// use adaptive_query_core::types::ScoredResult;
/// use adaptive_query_pipeline::service::{AdaptiveQueryServiceBuilder, ProcessOptions};
///
/// # tokio_test::block_on(async {
/// let backend = FnRetriever::new(|query: String| async move {
///     Ok(vec![ScoredResult::new(format!("notes on {query}"), 0.8, "memory")])
/// });
/// let service = AdaptiveQueryServiceBuilder::new()
///     .with_retriever(Arc::new(backend))
///     .build()
///     .await
///     .unwrap();
///
/// service.start().await.unwrap();
/// let outcome = service
///     .process_query("s1", "how to configure redis persistence", 5, ProcessOptions::default())
///     .await
///     .unwrap();
/// assert!(outcome.retrieved);
/// service.stop().await.unwrap();
/// # });
/// ```
#[derive(Default)]
pub struct AdaptiveQueryServiceBuilder {
    config: PipelineConfig,
    retriever: Option<Arc<dyn ContextRetriever>>,
    state_store: Option<Arc<dyn StateStore>>,
    decision_rules: Vec<DecisionRule>,
}

impl std::fmt::Debug for AdaptiveQueryServiceBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdaptiveQueryServiceBuilder")
            .field("config", &self.config)
            .field("has_retriever", &self.retriever.is_some())
            .field("has_state_store", &self.state_store.is_some())
            .field("decision_rules", &self.decision_rules.len())
            .finish_non_exhaustive()
    }
}

impl AdaptiveQueryServiceBuilder {
    /// Create a builder with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a pipeline configuration.
    #[must_use]
    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the retrieval collaborator. Required.
    #[must_use]
    pub fn with_retriever(mut self, retriever: Arc<dyn ContextRetriever>) -> Self {
        self.retriever = Some(retriever);
        self
    }

    /// Set the state-store collaborator.
    #[must_use]
    pub fn with_state_store(mut self, state_store: Arc<dyn StateStore>) -> Self {
        self.state_store = Some(state_store);
        self
    }

    /// Register an extra decision rule next to the built-in ones.
    #[must_use]
    pub fn with_decision_rule(mut self, rule: DecisionRule) -> Self {
        self.decision_rules.push(rule);
        self
    }

    /// Validate the configuration and assemble the service.
    pub async fn build(self) -> Result<AdaptiveQueryService> {
        self.config.validate()?;
        let retriever = self
            .retriever
            .ok_or_else(|| AdaptiveQueryError::configuration("a context retriever is required"))?;
        let config = self.config;

        let gate = Arc::new(RetrievalGate::new(config.gate.clone()));
        let context = Arc::new(SessionContextLayer::new(SessionLimits::from(&config.service)));
        let classifier = Arc::new(IntentClassifier::new(config.classifier.clone()));
        let decision = Arc::new(DecisionEngine::new(config.decision.clone()));
        for rule in self.decision_rules {
            decision.register_rule(rule).await?;
        }
        let planner = Arc::new(TaskPlanner::new(config.planner.clone()));
        let rewriter = Arc::new(RewritePipeline::new(config.rewrite.clone()));
        let iterative = IterativeRetriever::new(config.iterative.clone());
        let evaluator = Arc::new(QualityEvaluator::with_shared_config(iterative.shared_config()));
        let iterative = Arc::new(
            iterative
                .with_quality_engine(Arc::clone(&evaluator) as _)
                .with_rewriter(Arc::clone(&rewriter) as _),
        );

        let registry = ComponentRegistry::new(config.registry.clone());
        let builtin: [Arc<dyn Component>; 8] = [
            Arc::clone(&gate) as _,
            Arc::clone(&context) as _,
            Arc::clone(&classifier) as _,
            Arc::clone(&decision) as _,
            Arc::clone(&planner) as _,
            Arc::clone(&rewriter) as _,
            Arc::clone(&evaluator) as _,
            Arc::clone(&iterative) as _,
        ];
        for component in builtin {
            registry.register(component).await?;
        }

        info!(service = %config.service.name, "Adaptive query service built");
        Ok(AdaptiveQueryService {
            config: config.service,
            flags: FeatureFlags::with_defaults(),
            gate,
            context,
            classifier,
            decision,
            planner,
            rewriter,
            iterative,
            registry,
            retriever,
            state_store: self.state_store,
            stats: RwLock::new(ServiceStats::default()),
        })
    }
}

/// Adaptive query processing behind one entry point.
pub struct AdaptiveQueryService {
    config: ServiceConfig,
    flags: FeatureFlags,
    gate: Arc<RetrievalGate>,
    context: Arc<SessionContextLayer>,
    classifier: Arc<IntentClassifier>,
    decision: Arc<DecisionEngine>,
    planner: Arc<TaskPlanner>,
    rewriter: Arc<RewritePipeline>,
    iterative: Arc<IterativeRetriever>,
    registry: ComponentRegistry,
    retriever: Arc<dyn ContextRetriever>,
    state_store: Option<Arc<dyn StateStore>>,
    stats: RwLock<ServiceStats>,
}

impl std::fmt::Debug for AdaptiveQueryService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdaptiveQueryService")
            .field("name", &self.config.name)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

/// Intermediate products of the adaptive stages.
#[derive(Default)]
struct Analysis {
    intent: Option<QueryIntent>,
    decision: Option<ProcessingDecision>,
    plan: Option<TaskPlan>,
    degraded: bool,
}

impl AdaptiveQueryService {
    /// Start a builder.
    #[must_use]
    pub fn builder() -> AdaptiveQueryServiceBuilder {
        AdaptiveQueryServiceBuilder::new()
    }

    /// Start every hosted component and the health monitor.
    pub async fn start(&self) -> Result<()> {
        self.registry.start_all().await?;
        info!(service = %self.config.name, "Adaptive query service started");
        Ok(())
    }

    /// Stop every hosted component.
    pub async fn stop(&self) -> Result<()> {
        self.registry.stop_all().await?;
        info!(service = %self.config.name, "Adaptive query service stopped");
        Ok(())
    }

    /// Feature flags consulted on every request.
    pub fn flags(&self) -> &FeatureFlags {
        &self.flags
    }

    /// Process one query end to end.
    #[instrument(skip(self, options), fields(service = %self.config.name))]
    pub async fn process_query(
        &self,
        session_id: &str,
        query: &str,
        limit: usize,
        options: ProcessOptions,
    ) -> Result<QueryOutcome> {
        if query.trim().is_empty() {
            return Err(AdaptiveQueryError::EmptyQuery);
        }
        if !self.registry.is_running() {
            return Err(AdaptiveQueryError::not_started(&self.config.name));
        }
        let start = Instant::now();
        self.stats.write().await.total_queries += 1;

        let gate = if !options.bypass_gate && self.flags.is_enabled(FLAG_RETRIEVAL_GATE).await {
            self.gate.evaluate(query).await
        } else {
            GateDecision {
                should_retrieve: true,
                confidence: 1.0,
                reason: "retrieval gate bypassed".to_string(),
                rule: None,
                processing_time: Duration::ZERO,
            }
        };

        let context = self.context.build_context(session_id, query).await?;

        if !gate.should_retrieve {
            info!(reason = %gate.reason, "Retrieval skipped by gate");
            self.stats.write().await.gated_queries += 1;
            self.remember(session_id, query, None).await;
            let outcome = QueryOutcome {
                session_id: session_id.to_string(),
                original_query: query.to_string(),
                final_query: query.to_string(),
                results: Vec::new(),
                assessment: QualityAssessment {
                    overall_score: 0.0,
                    relevance_score: 0.0,
                    diversity_score: 0.0,
                    completeness_score: 0.0,
                    confidence: gate.confidence,
                    issues: Vec::new(),
                },
                gate,
                retrieved: false,
                context,
                intent: None,
                decision: None,
                plan: None,
                rewrite: None,
                search: None,
                limit: effective_limit(&self.config, limit, None),
                processing_time: start.elapsed(),
            };
            self.store(&outcome).await;
            return Ok(outcome);
        }

        let analysis = self.analyze(query).await;

        let rewrite = if options.rewrite && self.flags.is_enabled(FLAG_REWRITE).await {
            Some(self.rewriter.process(query).await)
        } else {
            None
        };
        let mut search_query = rewrite
            .as_ref()
            .map_or_else(|| query.to_string(), |r| r.rewritten_query.clone());
        if let (true, Some(intent), Some(decision)) = (
            self.config.apply_task_hints,
            analysis.intent.as_ref(),
            analysis.decision.as_ref(),
        ) {
            search_query = apply_task_hints(&search_query, intent, decision);
        }
        let limit = effective_limit(&self.config, limit, analysis.intent.as_ref());
        debug!(query = %search_query, limit, "Searching");

        let iterate = options.iterative && self.flags.is_enabled(FLAG_ITERATIVE).await;
        let searched = if iterate {
            self.iterative.search(&search_query, self.retriever.as_ref()).await
        } else {
            self.iterative
                .search_once(&search_query, self.retriever.as_ref())
                .await
        };
        let search = match searched {
            Ok(search) => search,
            Err(e) => {
                warn!(error = %e, "Retrieval failed");
                self.stats.write().await.failed_queries += 1;
                return Err(e);
            }
        };

        let mut results = search.results.clone();
        results.truncate(limit);
        let outcome = QueryOutcome {
            session_id: session_id.to_string(),
            original_query: query.to_string(),
            final_query: search.final_query.clone(),
            results,
            assessment: search.assessment.clone(),
            gate,
            retrieved: true,
            context,
            intent: analysis.intent,
            decision: analysis.decision,
            plan: analysis.plan,
            rewrite,
            search: Some(search),
            limit,
            processing_time: start.elapsed(),
        };

        self.record(&outcome, analysis.degraded).await;
        self.remember(session_id, query, outcome.intent.as_ref().map(|i| i.domain))
            .await;
        self.store(&outcome).await;
        info!(
            results = outcome.results.len(),
            overall = outcome.assessment.overall_score,
            elapsed_ms = outcome.processing_time.as_millis(),
            "Query processed"
        );
        Ok(outcome)
    }

    /// Classify, decide and plan. Failures degrade instead of erroring.
    async fn analyze(&self, query: &str) -> Analysis {
        if !self.config.adaptive || !self.flags.is_enabled(FLAG_ADAPTIVE).await {
            return Analysis::default();
        }

        let intent = match self.classifier.classify(query).await {
            Ok(intent) => intent,
            Err(e) => {
                warn!(error = %e, "Classification failed, continuing without adaptation");
                return Analysis {
                    degraded: true,
                    ..Analysis::default()
                };
            }
        };

        let decision = match self.decision.decide(&intent).await {
            Ok(decision) => Some(decision),
            Err(e) => {
                warn!(error = %e, "Decision failed, continuing without decision");
                None
            }
        };

        let plan = match self.planner.plan(&intent).await {
            Ok(plan) => Some(plan),
            Err(e) => {
                debug!(error = %e, "Planning skipped");
                None
            }
        };

        Analysis {
            intent: Some(intent),
            decision,
            plan,
            degraded: false,
        }
    }

    #[allow(clippy::cast_precision_loss)]
    async fn record(&self, outcome: &QueryOutcome, degraded: bool) {
        let mut stats = self.stats.write().await;
        if degraded {
            stats.degraded_queries += 1;
        }
        if let Some(intent) = &outcome.intent {
            stats.adaptive_queries += 1;
            *stats.intent_distribution.entry(intent.intent_type).or_insert(0) += 1;
            *stats.domain_distribution.entry(intent.domain).or_insert(0) += 1;
        }
        if let Some(decision) = &outcome.decision {
            for strategy in &decision.selected_strategies {
                *stats.strategy_usage.entry(strategy.clone()).or_insert(0) += 1;
            }
        }

        stats.retrieved_queries += 1;
        let n = u32::try_from(stats.retrieved_queries).unwrap_or(u32::MAX);
        stats.average_processing_time =
            (stats.average_processing_time * (n - 1) + outcome.processing_time) / n;
        stats.average_quality +=
            (outcome.assessment.overall_score - stats.average_quality) / n as f32;

        stats.performance_history.push_back(PerformanceRecord {
            timestamp: Utc::now(),
            query: outcome.original_query.clone(),
            intent_type: outcome.intent.as_ref().map(|i| i.intent_type),
            domain: outcome.intent.as_ref().map(|i| i.domain),
            processing_time: outcome.processing_time,
            overall_score: outcome.assessment.overall_score,
            success: outcome.search.as_ref().is_some_and(|s| s.success),
        });
        while stats.performance_history.len() > self.config.history_limit {
            stats.performance_history.pop_front();
        }
    }

    async fn remember(&self, session_id: &str, query: &str, domain: Option<Domain>) {
        if let Err(e) = self.context.record(session_id, query, domain).await {
            warn!(error = %e, "Failed to record session context");
        }
    }

    async fn store(&self, outcome: &QueryOutcome) {
        let Some(store) = &self.state_store else {
            return;
        };
        let record = QueryRecord {
            session_id: outcome.session_id.clone(),
            query: outcome.original_query.clone(),
            final_query: outcome.final_query.clone(),
            intent_type: outcome.intent.as_ref().map(|i| i.intent_type),
            domain: outcome.intent.as_ref().map(|i| i.domain),
            decision_id: outcome.decision.as_ref().map(|d| d.decision_id.clone()),
            overall_score: outcome.assessment.overall_score,
            result_count: outcome.results.len(),
            termination_reason: outcome.search.as_ref().map(|s| s.termination_reason),
            timestamp: Utc::now(),
        };
        if let Err(e) = store.store_state(&record).await {
            warn!(error = %e, session_id = %outcome.session_id, "Failed to store state");
        }
    }

    /// Report whether a past decision worked out.
    pub async fn record_feedback(&self, feedback: &Feedback) -> Result<()> {
        self.decision.record_feedback(feedback).await
    }

    /// Recompute decision rule weights from their success rates.
    pub async fn optimize_decision_strategy(&self) -> HashMap<String, f32> {
        self.decision.optimize_strategy().await
    }

    /// Statistics of the service and every stage.
    pub async fn stats(&self) -> PipelineStats {
        PipelineStats {
            service: self.stats.read().await.clone(),
            classifier: self.classifier.stats().await,
            decision: self.decision.stats().await,
            planner: self.planner.stats().await,
            rewrite: self.rewriter.stats().await,
            iterative: self.iterative.stats().await,
        }
    }

    /// Recent decisions, oldest first.
    pub async fn decision_history(&self) -> Vec<ProcessingDecision> {
        self.decision.decision_history().await
    }

    /// Hosted components with their current health.
    pub async fn list_all_components(&self) -> Vec<ComponentInfo> {
        self.registry.list_all_components().await
    }

    /// Apply a configuration patch to a hosted component. Takes effect on the
    /// next request.
    pub async fn update_component_config(&self, name: &str, config: ComponentConfig) -> Result<()> {
        self.registry.update_component_config(name, config).await
    }

    /// The component registry.
    pub fn registry(&self) -> &ComponentRegistry {
        &self.registry
    }
}
