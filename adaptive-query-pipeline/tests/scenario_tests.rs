//! End-to-end scenarios across the pipeline components.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use pretty_assertions::assert_eq;

use adaptive_query_core::config::{PlannerConfig, RewriteConfig};
use adaptive_query_core::traits::{Component, ComponentConfig, FnRetriever, RewriteStrategy};
use adaptive_query_core::types::{
    ComponentHealth, Domain, IntentType, IssueKind, ScoredResult, TerminationReason,
};
use adaptive_query_core::{AdaptiveQueryError, Result};
use adaptive_query_pipeline::classifier::IntentClassifier;
use adaptive_query_pipeline::decision::DecisionEngine;
use adaptive_query_pipeline::gate::RetrievalGate;
use adaptive_query_pipeline::iterative::IterativeRetriever;
use adaptive_query_pipeline::planner::{TaskPlanner, validate_plan};
use adaptive_query_pipeline::registry::ComponentRegistry;
use adaptive_query_pipeline::rewrite::RewritePipeline;

const COMPLEX_QUERY: &str =
    "如何设计一个高可用的分布式微服务架构，需要考虑服务发现、负载均衡和熔断器";

#[tokio::test]
async fn test_debugging_query_is_classified() {
    let classifier = IntentClassifier::default();
    let intent = classifier
        .classify("这个Go程序报错了，怎么debug？")
        .await
        .unwrap();

    assert_eq!(intent.intent_type, IntentType::Debugging);
    assert_eq!(intent.domain, Domain::Programming);
    assert!(intent.tech_stack.iter().any(|t| t == "go"));
}

#[tokio::test]
async fn test_complex_architecture_query_gets_sequential_plan() {
    let classifier = IntentClassifier::default();
    let intent = classifier.classify(COMPLEX_QUERY).await.unwrap();
    assert!(intent.complexity >= 0.7);
    assert_eq!(intent.domain, Domain::Architecture);

    let engine = DecisionEngine::default();
    engine.start().await.unwrap();
    let decision = engine.decide(&intent).await.unwrap();
    assert!(!decision.task_plan.parallel);
    assert!(decision.task_plan.timeout_seconds >= 40);
    engine.stop().await.unwrap();
}

#[tokio::test]
async fn test_empty_retrieval_terminates_at_max_iterations() {
    let retriever = IterativeRetriever::default();
    let backend = FnRetriever::new(|_query: String| async { Ok(Vec::<ScoredResult>::new()) });

    let outcome = retriever.search("kafka rebalancing", &backend).await.unwrap();
    assert!(outcome.assessment.overall_score.abs() < f32::EPSILON);
    assert!(outcome.assessment.has_issue(IssueKind::NoResults));
    assert_eq!(outcome.termination_reason, TerminationReason::MaxIterationsReached);
    assert_eq!(outcome.iterations, 3);
}

#[derive(Debug)]
struct StubComponent {
    name: String,
    fail_start: bool,
    log: Arc<Mutex<Vec<String>>>,
}

impl StubComponent {
    fn new(name: &str, fail_start: bool, log: &Arc<Mutex<Vec<String>>>) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            fail_start,
            log: Arc::clone(log),
        })
    }
}

#[async_trait]
impl Component for StubComponent {
    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> &str {
        "0.0.0"
    }

    async fn initialize(&self, _config: &ComponentConfig) -> Result<()> {
        Ok(())
    }

    async fn start(&self) -> Result<()> {
        if self.fail_start {
            return Err(AdaptiveQueryError::internal("refusing to start"));
        }
        self.log.lock().unwrap().push(format!("start {}", self.name));
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.log.lock().unwrap().push(format!("stop {}", self.name));
        Ok(())
    }

    async fn health_check(&self) -> ComponentHealth {
        ComponentHealth::healthy("stub component")
    }
}

#[tokio::test]
async fn test_failed_start_rolls_back_in_reverse() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let registry = ComponentRegistry::default();
    registry.register(StubComponent::new("first", false, &log)).await.unwrap();
    registry.register(StubComponent::new("second", false, &log)).await.unwrap();
    registry.register(StubComponent::new("third", true, &log)).await.unwrap();

    let err = registry.start_all().await.unwrap_err();
    assert!(matches!(err, AdaptiveQueryError::Lifecycle { .. }));
    assert!(!registry.is_running());
    assert!(registry.start_order().await.is_empty());
    assert_eq!(
        *log.lock().unwrap(),
        vec!["start first", "start second", "stop second", "stop first"]
    );
}

#[tokio::test]
async fn test_classification_is_deterministic() {
    let classifier = IntentClassifier::default();
    for query in ["redis 集群 部署", COMPLEX_QUERY, "what is a monad"] {
        let a = classifier.classify(query).await.unwrap();
        let b = classifier.classify(query).await.unwrap();
        assert_eq!(a.intent_type, b.intent_type);
        assert_eq!(a.domain, b.domain);
        assert!((a.complexity - b.complexity).abs() < f32::EPSILON);
        assert_eq!(a.keywords, b.keywords);
    }
}

#[tokio::test]
async fn test_every_decision_has_tasks() {
    let classifier = IntentClassifier::default();
    let engine = DecisionEngine::default();
    engine.start().await.unwrap();
    for query in [
        "这个Go程序报错了，怎么debug？",
        "如何配置nginx反向代理",
        "什么是CAP定理",
        "rust async runtime",
        COMPLEX_QUERY,
    ] {
        let intent = classifier.classify(query).await.unwrap();
        let decision = engine.decide(&intent).await.unwrap();
        assert!(!decision.task_plan.tasks.is_empty(), "{query}");
        assert!(!decision.selected_strategies.is_empty(), "{query}");
    }
}

#[tokio::test]
async fn test_dangling_dependency_round_trip() {
    let classifier = IntentClassifier::default();
    let planner = TaskPlanner::new(PlannerConfig::default());
    let intent = classifier.classify(COMPLEX_QUERY).await.unwrap();
    let mut plan = planner.plan(&intent).await.unwrap();
    planner.validate_plan(&plan).await.unwrap();

    plan.tasks[0].dependencies.push("missing_task".to_string());
    assert!(matches!(
        validate_plan(&plan, PlannerConfig::default().max_tasks_per_plan),
        Err(AdaptiveQueryError::InvalidPlan { .. })
    ));

    plan.tasks[0].dependencies.retain(|d| d != "missing_task");
    planner.validate_plan(&plan).await.unwrap();
}

#[tokio::test]
async fn test_rewrite_is_idempotent() {
    let pipeline = RewritePipeline::new(RewriteConfig::default());
    let once = pipeline
        .rewrite("请问 数据库 性能 问题 with the UserService")
        .await
        .unwrap();
    let twice = pipeline.rewrite(&once.rewritten_query).await.unwrap();
    assert_eq!(twice.rewritten_query, once.rewritten_query);
}

#[tokio::test]
async fn test_gate_boundaries() {
    let gate = RetrievalGate::default();
    assert!(!gate.evaluate("ok").await.should_retrieve);
    assert!(!gate.evaluate("你是谁").await.should_retrieve);
    assert!(gate.evaluate("go").await.should_retrieve);
    assert!(gate.evaluate("k8s").await.should_retrieve);
    assert!(
        gate.evaluate("how do I tune postgres autovacuum")
            .await
            .should_retrieve
    );
}
