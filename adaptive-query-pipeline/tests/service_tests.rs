//! Integration tests for the adaptive query service against mocked
//! collaborators.

use std::sync::Arc;

use async_trait::async_trait;
use mockall::mock;
use mockall::predicate::always;
use pretty_assertions::assert_eq;

use adaptive_query_core::config::{PipelineConfig, ServiceConfig};
use adaptive_query_core::traits::{ContextRetriever, QueryRecord, StateStore};
use adaptive_query_core::traits::ComponentConfig;
use adaptive_query_core::types::{
    Domain, Feedback, HealthStatus, IntentType, IssueKind, ScoredResult, TerminationReason,
};
use adaptive_query_core::{AdaptiveQueryError, Result};
use adaptive_query_pipeline::decision::{DecisionRule, RuleCondition, default_outcome};
use adaptive_query_pipeline::prelude::*;

mock! {
    pub Backend {}

    #[async_trait]
    impl ContextRetriever for Backend {
        async fn retrieve(&self, query: &str) -> Result<Vec<ScoredResult>>;
        fn name(&self) -> &'static str;
    }
}

mock! {
    pub Store {}

    #[async_trait]
    impl StateStore for Store {
        async fn store_state(&self, record: &QueryRecord) -> Result<()>;
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("adaptive_query_pipeline=debug")
        .with_test_writer()
        .try_init();
}

fn good_results(query: &str) -> Vec<ScoredResult> {
    vec![
        ScoredResult::new(format!("{query} configuration reference"), 0.92, "docs"),
        ScoredResult::new(format!("{query} troubleshooting notes"), 0.85, "wiki"),
        ScoredResult::new(format!("{query} production checklist"), 0.8, "blog"),
        ScoredResult::new(format!("{query} benchmark numbers"), 0.75, "forum"),
    ]
}

async fn started(backend: MockBackend, store: Option<MockStore>) -> AdaptiveQueryService {
    let mut builder = AdaptiveQueryService::builder().with_retriever(Arc::new(backend));
    if let Some(store) = store {
        builder = builder.with_state_store(Arc::new(store));
    }
    let service = builder.build().await.unwrap();
    service.start().await.unwrap();
    service
}

#[tokio::test]
async fn test_query_flows_through_every_stage() {
    init_tracing();
    let mut backend = MockBackend::new();
    backend
        .expect_retrieve()
        .with(always())
        .returning(|query| Ok(good_results(query)));
    backend.expect_name().return_const("mock");

    let mut store = MockStore::new();
    store
        .expect_store_state()
        .withf(|record| {
            record.session_id == "s1"
                && record.intent_type == Some(IntentType::Debugging)
                && record.decision_id.is_some()
                && record.termination_reason.is_some()
        })
        .times(1)
        .returning(|_| Ok(()));

    let service = started(backend, Some(store)).await;
    let outcome = service
        .process_query("s1", "这个Go程序报错了，怎么debug？", 3, ProcessOptions::default())
        .await
        .unwrap();

    assert!(outcome.retrieved);
    assert_eq!(outcome.intent.as_ref().unwrap().intent_type, IntentType::Debugging);
    assert!(outcome.decision.is_some());
    assert!(outcome.rewrite.is_some());
    assert!(outcome.results.len() <= outcome.limit);
    assert!(!outcome.results.is_empty());
    service.stop().await.unwrap();
}

#[tokio::test]
async fn test_gated_query_never_reaches_retriever() {
    let mut backend = MockBackend::new();
    backend.expect_retrieve().never();
    backend.expect_name().return_const("mock");

    let mut store = MockStore::new();
    store
        .expect_store_state()
        .withf(|record| record.result_count == 0 && record.termination_reason.is_none())
        .times(1)
        .returning(|_| Ok(()));

    let service = started(backend, Some(store)).await;
    let outcome = service
        .process_query("s1", "谢谢", 5, ProcessOptions::default())
        .await
        .unwrap();
    assert!(!outcome.retrieved);
    assert!(outcome.gate.rule.is_some());
    service.stop().await.unwrap();
}

#[tokio::test]
async fn test_retrieval_failure_is_reported() {
    let mut backend = MockBackend::new();
    backend
        .expect_retrieve()
        .returning(|_| Err(AdaptiveQueryError::retrieval("index offline")));
    backend.expect_name().return_const("mock");

    let service = started(backend, None).await;
    let err = service
        .process_query("s1", "redis sentinel failover", 5, ProcessOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, AdaptiveQueryError::Retrieval { .. }));
    assert_eq!(service.stats().await.service.failed_queries, 1);
    service.stop().await.unwrap();
}

#[tokio::test]
async fn test_state_store_failure_does_not_fail_query() {
    let mut backend = MockBackend::new();
    backend.expect_retrieve().returning(|query| Ok(good_results(query)));
    backend.expect_name().return_const("mock");

    let mut store = MockStore::new();
    store
        .expect_store_state()
        .returning(|_| Err(AdaptiveQueryError::internal("disk full")));

    let service = started(backend, Some(store)).await;
    let outcome = service
        .process_query("s1", "postgres vacuum tuning", 5, ProcessOptions::default())
        .await;
    assert!(outcome.is_ok());
    service.stop().await.unwrap();
}

#[tokio::test]
async fn test_single_shot_search_when_iteration_is_off() {
    let mut backend = MockBackend::new();
    backend
        .expect_retrieve()
        .times(1)
        .returning(|_| Ok(Vec::new()));
    backend.expect_name().return_const("mock");

    let service = started(backend, None).await;
    let outcome = service
        .process_query(
            "s1",
            "kafka consumer lag",
            5,
            ProcessOptions::default().with_iterative(false),
        )
        .await
        .unwrap();
    let search = outcome.search.unwrap();
    assert_eq!(search.iterations, 1);
    assert_eq!(search.termination_reason, TerminationReason::Disabled);
    service.stop().await.unwrap();
}

#[tokio::test]
async fn test_iterative_config_update_changes_search() {
    let mut backend = MockBackend::new();
    backend
        .expect_retrieve()
        .returning(|query| Ok(vec![ScoredResult::new(format!("{query} reference"), 0.95, "docs")]));
    backend.expect_name().return_const("mock");

    let service = started(backend, None).await;
    let before = service
        .process_query("s1", "redis sentinel failover", 5, ProcessOptions::default())
        .await
        .unwrap();
    assert!(before.assessment.has_issue(IssueKind::InsufficientResults));

    let mut evaluator = ComponentConfig::new();
    evaluator.insert("min_results_required".to_string(), serde_json::json!(1));
    service
        .update_component_config("quality_evaluator", evaluator)
        .await
        .unwrap();
    let mut iterative = ComponentConfig::new();
    iterative.insert("max_iterations".to_string(), serde_json::json!(1));
    service
        .update_component_config("iterative_retriever", iterative)
        .await
        .unwrap();

    let after = service
        .process_query("s1", "redis sentinel failover", 5, ProcessOptions::default())
        .await
        .unwrap();
    assert!(!after.assessment.has_issue(IssueKind::InsufficientResults));
    assert_eq!(after.search.as_ref().map(|s| s.iterations), Some(1));
    service.stop().await.unwrap();
}

#[tokio::test]
async fn test_session_context_carries_dominant_domain() {
    let mut backend = MockBackend::new();
    backend.expect_retrieve().returning(|query| Ok(good_results(query)));
    backend.expect_name().return_const("mock");

    let service = started(backend, None).await;
    for query in ["mysql 索引 优化", "sql 慢查询 分析"] {
        service
            .process_query("s1", query, 5, ProcessOptions::default())
            .await
            .unwrap();
    }
    let outcome = service
        .process_query("s1", "继续", 5, ProcessOptions::default().bypass_gate())
        .await
        .unwrap();
    assert_eq!(outcome.context.recent_queries.len(), 2);
    assert_eq!(outcome.context.dominant_domain, Some(Domain::Database));
    service.stop().await.unwrap();
}

#[tokio::test]
async fn test_custom_rule_and_feedback() {
    let mut backend = MockBackend::new();
    backend.expect_retrieve().returning(|query| Ok(good_results(query)));
    backend.expect_name().return_const("mock");

    let rule = DecisionRule::new(
        "frontend_rule",
        0.99,
        0.9,
        RuleCondition::DomainIs(Domain::Frontend),
        |_| Ok(default_outcome()),
    );
    let service = AdaptiveQueryService::builder()
        .with_retriever(Arc::new(backend))
        .with_decision_rule(rule)
        .build()
        .await
        .unwrap();
    service.start().await.unwrap();

    let outcome = service
        .process_query("s1", "react 组件 渲染 优化", 5, ProcessOptions::default())
        .await
        .unwrap();
    let decision = outcome.decision.unwrap();
    assert_eq!(decision.rule_id.as_deref(), Some("frontend_rule"));

    service
        .record_feedback(&Feedback::success(decision.decision_id.clone()))
        .await
        .unwrap();
    assert_eq!(service.decision_history().await.len(), 1);

    let weights = service.optimize_decision_strategy().await;
    assert!((weights["frontend_rule"] - 1.2).abs() < 1e-6);
    service.stop().await.unwrap();
}

#[tokio::test]
async fn test_components_are_listed_healthy_while_running() {
    let mut backend = MockBackend::new();
    backend.expect_name().return_const("mock");

    let service = started(backend, None).await;
    let components = service.list_all_components().await;
    assert_eq!(components.len(), 8);
    assert!(
        components
            .iter()
            .all(|c| c.health.status == HealthStatus::Healthy)
    );
    service.stop().await.unwrap();
}

#[tokio::test]
async fn test_builder_rejects_invalid_config() {
    let config = PipelineConfig::default().with_service(ServiceConfig {
        default_limit: 0,
        ..ServiceConfig::default()
    });
    let err = AdaptiveQueryService::builder()
        .with_config(config)
        .with_retriever(Arc::new(MockBackend::new()))
        .build()
        .await
        .unwrap_err();
    assert!(matches!(err, AdaptiveQueryError::Configuration { .. }));
}
