//! Tests for the facade crate: configuration file to running service.

use std::io::Write;
use std::sync::Arc;

use adaptive_query::prelude::*;
use pretty_assertions::assert_eq;

#[tokio::test]
async fn test_service_from_config_file() {
    adaptive_query::init_tracing();

    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    writeln!(
        file,
        r#"
[iterative]
max_iterations = 1

[service]
name = "facade_service"
default_limit = 2
"#
    )
    .unwrap();

    let config = PipelineConfig::from_file(file.path()).unwrap();
    assert_eq!(config.iterative.max_iterations, 1);
    assert_eq!(config.service.name, "facade_service");

    let backend = FnRetriever::new(|query: String| async move {
        Ok((0..5)
            .map(|i| ScoredResult::new(format!("{query} part {i}"), 0.9, "memory"))
            .collect())
    });
    let service = AdaptiveQueryService::builder()
        .with_config(config)
        .with_retriever(Arc::new(backend))
        .build()
        .await
        .unwrap();
    service.start().await.unwrap();

    let outcome = service
        .process_query("s", "rust 生命周期 错误", 0, ProcessOptions::default())
        .await
        .unwrap();
    assert!(outcome.results.len() <= outcome.limit);
    assert_eq!(outcome.search.as_ref().map(|s| s.iterations), Some(1));
    service.stop().await.unwrap();
}

#[test]
fn test_init_tracing_is_idempotent() {
    adaptive_query::init_tracing();
    assert!(!adaptive_query::init_tracing());
}
