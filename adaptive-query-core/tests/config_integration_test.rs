//! Integration tests for layered configuration loading.

use adaptive_query_core::config::{
    FeatureFlags, GateRuleKind, IterativeConfig, PipelineConfig, merge_overrides,
};
use adaptive_query_core::traits::ComponentConfig;
use pretty_assertions::assert_eq;
use std::io::Write;
use tempfile::NamedTempFile;

fn toml_file() -> NamedTempFile {
    tempfile::Builder::new().suffix(".toml").tempfile().unwrap()
}

#[test]
fn test_load_from_toml_file() {
    let mut file = toml_file();
    writeln!(
        file,
        r#"
[iterative]
max_iterations = 4
timeout_ms = 5000

[gate]
rules = ["status_confirmation", "ultra_short_query", "default"]

[rewrite.noise_reduction]
min_length = 6
"#
    )
    .unwrap();

    let config = PipelineConfig::from_file(file.path()).unwrap();
    assert_eq!(config.iterative.max_iterations, 4);
    assert_eq!(config.iterative.timeout_ms, 5000);
    assert_eq!(
        config.gate.rules,
        vec![
            GateRuleKind::StatusConfirmation,
            GateRuleKind::UltraShortQuery,
            GateRuleKind::Default
        ]
    );
    assert_eq!(config.rewrite.noise_reduction.min_length, 6);
    // Untouched sections keep their defaults.
    assert_eq!(config.planner.max_tasks_per_plan, 10);
}

#[test]
fn test_missing_file_yields_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let config = PipelineConfig::from_file(dir.path().join("absent.toml")).unwrap();
    assert_eq!(config.decision.history_limit, 100);
}

#[test]
fn test_invalid_file_rejected() {
    let mut file = toml_file();
    writeln!(file, "[iterative]\nquality_threshold = 3.5").unwrap();
    assert!(PipelineConfig::from_file(file.path()).is_err());
}

#[test]
fn test_hot_update_patch() {
    let mut patch = ComponentConfig::new();
    patch.insert("quality_threshold".to_string(), serde_json::json!(0.8));
    let updated = merge_overrides(&IterativeConfig::default(), &patch).unwrap();
    assert!((updated.quality_threshold - 0.8).abs() < f32::EPSILON);
    assert_eq!(updated.max_iterations, 3);
}

#[tokio::test]
async fn test_feature_flags_toggle() {
    let flags = FeatureFlags::with_defaults();
    flags.disable("retrieval_gate").await;
    flags.enable("experimental").await;
    let names: Vec<_> = flags
        .list()
        .await
        .into_iter()
        .filter(|f| f.enabled)
        .map(|f| f.name)
        .collect();
    assert!(names.contains(&"experimental".to_string()));
    assert!(!names.contains(&"retrieval_gate".to_string()));
}
