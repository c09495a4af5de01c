//! Result-set quality evaluation.

use async_trait::async_trait;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use adaptive_query_core::Result;
use adaptive_query_core::config::{IterativeConfig, merge_overrides};
use adaptive_query_core::traits::{Component, ComponentConfig, QualityEngine};
use adaptive_query_core::types::{
    ComponentHealth, ImprovementSuggestion, IssueKind, IssueSeverity, QualityAssessment,
    QualityIssue, ScoredResult, SuggestionKind,
};

use crate::utils::{content_words, jaccard};

/// Scores result sets on relevance, diversity and completeness and proposes
/// improvements.
///
/// Overall quality is `0.5 * relevance + 0.2 * diversity + 0.3 * completeness`.
#[derive(Debug)]
pub struct QualityEvaluator {
    name: String,
    config: Arc<RwLock<IterativeConfig>>,
}

impl Default for QualityEvaluator {
    fn default() -> Self {
        Self::new(IterativeConfig::default())
    }
}

impl QualityEvaluator {
    /// Create an evaluator. It reads `max_iterations` and
    /// `min_results_required` from the configuration.
    pub fn new(config: IterativeConfig) -> Self {
        Self::with_shared_config(Arc::new(RwLock::new(config)))
    }

    /// Create an evaluator over a configuration shared with an
    /// [`IterativeRetriever`](super::IterativeRetriever). Updates through
    /// either component are seen by both.
    pub fn with_shared_config(config: Arc<RwLock<IterativeConfig>>) -> Self {
        Self {
            name: "quality_evaluator".to_string(),
            config,
        }
    }
}

#[allow(clippy::cast_precision_loss)]
fn relevance(query: &str, results: &[ScoredResult]) -> f32 {
    let query_words = content_words(query);
    let total: f32 = results
        .iter()
        .map(|r| {
            let overlap = if query_words.is_empty() {
                0.0
            } else {
                let content = content_words(&r.content);
                query_words.intersection(&content).count() as f32 / query_words.len() as f32
            };
            (r.score + overlap) / 2.0
        })
        .sum();
    total / results.len() as f32
}

#[allow(clippy::cast_precision_loss)]
fn diversity(results: &[ScoredResult]) -> f32 {
    if results.len() <= 1 {
        return 1.0;
    }
    let words: Vec<_> = results.iter().map(|r| content_words(&r.content)).collect();
    let mut total = 0.0;
    let mut pairs = 0usize;
    for (i, a) in words.iter().enumerate() {
        for b in &words[i + 1..] {
            total += jaccard(a, b);
            pairs += 1;
        }
    }
    1.0 - total / pairs as f32
}

/// Rough number of "information units" a query asks for.
#[allow(clippy::cast_precision_loss)]
fn query_units(query: &str) -> f32 {
    let words = content_words(query);
    let long = words.iter().filter(|w| w.len() > 6).count();
    (words.len() as f32 + 0.5 * long as f32) / 10.0
}

#[allow(clippy::cast_precision_loss)]
fn completeness(query: &str, results: &[ScoredResult]) -> f32 {
    let mut units = query_units(query);
    if units <= 0.0 {
        units = 1.0;
    }
    (results.len() as f32 / (units * 3.0)).min(1.0)
}

#[allow(clippy::cast_precision_loss)]
fn confidence(results: &[ScoredResult]) -> f32 {
    let total: f32 = results.iter().map(|r| r.score).sum();
    let max = results.iter().map(|r| r.score).fold(0.0_f32, f32::max);
    ((total / results.len() as f32 + max) / 2.0).min(1.0)
}

fn issue(kind: IssueKind, severity: IssueSeverity, description: String, score: f32) -> QualityIssue {
    QualityIssue {
        kind,
        severity,
        description,
        score,
    }
}

fn suggestion(
    kind: SuggestionKind,
    priority: u32,
    expected_gain: f32,
    description: &str,
    parameters: serde_json::Value,
) -> ImprovementSuggestion {
    let parameters = match parameters {
        serde_json::Value::Object(map) => map.into_iter().collect(),
        _ => HashMap::new(),
    };
    ImprovementSuggestion {
        kind,
        priority,
        expected_gain,
        description: description.to_string(),
        parameters,
    }
}

#[async_trait]
impl QualityEngine for QualityEvaluator {
    #[allow(clippy::cast_precision_loss)]
    async fn assess(&self, query: &str, results: &[ScoredResult]) -> QualityAssessment {
        if results.is_empty() {
            return QualityAssessment {
                overall_score: 0.0,
                relevance_score: 0.0,
                diversity_score: 0.0,
                completeness_score: 0.0,
                confidence: 0.0,
                issues: vec![issue(
                    IssueKind::NoResults,
                    IssueSeverity::High,
                    "no results were retrieved".to_string(),
                    0.0,
                )],
            };
        }

        let min_results = self.config.read().await.min_results_required;
        let relevance = relevance(query, results);
        let diversity = diversity(results);
        let completeness = completeness(query, results);

        let mut issues = Vec::new();
        if relevance < 0.4 {
            issues.push(issue(
                IssueKind::LowRelevance,
                IssueSeverity::High,
                format!("relevance too low: {relevance:.2}"),
                relevance,
            ));
        }
        if diversity < 0.3 {
            issues.push(issue(
                IssueKind::LowDiversity,
                IssueSeverity::Medium,
                format!("results are too similar: {diversity:.2}"),
                diversity,
            ));
        }
        if completeness < 0.5 {
            issues.push(issue(
                IssueKind::Incompleteness,
                IssueSeverity::Medium,
                format!("results are incomplete: {completeness:.2}"),
                completeness,
            ));
        }
        if results.len() < min_results {
            issues.push(issue(
                IssueKind::InsufficientResults,
                IssueSeverity::High,
                format!("only {} results", results.len()),
                results.len() as f32 / 10.0,
            ));
        }

        QualityAssessment {
            overall_score: relevance * 0.5 + diversity * 0.2 + completeness * 0.3,
            relevance_score: relevance,
            diversity_score: diversity,
            completeness_score: completeness,
            confidence: confidence(results),
            issues,
        }
    }

    fn suggest(&self, assessment: &QualityAssessment) -> Vec<ImprovementSuggestion> {
        let mut suggestions = Vec::new();
        for found in &assessment.issues {
            match found.kind {
                IssueKind::LowRelevance => suggestions.push(suggestion(
                    SuggestionKind::QueryRewrite,
                    8,
                    0.3,
                    "rewrite the query to improve relevance",
                    json!({"focus": "relevance", "method": "keyword_enhancement"}),
                )),
                IssueKind::LowDiversity => suggestions.push(suggestion(
                    SuggestionKind::ExpandSearch,
                    6,
                    0.2,
                    "broaden the search for more varied results",
                    json!({"method": "synonym_expansion"}),
                )),
                IssueKind::Incompleteness => suggestions.push(suggestion(
                    SuggestionKind::QueryDecomposition,
                    7,
                    0.25,
                    "split the query to cover more aspects",
                    json!({"method": "aspect_decomposition"}),
                )),
                IssueKind::NoResults => suggestions.push(suggestion(
                    SuggestionKind::ExpandSearch,
                    6,
                    0.2,
                    "broaden the search to find any results",
                    json!({"method": "related_terms"}),
                )),
                IssueKind::InsufficientResults => {}
            }
        }

        if assessment.overall_score < 0.3 {
            suggestions.push(suggestion(
                SuggestionKind::QueryRewrite,
                9,
                0.4,
                "overall quality is poor, rewrite the query",
                json!({"strategy": "complete_rewrite"}),
            ));
        } else if assessment.overall_score < 0.6 {
            suggestions.push(suggestion(
                SuggestionKind::RefineQuery,
                5,
                0.15,
                "refine the query wording",
                json!({"strategy": "refinement"}),
            ));
        }
        suggestions
    }

    async fn should_continue(&self, assessment: &QualityAssessment, iteration: usize) -> bool {
        if assessment.overall_score < 0.3 || assessment.has_high_severity_issue() {
            return true;
        }
        iteration < self.config.read().await.max_iterations / 2 && assessment.overall_score < 0.7
    }
}

#[async_trait]
impl Component for QualityEvaluator {
    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> &str {
        crate::VERSION
    }

    async fn initialize(&self, config: &ComponentConfig) -> Result<()> {
        let mut current = self.config.write().await;
        let updated: IterativeConfig = merge_overrides(&*current, config)?;
        updated.validate()?;
        *current = updated;
        Ok(())
    }

    async fn start(&self) -> Result<()> {
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        Ok(())
    }

    async fn health_check(&self) -> ComponentHealth {
        ComponentHealth::healthy("quality evaluator ready")
    }

    fn as_quality_engine(self: Arc<Self>) -> Option<Arc<dyn QualityEngine>> {
        Some(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn result(content: &str, score: f32) -> ScoredResult {
        ScoredResult::new(content, score, "test")
    }

    #[tokio::test]
    async fn test_empty_results() {
        let assessment = QualityEvaluator::default().assess("redis cache", &[]).await;
        assert!(assessment.overall_score.abs() < f32::EPSILON);
        assert!(assessment.confidence.abs() < f32::EPSILON);
        assert_eq!(assessment.issues.len(), 1);
        assert!(assessment.has_issue(IssueKind::NoResults));
    }

    #[tokio::test]
    async fn test_scores() {
        let evaluator = QualityEvaluator::default();
        let results = vec![
            result("redis cache eviction policy", 0.8),
            result("redis persistence snapshots", 0.6),
            result("cache warming strategies", 0.4),
        ];
        let assessment = evaluator.assess("redis cache", &results).await;

        // overlaps: 1.0, 0.5, 0.5
        let expected_relevance = ((0.8 + 1.0) / 2.0 + (0.6 + 0.5) / 2.0 + (0.4 + 0.5) / 2.0) / 3.0;
        assert!((assessment.relevance_score - expected_relevance).abs() < 1e-5);
        // two content words -> 0.2 units -> 0.6 results needed
        assert!((assessment.completeness_score - 1.0).abs() < 1e-6);
        assert!((assessment.confidence - 0.7).abs() < 1e-6);
        assert!(assessment.issues.is_empty());
    }

    #[tokio::test]
    async fn test_identical_results_lack_diversity() {
        let evaluator = QualityEvaluator::default();
        let results = vec![result("same text here", 0.9), result("same text here", 0.9)];
        let assessment = evaluator.assess("same text", &results).await;
        assert!(assessment.diversity_score.abs() < 1e-6);
        assert!(assessment.has_issue(IssueKind::LowDiversity));
        assert!(assessment.has_issue(IssueKind::InsufficientResults));
    }

    #[tokio::test]
    async fn test_suggestions_for_empty_results() {
        let evaluator = QualityEvaluator::default();
        let assessment = evaluator.assess("anything", &[]).await;
        let kinds: Vec<_> = evaluator
            .suggest(&assessment)
            .into_iter()
            .map(|s| s.kind)
            .collect();
        assert_eq!(
            kinds,
            vec![SuggestionKind::ExpandSearch, SuggestionKind::QueryRewrite]
        );
    }

    #[tokio::test]
    async fn test_should_continue() {
        let evaluator = QualityEvaluator::default();
        let mut assessment = QualityAssessment {
            overall_score: 0.65,
            relevance_score: 0.7,
            diversity_score: 0.7,
            completeness_score: 0.5,
            confidence: 0.8,
            issues: Vec::new(),
        };
        assert!(evaluator.should_continue(&assessment, 0).await);
        assert!(!evaluator.should_continue(&assessment, 1).await);
        assessment.overall_score = 0.2;
        assert!(evaluator.should_continue(&assessment, 2).await);
    }

    #[tokio::test]
    async fn test_initialize_lowers_min_results() {
        let evaluator = QualityEvaluator::default();
        let results = vec![result("redis cache eviction policy", 0.9)];
        let before = evaluator.assess("redis cache", &results).await;
        assert!(before.has_issue(IssueKind::InsufficientResults));

        let mut overrides = ComponentConfig::new();
        overrides.insert("min_results_required".to_string(), json!(1));
        evaluator.initialize(&overrides).await.unwrap();

        let after = evaluator.assess("redis cache", &results).await;
        assert!(!after.has_issue(IssueKind::InsufficientResults));
    }
}
