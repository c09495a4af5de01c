//! Retrieval result and quality types.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use strum::{AsRefStr, Display, EnumString};

/// A single result returned by the retrieval collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredResult {
    /// Retrieved text.
    pub content: String,
    /// Backend score, expected in `[0, 1]`.
    pub score: f32,
    /// Where the content came from.
    pub source: String,
    /// Backend metadata.
    pub metadata: HashMap<String, serde_json::Value>,
}

impl ScoredResult {
    /// Create a result without metadata.
    pub fn new<C: Into<String>, S: Into<String>>(content: C, score: f32, source: S) -> Self {
        Self {
            content: content.into(),
            score,
            source: source.into(),
            metadata: HashMap::new(),
        }
    }
}

/// Kind of quality problem found in a result set.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum IssueKind {
    /// Nothing was retrieved.
    NoResults,
    /// Results do not match the query.
    LowRelevance,
    /// Results repeat each other.
    LowDiversity,
    /// Too few results for the query's complexity.
    Incompleteness,
    /// Fewer results than required.
    InsufficientResults,
}

/// How serious an issue is.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum IssueSeverity {
    /// Cosmetic.
    Low,
    /// Worth improving.
    Medium,
    /// Should be improved before answering.
    High,
}

/// A problem found while assessing a result set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityIssue {
    /// Issue kind.
    #[serde(rename = "type")]
    pub kind: IssueKind,
    /// Severity.
    pub severity: IssueSeverity,
    /// Human readable description.
    pub description: String,
    /// The metric value that triggered the issue.
    pub score: f32,
}

/// Scored evaluation of a result set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityAssessment {
    /// `0.5 * relevance + 0.2 * diversity + 0.3 * completeness`.
    pub overall_score: f32,
    /// How well results match the query.
    pub relevance_score: f32,
    /// How different results are from each other.
    pub diversity_score: f32,
    /// Result count relative to query complexity.
    pub completeness_score: f32,
    /// Confidence of the assessment.
    pub confidence: f32,
    /// Problems found.
    pub issues: Vec<QualityIssue>,
}

impl QualityAssessment {
    /// Whether an issue of `kind` was raised.
    pub fn has_issue(&self, kind: IssueKind) -> bool {
        self.issues.iter().any(|i| i.kind == kind)
    }

    /// Whether any issue is of high severity.
    pub fn has_high_severity_issue(&self) -> bool {
        self.issues.iter().any(|i| i.severity == IssueSeverity::High)
    }
}

/// Kind of improvement the iterative retriever can apply.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SuggestionKind {
    /// Run the rewrite pipeline.
    QueryRewrite,
    /// Broaden with related terms.
    ExpandSearch,
    /// Narrow with detail terms.
    RefineQuery,
    /// Ask for principles, methods and steps.
    QueryDecomposition,
}

/// A proposed next action to raise quality.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImprovementSuggestion {
    /// Suggestion kind.
    #[serde(rename = "type")]
    pub kind: SuggestionKind,
    /// Priority, higher first.
    pub priority: u32,
    /// Expected gain in overall score.
    pub expected_gain: f32,
    /// Human readable description.
    pub description: String,
    /// Extra parameters for the applier.
    pub parameters: HashMap<String, serde_json::Value>,
}

impl ImprovementSuggestion {
    /// Ranking score: `priority * expected_gain`.
    #[allow(clippy::cast_precision_loss)]
    pub fn rank(&self) -> f32 {
        self.priority as f32 * self.expected_gain
    }
}

/// Why the iterative search loop stopped.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TerminationReason {
    /// Iteration disabled; a single retrieval was made.
    Disabled,
    /// The deadline passed.
    Timeout,
    /// The quality threshold was reached.
    QualityThresholdReached,
    /// Nothing warranted further improvement.
    NoImprovementPossible,
    /// No suggestion was generated.
    NoSuggestions,
    /// No suggestion changed the query.
    QueryUnchanged,
    /// The iteration budget was used up.
    MaxIterationsReached,
}

/// What happened in one iteration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationRecord {
    /// Iteration number, starting at 1.
    pub iteration: usize,
    /// Query used for retrieval.
    pub query: String,
    /// Number of results, `None` if retrieval failed.
    pub result_count: Option<usize>,
    /// Overall score, `None` if retrieval failed.
    pub overall_score: Option<f32>,
    /// Suggestion applied after the iteration.
    pub applied: Option<SuggestionKind>,
    /// Time spent in the iteration.
    pub elapsed: Duration,
}

/// Final result of an iterative search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterativeSearchResult {
    /// Query the search started with.
    pub original_query: String,
    /// Query that produced the best results.
    pub final_query: String,
    /// Best results.
    pub results: Vec<ScoredResult>,
    /// Assessment of the best results.
    pub assessment: QualityAssessment,
    /// Completed retrieval iterations.
    pub iterations: usize,
    /// Whether the best score reached the threshold.
    pub success: bool,
    /// Why the loop stopped.
    pub termination_reason: TerminationReason,
    /// Every query tried, in order.
    pub query_history: Vec<String>,
    /// Overall score of each completed iteration.
    pub quality_history: Vec<f32>,
    /// Per-iteration log.
    pub improvement_log: Vec<IterationRecord>,
    /// Total time spent.
    pub total_time: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_suggestion_rank() {
        let s = ImprovementSuggestion {
            kind: SuggestionKind::QueryRewrite,
            priority: 9,
            expected_gain: 0.4,
            description: String::new(),
            parameters: HashMap::new(),
        };
        assert!((s.rank() - 3.6).abs() < 1e-5);
    }

    #[test]
    fn test_reason_names() {
        assert_eq!(
            TerminationReason::MaxIterationsReached.to_string(),
            "max_iterations_reached"
        );
        assert_eq!(IssueKind::NoResults.as_ref(), "no_results");
    }
}
