//! Quality-driven iterative retrieval.

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

use adaptive_query_core::config::{IterativeConfig, merge_overrides};
use adaptive_query_core::traits::{
    Component, ComponentConfig, ContextRetriever, QualityEngine, RewriteStrategy,
};
use adaptive_query_core::types::{
    ComponentHealth, HealthStatus, ImprovementSuggestion, IterationRecord, IterativeSearchResult,
    QualityAssessment, ScoredResult, SuggestionKind, TerminationReason,
};
use adaptive_query_core::{AdaptiveQueryError, Result};

use super::evaluator::QualityEvaluator;

const EXPAND_TERMS: &str = " 相关 相似 关联";
const REFINE_TERMS: &str = " 详细 具体";
const DECOMPOSE_TERMS: &str = " 原理 方法 步骤";

/// Iterative search statistics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IterativeStats {
    /// Searches run.
    pub total_searches: u64,
    /// Searches whose best result reached the quality threshold.
    pub successful_searches: u64,
    /// Mean completed iterations per search.
    pub average_iterations: f32,
    /// Mean best overall score.
    pub average_quality: f32,
    /// Mean search time.
    pub average_time: Duration,
    /// Searches whose last score beat the first by more than the improvement
    /// threshold.
    pub quality_improvements: u64,
}

struct Best {
    query: String,
    results: Vec<ScoredResult>,
    assessment: QualityAssessment,
}

/// Retrieves, scores, and improves the query until the results are good
/// enough, nothing can be improved, or the budget runs out.
///
/// # Examples
///
/// ```rust
/// use adaptive_query_core::traits::FnRetriever;
/// use adaptive_query_core::types::{ScoredResult, TerminationReason};
/// use adaptive_query_pipeline::iterative::IterativeRetriever;
///
/// # tokio_test::block_on(async {
/// let backend = FnRetriever::new(|query: String| async move {
///     Ok(vec![
///         ScoredResult::new(format!("{query} overview"), 0.9, "docs"),
///         ScoredResult::new(format!("{query} tuning guide"), 0.9, "docs"),
///         ScoredResult::new(format!("{query} internals"), 0.9, "docs"),
///     ])
/// });
///
/// let retriever = IterativeRetriever::default();
/// let outcome = retriever.search("redis eviction", &backend).await.unwrap();
/// assert_eq!(outcome.iterations, 1);
/// assert_eq!(outcome.termination_reason, TerminationReason::QualityThresholdReached);
/// # });
/// ```
pub struct IterativeRetriever {
    name: String,
    config: Arc<RwLock<IterativeConfig>>,
    engine: Arc<dyn QualityEngine>,
    rewriter: Option<Arc<dyn RewriteStrategy>>,
    stats: RwLock<IterativeStats>,
}

impl std::fmt::Debug for IterativeRetriever {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IterativeRetriever")
            .field("name", &self.name)
            .field("has_rewriter", &self.rewriter.is_some())
            .finish_non_exhaustive()
    }
}

impl Default for IterativeRetriever {
    fn default() -> Self {
        Self::new(IterativeConfig::default())
    }
}

impl IterativeRetriever {
    /// Create a retriever with the default quality evaluator and no rewriter.
    /// The evaluator shares this retriever's configuration.
    pub fn new(config: IterativeConfig) -> Self {
        let config = Arc::new(RwLock::new(config));
        let engine = Arc::new(QualityEvaluator::with_shared_config(Arc::clone(&config)));
        Self {
            name: "iterative_retriever".to_string(),
            config,
            engine,
            rewriter: None,
            stats: RwLock::new(IterativeStats::default()),
        }
    }

    /// Use a different quality engine.
    #[must_use]
    pub fn with_quality_engine(mut self, engine: Arc<dyn QualityEngine>) -> Self {
        self.engine = engine;
        self
    }

    /// Configuration handle shared with the default evaluator.
    pub fn shared_config(&self) -> Arc<RwLock<IterativeConfig>> {
        Arc::clone(&self.config)
    }

    /// Rewriter used for `query_rewrite` suggestions.
    #[must_use]
    pub fn with_rewriter(mut self, rewriter: Arc<dyn RewriteStrategy>) -> Self {
        self.rewriter = Some(rewriter);
        self
    }

    /// Search with quality-driven query improvement.
    ///
    /// Failed retrievals are logged and skipped. The call fails only when no
    /// iteration completed: with the last retrieval error, or with a timeout
    /// error when the deadline passed first.
    #[instrument(skip(self, retriever))]
    pub async fn search(
        &self,
        query: &str,
        retriever: &dyn ContextRetriever,
    ) -> Result<IterativeSearchResult> {
        let config = self.config.read().await.clone();
        let start = Instant::now();

        if !config.enabled {
            return self.search_once(query, retriever).await;
        }

        let deadline = start + config.timeout();
        let mut current = query.to_string();
        let mut best: Option<Best> = None;
        let mut completed = 0usize;
        let mut last_error = None;
        let mut query_history = Vec::new();
        let mut quality_history = Vec::new();
        let mut log = Vec::new();
        let mut reason = TerminationReason::MaxIterationsReached;

        for iteration in 0..config.max_iterations {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                reason = TerminationReason::Timeout;
                break;
            }

            let iteration_start = Instant::now();
            query_history.push(current.clone());
            let mut record = IterationRecord {
                iteration: iteration + 1,
                query: current.clone(),
                result_count: None,
                overall_score: None,
                applied: None,
                elapsed: Duration::ZERO,
            };

            let results = match tokio::time::timeout(remaining, retriever.retrieve(&current)).await {
                Err(_) => {
                    warn!(iteration = iteration + 1, "Retrieval deadline exceeded");
                    record.elapsed = iteration_start.elapsed();
                    log.push(record);
                    reason = TerminationReason::Timeout;
                    break;
                }
                Ok(Err(e)) => {
                    warn!(iteration = iteration + 1, error = %e, "Retrieval failed, skipping iteration");
                    record.elapsed = iteration_start.elapsed();
                    log.push(record);
                    last_error = Some(e);
                    continue;
                }
                Ok(Ok(results)) => results,
            };

            completed += 1;
            let assessment = self.engine.assess(&current, &results).await;
            let overall = assessment.overall_score;
            quality_history.push(overall);
            record.result_count = Some(results.len());
            record.overall_score = Some(overall);
            debug!(
                iteration = iteration + 1,
                results = results.len(),
                overall,
                "Iteration assessed"
            );

            let keep_going = self.engine.should_continue(&assessment, iteration).await;
            let suggestions = self.engine.suggest(&assessment);
            if best
                .as_ref()
                .is_none_or(|b| overall > b.assessment.overall_score)
            {
                best = Some(Best {
                    query: current.clone(),
                    results,
                    assessment,
                });
            }

            let stop = if overall >= config.quality_threshold {
                Some(TerminationReason::QualityThresholdReached)
            } else if !keep_going {
                Some(TerminationReason::NoImprovementPossible)
            } else if suggestions.is_empty() {
                Some(TerminationReason::NoSuggestions)
            } else {
                None
            };
            if let Some(stop) = stop {
                record.elapsed = iteration_start.elapsed();
                log.push(record);
                reason = stop;
                break;
            }

            match self.improve(&current, suggestions).await {
                Some((kind, improved)) => {
                    debug!(suggestion = %kind, query = %improved, "Query improved");
                    record.applied = Some(kind);
                    current = improved;
                }
                None => {
                    record.elapsed = iteration_start.elapsed();
                    log.push(record);
                    reason = TerminationReason::QueryUnchanged;
                    break;
                }
            }
            record.elapsed = iteration_start.elapsed();
            log.push(record);
        }

        let Some(best) = best else {
            if let Some(e) = last_error {
                return Err(e);
            }
            return Err(AdaptiveQueryError::timeout("iterative search"));
        };

        let outcome = IterativeSearchResult {
            original_query: query.to_string(),
            final_query: best.query,
            success: best.assessment.overall_score >= config.quality_threshold,
            results: best.results,
            assessment: best.assessment,
            iterations: completed,
            termination_reason: reason,
            query_history,
            quality_history,
            improvement_log: log,
            total_time: start.elapsed(),
        };
        info!(
            iterations = outcome.iterations,
            reason = %outcome.termination_reason,
            overall = outcome.assessment.overall_score,
            "Iterative search finished"
        );
        self.record(&outcome, config.improvement_threshold).await;
        Ok(outcome)
    }

    /// Retrieve once without improving the query. Used when iteration is
    /// disabled; the termination reason is `disabled`.
    pub async fn search_once(
        &self,
        query: &str,
        retriever: &dyn ContextRetriever,
    ) -> Result<IterativeSearchResult> {
        let config = self.config.read().await.clone();
        let start = Instant::now();
        let results = tokio::time::timeout(config.timeout(), retriever.retrieve(query))
            .await
            .map_err(|_| AdaptiveQueryError::timeout("retrieval"))??;
        let assessment = self.engine.assess(query, &results).await;
        let outcome = IterativeSearchResult {
            original_query: query.to_string(),
            final_query: query.to_string(),
            success: assessment.overall_score >= config.quality_threshold,
            quality_history: vec![assessment.overall_score],
            improvement_log: vec![IterationRecord {
                iteration: 1,
                query: query.to_string(),
                result_count: Some(results.len()),
                overall_score: Some(assessment.overall_score),
                applied: None,
                elapsed: start.elapsed(),
            }],
            query_history: vec![query.to_string()],
            results,
            assessment,
            iterations: 1,
            termination_reason: TerminationReason::Disabled,
            total_time: start.elapsed(),
        };
        self.record(&outcome, config.improvement_threshold).await;
        Ok(outcome)
    }

    /// Try suggestions best first until one changes the query.
    async fn improve(
        &self,
        query: &str,
        mut suggestions: Vec<ImprovementSuggestion>,
    ) -> Option<(SuggestionKind, String)> {
        suggestions.sort_by(|a, b| b.rank().total_cmp(&a.rank()));
        for suggestion in suggestions {
            let improved = self.apply(query, suggestion.kind).await;
            if improved != query {
                return Some((suggestion.kind, improved));
            }
        }
        None
    }

    async fn apply(&self, query: &str, kind: SuggestionKind) -> String {
        match kind {
            SuggestionKind::QueryRewrite => match &self.rewriter {
                Some(rewriter) => match rewriter.rewrite(query).await {
                    Ok(result) => result.rewritten_query,
                    Err(e) => {
                        warn!(error = %e, "Rewrite failed during iterative search");
                        query.to_string()
                    }
                },
                None => query.to_string(),
            },
            SuggestionKind::ExpandSearch => format!("{query}{EXPAND_TERMS}"),
            SuggestionKind::RefineQuery => format!("{query}{REFINE_TERMS}"),
            SuggestionKind::QueryDecomposition => format!("{query}{DECOMPOSE_TERMS}"),
        }
    }

    #[allow(clippy::cast_precision_loss)]
    async fn record(&self, outcome: &IterativeSearchResult, improvement_threshold: f32) {
        let mut stats = self.stats.write().await;
        stats.total_searches += 1;
        if outcome.success {
            stats.successful_searches += 1;
        }
        let n = stats.total_searches as f32;
        stats.average_iterations += (outcome.iterations as f32 - stats.average_iterations) / n;
        stats.average_quality += (outcome.assessment.overall_score - stats.average_quality) / n;
        let count = u32::try_from(stats.total_searches).unwrap_or(u32::MAX);
        stats.average_time = (stats.average_time * (count - 1) + outcome.total_time) / count;
        if let (Some(first), Some(last)) =
            (outcome.quality_history.first(), outcome.quality_history.last())
        {
            if outcome.quality_history.len() > 1 && last - first > improvement_threshold {
                stats.quality_improvements += 1;
            }
        }
    }

    /// Statistics snapshot.
    pub async fn stats(&self) -> IterativeStats {
        self.stats.read().await.clone()
    }
}

#[async_trait]
impl Component for IterativeRetriever {
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

    #[allow(clippy::cast_precision_loss)]
    async fn health_check(&self) -> ComponentHealth {
        let stats = self.stats().await;
        let health = if self.config.read().await.enabled {
            ComponentHealth::healthy("iterative retrieval enabled")
        } else {
            ComponentHealth::new(HealthStatus::Degraded, "iterative retrieval disabled")
        };
        health
            .with_metric("total_searches", stats.total_searches as f64)
            .with_metric("average_quality", f64::from(stats.average_quality))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use adaptive_query_core::traits::FnRetriever;
    use adaptive_query_core::types::IssueKind;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};

    type Ready = futures::future::Ready<Result<Vec<ScoredResult>>>;

    fn empty_backend() -> FnRetriever<impl Fn(String) -> Ready> {
        FnRetriever::new(|_query: String| futures::future::ready(Ok(Vec::new())))
    }

    #[tokio::test]
    async fn test_empty_backend_runs_all_iterations() {
        let retriever = IterativeRetriever::default();
        let outcome = retriever.search("redis", &empty_backend()).await.unwrap();
        assert_eq!(outcome.iterations, 3);
        assert_eq!(outcome.termination_reason, TerminationReason::MaxIterationsReached);
        assert!(outcome.assessment.overall_score.abs() < f32::EPSILON);
        assert!(outcome.assessment.has_issue(IssueKind::NoResults));
        assert_eq!(
            outcome.query_history,
            vec![
                "redis".to_string(),
                "redis 相关 相似 关联".to_string(),
                "redis 相关 相似 关联 相关 相似 关联".to_string(),
            ]
        );
        assert!(!outcome.success);
    }

    #[tokio::test]
    async fn test_failures_are_skipped() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let backend = FnRetriever::new(move |query: String| {
            let attempt = counter.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt == 0 {
                    Err(AdaptiveQueryError::retrieval("backend unavailable"))
                } else {
                    Ok(vec![
                        ScoredResult::new(format!("{query} one"), 1.0, "a"),
                        ScoredResult::new(format!("{query} two"), 1.0, "b"),
                        ScoredResult::new(format!("{query} three"), 1.0, "c"),
                    ])
                }
            }
        });
        let outcome = IterativeRetriever::default()
            .search("redis", &backend)
            .await
            .unwrap();
        assert_eq!(outcome.iterations, 1);
        assert_eq!(outcome.improvement_log.len(), 2);
        assert_eq!(outcome.improvement_log[0].result_count, None);
        assert_eq!(outcome.termination_reason, TerminationReason::QualityThresholdReached);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_all_failures_return_last_error() {
        let backend = FnRetriever::new(|_query: String| async {
            Err::<Vec<ScoredResult>, _>(AdaptiveQueryError::retrieval("down"))
        });
        let err = IterativeRetriever::default()
            .search("redis", &backend)
            .await
            .unwrap_err();
        assert!(matches!(err, AdaptiveQueryError::Retrieval { .. }));
    }

    #[tokio::test]
    async fn test_timeout_without_results_is_an_error() {
        let backend = FnRetriever::new(|_query: String| async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(Vec::new())
        });
        let retriever = IterativeRetriever::new(
            IterativeConfig::default().with_timeout(Duration::from_millis(20)),
        );
        let err = retriever.search("redis", &backend).await.unwrap_err();
        assert!(matches!(err, AdaptiveQueryError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_disabled_runs_once() {
        let retriever = IterativeRetriever::new(IterativeConfig::default().with_enabled(false));
        let outcome = retriever.search("redis", &empty_backend()).await.unwrap();
        assert_eq!(outcome.iterations, 1);
        assert_eq!(outcome.termination_reason, TerminationReason::Disabled);
    }

    #[tokio::test]
    async fn test_initialize_reaches_the_evaluator() {
        let backend = FnRetriever::new(|query: String| {
            futures::future::ready(Ok(vec![ScoredResult::new(format!("{query} guide"), 0.9, "a")]))
        });
        let retriever = IterativeRetriever::default();
        let before = retriever.search("redis", &backend).await.unwrap();
        assert!(before.assessment.has_issue(IssueKind::InsufficientResults));

        let mut overrides = ComponentConfig::new();
        overrides.insert("min_results_required".to_string(), serde_json::json!(1));
        overrides.insert("max_iterations".to_string(), serde_json::json!(1));
        retriever.initialize(&overrides).await.unwrap();

        let after = retriever.search("redis", &backend).await.unwrap();
        assert!(!after.assessment.has_issue(IssueKind::InsufficientResults));
        assert_eq!(after.iterations, 1);
    }

    #[tokio::test]
    async fn test_stats_are_recorded() {
        let retriever = IterativeRetriever::default();
        retriever.search("redis", &empty_backend()).await.unwrap();
        let stats = retriever.stats().await;
        assert_eq!(stats.total_searches, 1);
        assert_eq!(stats.successful_searches, 0);
        assert!((stats.average_iterations - 3.0).abs() < f32::EPSILON);
    }
}
