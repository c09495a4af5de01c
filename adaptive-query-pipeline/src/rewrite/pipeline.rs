//! Multi-pass rewrite pipeline.

use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info, instrument};

use adaptive_query_core::config::{RewriteConfig, merge_overrides};
use adaptive_query_core::traits::{Component, ComponentConfig, RewriteStrategy};
use adaptive_query_core::types::{
    ComponentHealth, HealthStatus, RewriteResult, RewriteStage, RewriteStep,
};
use adaptive_query_core::Result;

use super::stages::{
    ContextEnrichmentStage, KeywordExtractionStage, NoiseReductionStage, StageProcessor,
};
use crate::utils::{assess_query_quality, push_unique, query_complexity, query_similarity};

type StageList = Arc<Vec<Box<dyn StageProcessor>>>;

/// Rewrite statistics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RewriteStats {
    /// Queries processed.
    pub total_rewrites: u64,
    /// Queries that came out different.
    pub changed_rewrites: u64,
    /// Mean final quality.
    pub average_quality: f32,
    /// Mean change of the heuristic query quality, rewritten minus original.
    pub average_quality_gain: f32,
    /// Mean word-overlap similarity between original and rewritten query.
    pub average_similarity: f32,
    /// Mean processing time.
    pub average_time: Duration,
    /// How often each stage changed a query.
    pub stage_usage: HashMap<RewriteStage, u64>,
}

/// Runs the enabled rewrite stages in priority order for up to
/// `max_iterations` passes.
///
/// A pass that changes nothing, or a pass after which the best stage quality
/// reaches the threshold, ends the loop. Configuration updates rebuild the
/// stage list and apply to the next request.
///
/// # Examples
///
/// ```rust
/// use adaptive_query_pipeline::rewrite::RewritePipeline;
///
/// # tokio_test::block_on(async {
/// let pipeline = RewritePipeline::default();
/// let result = pipeline.process("can you tell me the api timeout").await;
/// assert!(result.rewritten_query.contains("api timeout"));
/// assert!(!result.rewritten_query.contains("can you tell me"));
/// # });
/// ```
#[derive(Debug)]
pub struct RewritePipeline {
    name: String,
    config: RwLock<RewriteConfig>,
    stages: RwLock<StageList>,
    running: AtomicBool,
    stats: RwLock<RewriteStats>,
}

impl Default for RewritePipeline {
    fn default() -> Self {
        Self::new(RewriteConfig::default())
    }
}

impl RewritePipeline {
    /// Create a pipeline with the three built-in stages.
    pub fn new(config: RewriteConfig) -> Self {
        let stages = build_stages(&config);
        Self {
            name: "query_rewriter".to_string(),
            config: RwLock::new(config),
            stages: RwLock::new(stages),
            running: AtomicBool::new(false),
            stats: RwLock::new(RewriteStats::default()),
        }
    }

    /// Replace the configuration.
    pub async fn update_config(&self, config: RewriteConfig) -> Result<()> {
        config.validate()?;
        let stages = build_stages(&config);
        *self.stages.write().await = stages;
        *self.config.write().await = config;
        Ok(())
    }

    /// Current configuration.
    pub async fn config(&self) -> RewriteConfig {
        self.config.read().await.clone()
    }

    /// Rewrite a query.
    #[instrument(skip(self))]
    pub async fn process(&self, query: &str) -> RewriteResult {
        let config = self.config.read().await.clone();
        if !config.enabled {
            return RewriteResult::passthrough(query, 1.0);
        }
        let stages = Arc::clone(&*self.stages.read().await);
        let start = Instant::now();

        let mut result = RewriteResult::passthrough(query, 0.0);
        let mut current = query.to_string();

        for pass in 1..=config.max_iterations {
            result.iterations = pass;
            let mut improved = false;
            for stage in stages.iter() {
                let candidate = stage.process(&current);
                if !candidate.changed() {
                    continue;
                }
                debug!(
                    stage = %candidate.stage,
                    pass,
                    quality = candidate.quality_score,
                    "Stage changed query"
                );
                improved = true;
                result.steps.push(RewriteStep {
                    iteration: pass,
                    stage: candidate.stage,
                    input: current.clone(),
                    output: candidate.rewritten_query.clone(),
                    quality_score: candidate.quality_score,
                    duration: candidate.processing_time,
                });
                for keyword in candidate.extracted_keywords {
                    push_unique(&mut result.keywords, keyword);
                }
                for noise in candidate.removed_noise {
                    push_unique(&mut result.removed_noise, noise);
                }
                for context in candidate.added_context {
                    push_unique(&mut result.added_context, context);
                }
                result.quality_score = result.quality_score.max(candidate.quality_score);
                current = candidate.rewritten_query;
            }

            if result.quality_score >= config.quality_threshold || !improved {
                break;
            }
        }

        if result.quality_score <= 0.0 {
            result.quality_score = fallback_quality(query, &current);
        }
        result.rewritten_query = current;
        result.processing_time = start.elapsed();

        self.record(&result).await;
        if result.changed() {
            info!(
                original = %result.original_query,
                rewritten = %result.rewritten_query,
                quality = result.quality_score,
                "Query rewritten"
            );
        }
        result
    }

    #[allow(clippy::cast_precision_loss)]
    async fn record(&self, result: &RewriteResult) {
        let gain = assess_query_quality(&result.rewritten_query)
            - assess_query_quality(&result.original_query);
        let similarity = query_similarity(&result.original_query, &result.rewritten_query);

        let mut stats = self.stats.write().await;
        stats.total_rewrites += 1;
        if result.changed() {
            stats.changed_rewrites += 1;
        }
        let n = stats.total_rewrites as f32;
        stats.average_quality += (result.quality_score - stats.average_quality) / n;
        stats.average_quality_gain += (gain - stats.average_quality_gain) / n;
        stats.average_similarity += (similarity - stats.average_similarity) / n;
        let count = u32::try_from(stats.total_rewrites).unwrap_or(u32::MAX);
        stats.average_time = (stats.average_time * (count - 1) + result.processing_time) / count;
        for step in &result.steps {
            *stats.stage_usage.entry(step.stage).or_insert(0) += 1;
        }
    }

    /// Statistics snapshot.
    pub async fn stats(&self) -> RewriteStats {
        self.stats.read().await.clone()
    }
}

/// Enabled stages, highest priority first.
fn build_stages(config: &RewriteConfig) -> StageList {
    let noise = NoiseReductionStage::new(config.noise_reduction.clone());
    let mut keywords = KeywordExtractionStage::new(config.keyword_extraction.clone());
    if noise.is_enabled() {
        keywords = keywords.with_ignored_terms(noise.stop_words());
    }
    let mut stages: Vec<Box<dyn StageProcessor>> = vec![
        Box::new(keywords),
        Box::new(noise),
        Box::new(ContextEnrichmentStage::new(
            config.context_enrichment.clone(),
        )),
    ];
    stages.retain(|s| s.is_enabled());
    stages.sort_by_key(|s| std::cmp::Reverse(s.priority()));
    Arc::new(stages)
}

/// Quality assigned when no stage produced a score.
fn fallback_quality(original: &str, rewritten: &str) -> f32 {
    if original == rewritten {
        return 0.5;
    }
    let before = query_complexity(original);
    let after = query_complexity(rewritten);
    if after > before {
        0.8
    } else if (after - before).abs() < f32::EPSILON {
        0.6
    } else {
        0.4
    }
}

#[async_trait]
impl RewriteStrategy for RewritePipeline {
    async fn rewrite(&self, query: &str) -> Result<RewriteResult> {
        Ok(self.process(query).await)
    }
}

#[async_trait]
impl Component for RewritePipeline {
    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> &str {
        crate::VERSION
    }

    async fn initialize(&self, config: &ComponentConfig) -> Result<()> {
        let current = self.config().await;
        let updated = merge_overrides(&current, config)?;
        self.update_config(updated).await
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
        let stages = self.stages.read().await.len();
        let health = if !self.config.read().await.enabled {
            ComponentHealth::new(HealthStatus::Degraded, "rewrite pipeline disabled")
        } else {
            ComponentHealth::healthy(format!("{stages} stages active"))
        };
        health
            .with_metric("total_rewrites", stats.total_rewrites as f64)
            .with_metric("average_quality", f64::from(stats.average_quality))
    }

    fn as_rewrite_strategy(self: Arc<Self>) -> Option<Arc<dyn RewriteStrategy>> {
        Some(self)
    }
}
