//! Query rewrite types.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use strum::{AsRefStr, Display, EnumString};

/// The rewrite stages, in their default priority order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RewriteStage {
    /// Keyword extraction.
    KeywordExtraction,
    /// Stop-word and filler removal.
    NoiseReduction,
    /// Domain terms, synonyms and related concepts.
    ContextEnrichment,
}

/// Output of a single stage run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RewriteCandidate {
    /// Stage that produced the candidate.
    pub stage: RewriteStage,
    /// Query the stage received.
    pub original_query: String,
    /// Query the stage produced.
    pub rewritten_query: String,
    /// Keywords found by the stage.
    pub extracted_keywords: Vec<String>,
    /// Tokens or phrases removed by the stage.
    pub removed_noise: Vec<String>,
    /// Terms added by the stage.
    pub added_context: Vec<String>,
    /// Stage quality in `[0, 1]`.
    pub quality_score: f32,
    /// Time spent in the stage.
    pub processing_time: Duration,
}

impl RewriteCandidate {
    /// A candidate that leaves the query untouched.
    pub fn unchanged<S: Into<String>>(stage: RewriteStage, query: S) -> Self {
        let query = query.into();
        Self {
            stage,
            original_query: query.clone(),
            rewritten_query: query,
            extracted_keywords: Vec::new(),
            removed_noise: Vec::new(),
            added_context: Vec::new(),
            quality_score: 0.0,
            processing_time: Duration::ZERO,
        }
    }

    /// Whether the stage changed the query.
    pub fn changed(&self) -> bool {
        self.original_query != self.rewritten_query
    }
}

/// One applied stage in the rewrite log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RewriteStep {
    /// Pipeline pass, starting at 1.
    pub iteration: usize,
    /// Stage that ran.
    pub stage: RewriteStage,
    /// Query before the stage.
    pub input: String,
    /// Query after the stage.
    pub output: String,
    /// Stage quality.
    pub quality_score: f32,
    /// Time spent in the stage.
    pub duration: Duration,
}

/// Cumulative result of the rewrite pipeline for one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RewriteResult {
    /// Query given to the pipeline.
    pub original_query: String,
    /// Final query.
    pub rewritten_query: String,
    /// Keywords found across all stages, deduplicated.
    pub keywords: Vec<String>,
    /// Noise removed across all stages, deduplicated.
    pub removed_noise: Vec<String>,
    /// Context added across all stages, deduplicated.
    pub added_context: Vec<String>,
    /// Best quality seen.
    pub quality_score: f32,
    /// Number of passes run.
    pub iterations: usize,
    /// Stages that changed the query, in order.
    pub steps: Vec<RewriteStep>,
    /// Total time.
    pub processing_time: Duration,
}

impl RewriteResult {
    /// A result that leaves the query untouched with the given quality.
    pub fn passthrough<S: Into<String>>(query: S, quality_score: f32) -> Self {
        let query = query.into();
        Self {
            original_query: query.clone(),
            rewritten_query: query,
            keywords: Vec::new(),
            removed_noise: Vec::new(),
            added_context: Vec::new(),
            quality_score,
            iterations: 0,
            steps: Vec::new(),
            processing_time: Duration::ZERO,
        }
    }

    /// Whether the query was changed.
    pub fn changed(&self) -> bool {
        self.original_query != self.rewritten_query
    }
}
