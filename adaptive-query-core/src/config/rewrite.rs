//! Configuration for the query rewrite pipeline.

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

use crate::{AdaptiveQueryError, Result};

/// Keyword extraction methods.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum KeywordMethod {
    /// Acronyms, calls, dotted paths, service and controller names.
    TechnicalTerms,
    /// Capitalized words.
    NamedEntity,
    /// Frequency of repeated words.
    KeywordDensity,
}

/// Keyword extraction stage settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct KeywordExtractionConfig {
    /// Whether the stage runs.
    pub enabled: bool,
    /// Enabled methods.
    pub methods: Vec<KeywordMethod>,
    /// Keywords strictly above this weight are appended to the query.
    pub min_weight: f32,
    /// Maximum keywords appended per run.
    pub max_keywords: usize,
}

impl Default for KeywordExtractionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            methods: vec![
                KeywordMethod::TechnicalTerms,
                KeywordMethod::NamedEntity,
                KeywordMethod::KeywordDensity,
            ],
            min_weight: 0.7,
            max_keywords: 5,
        }
    }
}

/// Noise reduction stage settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NoiseReductionConfig {
    /// Whether the stage runs.
    pub enabled: bool,
    /// Whole words removed case-insensitively.
    pub stop_words: Vec<String>,
    /// Phrases removed case-insensitively wherever they occur.
    pub filler_phrases: Vec<String>,
    /// Cleaned queries shorter than this many bytes are reverted.
    pub min_length: usize,
}

impl Default for NoiseReductionConfig {
    fn default() -> Self {
        let stop_words = ["the", "a", "an", "is", "are", "was", "of", "please", "的", "了", "吗", "呢", "吧"];
        let filler_phrases = [
            "can you tell me",
            "i want to know",
            "i would like to know",
            "请问",
            "帮我看看",
            "麻烦",
        ];
        Self {
            enabled: true,
            stop_words: stop_words.iter().map(ToString::to_string).collect(),
            filler_phrases: filler_phrases.iter().map(ToString::to_string).collect(),
            min_length: 3,
        }
    }
}

/// Context enrichment stage settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ContextEnrichmentConfig {
    /// Whether the stage runs.
    pub enabled: bool,
    /// Terms added when the query contains their first three characters.
    pub domain_terms: Vec<String>,
    /// Whether built-in synonyms are added.
    pub synonym_expansion: bool,
    /// Whether built-in related concepts are added.
    pub related_concepts: bool,
}

impl Default for ContextEnrichmentConfig {
    fn default() -> Self {
        let domain_terms = [
            "performance tuning",
            "database indexing",
            "cache strategy",
            "microservice architecture",
            "数据库优化",
            "性能调优",
        ];
        Self {
            enabled: true,
            domain_terms: domain_terms.iter().map(ToString::to_string).collect(),
            synonym_expansion: true,
            related_concepts: true,
        }
    }
}

/// Configuration for the rewrite pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RewriteConfig {
    /// Whether rewriting is enabled. When disabled the query passes through.
    pub enabled: bool,
    /// Keyword extraction stage.
    pub keyword_extraction: KeywordExtractionConfig,
    /// Noise reduction stage.
    pub noise_reduction: NoiseReductionConfig,
    /// Context enrichment stage.
    pub context_enrichment: ContextEnrichmentConfig,
    /// Maximum pipeline passes.
    pub max_iterations: usize,
    /// Quality that ends the pass loop early.
    pub quality_threshold: f32,
}

impl Default for RewriteConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            keyword_extraction: KeywordExtractionConfig::default(),
            noise_reduction: NoiseReductionConfig::default(),
            context_enrichment: ContextEnrichmentConfig::default(),
            max_iterations: 3,
            quality_threshold: 0.7,
        }
    }
}

impl RewriteConfig {
    /// Enable or disable the pipeline.
    #[must_use]
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Set the maximum number of passes.
    #[must_use]
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Set the quality threshold.
    #[must_use]
    pub fn with_quality_threshold(mut self, quality_threshold: f32) -> Self {
        self.quality_threshold = quality_threshold;
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.max_iterations == 0 {
            return Err(AdaptiveQueryError::configuration(
                "max_iterations must be greater than 0",
            ));
        }
        if !(0.0..=1.0).contains(&self.quality_threshold) {
            return Err(AdaptiveQueryError::configuration(
                "quality_threshold must be within [0, 1]",
            ));
        }
        if !(0.0..=1.0).contains(&self.keyword_extraction.min_weight) {
            return Err(AdaptiveQueryError::configuration(
                "keyword_extraction.min_weight must be within [0, 1]",
            ));
        }
        if self
            .noise_reduction
            .stop_words
            .iter()
            .chain(&self.noise_reduction.filler_phrases)
            .any(|w| w.trim().is_empty())
        {
            return Err(AdaptiveQueryError::configuration(
                "noise_reduction entries cannot be blank",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_rewrite_config_is_valid() {
        RewriteConfig::default().validate().unwrap();
    }

    #[test]
    fn test_blank_stop_word_rejected() {
        let mut config = RewriteConfig::default();
        config.noise_reduction.stop_words.push("  ".to_string());
        assert!(config.validate().is_err());
    }
}
