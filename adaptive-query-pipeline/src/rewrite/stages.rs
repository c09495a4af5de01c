//! The individual rewrite stages.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeMap, HashSet};
use std::fmt::Debug;
use std::time::Instant;

use adaptive_query_core::config::{
    ContextEnrichmentConfig, KeywordExtractionConfig, KeywordMethod, NoiseReductionConfig,
};
use adaptive_query_core::types::{RewriteCandidate, RewriteStage};

use crate::utils::{count_term, push_unique};

/// A single step of the rewrite pipeline.
///
/// Stages are pure functions of their input query; a stage that has nothing
/// to do returns the query unchanged.
pub trait StageProcessor: Send + Sync + Debug {
    /// Which stage this is.
    fn stage(&self) -> RewriteStage;

    /// Higher priorities run first within a pass.
    fn priority(&self) -> u32;

    /// Whether the stage takes part in the pipeline.
    fn is_enabled(&self) -> bool;

    /// Run the stage on a query.
    fn process(&self, query: &str) -> RewriteCandidate;
}

static TECHNICAL_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"\b[A-Z]{2,}\b",
        r"\b\w+\(\)",
        r"\b\w+\.\w+\b",
        r"\b\w+Service\b",
        r"\b\w+Controller\b",
    ]
    .iter()
    .filter_map(|p| Regex::new(p).ok())
    .collect()
});

static NAMED_ENTITY: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"\b[A-Z][a-z]+\b").ok());

const TECHNICAL_WEIGHT: f32 = 0.9;
const ENTITY_WEIGHT: f32 = 0.8;

/// Finds technical terms, named entities and repeated words, and emphasises
/// the strongest ones by appending them to the query.
///
/// Terms already emphasised (a strong term occurring more than once) leave
/// the query untouched, so running the stage on its own output is a no-op.
#[derive(Debug, Clone)]
pub struct KeywordExtractionStage {
    config: KeywordExtractionConfig,
    ignored: HashSet<String>,
}

impl KeywordExtractionStage {
    /// Create the stage.
    pub fn new(config: KeywordExtractionConfig) -> Self {
        Self {
            config,
            ignored: HashSet::new(),
        }
    }

    /// Never treat these words (compared lowercase) as keywords.
    #[must_use]
    pub fn with_ignored_terms<I, S>(mut self, terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.ignored = terms.into_iter().map(|t| t.as_ref().to_lowercase()).collect();
        self
    }

    fn uses(&self, method: KeywordMethod) -> bool {
        self.config.methods.contains(&method)
    }

    fn keywords(&self, query: &str) -> Vec<(String, f32)> {
        let mut keywords = Vec::new();
        if self.uses(KeywordMethod::TechnicalTerms) {
            for pattern in TECHNICAL_PATTERNS.iter() {
                keywords.extend(
                    pattern
                        .find_iter(query)
                        .map(|m| (m.as_str().to_string(), TECHNICAL_WEIGHT)),
                );
            }
        }
        if self.uses(KeywordMethod::NamedEntity) {
            if let Some(re) = NAMED_ENTITY.as_ref() {
                keywords.extend(
                    re.find_iter(query)
                        .map(|m| (m.as_str().to_string(), ENTITY_WEIGHT)),
                );
            }
        }
        if self.uses(KeywordMethod::KeywordDensity) {
            keywords.extend(density_keywords(query));
        }
        keywords.retain(|(term, _)| !self.ignored.contains(&term.to_lowercase()));
        keywords
    }
}

/// Words longer than two characters that occur more than once, weighted by
/// their share of all words.
#[allow(clippy::cast_precision_loss)]
fn density_keywords(query: &str) -> Vec<(String, f32)> {
    let lower = query.to_lowercase();
    let words: Vec<&str> = lower.split_whitespace().collect();
    let mut frequency: BTreeMap<String, usize> = BTreeMap::new();
    for word in &words {
        let cleaned: String = word.chars().filter(char::is_ascii_alphanumeric).collect();
        if cleaned.len() > 2 {
            *frequency.entry(cleaned).or_insert(0) += 1;
        }
    }
    frequency
        .into_iter()
        .filter(|(_, freq)| *freq > 1)
        .map(|(word, freq)| (word, freq as f32 / words.len() as f32))
        .collect()
}

impl StageProcessor for KeywordExtractionStage {
    fn stage(&self) -> RewriteStage {
        RewriteStage::KeywordExtraction
    }

    fn priority(&self) -> u32 {
        100
    }

    fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    #[allow(clippy::cast_precision_loss)]
    fn process(&self, query: &str) -> RewriteCandidate {
        let start = Instant::now();
        let keywords = self.keywords(query);

        let mut strong: Vec<&str> = Vec::new();
        for (term, weight) in &keywords {
            if *weight > self.config.min_weight
                && !strong.iter().any(|s| s.eq_ignore_ascii_case(term))
            {
                strong.push(term);
            }
        }

        let emphasised = strong.iter().any(|t| count_term(query, t) >= 2);
        let appended: Vec<&str> = if emphasised {
            Vec::new()
        } else {
            strong
                .iter()
                .copied()
                .filter(|t| count_term(query, t) == 1)
                .take(self.config.max_keywords)
                .collect()
        };

        let rewritten = if appended.is_empty() {
            query.to_string()
        } else {
            format!("{query} {}", appended.join(" "))
        };

        let quality_score = if keywords.is_empty() {
            0.5
        } else {
            let total: f32 = keywords.iter().map(|(_, w)| w).sum();
            (total / keywords.len() as f32).min(1.0)
        };

        let mut extracted = Vec::new();
        for (term, _) in keywords {
            push_unique(&mut extracted, term);
        }

        RewriteCandidate {
            stage: self.stage(),
            original_query: query.to_string(),
            rewritten_query: rewritten,
            extracted_keywords: extracted,
            removed_noise: Vec::new(),
            added_context: Vec::new(),
            quality_score,
            processing_time: start.elapsed(),
        }
    }
}

/// Removes stop words and filler phrases and collapses whitespace.
#[derive(Debug, Clone)]
pub struct NoiseReductionStage {
    config: NoiseReductionConfig,
    stop_words: Vec<(String, Regex)>,
    fillers: Vec<(String, Regex)>,
}

impl NoiseReductionStage {
    /// Create the stage, compiling its patterns.
    pub fn new(config: NoiseReductionConfig) -> Self {
        let compile = |words: &[String], template: fn(&str) -> String| -> Vec<(String, Regex)> {
            words
                .iter()
                .filter_map(|w| {
                    Regex::new(&template(&regex::escape(w)))
                        .ok()
                        .map(|re| (w.clone(), re))
                })
                .collect()
        };
        let stop_words = compile(&config.stop_words, |w| format!(r"(?i)\b{w}\b"));
        let fillers = compile(&config.filler_phrases, |w| format!("(?i){w}"));
        Self {
            config,
            stop_words,
            fillers,
        }
    }

    /// Stop words this stage removes.
    pub fn stop_words(&self) -> impl Iterator<Item = &str> {
        self.config.stop_words.iter().map(String::as_str)
    }
}

impl StageProcessor for NoiseReductionStage {
    fn stage(&self) -> RewriteStage {
        RewriteStage::NoiseReduction
    }

    fn priority(&self) -> u32 {
        90
    }

    fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    #[allow(clippy::cast_precision_loss)]
    fn process(&self, query: &str) -> RewriteCandidate {
        let start = Instant::now();
        let mut cleaned = query.to_string();
        let mut removed = Vec::new();

        for (word, re) in &self.stop_words {
            if re.is_match(&cleaned) {
                cleaned = re.replace_all(&cleaned, " ").into_owned();
                push_unique(&mut removed, word.clone());
            }
        }
        for (phrase, re) in &self.fillers {
            // Removing a phrase can join its neighbours into a new occurrence.
            while re.is_match(&cleaned) {
                cleaned = re.replace_all(&cleaned, " ").into_owned();
                push_unique(&mut removed, phrase.clone());
            }
        }

        let mut cleaned = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
        if cleaned.len() < self.config.min_length {
            cleaned = query.to_string();
            removed.clear();
        }

        let original_words = query.split_whitespace().count();
        let quality_score = if original_words == 0 {
            0.5
        } else {
            let preservation = cleaned.split_whitespace().count() as f32 / original_words as f32;
            if preservation > 0.7 && preservation < 1.0 {
                0.8
            } else if (preservation - 1.0).abs() < f32::EPSILON {
                0.6
            } else if preservation < 0.3 {
                0.3
            } else {
                preservation
            }
        };

        RewriteCandidate {
            stage: self.stage(),
            original_query: query.to_string(),
            rewritten_query: cleaned,
            extracted_keywords: Vec::new(),
            removed_noise: removed,
            added_context: Vec::new(),
            quality_score,
            processing_time: start.elapsed(),
        }
    }
}

const SYNONYMS: &[(&str, &[&str])] = &[
    ("问题", &["issue", "bug", "故障"]),
    ("解决", &["fix", "resolve", "solve"]),
    ("优化", &["optimize", "improve", "enhance"]),
    ("配置", &["config", "configuration", "setting"]),
];

const RELATED_CONCEPTS: &[(&str, &[&str])] = &[
    ("api", &["接口", "请求", "响应", "状态码"]),
    ("数据库", &["sql", "查询", "索引", "事务"]),
    ("性能", &["延迟", "吞吐量", "并发", "缓存"]),
];

/// Adds domain terms, synonyms and related concepts that are not already
/// present in the query.
#[derive(Debug, Clone)]
pub struct ContextEnrichmentStage {
    config: ContextEnrichmentConfig,
}

impl ContextEnrichmentStage {
    /// Create the stage.
    pub fn new(config: ContextEnrichmentConfig) -> Self {
        Self { config }
    }

    fn candidates(&self, lower: &str) -> Vec<String> {
        let mut terms = Vec::new();
        for term in &self.config.domain_terms {
            let trigger: String = term.chars().take(3).collect::<String>().to_lowercase();
            if !trigger.is_empty() && lower.contains(&trigger) {
                terms.push(term.clone());
            }
        }
        let tables = [
            (self.config.synonym_expansion, SYNONYMS),
            (self.config.related_concepts, RELATED_CONCEPTS),
        ];
        for (enabled, table) in tables {
            if !enabled {
                continue;
            }
            for (trigger, additions) in table {
                if lower.contains(trigger) {
                    terms.extend(additions.iter().map(ToString::to_string));
                }
            }
        }
        terms
    }
}

impl StageProcessor for ContextEnrichmentStage {
    fn stage(&self) -> RewriteStage {
        RewriteStage::ContextEnrichment
    }

    fn priority(&self) -> u32 {
        80
    }

    fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    #[allow(clippy::cast_precision_loss)]
    fn process(&self, query: &str) -> RewriteCandidate {
        let start = Instant::now();
        let mut enriched = query.trim().to_string();
        let mut added: Vec<String> = Vec::new();

        // Added terms can trigger further additions; run to a fixed point.
        loop {
            let lower = enriched.to_lowercase();
            let fresh: Vec<String> = self
                .candidates(&lower)
                .into_iter()
                .filter(|t| !lower.contains(&t.to_lowercase()))
                .collect();
            let mut grew = false;
            for term in fresh {
                if enriched.to_lowercase().contains(&term.to_lowercase()) {
                    continue;
                }
                enriched.push(' ');
                enriched.push_str(&term);
                added.push(term);
                grew = true;
            }
            if !grew {
                break;
            }
        }
        if added.is_empty() {
            enriched = query.to_string();
        }

        let original_words = query.split_whitespace().count();
        let quality_score = if original_words == 0 {
            0.5
        } else {
            let enriched_words = enriched.split_whitespace().count();
            let ratio = enriched_words.saturating_sub(original_words) as f32 / original_words as f32;
            if (0.1..=0.5).contains(&ratio) {
                0.9
            } else if ratio > 0.5 {
                0.7
            } else {
                0.6
            }
        };

        RewriteCandidate {
            stage: self.stage(),
            original_query: query.to_string(),
            rewritten_query: enriched,
            extracted_keywords: Vec::new(),
            removed_noise: Vec::new(),
            added_context: added,
            quality_score,
            processing_time: start.elapsed(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    fn keyword_stage() -> KeywordExtractionStage {
        KeywordExtractionStage::new(KeywordExtractionConfig::default())
    }

    #[test]
    fn test_keywords_are_appended_once() {
        let stage = keyword_stage();
        let first = stage.process("call the UserService over HTTP");
        assert_eq!(
            first.rewritten_query,
            "call the UserService over HTTP HTTP UserService"
        );
        let second = stage.process(&first.rewritten_query);
        assert!(!second.changed());
    }

    #[test]
    fn test_emphasised_query_is_stable_after_enrichment() {
        let stage = keyword_stage();
        let first = stage.process("数据库 性能 with UserService");
        assert_eq!(first.rewritten_query, "数据库 性能 with UserService UserService");
        let enriched = format!("{} 数据库设计 SQL优化", first.rewritten_query);
        assert!(!stage.process(&enriched).changed());
    }

    #[test]
    fn test_keyword_quality_without_keywords() {
        let candidate = keyword_stage().process("nothing special here");
        assert!(!candidate.changed());
        assert!((candidate.quality_score - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_ignored_terms_are_not_keywords() {
        let stage = keyword_stage().with_ignored_terms(["the"]);
        let candidate = stage.process("The cache");
        assert!(!candidate.changed());
        assert!(candidate.extracted_keywords.is_empty());
    }

    #[test]
    fn test_density_keywords() {
        let keywords = density_keywords("cache cache miss");
        assert_eq!(keywords.len(), 1);
        assert_eq!(keywords[0].0, "cache");
        assert!((keywords[0].1 - 2.0 / 3.0).abs() < 1e-6);
    }

    fn noise_stage() -> NoiseReductionStage {
        NoiseReductionStage::new(NoiseReductionConfig::default())
    }

    #[test_case("what is the cache policy", "what cache policy", 0.6 ; "stop words removed")]
    #[test_case("Can you tell me redis eviction rules", "redis eviction rules", 3.0 / 7.0 ; "filler removed case insensitively")]
    #[test_case("the a", "the a", 0.6 ; "too short reverts")]
    #[test_case("redis   eviction", "redis eviction", 0.6 ; "whitespace collapsed")]
    fn test_noise_reduction(input: &str, expected: &str, quality: f32) {
        let candidate = noise_stage().process(input);
        assert_eq!(candidate.rewritten_query, expected);
        assert!((candidate.quality_score - quality).abs() < 1e-6);
    }

    #[test]
    fn test_noise_reduction_records_removed_words() {
        let candidate = noise_stage().process("please explain the index");
        assert_eq!(candidate.removed_noise, vec!["the", "please"]);
    }

    fn enrichment_stage() -> ContextEnrichmentStage {
        ContextEnrichmentStage::new(ContextEnrichmentConfig::default())
    }

    #[test]
    fn test_related_concepts_and_synonyms() {
        let candidate = enrichment_stage().process("api 问题");
        assert_eq!(
            candidate.added_context,
            vec!["issue", "bug", "故障", "接口", "请求", "响应", "状态码"]
        );
        assert!((candidate.quality_score - 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_domain_terms_trigger_on_prefix() {
        let candidate = enrichment_stage().process("cache warmup");
        assert_eq!(candidate.added_context, vec!["cache strategy"]);
    }

    #[test]
    fn test_enrichment_reaches_fixed_point() {
        let stage = enrichment_stage();
        let first = stage.process("数据库 slow");
        let second = stage.process(&first.rewritten_query);
        assert!(first.changed());
        assert!(!second.changed());
    }
}
