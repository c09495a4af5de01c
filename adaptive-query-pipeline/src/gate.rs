//! Retrieval gate.
//!
//! Decides before any classification work whether a query needs context
//! retrieval at all. Acknowledgements, thanks, questions about the assistant
//! and accidental one-character messages are answered without touching the
//! retrieval backend.

use async_trait::async_trait;
use serde::Serialize;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::debug;

use adaptive_query_core::Result;
use adaptive_query_core::config::{GateRuleKind, RetrievalGateConfig, merge_overrides};
use adaptive_query_core::traits::{Component, ComponentConfig};
use adaptive_query_core::types::{ComponentHealth, HealthStatus};

const CONFIRMATIONS: &[&str] = &[
    "好的", "好", "ok", "行", "可以", "没问题", "明白", "了解", "知道了", "收到", "yes", "sure",
    "alright", "got it", "i see", "understood", "noted", "嗯", "哦", "啊", "是的", "对", "right",
    "yeah", "yep",
];

const EMOTIONS: &[&str] = &[
    "谢谢", "谢了", "感谢", "thanks", "thank you", "thx", "很好", "不错", "棒", "赞", "牛", "厉害",
    "awesome", "great", "nice", "perfect", "excellent", "哇", "wow", "amazing", "incredible", "👍",
    "😊", "😄", "❤️", ":)", ":-)", "^_^",
];

const META_QUERIES: &[&str] = &[
    "你能做什么", "有什么功能", "能帮我做什么", "what can you do", "what are your capabilities",
    "你是谁", "你是什么", "who are you", "怎么用", "使用方法", "使用说明", "how to use",
    "how does it work", "help", "还在吗", "工作正常吗", "能听到吗", "are you there",
    "are you working", "status",
];

const TEST_QUERIES: &[&str] = &[
    "测试", "test", "试试", "试一下", "testing", "hello world", "world", "你好世界", "1", "2", "3",
    "a", "b", "c", "ping", "echo", "check",
];

const REPEAT_REQUESTS: &[&str] = &[
    "再说一遍", "重复一下", "没听清", "刚才说什么", "再来一次", "repeat", "say again",
    "what did you say", "pardon", "come again", "again", "once more",
];

/// Short technical tokens that always warrant retrieval.
pub const MEANINGFUL_SHORT: &[&str] = &[
    "api", "bug", "git", "sql", "css", "js", "go", "py", "k8s", "aws", "gcp", "tcp", "http",
    "rest",
];

/// Confidence of the fallback when no rule is confident enough.
const FALLBACK_CONFIDENCE: f32 = 0.5;

/// Outcome of the gate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GateDecision {
    /// Whether the query should go to the retriever.
    pub should_retrieve: bool,
    /// Confidence of the decision.
    pub confidence: f32,
    /// Why the decision was made.
    pub reason: String,
    /// Rule that decided, `None` for the fallback.
    pub rule: Option<GateRuleKind>,
    /// Time spent deciding.
    pub processing_time: Duration,
}

/// A rule verdict before the confidence threshold is applied.
#[derive(Debug, Clone, PartialEq)]
struct Verdict {
    should_retrieve: bool,
    confidence: f32,
    reason: String,
}

impl Verdict {
    fn skip(confidence: f32, reason: String) -> Option<Self> {
        Some(Self {
            should_retrieve: false,
            confidence,
            reason,
        })
    }
}

/// Evaluation priority of a rule, higher first.
pub fn rule_priority(kind: GateRuleKind) -> u32 {
    match kind {
        GateRuleKind::StatusConfirmation => 100,
        GateRuleKind::EmotionalFeedback => 95,
        GateRuleKind::MetaQuery => 90,
        GateRuleKind::SimpleTest => 85,
        GateRuleKind::RepeatRequest => 80,
        GateRuleKind::UltraShortQuery => 75,
        GateRuleKind::Default => 1,
    }
}

/// `phrase` is the whole query or the query is only slightly longer.
fn short_match(query: &str, phrase: &str, slack: usize) -> bool {
    query == phrase
        || (query.contains(phrase) && query.chars().count() <= phrase.chars().count() + slack)
}

fn evaluate_rule(kind: GateRuleKind, raw: &str) -> Option<Verdict> {
    let trimmed = raw.trim();
    let query = trimmed.to_lowercase();
    match kind {
        GateRuleKind::StatusConfirmation => CONFIRMATIONS
            .iter()
            .find(|c| short_match(&query, c, 3))
            .and_then(|c| Verdict::skip(0.95, format!("status confirmation '{c}'"))),
        GateRuleKind::EmotionalFeedback => EMOTIONS
            .iter()
            .find(|e| short_match(&query, e, 5))
            .and_then(|e| Verdict::skip(0.9, format!("emotional feedback '{e}'"))),
        GateRuleKind::MetaQuery => META_QUERIES
            .iter()
            .find(|m| query.contains(*m))
            .and_then(|m| Verdict::skip(0.88, format!("meta query '{m}'"))),
        GateRuleKind::SimpleTest => TEST_QUERIES
            .iter()
            .find(|t| query == **t)
            .and_then(|t| Verdict::skip(0.85, format!("simple test '{t}'"))),
        GateRuleKind::RepeatRequest => REPEAT_REQUESTS
            .iter()
            .find(|r| query.contains(*r))
            .and_then(|r| Verdict::skip(0.8, format!("repeat request '{r}'"))),
        GateRuleKind::UltraShortQuery => {
            if MEANINGFUL_SHORT.contains(&query.as_str()) {
                return None;
            }
            match trimmed.chars().count() {
                0..=2 => Verdict::skip(0.75, "query of at most two characters".to_string()),
                3..=4 => Verdict::skip(0.7, "short non-technical query".to_string()),
                _ => None,
            }
        }
        GateRuleKind::Default => Some(Verdict {
            should_retrieve: true,
            confidence: 0.6,
            reason: "default retrieval".to_string(),
        }),
    }
}

/// Rule-based gate deciding whether a query needs retrieval.
///
/// Rules run in priority order and the first verdict whose confidence is
/// strictly above the configured threshold wins. When none qualifies the gate
/// retrieves with confidence 0.5.
///
/// # Examples
///
/// ```rust
/// use adaptive_query_pipeline::gate::RetrievalGate;
///
/// # tokio_test::block_on(async {
/// let gate = RetrievalGate::default();
/// assert!(!gate.evaluate("thanks!").await.should_retrieve);
/// assert!(gate.evaluate("sql").await.should_retrieve);
/// # });
/// ```
#[derive(Debug)]
pub struct RetrievalGate {
    name: String,
    config: RwLock<RetrievalGateConfig>,
}

impl Default for RetrievalGate {
    fn default() -> Self {
        Self::new(RetrievalGateConfig::default())
    }
}

impl RetrievalGate {
    /// Create a gate.
    pub fn new(config: RetrievalGateConfig) -> Self {
        Self {
            name: "retrieval_gate".to_string(),
            config: RwLock::new(config),
        }
    }

    /// Decide whether `query` needs retrieval.
    pub async fn evaluate(&self, query: &str) -> GateDecision {
        let start = Instant::now();
        let config = self.config.read().await.clone();

        if !config.enabled {
            return GateDecision {
                should_retrieve: true,
                confidence: 1.0,
                reason: "retrieval gate disabled".to_string(),
                rule: None,
                processing_time: start.elapsed(),
            };
        }

        let mut rules = config.rules.clone();
        rules.sort_by_key(|kind| std::cmp::Reverse(rule_priority(*kind)));
        rules.dedup();

        for kind in rules {
            let Some(verdict) = evaluate_rule(kind, query) else {
                continue;
            };
            if verdict.confidence > config.confidence_threshold {
                debug!(
                    rule = %kind,
                    should_retrieve = verdict.should_retrieve,
                    confidence = verdict.confidence,
                    "Retrieval gate decided"
                );
                return GateDecision {
                    should_retrieve: verdict.should_retrieve,
                    confidence: verdict.confidence,
                    reason: verdict.reason,
                    rule: Some(kind),
                    processing_time: start.elapsed(),
                };
            }
        }

        GateDecision {
            should_retrieve: true,
            confidence: FALLBACK_CONFIDENCE,
            reason: "no confident rule, retrieving".to_string(),
            rule: None,
            processing_time: start.elapsed(),
        }
    }
}

#[async_trait]
impl Component for RetrievalGate {
    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> &str {
        crate::VERSION
    }

    async fn initialize(&self, config: &ComponentConfig) -> Result<()> {
        let mut current = self.config.write().await;
        let updated: RetrievalGateConfig = merge_overrides(&*current, config)?;
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
        let config = self.config.read().await;
        let health = if config.enabled {
            ComponentHealth::healthy("retrieval gate active")
        } else {
            ComponentHealth::new(HealthStatus::Degraded, "retrieval gate disabled")
        };
        health.with_metric("rules", config.rules.len() as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("a", GateRuleKind::SimpleTest ; "single letter")]
    #[test_case("hi", GateRuleKind::UltraShortQuery ; "two letters")]
    #[test_case("好", GateRuleKind::StatusConfirmation ; "single confirmation")]
    #[test_case("got it", GateRuleKind::StatusConfirmation ; "english confirmation")]
    #[test_case("thanks!", GateRuleKind::EmotionalFeedback ; "thanks")]
    #[test_case("who are you?", GateRuleKind::MetaQuery ; "meta")]
    #[test_case("ping", GateRuleKind::SimpleTest ; "ping")]
    #[test_case("please say again", GateRuleKind::RepeatRequest ; "repeat")]
    #[test_case("abcd", GateRuleKind::UltraShortQuery ; "four letters")]
    fn test_skips_retrieval(query: &str, rule: GateRuleKind) {
        let decision = tokio_test::block_on(RetrievalGate::default().evaluate(query));
        assert!(!decision.should_retrieve);
        assert_eq!(decision.rule, Some(rule));
    }

    #[test_case("api" ; "api")]
    #[test_case("go" ; "go")]
    #[test_case("sql" ; "sql")]
    #[test_case("K8S" ; "uppercase token")]
    #[test_case("how do I configure connection pooling" ; "regular query")]
    fn test_retrieves(query: &str) {
        let decision = tokio_test::block_on(RetrievalGate::default().evaluate(query));
        assert!(decision.should_retrieve);
    }

    #[tokio::test]
    async fn test_short_query_confidence() {
        let gate = RetrievalGate::default();
        for query in ["x", "hi", "ab"] {
            let decision = gate.evaluate(query).await;
            assert!(!decision.should_retrieve, "{query}");
            assert!(decision.confidence >= 0.75, "{query}");
        }
    }

    #[tokio::test]
    async fn test_default_rule_needs_confidence_above_threshold() {
        let decision = RetrievalGate::default()
            .evaluate("how do I configure connection pooling")
            .await;
        assert!(decision.rule.is_none());
        assert!((decision.confidence - FALLBACK_CONFIDENCE).abs() < f32::EPSILON);

        let mut config = RetrievalGateConfig::default();
        config.confidence_threshold = 0.5;
        let decision = RetrievalGate::new(config)
            .evaluate("how do I configure connection pooling")
            .await;
        assert_eq!(decision.rule, Some(GateRuleKind::Default));
    }

    #[tokio::test]
    async fn test_disabled_gate_always_retrieves() {
        let mut config = RetrievalGateConfig::default();
        config.enabled = false;
        let decision = RetrievalGate::new(config).evaluate("ok").await;
        assert!(decision.should_retrieve);
    }

    #[tokio::test]
    async fn test_rule_list_is_configurable() {
        let gate = RetrievalGate::default();
        let mut overrides = ComponentConfig::new();
        overrides.insert(
            "rules".to_string(),
            serde_json::json!(["meta_query", "default"]),
        );
        gate.initialize(&overrides).await.unwrap();

        assert!(gate.evaluate("thanks").await.should_retrieve);
        assert!(!gate.evaluate("help").await.should_retrieve);
    }
}
