//! Rule-based intent classification.
//!
//! The classifier maps raw query text to a [`QueryIntent`] through ordered
//! keyword buckets, a length and vocabulary based complexity heuristic,
//! dictionary keyword and entity lookup, and a confidence score built from
//! those signals. There is no learned component, so the same query always
//! yields the same intent (apart from the timestamp).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, instrument};

use adaptive_query_core::config::{ClassifierConfig, merge_overrides};
use adaptive_query_core::traits::{Component, ComponentConfig, IntentAnalyzer};
use adaptive_query_core::types::{
    ComponentHealth, Domain, Entity, EntityKind, HealthStatus, IntentType, Keyword,
    KeywordCategory, KeywordSource, QueryIntent,
};
use adaptive_query_core::{AdaptiveQueryError, Result};

/// Intent buckets in precedence order. Technical is also the fallback.
const INTENT_PATTERNS: &[(IntentType, &[&str])] = &[
    (
        IntentType::Debugging,
        &[
            "调试", "debug", "错误", "error", "bug", "问题", "失败", "不工作", "修复", "fix", "解决",
            "怎么回事", "为什么不", "出了什么问题", "报错",
        ],
    ),
    (
        IntentType::Procedural,
        &[
            "怎么", "如何", "步骤", "流程", "教程", "指南", "方法", "操作", "使用", "设置", "建立",
        ],
    ),
    (
        IntentType::Conceptual,
        &[
            "什么是", "概念", "原理", "定义", "解释", "理解", "学习", "区别", "比较", "优缺点",
            "特点", "作用", "最佳实践",
        ],
    ),
    (
        IntentType::Technical,
        &[
            "实现", "代码", "函数", "算法", "性能", "优化", "配置", "部署", "安装", "搭建", "集成",
            "开发",
        ],
    ),
];

/// Domains in precedence order. Programming is the fallback.
const DOMAIN_PATTERNS: &[(Domain, &[&str])] = &[
    (
        Domain::Architecture,
        &[
            "架构", "architecture", "设计模式", "系统设计", "分布式", "高可用", "负载均衡",
            "服务发现", "熔断器", "监控系统",
        ],
    ),
    (
        Domain::Database,
        &["数据库", "database", "sql", "mysql", "postgresql", "mongodb", "redis"],
    ),
    (
        Domain::Frontend,
        &["前端", "frontend", "react", "vue", "javascript", "css", "html", "ui"],
    ),
    (
        Domain::Backend,
        &["后端", "backend", "api", "服务器", "server", "service"],
    ),
    (
        Domain::Devops,
        &["部署", "docker", "kubernetes", "ci/cd", "运维", "devops"],
    ),
];

/// Vocabulary that raises complexity by 0.1 per contained term.
const COMPLEXITY_TERMS: &[&str] = &[
    "api", "json", "xml", "http", "https", "rest", "graphql", "docker", "kubernetes", "微服务",
    "分布式", "集群", "数据库", "缓存", "队列", "消息", "事务",
];

const STOP_WORDS: &[&str] = &[
    "的", "了", "和", "是", "在", "有", "不", "为", "这", "个", "我", "你", "他", "它", "们", "怎么",
    "如何", "什么", "哪个",
];

/// Exact-match keyword dictionary.
const TECH_DICTIONARY: &[(&str, KeywordCategory, f32)] = &[
    ("数据库", KeywordCategory::Technical, 0.9),
    ("SQL", KeywordCategory::Technical, 0.8),
    ("API", KeywordCategory::Technical, 0.8),
    ("Redis", KeywordCategory::Technical, 0.8),
    ("MongoDB", KeywordCategory::Technical, 0.8),
    ("MySQL", KeywordCategory::Technical, 0.8),
    ("架构", KeywordCategory::Domain, 0.9),
    ("设计", KeywordCategory::Domain, 0.7),
    ("性能", KeywordCategory::Domain, 0.8),
    ("优化", KeywordCategory::Action, 0.8),
    ("调试", KeywordCategory::Action, 0.9),
    ("修复", KeywordCategory::Action, 0.8),
    ("服务", KeywordCategory::Object, 0.7),
    ("系统", KeywordCategory::Object, 0.7),
    ("项目", KeywordCategory::Object, 0.6),
];

/// Exact-match entity dictionary.
const ENTITY_DICTIONARY: &[(&str, EntityKind, f32)] = &[
    ("Go", EntityKind::Tech, 0.9),
    ("Python", EntityKind::Tech, 0.9),
    ("Java", EntityKind::Tech, 0.9),
    ("React", EntityKind::Tech, 0.8),
    ("Vue", EntityKind::Tech, 0.8),
    ("Angular", EntityKind::Tech, 0.8),
    ("Docker", EntityKind::Tool, 0.9),
    ("Kubernetes", EntityKind::Tool, 0.9),
    ("Redis", EntityKind::Tool, 0.8),
    ("MySQL", EntityKind::Tool, 0.8),
    ("MongoDB", EntityKind::Tool, 0.8),
    ("PostgreSQL", EntityKind::Tool, 0.8),
    ("GitHub", EntityKind::Org, 0.7),
    ("Google", EntityKind::Org, 0.7),
    ("Microsoft", EntityKind::Org, 0.7),
];

/// Technology tags, reported in this order.
const TECH_STACK: &[&str] = &[
    "go", "golang", "python", "java", "javascript", "typescript", "rust", "c++", "react", "vue",
    "angular", "spring", "django", "express", "gin", "mysql", "postgresql", "mongodb", "redis",
    "elasticsearch",
];

static CAPITALIZED_WORD: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"[A-Z][a-z]+").ok());
static ACRONYM: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"[A-Z]{2,}").ok());

/// Classification statistics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ClassifierStats {
    /// Queries classified.
    pub total_analyzed: u64,
    /// Count per intent bucket.
    pub intent_distribution: HashMap<IntentType, u64>,
    /// Running mean confidence.
    pub average_confidence: f32,
    /// Running mean processing time.
    pub average_processing_time: Duration,
    /// When the last query was classified.
    pub last_analyzed: Option<DateTime<Utc>>,
}

/// Rule-based intent classifier.
///
/// # Examples
///
/// ```rust
/// use adaptive_query_pipeline::classifier::IntentClassifier;
/// use adaptive_query_core::types::{Domain, IntentType};
///
/// # tokio_test::block_on(async {
/// let classifier = IntentClassifier::default();
/// let intent = classifier.classify("这个Go程序报错了，怎么debug？").await.unwrap();
/// assert_eq!(intent.intent_type, IntentType::Debugging);
/// assert_eq!(intent.domain, Domain::Programming);
/// # });
/// ```
#[derive(Debug)]
pub struct IntentClassifier {
    name: String,
    config: RwLock<ClassifierConfig>,
    running: AtomicBool,
    stats: RwLock<ClassifierStats>,
}

impl Default for IntentClassifier {
    fn default() -> Self {
        Self::new(ClassifierConfig::default())
    }
}

impl IntentClassifier {
    /// Create a classifier.
    pub fn new(config: ClassifierConfig) -> Self {
        Self {
            name: config.name.clone(),
            config: RwLock::new(config),
            running: AtomicBool::new(false),
            stats: RwLock::new(ClassifierStats::default()),
        }
    }

    /// Classify a query.
    #[instrument(skip(self), fields(classifier = %self.name))]
    pub async fn classify(&self, query: &str) -> Result<QueryIntent> {
        let config = self.config.read().await.clone();
        if !config.enabled {
            return Err(AdaptiveQueryError::disabled(&self.name));
        }
        if query.trim().is_empty() {
            return Err(AdaptiveQueryError::EmptyQuery);
        }

        let start = Instant::now();
        let intent = Self::build_intent(query, &config);
        let elapsed = start.elapsed();

        debug!(
            intent = %intent.intent_type,
            domain = %intent.domain,
            complexity = intent.complexity,
            confidence = intent.confidence,
            "Query classified"
        );
        self.record(&intent, elapsed).await;
        Ok(intent)
    }

    /// Snapshot of the classification statistics.
    pub async fn stats(&self) -> ClassifierStats {
        self.stats.read().await.clone()
    }

    fn build_intent(query: &str, config: &ClassifierConfig) -> QueryIntent {
        let lower = query.to_lowercase();
        let intent_type = classify_intent(&lower);
        let domain = classify_domain(&lower);
        let keywords = extract_keywords(query);
        let confidence = compute_confidence(intent_type, domain, &keywords);

        let mut intent = QueryIntent::new(query, intent_type, domain)
            .with_complexity(compute_complexity(query, &lower))
            .with_confidence(confidence);
        intent.keywords = keywords;
        intent.entities = extract_entities(query);
        intent.tech_stack = detect_tech_stack(&lower);
        intent
            .metadata
            .insert("analyzer_name".into(), config.name.clone().into());
        intent
            .metadata
            .insert("version".into(), crate::VERSION.into());
        intent
            .metadata
            .insert("analysis_method".into(), "rule_based".into());
        intent
    }

    #[allow(clippy::cast_precision_loss)]
    async fn record(&self, intent: &QueryIntent, elapsed: Duration) {
        let mut stats = self.stats.write().await;
        stats.total_analyzed += 1;
        *stats
            .intent_distribution
            .entry(intent.intent_type)
            .or_insert(0) += 1;
        let n = stats.total_analyzed as f32;
        stats.average_confidence = (stats.average_confidence * (n - 1.0) + intent.confidence) / n;
        let total = u32::try_from(stats.total_analyzed).unwrap_or(u32::MAX);
        stats.average_processing_time =
            (stats.average_processing_time * (total - 1) + elapsed) / total;
        stats.last_analyzed = Some(intent.timestamp);
    }
}

/// First matching intent bucket; technical when nothing matches.
pub fn classify_intent(lower: &str) -> IntentType {
    INTENT_PATTERNS
        .iter()
        .find(|(_, patterns)| patterns.iter().any(|p| lower.contains(p)))
        .map_or(IntentType::Technical, |(intent, _)| *intent)
}

/// First matching domain; programming when nothing matches.
pub fn classify_domain(lower: &str) -> Domain {
    DOMAIN_PATTERNS
        .iter()
        .find(|(_, patterns)| patterns.iter().any(|p| lower.contains(p)))
        .map_or(Domain::Programming, |(domain, _)| *domain)
}

/// Complexity from byte length, technical vocabulary and the architecture
/// keyword, capped at one.
pub fn compute_complexity(query: &str, lower: &str) -> f32 {
    let mut complexity = match query.len() {
        len if len > 100 => 0.3,
        len if len > 50 => 0.2,
        _ => 0.1,
    };
    for term in COMPLEXITY_TERMS {
        if lower.contains(term) {
            complexity += 0.1;
        }
    }
    if query.contains("架构") {
        complexity += 0.3;
    }
    f32::min(complexity, 1.0)
}

/// Whitespace-separated keywords with dictionary weights. Words in the first
/// third of the query get a small boost.
pub fn extract_keywords(query: &str) -> Vec<Keyword> {
    let words: Vec<&str> = query.split_whitespace().collect();
    let leading = words.len() / 3;
    words
        .iter()
        .copied()
        .enumerate()
        .filter(|(_, word)| word.len() > 1 && !STOP_WORDS.contains(word))
        .map(|(i, word)| {
            let (category, weight, source) = TECH_DICTIONARY
                .iter()
                .find(|(term, _, _)| *term == word)
                .map_or(
                    (KeywordCategory::General, 0.5, KeywordSource::TextAnalysis),
                    |(_, category, weight)| (*category, *weight, KeywordSource::TechDictionary),
                );
            let weight = if i < leading {
                f32::min(weight + 0.1, 1.0)
            } else {
                weight
            };
            Keyword {
                term: word.to_string(),
                weight,
                category,
                source,
            }
        })
        .collect()
}

/// Dictionary entities first, then capitalized words and acronyms.
pub fn extract_entities(query: &str) -> Vec<Entity> {
    let mut entities: Vec<Entity> = Vec::new();
    let mut push = |text: &str, kind: EntityKind, score: f32| {
        if entities.iter().any(|e| e.text == text) {
            return;
        }
        let start = query.find(text).unwrap_or(0);
        entities.push(Entity {
            text: text.to_string(),
            kind,
            score,
            span: (start, start + text.len()),
        });
    };

    for word in query.split_whitespace() {
        if let Some((text, kind, score)) = ENTITY_DICTIONARY.iter().find(|(t, _, _)| *t == word) {
            push(text, *kind, *score);
        }
    }
    if let Some(re) = CAPITALIZED_WORD.as_ref() {
        for m in re.find_iter(query) {
            push(m.as_str(), EntityKind::Tech, 0.6);
        }
    }
    if let Some(re) = ACRONYM.as_ref() {
        for m in re.find_iter(query) {
            push(m.as_str(), EntityKind::Tech, 0.7);
        }
    }
    entities
}

/// Technology tags contained in the lowercased query.
pub fn detect_tech_stack(lower: &str) -> Vec<String> {
    TECH_STACK
        .iter()
        .filter(|tech| lower.contains(*tech))
        .map(ToString::to_string)
        .collect()
}

/// Confidence from non-default buckets and keyword statistics.
#[allow(clippy::cast_precision_loss)]
pub fn compute_confidence(intent_type: IntentType, domain: Domain, keywords: &[Keyword]) -> f32 {
    let mut confidence: f32 = 0.5;
    if intent_type != IntentType::Technical {
        confidence += 0.2;
    }
    if domain != Domain::Programming {
        confidence += 0.2;
    }
    if keywords.len() > 3 {
        confidence += 0.1;
    }
    if !keywords.is_empty() {
        let average = keywords.iter().map(|k| k.weight).sum::<f32>() / keywords.len() as f32;
        if average > 0.7 {
            confidence += 0.15;
        } else if average < 0.3 {
            confidence -= 0.1;
        }
        let specific = keywords
            .iter()
            .filter(|k| matches!(k.category, KeywordCategory::Technical | KeywordCategory::Domain))
            .count();
        if specific as f32 / keywords.len() as f32 > 0.5 {
            confidence += 0.1;
        }
    }
    confidence.clamp(0.0, 1.0)
}

#[async_trait]
impl IntentAnalyzer for IntentClassifier {
    async fn analyze(&self, query: &str) -> Result<QueryIntent> {
        self.classify(query).await
    }
}

#[async_trait]
impl Component for IntentClassifier {
    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> &str {
        crate::VERSION
    }

    async fn initialize(&self, config: &ComponentConfig) -> Result<()> {
        let mut current = self.config.write().await;
        let updated = merge_overrides(&*current, config)?;
        updated.validate()?;
        *current = updated;
        Ok(())
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
        let enabled = self.config.read().await.enabled;
        let stats = self.stats.read().await;
        let health = if enabled {
            ComponentHealth::healthy("classifier ready")
        } else {
            ComponentHealth::new(HealthStatus::Degraded, "classifier disabled")
        };
        health
            .with_metric("total_analyzed", stats.total_analyzed as f64)
            .with_metric("average_confidence", f64::from(stats.average_confidence))
    }

    fn as_intent_analyzer(self: Arc<Self>) -> Option<Arc<dyn IntentAnalyzer>> {
        Some(self)
    }
}
