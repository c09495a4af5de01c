//! Query intent types.
//!
//! A [`QueryIntent`] is the immutable classification snapshot produced once per
//! request by the intent classifier and read by every downstream component.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use strum::{AsRefStr, Display, EnumIter, EnumString};

/// The kind of help a query is asking for.
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
    EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum IntentType {
    /// Something is broken and needs fixing.
    Debugging,
    /// Step-by-step "how do I" questions.
    Procedural,
    /// "What is" and comparison questions.
    Conceptual,
    /// Implementation questions; the default bucket.
    Technical,
}

/// The technical area a query belongs to.
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
    EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Domain {
    /// General programming; the default domain.
    Programming,
    /// Databases and storage engines.
    Database,
    /// Browser and UI development.
    Frontend,
    /// Services and APIs.
    Backend,
    /// Deployment and operations.
    Devops,
    /// System design.
    Architecture,
}

/// Category assigned to an extracted keyword.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum KeywordCategory {
    /// Technology names such as databases or protocols.
    Technical,
    /// Domain vocabulary such as architecture or performance.
    Domain,
    /// Verbs describing what the user wants done.
    Action,
    /// Things being acted upon.
    Object,
    /// Anything not found in the dictionary.
    General,
}

/// Where a keyword's weight came from.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum KeywordSource {
    /// Plain token analysis.
    TextAnalysis,
    /// Looked up in the technical dictionary.
    TechDictionary,
}

/// A weighted keyword extracted from the query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Keyword {
    /// The keyword text as it appeared in the query.
    pub term: String,
    /// Importance in `[0, 1]`.
    pub weight: f32,
    /// Dictionary category.
    pub category: KeywordCategory,
    /// Origin of the weight.
    pub source: KeywordSource,
}

/// Kind of a named entity.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum EntityKind {
    /// Languages and frameworks.
    Tech,
    /// Infrastructure tools and datastores.
    Tool,
    /// Companies and platforms.
    Org,
    /// People.
    Person,
}

/// A named entity recognized in the query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Entity text.
    pub text: String,
    /// Entity kind.
    #[serde(rename = "type")]
    pub kind: EntityKind,
    /// Recognition score in `[0, 1]`.
    pub score: f32,
    /// Byte span `(start, end)` of the first occurrence.
    pub span: (usize, usize),
}

/// Structured classification of a single query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryIntent {
    /// The query that was classified.
    pub query: String,
    /// Intent bucket.
    #[serde(rename = "type")]
    pub intent_type: IntentType,
    /// Technical domain.
    pub domain: Domain,
    /// Heuristic complexity in `[0, 1]`.
    pub complexity: f32,
    /// Classification confidence in `[0, 1]`.
    pub confidence: f32,
    /// Keywords in query order.
    pub keywords: Vec<Keyword>,
    /// Recognized entities.
    pub entities: Vec<Entity>,
    /// Technology tags found in the query.
    pub tech_stack: Vec<String>,
    /// When the classification happened.
    pub timestamp: DateTime<Utc>,
    /// Analyzer metadata.
    pub metadata: HashMap<String, serde_json::Value>,
}

impl QueryIntent {
    /// Create an intent with the given buckets and neutral scores.
    pub fn new<S: Into<String>>(query: S, intent_type: IntentType, domain: Domain) -> Self {
        Self {
            query: query.into(),
            intent_type,
            domain,
            complexity: 0.0,
            confidence: 0.5,
            keywords: Vec::new(),
            entities: Vec::new(),
            tech_stack: Vec::new(),
            timestamp: Utc::now(),
            metadata: HashMap::new(),
        }
    }

    /// Set the complexity, clamped to `[0, 1]`.
    #[must_use]
    pub fn with_complexity(mut self, complexity: f32) -> Self {
        self.complexity = complexity.clamp(0.0, 1.0);
        self
    }

    /// Set the confidence, clamped to `[0, 1]`.
    #[must_use]
    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }

    /// Whether the query counts as complex (strictly above `threshold`).
    pub fn is_complex(&self, threshold: f32) -> bool {
        self.complexity > threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_enum_names_are_snake_case() {
        assert_eq!(IntentType::Debugging.to_string(), "debugging");
        assert_eq!(Domain::Devops.as_ref(), "devops");
        assert_eq!(KeywordSource::TechDictionary.to_string(), "tech_dictionary");
        assert_eq!(EntityKind::Tool.to_string(), "TOOL");
        assert_eq!(IntentType::from_str("conceptual").unwrap(), IntentType::Conceptual);
    }

    #[test]
    fn test_intent_serializes_type_field() {
        let intent = QueryIntent::new("why", IntentType::Debugging, Domain::Backend);
        let json = serde_json::to_value(&intent).unwrap();
        assert_eq!(json["type"], "debugging");
        assert_eq!(json["domain"], "backend");
    }

    #[test]
    fn test_builders_clamp() {
        let intent = QueryIntent::new("q", IntentType::Technical, Domain::Programming)
            .with_complexity(1.7)
            .with_confidence(-0.2);
        assert!((intent.complexity - 1.0).abs() < f32::EPSILON);
        assert!(intent.confidence.abs() < f32::EPSILON);
        assert!(intent.is_complex(0.7));
    }
}
