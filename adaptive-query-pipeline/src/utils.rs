//! Text helpers shared by the pipeline stages.

use std::collections::HashSet;

/// Technical vocabulary used by the query quality heuristic.
const QUALITY_TECH_TERMS: &[&str] = &[
    "api", "sql", "http", "json", "docker", "kubernetes", "redis", "数据库", "接口", "算法", "性能",
    "架构",
];

/// Lowercased content words longer than two bytes, split on spaces, tabs and
/// newlines.
pub fn content_words(text: &str) -> HashSet<String> {
    text.split([' ', '\t', '\n'])
        .filter(|w| w.len() > 2)
        .map(str::to_ascii_lowercase)
        .collect()
}

/// Jaccard similarity of two word sets; zero when either set is empty.
#[allow(clippy::cast_precision_loss)]
pub fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f32 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let common = a.intersection(b).count();
    let union = a.len() + b.len() - common;
    common as f32 / union as f32
}

/// Lexical complexity of a query in `[0, 1]`: the mean of the unique-word
/// ratio and the word count over ten (capped at one).
#[allow(clippy::cast_precision_loss)]
pub fn query_complexity(query: &str) -> f32 {
    let words: Vec<String> = query.split_whitespace().map(str::to_lowercase).collect();
    if words.is_empty() {
        return 0.0;
    }
    let unique: HashSet<&String> = words.iter().collect();
    let uniqueness = unique.len() as f32 / words.len() as f32;
    let length = (words.len() as f32 / 10.0).min(1.0);
    (uniqueness + length) / 2.0
}

/// Heuristic quality of a raw query: reasonable length, technical vocabulary
/// and more than three words each contribute.
pub fn assess_query_quality(query: &str) -> f32 {
    let mut score = 0.0;
    if (10..=200).contains(&query.len()) {
        score += 0.3;
    }
    let lower = query.to_lowercase();
    if QUALITY_TECH_TERMS.iter().any(|t| lower.contains(t)) {
        score += 0.4;
    }
    if query.split_whitespace().count() > 3 {
        score += 0.3;
    }
    f32::min(score, 1.0)
}

/// Word-overlap similarity of two queries: `2 * common / (n1 + n2)`.
#[allow(clippy::cast_precision_loss)]
pub fn query_similarity(a: &str, b: &str) -> f32 {
    let wa: HashSet<String> = a.split_whitespace().map(str::to_lowercase).collect();
    let wb: HashSet<String> = b.split_whitespace().map(str::to_lowercase).collect();
    if wa.is_empty() && wb.is_empty() {
        return 1.0;
    }
    let common = wa.intersection(&wb).count();
    2.0 * common as f32 / (wa.len() + wb.len()) as f32
}

/// Count occurrences of `term` in `haystack`, case-insensitively, that are not
/// glued to surrounding ASCII letters or digits.
pub fn count_term(haystack: &str, term: &str) -> usize {
    if term.is_empty() {
        return 0;
    }
    let haystack = haystack.to_lowercase();
    let term = term.to_lowercase();
    haystack
        .match_indices(&term)
        .filter(|(start, matched)| {
            let before = haystack[..*start].chars().next_back();
            let after = haystack[start + matched.len()..].chars().next();
            !before.is_some_and(|c| c.is_ascii_alphanumeric())
                && !after.is_some_and(|c| c.is_ascii_alphanumeric())
        })
        .count()
}

/// Push `item` unless an equal item is already present.
pub fn push_unique<T: PartialEq>(items: &mut Vec<T>, item: T) {
    if !items.contains(&item) {
        items.push(item);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn test_content_words_filters_short_tokens() {
        let words = content_words("An API\tfor the\nRust db");
        assert!(words.contains("api"));
        assert!(words.contains("rust"));
        assert!(words.contains("the"));
        assert!(!words.contains("an"));
        assert!(!words.contains("db"));
    }

    #[test]
    fn test_jaccard() {
        let a = content_words("rust async runtime");
        let b = content_words("rust sync runtime");
        assert!((jaccard(&a, &b) - 0.5).abs() < 1e-6);
        assert!(jaccard(&a, &HashSet::new()).abs() < f32::EPSILON);
    }

    #[test_case("", 0.0 ; "empty")]
    #[test_case("a a", 0.35 ; "repeated")]
    #[test_case("one two three four five six seven eight nine ten", 1.0 ; "ten unique")]
    fn test_query_complexity(query: &str, expected: f32) {
        assert!((query_complexity(query) - expected).abs() < 1e-5);
    }

    #[test_case("Go", "这个go程序", 1 ; "cjk neighbours count")]
    #[test_case("go", "google go", 1 ; "ascii neighbours do not")]
    #[test_case("getUser()", "call getUser() getUser()", 2 ; "punctuation term")]
    #[test_case("", "anything", 0 ; "empty term")]
    fn test_count_term(term: &str, haystack: &str, expected: usize) {
        assert_eq!(count_term(haystack, term), expected);
    }

    #[test]
    fn test_assess_query_quality() {
        assert!((assess_query_quality("how to tune the redis cache") - 1.0).abs() < 1e-6);
        assert!((assess_query_quality("hi") - 0.0).abs() < 1e-6);
    }

    #[test]
    fn test_query_similarity() {
        assert!((query_similarity("a b", "a b") - 1.0).abs() < 1e-6);
        assert!((query_similarity("a b", "c d")).abs() < 1e-6);
    }
}
