//! Deterministic text heuristics shared by the agents.
//!
//! Everything here is a pure string function: no runtime state, no I/O.

use std::sync::LazyLock;

use regex::Regex;

/// Keyword categories and their synonyms. A category is implied by an
/// expectation when the expectation mentions the category name or any synonym.
pub const KEYWORD_CATEGORIES: &[(&str, &[&str])] = &[
    (
        "error",
        &["error", "exception", "fail", "failure", "panic", "crash", "abort"],
    ),
    (
        "timeout",
        &["timeout", "timed out", "deadline", "hang", "hung", "stall"],
    ),
    (
        "type",
        &["type", "mismatch", "cast", "typeerror", "expected type", "null"],
    ),
    (
        "assertion",
        &["assert", "assertion", "expected", "actual", "left", "right"],
    ),
    (
        "missing",
        &["not found", "missing", "undefined", "enoent", "no such", "unresolved"],
    ),
    (
        "performance",
        &["latency", "throughput", "slow", "score", "shortfall", "regress"],
    ),
    (
        "context",
        &["context", "retrieval", "source", "citation", "grounded", "query"],
    ),
    (
        "version",
        &["version", "dependency", "upgrade", "config", "baseline"],
    ),
    (
        "consistency",
        &["answer", "variant", "inconsistent", "differs", "divergent"],
    ),
];

const STOPWORDS: &[&str] = &[
    "about", "after", "been", "does", "from", "have", "into", "only", "should", "than", "that",
    "their", "there", "them", "they", "this", "when", "which", "while", "with", "were", "will",
];

static PATH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"/?(?:[A-Za-z0-9_.-]+/)*[A-Za-z0-9_-][A-Za-z0-9_.-]*\.(?:rs|ts|tsx|js|jsx|mjs|cjs|py|go|java|kt|rb|c|cc|cpp|h|hpp|cs|swift|toml|json|ya?ml)\b",
    )
    .expect("path regex should be valid")
});

static TEST_INVOCATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^\s*(?:cargo\s+(?:test|nextest)|npm\s+(?:run\s+)?test|pnpm\s+(?:run\s+)?test|yarn\s+test|npx\s+(?:jest|vitest|mocha)|pytest|python3?\s+-m\s+(?:pytest|unittest)|go\s+test|jest|vitest|mocha|bun\s+test|deno\s+test|make\s+test|just\s+test|mvn\s+test|gradle\s+test|\./gradlew\s+test|dotnet\s+test|rspec|bundle\s+exec\s+rspec)\b",
    )
    .expect("test invocation regex should be valid")
});

/// Lowercased words longer than three characters, stopwords removed,
/// deduplicated in first-seen order.
pub fn significant_words(text: &str) -> Vec<String> {
    let mut words: Vec<String> = Vec::new();
    for raw in text.split(|c: char| !(c.is_alphanumeric() || c == '_')) {
        let word = raw.to_lowercase();
        if word.chars().count() <= 3 || STOPWORDS.contains(&word.as_str()) {
            continue;
        }
        if !words.contains(&word) {
            words.push(word);
        }
    }
    words
}

/// Number of significant words of `a` that also appear in `b`.
pub fn word_overlap(a: &str, b: &str) -> usize {
    let other = significant_words(b);
    significant_words(a)
        .iter()
        .filter(|word| other.contains(word))
        .count()
}

/// Synonym lists for every category implied by `expected`.
pub fn categories_for(expected: &str) -> Vec<&'static [&'static str]> {
    let expected = expected.to_lowercase();
    KEYWORD_CATEGORIES
        .iter()
        .filter(|(name, synonyms)| {
            expected.contains(name) || synonyms.iter().any(|syn| expected.contains(syn))
        })
        .map(|(_, synonyms)| *synonyms)
        .collect()
}

/// True when `text` mentions a synonym of any category implied by `expected`.
pub fn has_related_keywords(text: &str, expected: &str) -> bool {
    let text = text.to_lowercase();
    categories_for(expected)
        .iter()
        .any(|synonyms| synonyms.iter().any(|syn| text.contains(syn)))
}

/// Case-insensitive substring match of `expected` in `text`.
pub fn contains_expected(text: &str, expected: &str) -> bool {
    let expected = expected.trim().to_lowercase();
    !expected.is_empty() && text.to_lowercase().contains(&expected)
}

/// Direct match or keyword-category match.
pub fn matches_expected(text: &str, expected: &str) -> bool {
    contains_expected(text, expected) || has_related_keywords(text, expected)
}

/// Path-like tokens with a source/config file extension, in order of appearance.
pub fn extract_paths(text: &str) -> Vec<String> {
    let mut paths: Vec<String> = Vec::new();
    for found in PATH_RE.find_iter(text) {
        let path = found.as_str().to_string();
        if !paths.contains(&path) {
            paths.push(path);
        }
    }
    paths
}

/// Paths whose file name or a directory component marks them as tests.
pub fn extract_test_paths(text: &str) -> Vec<String> {
    extract_paths(text)
        .into_iter()
        .filter(|path| is_test_path(path))
        .collect()
}

pub fn is_test_path(path: &str) -> bool {
    let lower = path.to_lowercase();
    let mut parts = lower.rsplit('/');
    let file = parts.next().unwrap_or_default();
    if file.contains("test") || file.contains("spec") {
        return true;
    }
    parts.any(|dir| matches!(dir, "test" | "tests" | "spec" | "__tests__"))
}

/// True when `command` starts with a recognized test runner invocation.
pub fn looks_like_test_invocation(command: &str) -> bool {
    TEST_INVOCATION_RE.is_match(command)
}

/// Lowercase ASCII slug joined by `_`, suitable for file and function names.
pub fn slugify(text: &str) -> String {
    let mut slug = String::new();
    for word in text
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        if !slug.is_empty() {
            slug.push('_');
        }
        slug.push_str(&word.to_ascii_lowercase());
        if slug.len() >= 48 {
            break;
        }
    }
    if slug.is_empty() {
        "unnamed".to_string()
    } else {
        slug
    }
}

/// First `max` characters of `text`, respecting char boundaries.
pub fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}
