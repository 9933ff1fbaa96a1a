//! Content-aware token estimation
//!
//! Exact tokenization is provider specific; the ledger only needs a stable,
//! cheap approximation. Text is classified as code, JSON or prose and divided
//! by a characters-per-token ratio for that class.

use crate::cache::{MemoCache, MemoCacheConfig, Memoized};

/// Characters per token for source code
const CODE_CHARS_PER_TOKEN: f64 = 3.0;
/// Characters per token for JSON payloads
const JSON_CHARS_PER_TOKEN: f64 = 3.5;
/// Characters per token for natural language
const PROSE_CHARS_PER_TOKEN: f64 = 4.0;

/// Number of leading characters folded into the memoization key
const KEY_PREFIX_CHARS: usize = 100;

/// Share of punctuation typical of code above which text counts as code
const CODE_SYMBOL_DENSITY: f64 = 0.08;

const CODE_MARKERS: &[&str] = &[
    "```", "fn ", "function ", "def ", "class ", "import ", "const ", "let ", "=>", "#include",
    "public static",
];

/// Token estimator trait for different tokenization strategies
pub trait TokenEstimator: Send + Sync {
    /// Estimate the number of tokens in the given text
    fn estimate(&self, text: &str) -> u64;

    /// Estimate tokens for multiple texts
    fn estimate_batch(&self, texts: &[&str]) -> Vec<u64> {
        texts.iter().map(|t| self.estimate(t)).collect()
    }
}

/// Kind of content, which determines the characters-per-token ratio
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    Code,
    Json,
    Prose,
}

impl ContentKind {
    /// Classify text by shape
    pub fn classify(text: &str) -> Self {
        let trimmed = text.trim();
        let looks_like_json = (trimmed.starts_with('{') && trimmed.ends_with('}'))
            || (trimmed.starts_with('[') && trimmed.ends_with(']'));
        if looks_like_json {
            return Self::Json;
        }

        if CODE_MARKERS.iter().any(|marker| text.contains(marker)) {
            return Self::Code;
        }

        let total = text.chars().count();
        if total > 0 {
            let symbols = text
                .chars()
                .filter(|c| matches!(c, '{' | '}' | ';' | '(' | ')' | '=' | '<' | '>'))
                .count();
            if symbols as f64 / total as f64 > CODE_SYMBOL_DENSITY {
                return Self::Code;
            }
        }

        Self::Prose
    }

    pub fn chars_per_token(&self) -> f64 {
        match self {
            Self::Code => CODE_CHARS_PER_TOKEN,
            Self::Json => JSON_CHARS_PER_TOKEN,
            Self::Prose => PROSE_CHARS_PER_TOKEN,
        }
    }
}

/// Uncached heuristic estimate
pub fn heuristic_estimate(text: &str) -> u64 {
    let chars = text.chars().count();
    if chars == 0 {
        return 0;
    }
    let kind = ContentKind::classify(text);
    (chars as f64 / kind.chars_per_token()).ceil() as u64
}

/// Memoization key: byte length plus a bounded prefix
pub fn estimate_cache_key(text: &str) -> String {
    let prefix: String = text.chars().take(KEY_PREFIX_CHARS).collect();
    format!("{}:{}", text.len(), prefix)
}

/// Heuristic estimator with a memoized fast path
pub struct HeuristicEstimator {
    memo: Memoized<str, String, u64>,
}

impl HeuristicEstimator {
    pub fn new(cache: MemoCacheConfig) -> Self {
        Self {
            memo: Memoized::new(MemoCache::new(cache), estimate_cache_key, heuristic_estimate),
        }
    }

    /// Cache statistics for the memoized path
    pub fn cache_stats(&self) -> crate::cache::CacheStats {
        self.memo.cache().stats()
    }
}

impl Default for HeuristicEstimator {
    fn default() -> Self {
        Self::new(MemoCacheConfig::default())
    }
}

impl TokenEstimator for HeuristicEstimator {
    fn estimate(&self, text: &str) -> u64 {
        self.memo.call(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert_eq!(ContentKind::classify(r#"{"commands": []}"#), ContentKind::Json);
        assert_eq!(ContentKind::classify("[1, 2, 3]"), ContentKind::Json);
        assert_eq!(ContentKind::classify("fn main() { println!(\"hi\"); }"), ContentKind::Code);
        assert_eq!(
            ContentKind::classify("Please clone the repository and open a pull request."),
            ContentKind::Prose
        );
    }

    #[test]
    fn test_ratios_per_kind() {
        let prose = "a".repeat(40);
        assert_eq!(heuristic_estimate(&prose), 10);

        let json = format!("{{\"k\":\"{}\"}}", "v".repeat(29)); // 37 chars
        assert_eq!(heuristic_estimate(&json), 11);

        let code = format!("fn {}", "x".repeat(27)); // 30 chars
        assert_eq!(heuristic_estimate(&code), 10);
    }

    #[test]
    fn test_empty_text() {
        let estimator = HeuristicEstimator::default();
        assert_eq!(estimator.estimate(""), 0);
    }

    #[test]
    fn test_repeated_estimates_hit_cache() {
        let estimator = HeuristicEstimator::default();
        let prompt = "Summarize the open pull requests for the release branch.";

        let first = estimator.estimate(prompt);
        let second = estimator.estimate(prompt);

        assert_eq!(first, second);
        let stats = estimator.cache_stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[test]
    fn test_cache_key_uses_length_and_prefix() {
        let long = "x".repeat(500);
        let key = estimate_cache_key(&long);
        assert!(key.starts_with("500:"));
        assert_eq!(key.len(), "500:".len() + KEY_PREFIX_CHARS);
    }

    #[test]
    fn test_batch_estimation() {
        let estimator = HeuristicEstimator::default();
        let tokens = estimator.estimate_batch(&["Hello", "world", "test"]);
        assert_eq!(tokens.len(), 3);
        assert!(tokens.iter().all(|&t| t > 0));
    }
}
