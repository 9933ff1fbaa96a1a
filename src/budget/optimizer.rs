//! Prompt optimization analysis
//!
//! Flags the usual sources of wasted prompt tokens: phrases repeated over and
//! over, prompts that are simply too long, too many worked examples, and the
//! model's role being restated several times.

use super::estimator::TokenEstimator;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Words per phrase when looking for repetition
const NGRAM: usize = 5;
/// A phrase must occur more than this many times to count as repeated
const REPEAT_THRESHOLD: usize = 2;
/// Prompts longer than this (in characters) are flagged
const LONG_PROMPT_CHARS: usize = 8_000;
/// Example blocks allowed before flagging
const MAX_EXAMPLE_BLOCKS: usize = 3;
/// Tokens assumed saved per dropped example block
const EXAMPLE_BLOCK_TOKENS: u64 = 60;
/// Tokens assumed saved per dropped role statement
const ROLE_STATEMENT_TOKENS: u64 = 25;
/// Optimization is recommended only above this share of the prompt
const SAVINGS_FRACTION: f64 = 0.10;

const ROLE_PHRASES: &[&str] = &["you are a ", "you are an ", "act as ", "your role is "];

/// Result of analyzing a prompt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationReport {
    pub should_optimize: bool,
    pub recommendations: Vec<String>,
    pub estimated_savings: u64,
    pub current_tokens: u64,
}

/// Analyze a prompt for avoidable token spend
pub fn analyze_prompt(prompt: &str, estimator: &dyn TokenEstimator) -> OptimizationReport {
    let current_tokens = estimator.estimate(prompt);
    let mut recommendations = Vec::new();
    let mut estimated_savings = 0u64;

    let (phrases, redundant_words) = repeated_phrases(prompt);
    if !phrases.is_empty() {
        for (phrase, count) in phrases.iter().take(3) {
            recommendations.push(format!(
                "Phrase \"{}\" appears {} times; state it once",
                phrase, count
            ));
        }
        estimated_savings += estimator.estimate(&redundant_words.join(" "));
    }

    let chars = prompt.chars().count();
    if chars > LONG_PROMPT_CHARS {
        recommendations.push(format!(
            "Prompt is {} characters; summarize or trim background context",
            chars
        ));
        estimated_savings += current_tokens / 5;
    }

    let examples = count_example_blocks(prompt);
    if examples > MAX_EXAMPLE_BLOCKS {
        recommendations.push(format!(
            "Prompt contains {} example blocks; keep at most {}",
            examples, MAX_EXAMPLE_BLOCKS
        ));
        estimated_savings += (examples - MAX_EXAMPLE_BLOCKS) as u64 * EXAMPLE_BLOCK_TOKENS;
    }

    let roles = count_role_statements(prompt);
    if roles > 1 {
        recommendations.push(format!(
            "Role is defined {} times; keep a single role statement",
            roles
        ));
        estimated_savings += (roles - 1) as u64 * ROLE_STATEMENT_TOKENS;
    }

    let estimated_savings = estimated_savings.min(current_tokens);
    let should_optimize = estimated_savings as f64 > current_tokens as f64 * SAVINGS_FRACTION;

    OptimizationReport {
        should_optimize,
        recommendations,
        estimated_savings,
        current_tokens,
    }
}

/// Phrases occurring more than [`REPEAT_THRESHOLD`] times, most frequent
/// first, plus the words that only exist because of the repetition
fn repeated_phrases(prompt: &str) -> (Vec<(String, usize)>, Vec<String>) {
    let words: Vec<String> = prompt
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| c.is_ascii_punctuation()).to_lowercase())
        .filter(|w| !w.is_empty())
        .collect();

    if words.len() < NGRAM {
        return (Vec::new(), Vec::new());
    }

    let mut counts: HashMap<&[String], usize> = HashMap::new();
    for window in words.windows(NGRAM) {
        *counts.entry(window).or_insert(0) += 1;
    }

    let mut first_seen: HashSet<&[String]> = HashSet::new();
    let mut redundant = vec![false; words.len()];
    for (i, window) in words.windows(NGRAM).enumerate() {
        let repeated = counts.get(window).copied().unwrap_or(0) > REPEAT_THRESHOLD;
        if repeated && !first_seen.insert(window) {
            redundant[i..i + NGRAM].iter_mut().for_each(|flag| *flag = true);
        }
    }

    let mut phrases: Vec<(String, usize)> = counts
        .into_iter()
        .filter(|(_, count)| *count > REPEAT_THRESHOLD)
        .map(|(window, count)| (window.join(" "), count))
        .collect();
    phrases.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    let redundant_words = words
        .iter()
        .zip(redundant)
        .filter(|(_, flagged)| *flagged)
        .map(|(word, _)| word.clone())
        .collect();

    (phrases, redundant_words)
}

fn count_example_blocks(prompt: &str) -> usize {
    let labelled = prompt
        .lines()
        .filter(|line| line.trim_start().to_lowercase().starts_with("example"))
        .count();
    let fenced = prompt.matches("```").count() / 2;
    labelled.max(fenced)
}

fn count_role_statements(prompt: &str) -> usize {
    let lower = prompt.to_lowercase();
    ROLE_PHRASES.iter().map(|phrase| lower.matches(phrase).count()).sum()
}
