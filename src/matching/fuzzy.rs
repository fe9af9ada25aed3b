//! Token-order-insensitive fuzzy matching of channel names
//!
//! Names are normalized (lowercased, punctuation replaced by spaces, quality
//! tags such as `HD` removed), their tokens sorted and re-joined, and the
//! resulting strings compared with the Indel ratio
//! `100 * 2 * LCS(a, b) / (|a| + |b|)`.

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::config::defaults::{DEFAULT_QUALITY_TAGS, DEFAULT_SIMILARITY_THRESHOLD};

fn punctuation() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"[^\w\s]|_").expect("punctuation pattern compiles"))
}

/// Matcher settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatcherConfig {
    /// Minimum accepted score, 0-100
    pub threshold: u8,
    /// Whole-word tokens removed before scoring
    pub quality_tags: Vec<String>,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_SIMILARITY_THRESHOLD,
            quality_tags: DEFAULT_QUALITY_TAGS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Outcome of matching one query against a candidate list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub query: String,
    /// The winning candidate as supplied by the caller
    pub candidate: String,
    /// Position of the candidate in the input list
    pub candidate_index: usize,
    pub score: f64,
    pub accepted: bool,
}

pub struct FuzzyMatcher {
    threshold: u8,
    quality_tags: HashSet<String>,
}

impl FuzzyMatcher {
    pub fn new(config: &MatcherConfig) -> Self {
        Self {
            threshold: config.threshold.min(100),
            quality_tags: config
                .quality_tags
                .iter()
                .map(|tag| tag.trim().to_lowercase())
                .collect(),
        }
    }

    pub fn threshold(&self) -> u8 {
        self.threshold
    }

    /// Lowercase, strip punctuation and quality tags, sort tokens
    pub fn normalize(&self, name: &str) -> String {
        let lowered = name.to_lowercase();
        let spaced = punctuation().replace_all(&lowered, " ");
        let mut tokens: Vec<&str> = spaced
            .split_whitespace()
            .filter(|token| !self.quality_tags.contains(*token))
            .collect();
        tokens.sort_unstable();
        tokens.join(" ")
    }

    /// Similarity of two names in the range 0-100
    pub fn score(&self, a: &str, b: &str) -> f64 {
        indel_ratio(&self.normalize(a), &self.normalize(b))
    }

    /// Highest-scoring candidate regardless of the threshold.
    ///
    /// Ties keep the earliest candidate. Returns `None` when the normalized
    /// query is empty or there are no candidates.
    pub fn best_candidate<S: AsRef<str>>(&self, query: &str, candidates: &[S]) -> Option<MatchResult> {
        let normalized_query = self.normalize(query);
        if normalized_query.is_empty() {
            return None;
        }

        let mut best: Option<(usize, f64)> = None;
        for (index, candidate) in candidates.iter().enumerate() {
            let score = indel_ratio(&normalized_query, &self.normalize(candidate.as_ref()));
            match best {
                Some((_, best_score)) if score <= best_score => {}
                _ => best = Some((index, score)),
            }
        }

        best.map(|(index, score)| MatchResult {
            query: query.to_string(),
            candidate: candidates[index].as_ref().to_string(),
            candidate_index: index,
            score,
            accepted: score >= f64::from(self.threshold),
        })
    }

    /// The maximum-scoring candidate when it reaches the threshold
    pub fn find_match<S: AsRef<str>>(&self, query: &str, candidates: &[S]) -> Option<MatchResult> {
        self.best_candidate(query, candidates)
            .filter(|result| result.accepted)
    }
}

/// `100 * 2 * LCS(a, b) / (|a| + |b|)`, counted in characters
pub fn indel_ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let total = a.len() + b.len();

    if total == 0 {
        return 100.0;
    }
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    100.0 * 2.0 * longest_common_subsequence(&a, &b) as f64 / total as f64
}

fn longest_common_subsequence(a: &[char], b: &[char]) -> usize {
    let mut previous = vec![0usize; b.len() + 1];
    let mut current = vec![0usize; b.len() + 1];

    for &ca in a {
        for (j, &cb) in b.iter().enumerate() {
            current[j + 1] = if ca == cb {
                previous[j] + 1
            } else {
                previous[j + 1].max(current[j])
            };
        }
        std::mem::swap(&mut previous, &mut current);
    }

    previous[b.len()]
}
