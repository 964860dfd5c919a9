//! TF-IDF keyword extraction over a single-chunk corpus.
//!
//! With one document every term has the same smoothed idf (`ln(2/2) + 1 = 1`),
//! so the L2-normalised tf-idf weight is the term count over the norm of all
//! counts. Terms are lowercased tokens of two or more word characters.

use std::collections::BTreeMap;

use regex::Regex;

use crate::error::Result;

pub const DEFAULT_KEYWORD_COUNT: usize = 5;

const TOKEN_PATTERN: &str = r"\b\w\w+\b";

#[derive(Debug, Clone)]
pub struct KeywordExtractor {
    token_re: Regex,
}

impl KeywordExtractor {
    pub fn new() -> Result<Self> {
        Ok(Self {
            token_re: Regex::new(TOKEN_PATTERN)?,
        })
    }

    /// Every term with its tf-idf weight, highest first. Equal weights keep
    /// vocabulary (alphabetical) order.
    pub fn score_terms(&self, text: &str) -> Vec<(String, f32)> {
        let lowered = text.to_lowercase();
        let mut counts: BTreeMap<&str, u32> = BTreeMap::new();
        for token in self.token_re.find_iter(&lowered) {
            *counts.entry(token.as_str()).or_insert(0) += 1;
        }

        let norm = counts.values().map(|&c| (c as f32).powi(2)).sum::<f32>().sqrt();
        if norm == 0.0 {
            return Vec::new();
        }

        let mut scored: Vec<(String, u32)> = counts.into_iter().map(|(t, c)| (t.to_string(), c)).collect();
        scored.sort_by(|a, b| b.1.cmp(&a.1));
        scored
            .into_iter()
            .map(|(term, count)| (term, count as f32 / norm))
            .collect()
    }

    /// Top `top_n` terms; empty when the text has no qualifying tokens.
    pub fn extract(&self, text: &str, top_n: usize) -> Vec<String> {
        self.score_terms(text)
            .into_iter()
            .take(top_n)
            .map(|(term, _)| term)
            .collect()
    }
}
