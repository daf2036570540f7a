// src/classify/matcher.rs
//! Keyword matcher: one compiled, case-insensitive regex set over the vocabulary.
//!
//! The set runs a single pass over the text to decide *which* terms occur; the
//! reported order is the position of each term's first occurrence, ties broken
//! by vocabulary order (so `api` precedes `api design` at the same offset).

use regex::{RegexSet, RegexSetBuilder};

use crate::vocab::Vocabulary;

#[derive(Debug, Clone)]
pub struct KeywordMatcher {
    terms: Vec<String>,
    set: RegexSet,
}

impl KeywordMatcher {
    /// Compile the vocabulary. Terms are matched literally (regex-escaped).
    pub fn new(vocab: &Vocabulary) -> Result<Self, regex::Error> {
        let terms = vocab.terms().to_vec();
        let set = RegexSetBuilder::new(terms.iter().map(|t| regex::escape(t)))
            .case_insensitive(true)
            .size_limit(64 * (1 << 20))
            .build()?;
        Ok(Self { terms, set })
    }

    /// Terms occurring anywhere in `text`, in first-occurrence order. Empty means "not relevant".
    pub fn matches(&self, text: &str) -> Vec<String> {
        let lowered = text.to_lowercase();
        let mut hits: Vec<(usize, usize)> = self
            .set
            .matches(&lowered)
            .into_iter()
            .map(|idx| {
                let pos = lowered.find(self.terms[idx].as_str()).unwrap_or(usize::MAX);
                (pos, idx)
            })
            .collect();
        hits.sort_unstable();
        hits.into_iter()
            .map(|(_, idx)| self.terms[idx].clone())
            .collect()
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.set.is_match(&text.to_lowercase())
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }
}
