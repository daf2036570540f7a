// src/profanity.rs
//! Profanity check used only to flag events as volatile. Never gates persistence.

use std::collections::HashSet;

pub trait ProfanityFilter: Send + Sync {
    /// Flagged words found in `text` (lowercased, in order of appearance).
    fn check(&self, text: &str) -> Vec<String>;
}

/// Token-based word list. Whole tokens only, so "hello" never trips on "hell".
#[derive(Debug, Clone)]
pub struct WordListFilter {
    words: HashSet<String>,
}

impl WordListFilter {
    pub fn new<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            words: words
                .into_iter()
                .map(|w| w.as_ref().trim().to_lowercase())
                .filter(|w| !w.is_empty())
                .collect(),
        }
    }

    /// Small built-in list; swap in a fuller list via `new`.
    pub fn default_seed() -> Self {
        Self::new([
            "arse", "ass", "asshole", "bastard", "bitch", "bollocks", "crap", "damn", "dick",
            "fuck", "fucking", "piss", "shit", "wtf",
        ])
    }
}

impl ProfanityFilter for WordListFilter {
    fn check(&self, text: &str) -> Vec<String> {
        text.split(|c: char| !c.is_alphanumeric() && c != '\'')
            .filter(|t| !t.is_empty())
            .map(|t| t.trim_matches('\'').to_lowercase())
            .filter(|t| self.words.contains(t))
            .collect()
    }
}
