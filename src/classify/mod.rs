// src/classify/mod.rs
//! Per-event classification: keyword match, friendliness, volatility, relevance.

pub mod matcher;
pub mod scoring;

use serde::Serialize;

use crate::profanity::ProfanityFilter;
use crate::sentiment::SentimentSummary;
use crate::stream::event::RawEvent;
use crate::vocab::TrustedSourceSet;

pub use matcher::KeywordMatcher;
pub use scoring::{score, FRIENDLY_BOOST};

/// Outcome of classifying one event. Refined in place by the sentiment stage,
/// then consumed by the sink.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassificationResult {
    pub event_id: String,
    pub raw_text: String,
    pub raw_json: String,
    pub author: String,
    pub is_friendly: bool,
    pub relevance: f64,
    pub is_volatile: bool,
    pub matched_tags: Vec<String>,
    pub sentiment: Option<SentimentSummary>,
}

impl ClassificationResult {
    pub fn is_relevant(&self) -> bool {
        !self.matched_tags.is_empty()
    }

    /// Re-score from sentiment confidences; an empty summary keeps the friendliness score.
    pub fn apply_sentiment(&mut self, summary: SentimentSummary) {
        self.relevance = score(self.is_friendly, Some(summary.confidences().as_slice()));
        self.sentiment = Some(summary);
    }
}

/// Classify one event. Returns `None` when no vocabulary term occurs in its text.
pub fn classify(
    event: &RawEvent,
    matcher: &KeywordMatcher,
    trusted: &TrustedSourceSet,
    profanity: &dyn ProfanityFilter,
) -> Option<ClassificationResult> {
    let matched_tags = matcher.matches(&event.text);
    if matched_tags.is_empty() {
        return None;
    }

    let is_friendly = trusted.contains(&event.author_handle);
    let is_volatile = !profanity.check(&event.text).is_empty();

    Some(ClassificationResult {
        event_id: event.id.clone(),
        raw_text: event.text.clone(),
        raw_json: event.raw.clone(),
        author: event.author_handle.clone(),
        is_friendly,
        relevance: score(is_friendly, None),
        is_volatile,
        matched_tags,
        sentiment: None,
    })
}
