// src/sentiment/mod.rs
//! Entity-sentiment adapter: calls an external service and maps its entities into
//! confidence inputs for the relevance scorer.
//!
//! Only entities of a product-like type whose mention equals one of the matched
//! keyword terms count. Any failure of the remote call degrades to "no sentiment".

pub mod http;

use anyhow::Result;
use async_trait::async_trait;
use metrics::counter;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub use http::HttpSentimentClient;

/// Entity types whose sentiment is relevant to keyword matches.
pub const RELEVANT_ENTITY_TYPES: [&str; 4] = ["PRODUCT", "ORGANIZATION", "TITLE", "LOCATION"];

/// Request body sent to the sentiment service.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SentimentRequest<'a> {
    pub content: &'a str,
    pub language: &'a str,
}

impl<'a> SentimentRequest<'a> {
    pub fn english(content: &'a str) -> Self {
        Self {
            content,
            language: "eng",
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct SentimentResponse {
    #[serde(default)]
    pub entities: Vec<Entity>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Entity {
    #[serde(rename = "type")]
    pub kind: String,
    pub mention: String,
    #[serde(default)]
    pub sentiment: Option<EntityScore>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct EntityScore {
    pub confidence: f64,
}

/// Filtered entity sentiment attached to a classification result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntitySentiment {
    pub kind: String,
    pub mention: String,
    pub confidence: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SentimentSummary {
    pub entities: Vec<EntitySentiment>,
}

impl SentimentSummary {
    pub fn confidences(&self) -> Vec<f64> {
        self.entities.iter().map(|e| e.confidence).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

/// Remote entity-sentiment service.
#[async_trait]
pub trait SentimentClient: Send + Sync {
    async fn analyze_entities(&self, content: &str) -> Result<SentimentResponse>;
    fn name(&self) -> &'static str;
}

pub type DynSentimentClient = Arc<dyn SentimentClient>;

/// Keep entities of a relevant type whose lowercased mention is a matched term.
pub fn filter_entities(resp: &SentimentResponse, matched_terms: &[String]) -> SentimentSummary {
    let entities = resp
        .entities
        .iter()
        .filter(|e| RELEVANT_ENTITY_TYPES.contains(&e.kind.to_ascii_uppercase().as_str()))
        .filter_map(|e| {
            let mention = e.mention.to_lowercase();
            if !matched_terms.iter().any(|t| *t == mention) {
                return None;
            }
            let confidence = bounded_confidence(&mention, e.sentiment.as_ref()?.confidence)?;
            Some(EntitySentiment {
                kind: e.kind.to_ascii_uppercase(),
                mention,
                confidence,
            })
        })
        .collect();
    SentimentSummary { entities }
}

/// Relevance lives in `[0, 1]`: non-finite confidences are dropped, the rest clamped.
fn bounded_confidence(mention: &str, confidence: f64) -> Option<f64> {
    if !confidence.is_finite() {
        warn!(target: "sentiment", %mention, confidence, "dropping non-finite entity confidence");
        return None;
    }
    if !(0.0..=1.0).contains(&confidence) {
        warn!(target: "sentiment", %mention, confidence, "entity confidence out of range; clamped");
    }
    Some(confidence.clamp(0.0, 1.0))
}

/// Boundary wrapper around a [`SentimentClient`] with a hard timeout.
#[derive(Clone)]
pub struct SentimentAdapter {
    client: DynSentimentClient,
    timeout: Duration,
}

impl SentimentAdapter {
    pub fn new(client: DynSentimentClient, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    pub fn provider_name(&self) -> &'static str {
        self.client.name()
    }

    /// `None` when the service failed or timed out; never an error.
    pub async fn lookup(&self, text: &str, matched_terms: &[String]) -> Option<SentimentSummary> {
        let outcome = tokio::time::timeout(self.timeout, self.client.analyze_entities(text)).await;
        match outcome {
            Ok(Ok(resp)) => {
                let summary = filter_entities(&resp, matched_terms);
                debug!(
                    target: "sentiment",
                    provider = self.client.name(),
                    total = resp.entities.len(),
                    kept = summary.entities.len(),
                    "entity sentiment received"
                );
                Some(summary)
            }
            Ok(Err(e)) => {
                warn!(target: "sentiment", provider = self.client.name(), error = ?e, "sentiment lookup failed");
                counter!("sentiment_errors_total").increment(1);
                None
            }
            Err(_) => {
                warn!(
                    target: "sentiment",
                    provider = self.client.name(),
                    timeout_ms = self.timeout.as_millis() as u64,
                    "sentiment lookup timed out"
                );
                counter!("sentiment_errors_total").increment(1);
                None
            }
        }
    }
}
