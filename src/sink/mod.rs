// src/sink/mod.rs
//! Time-series sink: maps a classification result to one point and writes it.

pub mod influx;
pub mod memory;

use async_trait::async_trait;
use metrics::counter;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::classify::ClassificationResult;
use crate::error::SinkError;

pub use influx::{InfluxConfig, InfluxWriter};
pub use memory::MemoryWriter;

pub const DEFAULT_MEASUREMENT: &str = "events";

/// Tag key holding the comma-joined matched keywords.
pub const KEYWORDS_TAG: &str = "keywords";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Float(f64),
    Int(i64),
    Bool(bool),
    Str(String),
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}
impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}
impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}
impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}
impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

/// Single point write request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Point {
    pub measurement: String,
    pub tags: BTreeMap<String, String>,
    pub fields: BTreeMap<String, FieldValue>,
    /// Unix milliseconds; `None` lets the store assign server time.
    pub timestamp_ms: Option<i64>,
}

impl Point {
    pub fn new(measurement: impl Into<String>) -> Self {
        Self {
            measurement: measurement.into(),
            tags: BTreeMap::new(),
            fields: BTreeMap::new(),
            timestamp_ms: None,
        }
    }

    pub fn tag(mut self, k: impl Into<String>, v: impl Into<String>) -> Self {
        self.tags.insert(k.into(), v.into());
        self
    }

    pub fn field(mut self, k: impl Into<String>, v: impl Into<FieldValue>) -> Self {
        self.fields.insert(k.into(), v.into());
        self
    }

    pub fn at_ms(mut self, ts: i64) -> Self {
        self.timestamp_ms = Some(ts);
        self
    }

    /// InfluxDB line protocol (millisecond precision).
    pub fn to_line_protocol(&self) -> String {
        let mut out = escape(&self.measurement, &[',', ' ']);
        for (k, v) in &self.tags {
            if v.is_empty() {
                continue;
            }
            let _ = write!(out, ",{}={}", escape(k, TAG_SPECIAL), escape(v, TAG_SPECIAL));
        }
        let mut first = true;
        for (k, v) in &self.fields {
            out.push(if first { ' ' } else { ',' });
            first = false;
            let _ = write!(out, "{}=", escape(k, TAG_SPECIAL));
            match v {
                FieldValue::Float(f) => {
                    let _ = write!(out, "{f:?}");
                }
                FieldValue::Int(i) => {
                    let _ = write!(out, "{i}i");
                }
                FieldValue::Bool(b) => {
                    let _ = write!(out, "{b}");
                }
                FieldValue::Str(s) => {
                    let _ = write!(out, "\"{}\"", escape(s, &['"', '\\']));
                }
            }
        }
        if let Some(ts) = self.timestamp_ms {
            let _ = write!(out, " {ts}");
        }
        out
    }
}

const TAG_SPECIAL: &[char] = &[',', '=', ' '];

fn escape(s: &str, special: &[char]) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\n' => out.push_str("\\n"),
            c if special.contains(&c) => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out
}

/// Persistence collaborator accepting single point writes.
#[async_trait]
pub trait PointWriter: Send + Sync {
    async fn write_point(&self, point: &Point) -> Result<(), SinkError>;
    fn name(&self) -> &'static str;
}

pub type DynPointWriter = Arc<dyn PointWriter>;

/// Formats classification results into points and hands them to a [`PointWriter`].
#[derive(Clone)]
pub struct SinkAdapter {
    writer: DynPointWriter,
    measurement: String,
}

impl SinkAdapter {
    pub fn new(writer: DynPointWriter, measurement: impl Into<String>) -> Self {
        Self {
            writer,
            measurement: measurement.into(),
        }
    }

    pub fn to_point(&self, result: &ClassificationResult) -> Point {
        Point::new(self.measurement.as_str())
            .tag(KEYWORDS_TAG, result.matched_tags.join(","))
            .field("eventId", result.event_id.as_str())
            .field("relevance", result.relevance)
            .field("author", result.author.as_str())
            .field("isVolatile", result.is_volatile)
            .field("rawJSON", result.raw_json.as_str())
            .at_ms(chrono::Utc::now().timestamp_millis())
    }

    /// Write one result. Results without matched tags are refused.
    pub async fn persist(&self, result: &ClassificationResult) -> Result<(), SinkError> {
        if !result.is_relevant() {
            return Err(SinkError::Unmatched(result.event_id.clone()));
        }
        self.writer.write_point(&self.to_point(result)).await
    }

    /// `persist`, with failures logged and swallowed. Returns whether the write landed.
    pub async fn persist_logged(&self, result: &ClassificationResult) -> bool {
        match self.persist(result).await {
            Ok(()) => {
                counter!("sink_writes_total").increment(1);
                debug!(
                    target: "sink",
                    sink = self.writer.name(),
                    event_id = %result.event_id,
                    relevance = result.relevance,
                    "point written"
                );
                true
            }
            Err(e) => {
                counter!("sink_errors_total").increment(1);
                warn!(
                    target: "sink",
                    sink = self.writer.name(),
                    event_id = %result.event_id,
                    error = %e,
                    "point write failed; event dropped from sink"
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(tags: &[&str]) -> ClassificationResult {
        ClassificationResult {
            event_id: "42".into(),
            raw_text: "loving the new api design talk".into(),
            raw_json: r#"{"id":"42"}"#.into(),
            author: "amy".into(),
            is_friendly: false,
            relevance: 0.0,
            is_volatile: false,
            matched_tags: tags.iter().map(|s| s.to_string()).collect(),
            sentiment: None,
        }
    }

    #[test]
    fn point_shape_matches_record_contract() {
        let sink = SinkAdapter::new(Arc::new(MemoryWriter::default()), "tweets");
        let p = sink.to_point(&result(&["api", "api design"]));
        assert_eq!(p.measurement, "tweets");
        assert_eq!(p.tags.get("keywords").map(String::as_str), Some("api,api design"));
        assert_eq!(p.fields.get("eventId"), Some(&FieldValue::Str("42".into())));
        assert_eq!(p.fields.get("relevance"), Some(&FieldValue::Float(0.0)));
        assert_eq!(p.fields.get("author"), Some(&FieldValue::Str("amy".into())));
        assert_eq!(p.fields.get("isVolatile"), Some(&FieldValue::Bool(false)));
        assert_eq!(
            p.fields.get("rawJSON"),
            Some(&FieldValue::Str(r#"{"id":"42"}"#.into()))
        );
    }

    #[test]
    fn line_protocol_escapes() {
        let p = Point::new("my events")
            .tag("keywords", "api,api design")
            .field("author", "a \"quoted\" name")
            .field("relevance", 0.5)
            .field("count", 3i64)
            .field("isVolatile", true)
            .at_ms(1_700_000_000_000);
        assert_eq!(
            p.to_line_protocol(),
            r#"my\ events,keywords=api\,api\ design author="a \"quoted\" name",count=3i,isVolatile=true,relevance=0.5 1700000000000"#
        );
    }

    #[test]
    fn float_fields_keep_decimal_point() {
        let p = Point::new("m").field("relevance", 0.0);
        assert_eq!(p.to_line_protocol(), "m relevance=0.0");
    }

    #[tokio::test]
    async fn unmatched_results_are_refused() {
        let writer = Arc::new(MemoryWriter::default());
        let sink = SinkAdapter::new(writer.clone(), DEFAULT_MEASUREMENT);
        assert!(matches!(
            sink.persist(&result(&[])).await,
            Err(SinkError::Unmatched(_))
        ));
        assert!(writer.points().is_empty());
    }

    #[tokio::test]
    async fn write_failures_are_swallowed() {
        let writer = Arc::new(MemoryWriter::failing());
        let sink = SinkAdapter::new(writer.clone(), DEFAULT_MEASUREMENT);
        assert!(!sink.persist_logged(&result(&["api"])).await);
        assert!(writer.points().is_empty());
    }
}
