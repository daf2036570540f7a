// src/stream/event.rs
//! Ingestion-boundary validation: raw JSON payloads become typed [`RawEvent`]s or are rejected.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::MalformedEvent;

static RE_WS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("whitespace regex"));

/// One inbound post. Immutable once received.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawEvent {
    pub id: String,
    pub author_handle: String,
    /// Normalized post text (entities decoded, whitespace collapsed).
    pub text: String,
    /// Original payload, persisted verbatim.
    pub raw: String,
}

impl RawEvent {
    pub fn from_json(raw: &str) -> Result<Self, MalformedEvent> {
        let value: Value =
            serde_json::from_str(raw).map_err(|e| MalformedEvent::InvalidJson(e.to_string()))?;
        Self::from_value(&value, raw.trim().to_string())
    }

    /// Accepts `id_str`/`id` (string or number), `text`, and `user.screen_name`/`author_handle`.
    pub fn from_value(value: &Value, raw: String) -> Result<Self, MalformedEvent> {
        let id = ["/id_str", "/id"]
            .iter()
            .find_map(|p| value.pointer(p).and_then(scalar_string))
            .ok_or(MalformedEvent::MissingField("id"))?;

        let text = value
            .pointer("/text")
            .and_then(Value::as_str)
            .map(normalize_text)
            .filter(|t| !t.is_empty())
            .ok_or(MalformedEvent::MissingField("text"))?;

        let author_handle = ["/user/screen_name", "/author_handle"]
            .iter()
            .find_map(|p| value.pointer(p).and_then(Value::as_str))
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or(MalformedEvent::MissingField("author_handle"))?;

        Ok(Self {
            id,
            author_handle,
            text,
            raw,
        })
    }
}

fn scalar_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Decode HTML entities (streams deliver `&amp;`) and collapse whitespace.
pub fn normalize_text(s: &str) -> String {
    let decoded = html_escape::decode_html_entities(s);
    RE_WS.replace_all(&decoded, " ").trim().to_string()
}
