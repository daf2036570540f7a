// src/stream/fixture.rs
//! Offline event batches: a fixed built-in set or a JSONL / JSON-array file.

use anyhow::{Context, Result};
use metrics::counter;
use serde_json::Value;
use std::path::Path;
use tracing::warn;

use super::RawEvent;

const BUILTIN: &[&str] = &[
    r#"{"id_str":"1001","text":"loving the new API design talk","user":{"screen_name":"devrel_amy"}}"#,
    r#"{"id_str":"1002","text":"Rust 2024 edition migration notes are up","user":{"screen_name":"rustlang"}}"#,
    r#"{"id_str":"1003","text":"lunch was great today","user":{"screen_name":"random_person"}}"#,
];

/// Built-in sample batch for smoke runs without any files.
pub fn builtin_batch() -> Vec<RawEvent> {
    parse_lines(BUILTIN.iter().copied())
}

/// Load a batch from disk. A leading `[` means a JSON array, otherwise one event per line.
pub fn load_batch(path: &Path) -> Result<Vec<RawEvent>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading event fixture {}", path.display()))?;

    if content.trim_start().starts_with('[') {
        let items: Vec<Value> = serde_json::from_str(&content)
            .with_context(|| format!("parsing event array {}", path.display()))?;
        let mut out = Vec::with_capacity(items.len());
        for v in items {
            match RawEvent::from_value(&v, v.to_string()) {
                Ok(ev) => out.push(ev),
                Err(e) => quarantine(&e),
            }
        }
        return Ok(out);
    }

    Ok(parse_lines(content.lines()))
}

fn parse_lines<'a>(lines: impl Iterator<Item = &'a str>) -> Vec<RawEvent> {
    lines
        .filter(|l| !l.trim().is_empty())
        .filter_map(|l| match RawEvent::from_json(l) {
            Ok(ev) => Some(ev),
            Err(e) => {
                quarantine(&e);
                None
            }
        })
        .collect()
}

fn quarantine(e: &crate::error::MalformedEvent) {
    warn!(target: "stream", error = %e, "dropping malformed fixture event");
    counter!("events_malformed_total").increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn builtin_batch_is_valid() {
        assert_eq!(builtin_batch().len(), BUILTIN.len());
    }

    #[test]
    fn loads_jsonl_and_skips_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("events.jsonl");
        fs::write(
            &p,
            "{\"id\":\"1\",\"text\":\"a\",\"author_handle\":\"x\"}\n\nnot json\n{\"id\":\"2\",\"text\":\"b\",\"author_handle\":\"y\"}\n",
        )
        .unwrap();
        let evs = load_batch(&p).unwrap();
        assert_eq!(evs.iter().map(|e| e.id.as_str()).collect::<Vec<_>>(), vec!["1", "2"]);
    }

    #[test]
    fn loads_json_array() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("events.json");
        fs::write(
            &p,
            r#"[{"id":"1","text":"a","author_handle":"x"},{"id":"2"}]"#,
        )
        .unwrap();
        let evs = load_batch(&p).unwrap();
        assert_eq!(evs.len(), 1);
        assert_eq!(evs[0].author_handle, "x");
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(load_batch(Path::new("__no_such_fixture__.jsonl")).is_err());
    }
}
