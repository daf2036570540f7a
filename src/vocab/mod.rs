// src/vocab/mod.rs
//! Keyword vocabulary and trusted-source set: built once at startup, read-only afterwards.

use anyhow::{anyhow, Context, Result};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use tracing::warn;

/// Upstream filter limits: at most 400 tracked terms, each at most 60 chars.
pub const MAX_TERMS: usize = 400;
pub const MAX_TERM_CHARS: usize = 60;

/// Ordered, deduplicated, lowercased keyword set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Vocabulary {
    terms: Vec<String>,
}

impl Vocabulary {
    /// Trim + lowercase, keep first occurrence, drop over-long terms, cap the size.
    pub fn from_terms<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seen = HashSet::new();
        let mut terms = Vec::new();
        let mut too_long = 0usize;
        let mut over_cap = 0usize;

        for it in items {
            let t = it.as_ref().trim().to_lowercase();
            if t.is_empty() {
                continue;
            }
            if t.chars().count() > MAX_TERM_CHARS {
                too_long += 1;
                continue;
            }
            if !seen.insert(t.clone()) {
                continue;
            }
            if terms.len() >= MAX_TERMS {
                over_cap += 1;
                continue;
            }
            terms.push(t);
        }

        if too_long > 0 {
            warn!(target: "vocab", dropped = too_long, max_chars = MAX_TERM_CHARS, "dropped over-long terms");
        }
        if over_cap > 0 {
            warn!(target: "vocab", dropped = over_cap, max_terms = MAX_TERMS, "vocabulary truncated");
        }

        Self { terms }
    }

    pub fn terms(&self) -> &[String] {
        &self.terms
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Comma-joined form handed to the stream source as its `track` filter.
    pub fn track_param(&self) -> String {
        self.terms.join(",")
    }
}

/// Lowercase author handles whose posts get the friendliness boost.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrustedSourceSet {
    handles: HashSet<String>,
}

impl TrustedSourceSet {
    pub fn from_handles<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let handles = items
            .into_iter()
            .map(|h| normalize_handle(h.as_ref()))
            .filter(|h| !h.is_empty())
            .collect();
        Self { handles }
    }

    pub fn contains(&self, author: &str) -> bool {
        self.handles.contains(&normalize_handle(author))
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

fn normalize_handle(s: &str) -> String {
    s.trim().trim_start_matches('@').to_lowercase()
}

/// Load vocabulary terms from a JSON array or a TOML `keywords = [...]` file.
pub fn load_vocabulary(path: &Path) -> Result<Vocabulary> {
    let items = load_list(path, "keywords")?;
    let vocab = Vocabulary::from_terms(items);
    if vocab.is_empty() {
        return Err(anyhow!("vocabulary at {} is empty", path.display()));
    }
    Ok(vocab)
}

/// Load trusted handles from a JSON array or a TOML `sources = [...]` file.
pub fn load_trusted(path: &Path) -> Result<TrustedSourceSet> {
    Ok(TrustedSourceSet::from_handles(load_list(path, "sources")?))
}

fn load_list(path: &Path, toml_key: &str) -> Result<Vec<String>> {
    let content =
        fs::read_to_string(path).with_context(|| format!("reading list from {}", path.display()))?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    parse_list(&content, ext.as_str(), toml_key)
        .with_context(|| format!("parsing list from {}", path.display()))
}

fn parse_list(s: &str, hint_ext: &str, toml_key: &str) -> Result<Vec<String>> {
    let try_toml = hint_ext == "toml" || s.contains(toml_key);
    if try_toml {
        if let Ok(v) = parse_toml(s, toml_key) {
            return Ok(v);
        }
    }
    if let Ok(v) = serde_json::from_str::<Vec<String>>(s) {
        return Ok(v);
    }
    if !try_toml {
        if let Ok(v) = parse_toml(s, toml_key) {
            return Ok(v);
        }
    }
    Err(anyhow!("unsupported list format (expected JSON array or TOML `{toml_key}`)"))
}

fn parse_toml(s: &str, key: &str) -> Result<Vec<String>> {
    let table: toml::Table = toml::from_str(s)?;
    let arr = table
        .get(key)
        .and_then(|v| v.as_array())
        .ok_or_else(|| anyhow!("missing `{key}` array"))?;
    Ok(arr
        .iter()
        .filter_map(|v| v.as_str().map(str::to_string))
        .collect())
}
