// src/lib.rs
//! Keyword relevance scoring for a live social-media stream.
//!
//! Events arrive through a retrying [`stream::SessionManager`], are classified
//! against a keyword vocabulary, scored (trust boost, optional entity sentiment)
//! and written to a time-series store. All per-event work runs on a single
//! [`queue::TaskQueue`] worker.

pub mod cache;
pub mod classify;
pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod pipeline;
pub mod profanity;
pub mod queue;
pub mod sentiment;
pub mod sink;
pub mod stream;
pub mod vocab;

// ---- Re-exports for stable public API ----
pub use crate::classify::{ClassificationResult, KeywordMatcher};
pub use crate::config::AppConfig;
pub use crate::error::{MalformedEvent, SessionError, SinkError};
pub use crate::pipeline::{Pipeline, PipelineContext};
pub use crate::queue::TaskQueue;
pub use crate::stream::{RawEvent, RetryPolicy, SessionManager, SessionState};
pub use crate::vocab::{TrustedSourceSet, Vocabulary};
