// src/error.rs
//! Typed errors for the library boundaries. Setup code uses `anyhow` on top of these.

use thiserror::Error;

/// Failure writing a classification result to the time-series store.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("sink transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("sink returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// Results without keyword matches are never persisted.
    #[error("refusing to persist event {0} without matched tags")]
    Unmatched(String),
}

/// Terminal failure of the stream session.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("stream connection failed after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },
}

/// Inbound payload rejected at the ingestion boundary.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MalformedEvent {
    #[error("payload is not valid JSON: {0}")]
    InvalidJson(String),

    #[error("payload missing required field `{0}`")]
    MissingField(&'static str),
}
