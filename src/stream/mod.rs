// src/stream/mod.rs
//! Live event stream: source abstraction, boundary validation, session lifecycle.

pub mod event;
pub mod fixture;
pub mod http;
pub mod session;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;

pub use event::RawEvent;
pub use session::{RetryPolicy, SessionManager, SessionState};

/// What an open stream delivers. Payloads are unvalidated JSON text.
#[derive(Debug)]
pub enum StreamMessage {
    Data(String),
    Error(anyhow::Error),
}

/// An open connection. The stream has ended when the channel closes.
#[derive(Debug)]
pub struct StreamHandle {
    rx: mpsc::Receiver<StreamMessage>,
}

impl StreamHandle {
    pub fn new(rx: mpsc::Receiver<StreamMessage>) -> Self {
        Self { rx }
    }

    /// Handle plus the sender a source (or a test) feeds it from.
    pub fn channel(buffer: usize) -> (mpsc::Sender<StreamMessage>, Self) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (tx, Self::new(rx))
    }

    pub async fn next(&mut self) -> Option<StreamMessage> {
        self.rx.recv().await
    }
}

/// Connection factory for the live source. `track` is the comma-joined vocabulary filter.
#[async_trait]
pub trait StreamSource: Send + Sync {
    async fn connect(&self, track: &str) -> Result<StreamHandle>;
    fn name(&self) -> &'static str;
}
