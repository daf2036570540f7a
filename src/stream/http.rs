// src/stream/http.rs
//! Newline-delimited JSON stream over a long-lived HTTP response.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use metrics::counter;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, warn};

use super::{StreamHandle, StreamMessage, StreamSource};

const CHANNEL_SIZE: usize = 4096;

pub struct HttpStreamSource {
    client: Client,
    url: String,
    bearer_token: String,
}

impl HttpStreamSource {
    pub fn new(url: impl Into<String>, bearer_token: impl Into<String>) -> Result<Self> {
        // No overall timeout: the response body is the stream.
        let client = Client::builder()
            .user_agent(concat!("topic-pulse/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .context("building stream http client")?;
        Ok(Self {
            client,
            url: url.into(),
            bearer_token: bearer_token.into(),
        })
    }
}

#[async_trait]
impl StreamSource for HttpStreamSource {
    async fn connect(&self, track: &str) -> Result<StreamHandle> {
        let mut resp = self
            .client
            .get(&self.url)
            .bearer_auth(&self.bearer_token)
            .query(&[("track", track)])
            .send()
            .await
            .context("stream connect")?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(anyhow!("stream handshake HTTP {status}: {}", body.trim()));
        }

        let (tx, handle) = StreamHandle::channel(CHANNEL_SIZE);
        tokio::spawn(async move {
            let mut lines = LineBuffer::default();
            loop {
                match resp.chunk().await {
                    Ok(Some(bytes)) => {
                        for line in lines.push(&bytes) {
                            if tx.send(StreamMessage::Data(line)).await.is_err() {
                                return;
                            }
                        }
                    }
                    Ok(None) => {
                        debug!(target: "stream", "http stream body ended");
                        return;
                    }
                    Err(e) => {
                        let _ = tx
                            .send(StreamMessage::Error(anyhow!(e).context("stream read")))
                            .await;
                        return;
                    }
                }
            }
        });

        Ok(handle)
    }

    fn name(&self) -> &'static str {
        "http-ndjson"
    }
}

/// Longest payload line accepted from the stream.
const MAX_LINE_BYTES: usize = 1 << 20;

/// Splits arbitrary byte chunks into complete, non-blank lines.
#[derive(Debug, Default)]
struct LineBuffer {
    pending: Vec<u8>,
    /// Skipping the rest of an oversized line up to its newline.
    discarding: bool,
}

impl LineBuffer {
    fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);
        let mut out = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            if std::mem::take(&mut self.discarding) {
                continue;
            }
            let text = String::from_utf8_lossy(&line);
            let text = text.trim();
            // keep-alive
            if !text.is_empty() {
                out.push(text.to_string());
            }
        }
        if self.pending.len() > MAX_LINE_BYTES {
            if !self.discarding {
                warn!(
                    target: "stream",
                    buffered = self.pending.len(),
                    limit = MAX_LINE_BYTES,
                    "stream line exceeds limit; dropping it"
                );
                counter!("events_malformed_total").increment(1);
            }
            self.pending.clear();
            self.discarding = true;
        }
        out
    }
}
