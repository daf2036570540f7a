// src/sentiment/http.rs
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

use super::{SentimentClient, SentimentRequest, SentimentResponse};

/// JSON-over-HTTP entity sentiment service.
pub struct HttpSentimentClient {
    http: Client,
    endpoint: String,
    api_key: String,
}

impl HttpSentimentClient {
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .user_agent(concat!("topic-pulse/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(4))
            .timeout(timeout)
            .build()
            .context("building sentiment http client")?;
        Ok(Self {
            http,
            endpoint: endpoint.into(),
            api_key: api_key.into(),
        })
    }
}

#[async_trait]
impl SentimentClient for HttpSentimentClient {
    async fn analyze_entities(&self, content: &str) -> Result<SentimentResponse> {
        let resp = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&SentimentRequest::english(content))
            .send()
            .await
            .context("sentiment request")?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(anyhow!("sentiment service HTTP {status}: {}", body.trim()));
        }
        resp.json::<SentimentResponse>()
            .await
            .context("decoding sentiment response")
    }

    fn name(&self) -> &'static str {
        "http"
    }
}
