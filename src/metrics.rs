// src/metrics.rs
use anyhow::{Context, Result};
use axum::{routing::get, Router};
use metrics::{describe_counter, describe_gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use tracing::info;

/// One-time metric descriptions, so every series shows up on /metrics from the start.
pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("events_received_total", "Payloads delivered by the stream.");
        describe_counter!(
            "events_malformed_total",
            "Payloads rejected at the ingestion boundary."
        );
        describe_counter!(
            "events_matched_total",
            "Events with at least one keyword match."
        );
        describe_counter!("events_unmatched_total", "Events without keyword matches.");
        describe_counter!("sink_writes_total", "Points written to the time-series store.");
        describe_counter!("sink_errors_total", "Failed point writes (event dropped).");
        describe_counter!(
            "sentiment_errors_total",
            "Sentiment lookups that failed or timed out."
        );
        describe_counter!(
            "stream_reconnects_total",
            "Stream connection failures leading to a retry decision."
        );
        describe_counter!("task_panics_total", "Queued tasks that panicked.");
        describe_gauge!("task_queue_depth", "Tasks queued or running.");
    });
}

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the Prometheus recorder for this process.
    pub fn init() -> Result<Self> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("prometheus: install recorder")?;
        ensure_metrics_described();
        Ok(Self { handle })
    }

    /// `/metrics` (Prometheus exposition) and `/health`.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new()
            .route("/health", get(|| async { "ok" }))
            .route(
                "/metrics",
                get(move || {
                    let h = handle.clone();
                    async move { h.render() }
                }),
            )
    }

    /// Serve the router until the process exits.
    pub async fn serve(&self, listen: &str) -> Result<()> {
        let listener = tokio::net::TcpListener::bind(listen)
            .await
            .with_context(|| format!("binding metrics listener on {listen}"))?;
        info!(target: "metrics", %listen, "metrics endpoint up");
        axum::serve(listener, self.router())
            .await
            .context("metrics server")
    }
}
