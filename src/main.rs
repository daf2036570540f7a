//! topic-pulse worker entrypoint.
//! Loads config + credentials, builds the pipeline, then either replays an offline
//! batch or follows the live stream until shutdown or terminal failure.

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{error, info};

use topic_pulse::config::AppConfig;
use topic_pulse::metrics::{ensure_metrics_described, Metrics};
use topic_pulse::stream::fixture;
use topic_pulse::stream::http::HttpStreamSource;
use topic_pulse::{logging, Pipeline, PipelineContext, TaskQueue};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    logging::init_tracing();

    // Configuration errors are fatal before anything starts.
    let cfg = AppConfig::load_default()?;
    let creds = cfg.credentials()?;

    match cfg.metrics.listen.clone() {
        Some(listen) => {
            let metrics = Metrics::init()?;
            tokio::spawn(async move {
                if let Err(e) = metrics.serve(&listen).await {
                    error!(target: "metrics", error = ?e, "metrics endpoint stopped");
                }
            });
        }
        None => ensure_metrics_described(),
    }

    let ctx = PipelineContext::from_config(&cfg, &creds)?;
    let (queue, _worker) = TaskQueue::start();
    let pipeline = Pipeline::new(ctx, queue);

    if cfg.offline.enabled {
        let events = match &cfg.offline.fixture_path {
            Some(p) => fixture::load_batch(p)?,
            None => fixture::builtin_batch(),
        };
        pipeline.run_offline(events).await;
        return Ok(());
    }

    let token = creds
        .stream_token
        .clone()
        .context("stream token missing")?;
    let source = Arc::new(HttpStreamSource::new(cfg.stream.url.as_str(), token)?);
    let mut session = pipeline.live_session(source, cfg.stream.retry_policy());

    let stop = session.shutdown_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown requested");
            stop.notify_one();
        }
    });

    let outcome = session.run().await;
    // Tasks already queued still run to completion.
    pipeline.queue().wait_idle().await;
    outcome.context("stream session failed")?;
    info!("stopped");
    Ok(())
}
