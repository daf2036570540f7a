// src/pipeline.rs
//! Wiring: immutable context + task queue + per-event processing.
//!
//! Every inbound event becomes a queued classification task (plus an optional
//! cache task). Matched events are scored and written from inside the queue. When
//! a sentiment service is configured, the lookup runs off-queue and a continuation
//! task, enqueued right away, waits for it, re-scores and writes. Continuations are
//! enqueued in event order, so sink writes keep event order too.

use anyhow::{Context, Result};
use metrics::counter;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::cache::EventCache;
use crate::classify::{classify, ClassificationResult, KeywordMatcher};
use crate::config::{AppConfig, Credentials};
use crate::logging::anon_hash;
use crate::profanity::{ProfanityFilter, WordListFilter};
use crate::queue::TaskQueue;
use crate::sentiment::{HttpSentimentClient, SentimentAdapter};
use crate::sink::{InfluxConfig, InfluxWriter, MemoryWriter, PointWriter, SinkAdapter};
use crate::stream::{RawEvent, RetryPolicy, SessionManager, StreamSource};
use crate::vocab::{self, TrustedSourceSet, Vocabulary};

/// Everything a task reads. Built once at startup and never mutated.
pub struct PipelineContext {
    pub vocabulary: Vocabulary,
    pub trusted: TrustedSourceSet,
    pub matcher: KeywordMatcher,
    pub profanity: Arc<dyn ProfanityFilter>,
    pub sentiment: Option<SentimentAdapter>,
    pub sink: SinkAdapter,
    pub cache: Option<EventCache>,
}

impl PipelineContext {
    pub fn new(vocabulary: Vocabulary, trusted: TrustedSourceSet, sink: SinkAdapter) -> Result<Self> {
        let matcher = KeywordMatcher::new(&vocabulary).context("compiling keyword matcher")?;
        Ok(Self {
            vocabulary,
            trusted,
            matcher,
            profanity: Arc::new(WordListFilter::default_seed()),
            sentiment: None,
            sink,
            cache: None,
        })
    }

    pub fn with_sentiment(mut self, adapter: SentimentAdapter) -> Self {
        self.sentiment = Some(adapter);
        self
    }

    pub fn with_profanity(mut self, filter: Arc<dyn ProfanityFilter>) -> Self {
        self.profanity = filter;
        self
    }

    pub fn with_cache(mut self, cache: EventCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Load vocabulary + trust set and build the collaborators named in the config.
    pub fn from_config(cfg: &AppConfig, creds: &Credentials) -> Result<Self> {
        let vocabulary = vocab::load_vocabulary(&cfg.vocabulary.path)?;
        let trusted = match &cfg.vocabulary.trusted_path {
            Some(p) => vocab::load_trusted(p)?,
            None => TrustedSourceSet::default(),
        };

        let writer: Arc<dyn PointWriter> = if cfg.sink.in_memory {
            Arc::new(MemoryWriter::default())
        } else {
            Arc::new(InfluxWriter::new(InfluxConfig {
                url: cfg.sink.url.clone(),
                database: cfg.sink.database.clone(),
                username: creds.influx_username.clone(),
                password: creds.influx_password.clone(),
                ..InfluxConfig::default()
            })?)
        };
        let sink = SinkAdapter::new(writer, cfg.sink.measurement.as_str());

        let mut ctx = Self::new(vocabulary, trusted, sink)?;

        if cfg.sentiment.enabled {
            let key = creds
                .sentiment_key
                .clone()
                .context("sentiment enabled without an API key")?;
            let timeout = Duration::from_secs(cfg.sentiment.timeout_secs);
            let client = HttpSentimentClient::new(cfg.sentiment.endpoint.as_str(), key, timeout)?;
            ctx = ctx.with_sentiment(SentimentAdapter::new(Arc::new(client), timeout));
        }
        if let Some(p) = &cfg.stream.cache_path {
            ctx = ctx.with_cache(EventCache::new(p.clone()));
        }

        info!(
            target: "pipeline",
            terms = ctx.vocabulary.len(),
            trusted = ctx.trusted.len(),
            sentiment = ctx.sentiment.as_ref().map(|s| s.provider_name()).unwrap_or("off"),
            caching = ctx.cache.is_some(),
            "pipeline context ready"
        );
        Ok(ctx)
    }

    pub fn classify(&self, event: &RawEvent) -> Option<ClassificationResult> {
        classify(event, &self.matcher, &self.trusted, self.profanity.as_ref())
    }
}

#[derive(Clone)]
pub struct Pipeline {
    ctx: Arc<PipelineContext>,
    queue: TaskQueue,
}

impl Pipeline {
    pub fn new(ctx: PipelineContext, queue: TaskQueue) -> Self {
        Self {
            ctx: Arc::new(ctx),
            queue,
        }
    }

    pub fn context(&self) -> &PipelineContext {
        &self.ctx
    }

    pub fn queue(&self) -> &TaskQueue {
        &self.queue
    }

    /// Stream data handler: classification task, then the cache task if caching is on.
    pub fn handle_stream_event(&self, event: RawEvent) {
        let event = Arc::new(event);
        self.enqueue_shared(Arc::clone(&event));

        if let Some(cache) = self.ctx.cache.clone() {
            self.queue.push_fn(move || async move {
                if let Err(e) = cache.append(&event).await {
                    warn!(target: "cache", event_id = %event.id, error = ?e, "event cache write failed");
                }
            });
        }
    }

    /// Enqueue only the classification task for one event.
    pub fn enqueue_classification(&self, event: RawEvent) {
        self.enqueue_shared(Arc::new(event));
    }

    fn enqueue_shared(&self, event: Arc<RawEvent>) {
        let this = self.clone();
        self.queue
            .push_fn(move || async move { this.process_event(&event).await });
    }

    /// Body of a classification task.
    ///
    /// With sentiment on, the continuation waits inside the queue, so later tasks
    /// are held back for at most the sentiment timeout.
    async fn process_event(&self, event: &RawEvent) {
        let Some(mut result) = self.ctx.classify(event) else {
            counter!("events_unmatched_total").increment(1);
            debug!(target: "pipeline", event_id = %event.id, "no keyword match");
            return;
        };
        counter!("events_matched_total").increment(1);
        info!(
            target: "pipeline",
            event_id = %result.event_id,
            author = %result.author,
            text_id = %anon_hash(&result.raw_text),
            tags = ?result.matched_tags,
            friendly = result.is_friendly,
            volatile = result.is_volatile,
            relevance = result.relevance,
            "event matched"
        );

        let Some(adapter) = self.ctx.sentiment.clone() else {
            self.ctx.sink.persist_logged(&result).await;
            return;
        };

        let text = result.raw_text.clone();
        let terms = result.matched_tags.clone();
        let lookup = tokio::spawn(async move { adapter.lookup(&text, &terms).await });

        let ctx = Arc::clone(&self.ctx);
        self.queue.push_fn(move || async move {
            match lookup.await {
                Ok(Some(summary)) => {
                    result.apply_sentiment(summary);
                    debug!(
                        target: "pipeline",
                        event_id = %result.event_id,
                        relevance = result.relevance,
                        "relevance refined by sentiment"
                    );
                }
                // Already logged by the adapter; friendliness score stands.
                Ok(None) => {}
                Err(e) => {
                    warn!(target: "pipeline", event_id = %result.event_id, error = %e, "sentiment task aborted");
                }
            }
            ctx.sink.persist_logged(&result).await;
        });
    }

    /// Offline mode: enqueue a fixed batch and wait for every resulting task.
    pub async fn run_offline(&self, events: Vec<RawEvent>) {
        let n = events.len();
        info!(target: "pipeline", events = n, "offline batch start");
        for ev in events {
            self.enqueue_classification(ev);
        }
        self.queue.wait_idle().await;
        info!(target: "pipeline", events = n, "offline batch done");
    }

    /// Session whose data handler feeds this pipeline. Tracks the vocabulary.
    pub fn live_session(&self, source: Arc<dyn StreamSource>, policy: RetryPolicy) -> SessionManager {
        let this = self.clone();
        SessionManager::new(
            source,
            self.ctx.vocabulary.track_param(),
            policy,
            Box::new(move |ev| this.handle_stream_event(ev)),
        )
    }
}
