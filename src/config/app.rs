// src/config/app.rs
use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{env, fs};

use crate::sink::DEFAULT_MEASUREMENT;
use crate::stream::session::{RetryPolicy, DEFAULT_MAX_ATTEMPTS};

pub const DEFAULT_CONFIG_PATH: &str = "config/topic_pulse.toml";
pub const ENV_CONFIG_PATH: &str = "TOPIC_PULSE_CONFIG";

pub const ENV_STREAM_TOKEN: &str = "STREAM_BEARER_TOKEN";
pub const ENV_SENTIMENT_KEY: &str = "SENTIMENT_API_KEY";
pub const ENV_INFLUX_USERNAME: &str = "INFLUX_USERNAME";
pub const ENV_INFLUX_PASSWORD: &str = "INFLUX_PASSWORD";

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}
fn default_backoff_base_ms() -> u64 {
    500
}
fn default_backoff_max_ms() -> u64 {
    30_000
}
fn default_sentiment_timeout() -> u64 {
    10
}
fn default_sink_url() -> String {
    "http://localhost:8086".to_string()
}
fn default_database() -> String {
    "topic_pulse".to_string()
}
fn default_measurement() -> String {
    DEFAULT_MEASUREMENT.to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub stream: StreamSection,
    pub vocabulary: VocabularySection,
    #[serde(default)]
    pub sentiment: SentimentSection,
    #[serde(default)]
    pub sink: SinkSection,
    #[serde(default)]
    pub offline: OfflineSection,
    #[serde(default)]
    pub metrics: MetricsSection,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StreamSection {
    #[serde(default)]
    pub url: String,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,
    /// JSONL file receiving every inbound event; unset disables caching.
    #[serde(default)]
    pub cache_path: Option<PathBuf>,
}

impl Default for StreamSection {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_attempts: default_max_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: default_backoff_max_ms(),
            cache_path: None,
        }
    }
}

impl StreamSection {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.backoff_base_ms),
            max_delay: Duration::from_millis(self.backoff_max_ms),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct VocabularySection {
    pub path: PathBuf,
    #[serde(default)]
    pub trusted_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SentimentSection {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub endpoint: String,
    #[serde(default = "default_sentiment_timeout")]
    pub timeout_secs: u64,
}

impl Default for SentimentSection {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: String::new(),
            timeout_secs: default_sentiment_timeout(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SinkSection {
    #[serde(default = "default_sink_url")]
    pub url: String,
    #[serde(default = "default_database")]
    pub database: String,
    #[serde(default = "default_measurement")]
    pub measurement: String,
    /// Keep points in memory instead of writing to InfluxDB (dry runs).
    #[serde(default)]
    pub in_memory: bool,
}

impl Default for SinkSection {
    fn default() -> Self {
        Self {
            url: default_sink_url(),
            database: default_database(),
            measurement: default_measurement(),
            in_memory: false,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OfflineSection {
    #[serde(default)]
    pub enabled: bool,
    /// JSONL or JSON array of events; unset uses the built-in sample batch.
    #[serde(default)]
    pub fixture_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MetricsSection {
    /// `host:port` for the Prometheus endpoint; unset disables it.
    #[serde(default)]
    pub listen: Option<String>,
}

/// Secrets resolved from the environment, never from the config file.
#[derive(Clone, Default)]
pub struct Credentials {
    pub stream_token: Option<String>,
    pub sentiment_key: Option<String>,
    pub influx_username: Option<String>,
    pub influx_password: Option<String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fn shown(v: &Option<String>) -> &'static str {
            if v.is_some() {
                "<set>"
            } else {
                "<unset>"
            }
        }
        f.debug_struct("Credentials")
            .field("stream_token", &shown(&self.stream_token))
            .field("sentiment_key", &shown(&self.sentiment_key))
            .field("influx_username", &shown(&self.influx_username))
            .field("influx_password", &shown(&self.influx_password))
            .finish()
    }
}

impl AppConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::from_toml_str(&data).with_context(|| format!("parsing config {}", path.display()))
    }

    /// `$TOPIC_PULSE_CONFIG`, else `config/topic_pulse.toml`.
    pub fn load_default() -> Result<Self> {
        let path = env::var(ENV_CONFIG_PATH)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));
        Self::load_from_file(path)
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        let mut cfg: AppConfig = toml::from_str(s)?;
        cfg.sanitize();
        Ok(cfg)
    }

    fn sanitize(&mut self) {
        if self.stream.max_attempts == 0 {
            self.stream.max_attempts = default_max_attempts();
        }
        if self.stream.backoff_max_ms < self.stream.backoff_base_ms {
            std::mem::swap(&mut self.stream.backoff_base_ms, &mut self.stream.backoff_max_ms);
        }
        if self.sentiment.timeout_secs == 0 {
            self.sentiment.timeout_secs = default_sentiment_timeout();
        }
        if self.sink.measurement.trim().is_empty() {
            self.sink.measurement = default_measurement();
        }
    }

    /// Read secrets from the environment. Missing required ones are fatal.
    pub fn credentials(&self) -> Result<Credentials> {
        let creds = Credentials {
            stream_token: env_nonempty(ENV_STREAM_TOKEN),
            sentiment_key: env_nonempty(ENV_SENTIMENT_KEY),
            influx_username: env_nonempty(ENV_INFLUX_USERNAME),
            influx_password: env_nonempty(ENV_INFLUX_PASSWORD),
        };
        self.check_credentials(&creds)?;
        Ok(creds)
    }

    pub fn check_credentials(&self, creds: &Credentials) -> Result<()> {
        if !self.offline.enabled {
            if self.stream.url.trim().is_empty() {
                return Err(anyhow!("[stream].url is required in live mode"));
            }
            if creds.stream_token.is_none() {
                return Err(anyhow!("Missing {ENV_STREAM_TOKEN} env var"));
            }
        }
        if self.sink.in_memory && !self.offline.enabled {
            return Err(anyhow!("[sink].in_memory is only allowed with [offline].enabled"));
        }
        if self.sentiment.enabled {
            if self.sentiment.endpoint.trim().is_empty() {
                return Err(anyhow!("[sentiment].endpoint is required when sentiment is enabled"));
            }
            if creds.sentiment_key.is_none() {
                return Err(anyhow!("Missing {ENV_SENTIMENT_KEY} env var"));
            }
        }
        Ok(())
    }
}

fn env_nonempty(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}
