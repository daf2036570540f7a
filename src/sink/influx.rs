// src/sink/influx.rs
//! InfluxDB 1.x HTTP writer. The database is created on first use.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::info;

use super::{Point, PointWriter};
use crate::error::SinkError;

#[derive(Debug, Clone)]
pub struct InfluxConfig {
    /// Base URL, e.g. `http://localhost:8086`.
    pub url: String,
    pub database: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub timeout: Duration,
}

impl Default for InfluxConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8086".to_string(),
            database: "topic_pulse".to_string(),
            username: None,
            password: None,
            timeout: Duration::from_secs(5),
        }
    }
}

pub struct InfluxWriter {
    http: Client,
    cfg: InfluxConfig,
    db_ready: OnceCell<()>,
}

impl InfluxWriter {
    pub fn new(cfg: InfluxConfig) -> Result<Self> {
        let http = Client::builder()
            .user_agent(concat!("topic-pulse/", env!("CARGO_PKG_VERSION")))
            .timeout(cfg.timeout)
            .build()
            .context("building influx http client")?;
        Ok(Self {
            http,
            cfg,
            db_ready: OnceCell::new(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.cfg.url.trim_end_matches('/'), path)
    }

    fn auth_params(&self) -> Vec<(&'static str, String)> {
        let mut out = Vec::new();
        if let (Some(u), Some(p)) = (&self.cfg.username, &self.cfg.password) {
            out.push(("u", u.clone()));
            out.push(("p", p.clone()));
        }
        out
    }

    /// `CREATE DATABASE` is idempotent on the server; we still only send it once.
    async fn ensure_database(&self) -> Result<(), SinkError> {
        self.db_ready
            .get_or_try_init(|| async {
                let q = format!("CREATE DATABASE \"{}\"", self.cfg.database.replace('"', "\\\""));
                let resp = self
                    .http
                    .post(self.endpoint("query"))
                    .query(&self.auth_params())
                    .form(&[("q", q.as_str())])
                    .send()
                    .await?;
                check_status(resp).await?;
                info!(target: "sink", database = %self.cfg.database, "influx database ready");
                Ok::<(), SinkError>(())
            })
            .await
            .map(|_| ())
    }
}

async fn check_status(resp: reqwest::Response) -> Result<(), SinkError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(());
    }
    let body = resp.text().await.unwrap_or_default();
    Err(SinkError::Status {
        status: status.as_u16(),
        body: body.trim().to_string(),
    })
}

#[async_trait]
impl PointWriter for InfluxWriter {
    async fn write_point(&self, point: &Point) -> Result<(), SinkError> {
        self.ensure_database().await?;

        let mut params = self.auth_params();
        params.push(("db", self.cfg.database.clone()));
        params.push(("precision", "ms".to_string()));

        let resp = self
            .http
            .post(self.endpoint("write"))
            .query(&params)
            .body(point.to_line_protocol())
            .send()
            .await?;
        check_status(resp).await
    }

    fn name(&self) -> &'static str {
        "influxdb"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_joins_without_double_slash() {
        let w = InfluxWriter::new(InfluxConfig {
            url: "http://influx:8086/".into(),
            ..InfluxConfig::default()
        })
        .unwrap();
        assert_eq!(w.endpoint("write"), "http://influx:8086/write");
    }

    #[test]
    fn auth_params_need_both_parts() {
        let w = InfluxWriter::new(InfluxConfig {
            username: Some("u".into()),
            ..InfluxConfig::default()
        })
        .unwrap();
        assert!(w.auth_params().is_empty());

        let w = InfluxWriter::new(InfluxConfig {
            username: Some("u".into()),
            password: Some("p".into()),
            ..InfluxConfig::default()
        })
        .unwrap();
        assert_eq!(w.auth_params().len(), 2);
    }
}
