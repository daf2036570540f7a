// src/cache.rs
//! Appends raw inbound events to a JSONL file; the file doubles as an offline fixture.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;

use crate::stream::RawEvent;

#[derive(Debug, Clone)]
pub struct EventCache {
    path: PathBuf,
}

impl EventCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn append(&self, event: &RawEvent) -> Result<()> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .await
                .with_context(|| format!("creating cache dir {}", dir.display()))?;
        }
        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .with_context(|| format!("opening event cache {}", self.path.display()))?;
        let mut line = event.raw.replace('\n', " ");
        line.push('\n');
        f.write_all(line.as_bytes())
            .await
            .context("writing event cache line")?;
        f.flush().await.context("flushing event cache")?;
        Ok(())
    }
}
