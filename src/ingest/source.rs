// src/ingest/source.rs
use anyhow::{Context, Result};
use async_trait::async_trait;
use metrics::counter;
use reqwest::{Client, StatusCode};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use crate::config::SourceConfig;
use crate::error::RelayError;
use crate::ingest::types::SnapshotSource;

/// Talks to an external rendering sidecar that keeps the feed page open and runs the
/// extraction script on demand.
pub struct HttpSnapshotSource {
    snapshot_url: String,
    reload_url: Option<String>,
    client: Client,
}

impl HttpSnapshotSource {
    pub fn new(cfg: &SourceConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs.max(1)))
            .build()
            .context("building snapshot http client")?;
        Ok(Self {
            snapshot_url: cfg.snapshot_url.clone(),
            reload_url: cfg.reload_url.clone(),
            client,
        })
    }
}

#[async_trait]
impl SnapshotSource for HttpSnapshotSource {
    async fn load(&self) -> Result<()> {
        let Some(url) = &self.reload_url else {
            tracing::debug!("no reload_url configured; treating reload as loaded");
            return Ok(());
        };
        self.client
            .post(url)
            .send()
            .await
            .context("reload request")?
            .error_for_status()
            .context("reload non-2xx")?;
        Ok(())
    }

    async fn snapshot(&self) -> Result<Option<String>> {
        let resp = match self.client.get(&self.snapshot_url).send().await {
            Ok(resp) => resp,
            Err(e) => {
                counter!("relay_source_errors_total").increment(1);
                return Err(e).context("snapshot http get()");
            }
        };
        if resp.status() == StatusCode::NO_CONTENT {
            return Ok(None);
        }
        let status = resp.status();
        if !status.is_success() {
            counter!("relay_source_errors_total").increment(1);
            return Err(RelayError::Source(format!("snapshot HTTP {status}")).into());
        }
        let body = resp.text().await.context("snapshot .text()")?;
        let trimmed = body.trim();
        if trimmed.is_empty() || trimmed == "null" {
            return Ok(None);
        }
        Ok(Some(body))
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

/// Replays a fixed sequence of snapshot results; once exhausted it reports "not ready".
/// Loads succeed unless queued failures say otherwise.
pub struct ScriptedSource {
    snapshots: Mutex<VecDeque<Option<String>>>,
    load_failures: Mutex<usize>,
    loads: Mutex<usize>,
    calls: Mutex<usize>,
}

impl ScriptedSource {
    pub fn new<I, S>(snapshots: I) -> Self
    where
        I: IntoIterator<Item = Option<S>>,
        S: Into<String>,
    {
        Self {
            snapshots: Mutex::new(snapshots.into_iter().map(|s| s.map(Into::into)).collect()),
            load_failures: Mutex::new(0),
            loads: Mutex::new(0),
            calls: Mutex::new(0),
        }
    }

    /// Fail the next `n` loads.
    pub fn failing_loads(self, n: usize) -> Self {
        if let Ok(mut f) = self.load_failures.lock() {
            *f = n;
        }
        self
    }

    pub fn snapshot_calls(&self) -> usize {
        self.calls.lock().map(|c| *c).unwrap_or_default()
    }

    pub fn load_calls(&self) -> usize {
        self.loads.lock().map(|c| *c).unwrap_or_default()
    }
}

#[async_trait]
impl SnapshotSource for ScriptedSource {
    async fn load(&self) -> Result<()> {
        if let Ok(mut loads) = self.loads.lock() {
            *loads += 1;
        }
        let mut failures = self
            .load_failures
            .lock()
            .map_err(|_| anyhow::anyhow!("scripted source poisoned"))?;
        if *failures > 0 {
            *failures -= 1;
            anyhow::bail!("scripted load failure");
        }
        Ok(())
    }

    async fn snapshot(&self) -> Result<Option<String>> {
        if let Ok(mut calls) = self.calls.lock() {
            *calls += 1;
        }
        let mut queue = self
            .snapshots
            .lock()
            .map_err(|_| anyhow::anyhow!("scripted source poisoned"))?;
        Ok(queue.pop_front().flatten())
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_source_replays_then_goes_quiet() {
        let src = ScriptedSource::new([None, Some("[]")]);
        assert_eq!(src.snapshot().await.unwrap(), None);
        assert_eq!(src.snapshot().await.unwrap().as_deref(), Some("[]"));
        assert_eq!(src.snapshot().await.unwrap(), None);
        assert_eq!(src.snapshot_calls(), 3);
    }

    #[tokio::test]
    async fn scripted_load_failures_are_consumed() {
        let src = ScriptedSource::new(Vec::<Option<String>>::new()).failing_loads(1);
        assert!(src.load().await.is_err());
        assert!(src.load().await.is_ok());
        assert_eq!(src.load_calls(), 2);
    }
}
