// src/media.rs
use base64::{engine::general_purpose::STANDARD, Engine as _};
use metrics::{counter, histogram};
use once_cell::sync::OnceCell;
use regex::Regex;
use reqwest::Client;
use std::borrow::Cow;
use std::path::PathBuf;

use crate::compose::{ComposedMessage, Draft, DraftSegment, Segment};
use crate::config::MediaConfig;
use crate::error::{RelayError, Result};

pub const BASE64_PREFIX: &str = "base64://";

/// Downloads media references and inlines them as base64 image segments.
///
/// One GET per occurrence: no retry, no cache. Every request is bounded by the configured
/// timeout; expiry counts as a failure like any other.
pub struct MediaFetcher {
    client: Client,
    archive_dir: Option<PathBuf>,
}

impl MediaFetcher {
    pub fn new(cfg: &MediaConfig) -> Result<Self> {
        let mut builder = Client::builder().timeout(cfg.timeout());
        if let Some(proxy) = cfg.proxy.as_ref().filter(|p| p.is_enabled()) {
            let proxy = reqwest::Proxy::all(proxy.url()?)
                .map_err(|e| RelayError::Config(format!("invalid media proxy: {e}")))?;
            builder = builder.proxy(proxy);
        }
        let client = builder
            .build()
            .map_err(|e| RelayError::Config(format!("building media http client: {e}")))?;
        Ok(Self {
            client,
            archive_dir: cfg.archive_dir.clone(),
        })
    }

    pub async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let url = largest_rendition(url);
        let t0 = std::time::Instant::now();
        let fail = |reason: String| RelayError::MediaFetch {
            url: url.to_string(),
            reason,
        };

        let resp = self
            .client
            .get(url.as_ref())
            .send()
            .await
            .map_err(|e| fail(describe_transport_error(&e)))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(fail(format!("HTTP {status}")));
        }
        let body = resp
            .bytes()
            .await
            .map_err(|e| fail(describe_transport_error(&e)))?;

        histogram!("relay_media_fetch_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
        Ok(body.to_vec())
    }

    /// Fetch and encode as `base64://…`.
    pub async fn resolve(&self, url: &str) -> Result<String> {
        let bytes = self.fetch(url).await?;
        Ok(encode_inline(&bytes))
    }

    /// Resolve every media placeholder in `draft`. Failed media segments are dropped; a
    /// message left with nothing to send yields `None`. `name_hint` names archived copies and
    /// should be unique per draft.
    pub async fn resolve_draft(&self, draft: Draft, name_hint: &str) -> Option<ComposedMessage> {
        let mut segments = Vec::with_capacity(draft.segments.len());
        for (idx, seg) in draft.segments.into_iter().enumerate() {
            match seg {
                DraftSegment::Text(text) => segments.push(Segment::Text { text }),
                DraftSegment::Media { kind, url } => match self.fetch(&url).await {
                    Ok(bytes) => {
                        self.archive(name_hint, idx, &bytes).await;
                        segments.push(Segment::Image {
                            file: encode_inline(&bytes),
                        });
                    }
                    Err(e) => {
                        counter!("relay_media_fetch_failures_total").increment(1);
                        tracing::warn!(error = %e, ?kind, "dropping media segment");
                    }
                },
            }
        }
        if segments.is_empty() {
            None
        } else {
            Some(ComposedMessage { segments })
        }
    }

    async fn archive(&self, name_hint: &str, idx: usize, bytes: &[u8]) {
        let Some(dir) = &self.archive_dir else {
            return;
        };
        if let Err(e) = tokio::fs::create_dir_all(dir).await {
            tracing::warn!(dir = %dir.display(), error = %e, "media archive dir");
            return;
        }
        let stem = sanitize_filename(name_hint);
        let file = if idx == 0 {
            format!("{stem}.jpg")
        } else {
            format!("{stem}_{idx}.jpg")
        };
        let path = dir.join(file);
        if let Err(e) = tokio::fs::write(&path, bytes).await {
            tracing::warn!(path = %path.display(), error = %e, "media archive write");
        }
    }
}

pub fn encode_inline(bytes: &[u8]) -> String {
    format!("{BASE64_PREFIX}{}", STANDARD.encode(bytes))
}

/// Ask for the largest rendition: a trailing `name=<variant>` becomes `name=large`.
pub fn largest_rendition(url: &str) -> Cow<'_, str> {
    static RE_NAME: OnceCell<Regex> = OnceCell::new();
    let re = RE_NAME.get_or_init(|| Regex::new(r"name=[^&]+$").expect("static regex"));
    re.replace(url, "name=large")
}

/// Replace characters that are unsafe in file names with `_`.
pub fn sanitize_filename(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            ':' | ' ' | '/' | '\\' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            other => other,
        })
        .collect()
}

fn describe_transport_error(e: &reqwest::Error) -> String {
    if e.is_timeout() {
        format!("timed out: {e}")
    } else {
        e.to_string()
    }
}
