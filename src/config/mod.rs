// src/config/mod.rs
//! Relay configuration: one TOML (or JSON) file, deserialized with serde defaults for every
//! tunable so a minimal file only names the endpoint and the destination.

pub mod proxy;

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::cursor::DedupStrategy;
use crate::notify::{DeliveryJob, Destination};
pub use proxy::{ProxyConfig, ProxyKind};

pub const ENV_CONFIG_PATH: &str = "FEED_RELAY_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "config/feed-relay.toml";
pub const FALLBACK_JSON_CONFIG_PATH: &str = "config/feed-relay.json";

fn default_id_field() -> String {
    "group_id".to_string()
}
fn default_cursor_path() -> PathBuf {
    PathBuf::from("time.txt")
}
fn default_poll_secs() -> u64 {
    5
}
fn default_reload_secs() -> u64 {
    60
}
fn default_heartbeat_secs() -> u64 {
    600
}
fn default_heartbeat_text() -> String {
    "Keep alive test".to_string()
}
fn default_source_timeout_secs() -> u64 {
    30
}
fn default_media_timeout_secs() -> u64 {
    20
}
fn default_min_delay_ms() -> u64 {
    500
}
fn default_max_delay_ms() -> u64 {
    1500
}
fn default_delivery_timeout_secs() -> u64 {
    15
}

fn string_or_number<'de, D>(de: D) -> std::result::Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Text(String),
        Int(i64),
    }
    Ok(match Id::deserialize(de)? {
        Id::Text(s) => s,
        Id::Int(n) => n.to_string(),
    })
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Messaging endpoint that receives one JSON POST per message.
    pub push_url: String,
    /// Destination identifier (e.g. a group id) placed into every payload. Numeric ids are
    /// accepted and kept as text.
    #[serde(deserialize_with = "string_or_number")]
    pub destination_id: String,
    /// Payload key carrying `destination_id`.
    #[serde(default = "default_id_field")]
    pub destination_field: String,
    #[serde(default)]
    pub cursor: CursorConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    pub source: SourceConfig,
    #[serde(default)]
    pub media: MediaConfig,
    #[serde(default)]
    pub delivery: DeliveryConfig,
    /// Serve Prometheus metrics on this address when set.
    #[serde(default)]
    pub metrics_addr: Option<SocketAddr>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CursorConfig {
    #[serde(default = "default_cursor_path")]
    pub path: PathBuf,
    #[serde(default)]
    pub strategy: DedupStrategy,
}

impl Default for CursorConfig {
    fn default() -> Self {
        Self {
            path: default_cursor_path(),
            strategy: DedupStrategy::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    #[serde(default = "default_poll_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_reload_secs")]
    pub reload_interval_secs: u64,
    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_interval_secs: u64,
    /// Give up polling after this many "not ready" ticks; unbounded until the next reload
    /// when absent.
    #[serde(default)]
    pub max_poll_attempts: Option<u32>,
    #[serde(default = "default_heartbeat_text")]
    pub heartbeat_text: String,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_secs(),
            reload_interval_secs: default_reload_secs(),
            heartbeat_interval_secs: default_heartbeat_secs(),
            max_poll_attempts: None,
            heartbeat_text: default_heartbeat_text(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// GET returns the extraction result: a JSON array of items, or `null` when not ready.
    pub snapshot_url: String,
    /// POST asks the rendering surface to reload the page. Reload is a no-op when absent.
    #[serde(default)]
    pub reload_url: Option<String>,
    #[serde(default = "default_source_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaConfig {
    #[serde(default = "default_media_timeout_secs")]
    pub timeout_secs: u64,
    /// Keep a copy of every downloaded media body here.
    #[serde(default)]
    pub archive_dir: Option<PathBuf>,
    #[serde(default)]
    pub proxy: Option<ProxyConfig>,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_media_timeout_secs(),
            archive_dir: None,
            proxy: None,
        }
    }
}

impl MediaConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryConfig {
    #[serde(default = "default_min_delay_ms")]
    pub min_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_delivery_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            min_delay_ms: default_min_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            timeout_secs: default_delivery_timeout_secs(),
        }
    }
}

impl RelayConfig {
    /// Load from an explicit path. `.json` files are parsed as JSON, anything else as TOML.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading relay config from {}", path.display()))?;
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let cfg = Self::parse(&content, ext.as_str())
            .with_context(|| format!("parsing relay config {}", path.display()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load using env var + fallbacks:
    /// 1) $FEED_RELAY_CONFIG
    /// 2) config/feed-relay.toml
    /// 3) config/feed-relay.json
    pub fn load_default() -> Result<Self> {
        if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                bail!("{ENV_CONFIG_PATH} points to non-existent path {}", pb.display());
            }
            return Self::load_from(&pb);
        }
        for candidate in [DEFAULT_CONFIG_PATH, FALLBACK_JSON_CONFIG_PATH] {
            let pb = PathBuf::from(candidate);
            if pb.exists() {
                return Self::load_from(&pb);
            }
        }
        Err(anyhow!(
            "no relay config found (set {ENV_CONFIG_PATH} or create {DEFAULT_CONFIG_PATH})"
        ))
    }

    fn parse(s: &str, hint_ext: &str) -> Result<Self> {
        if hint_ext == "json" {
            return Ok(serde_json::from_str(s)?);
        }
        Ok(toml::from_str(s)?)
    }

    /// Destination shared by every job built from this config.
    pub fn destination(&self) -> Arc<Destination> {
        Arc::new(Destination::new(
            self.push_url.clone(),
            self.destination_id.clone(),
            self.destination_field.clone(),
        ))
    }

    pub fn heartbeat_job(&self) -> DeliveryJob {
        DeliveryJob::heartbeat(self.destination(), &self.schedule.heartbeat_text)
    }

    pub fn validate(&self) -> Result<()> {
        if self.push_url.trim().is_empty() {
            bail!("push_url must not be empty");
        }
        if self.destination_id.trim().is_empty() {
            bail!("destination_id must not be empty");
        }
        if self.destination_field.trim().is_empty() {
            bail!("destination_field must not be empty");
        }
        if self.source.snapshot_url.trim().is_empty() {
            bail!("source.snapshot_url must not be empty");
        }
        let s = &self.schedule;
        if s.poll_interval_secs == 0 || s.reload_interval_secs == 0 || s.heartbeat_interval_secs == 0
        {
            bail!("schedule intervals must be greater than zero");
        }
        if self.delivery.min_delay_ms > self.delivery.max_delay_ms {
            bail!(
                "delivery.min_delay_ms ({}) exceeds delivery.max_delay_ms ({})",
                self.delivery.min_delay_ms,
                self.delivery.max_delay_ms
            );
        }
        if self.media.timeout_secs == 0 || self.delivery.timeout_secs == 0 {
            bail!("request timeouts must be greater than zero");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
push_url = "http://127.0.0.1:3000/send_group_msg"
destination_id = "123456"

[source]
snapshot_url = "http://127.0.0.1:9000/snapshot"
"#;

    #[test]
    fn minimal_toml_fills_defaults() {
        let cfg = RelayConfig::parse(MINIMAL, "toml").unwrap();
        cfg.validate().unwrap();
        assert_eq!(cfg.destination_field, "group_id");
        assert_eq!(cfg.schedule.poll_interval_secs, 5);
        assert_eq!(cfg.schedule.reload_interval_secs, 60);
        assert_eq!(cfg.schedule.heartbeat_interval_secs, 600);
        assert_eq!(cfg.delivery.min_delay_ms, 500);
        assert_eq!(cfg.delivery.max_delay_ms, 1500);
        assert_eq!(cfg.cursor.strategy, DedupStrategy::Watermark);
        assert_eq!(cfg.cursor.path, PathBuf::from("time.txt"));
        assert!(cfg.metrics_addr.is_none());
    }

    #[test]
    fn numeric_destination_id_in_json() {
        let json = r#"{
            "push_url": "http://127.0.0.1:3000/send_group_msg",
            "destination_id": 987654321,
            "source": {"snapshot_url": "http://127.0.0.1:9000/snapshot"},
            "cursor": {"strategy": "seen_set"}
        }"#;
        let cfg = RelayConfig::parse(json, "json").unwrap();
        assert_eq!(cfg.destination_id, "987654321");
        assert_eq!(cfg.cursor.strategy, DedupStrategy::SeenSet);
    }

    #[test]
    fn inverted_jitter_bounds_are_rejected() {
        let mut cfg = RelayConfig::parse(MINIMAL, "toml").unwrap();
        cfg.delivery.min_delay_ms = 2000;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn zero_interval_is_rejected() {
        let mut cfg = RelayConfig::parse(MINIMAL, "toml").unwrap();
        cfg.schedule.poll_interval_secs = 0;
        assert!(cfg.validate().is_err());
    }
}
