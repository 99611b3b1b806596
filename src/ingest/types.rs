// src/ingest/types.rs
use anyhow::Result;
use serde::{Deserialize, Serialize};

/// One feed entry as returned by the extraction script.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct RawItem {
    /// `YYYY-MM-DD HH:MM:SS`; the dedup and ordering key.
    #[serde(default)]
    pub time: Option<String>,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub content: Content,
}

/// Item body: older extraction scripts emit a flat string, newer ones a bag of lists.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum Content {
    Plain(String),
    Structured(StructuredContent),
}

impl Default for Content {
    fn default() -> Self {
        Content::Plain(String::new())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct StructuredContent {
    #[serde(default)]
    pub text: Vec<String>,
    #[serde(default)]
    pub image: Vec<String>,
    #[serde(default)]
    pub video: Vec<String>,
}

/// A `RawItem` that survived dedup; `time` is guaranteed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedItem {
    pub time: String,
    pub username: String,
    pub content: Content,
}

/// The rendering/scraping surface. Loading, authentication and the extraction script live
/// behind this boundary.
#[async_trait::async_trait]
pub trait SnapshotSource: Send + Sync {
    /// (Re)load the page. `Err` means the load failed.
    async fn load(&self) -> Result<()>;
    /// Raw extraction result, `None` while the page is not ready.
    async fn snapshot(&self) -> Result<Option<String>>;
    fn name(&self) -> &'static str;
}
