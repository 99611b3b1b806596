// src/compose.rs
//! Turns one feed item into outbound messages.
//!
//! Every text block becomes its own message carrying the `time\nusername\n` header; every
//! image or video poster becomes a media-only draft that the media fetcher must resolve
//! before it can be delivered.

use serde::{Deserialize, Serialize};

use crate::ingest::types::{Content, FeedItem};

/// A deliverable message segment, serialized in the endpoint's `{type, data}` shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum Segment {
    Text { text: String },
    Image { file: String },
}

impl Segment {
    pub fn text(text: impl Into<String>) -> Self {
        Segment::Text { text: text.into() }
    }
}

/// Ordered segments ready for one delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ComposedMessage {
    pub segments: Vec<Segment>,
}

impl ComposedMessage {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            segments: vec![Segment::text(text)],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    /// A video's poster frame; sent as an image, the video itself is never downloaded.
    VideoPoster,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DraftSegment {
    Text(String),
    Media { kind: MediaKind, url: String },
}

/// A message whose media segments are still remote references.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Draft {
    pub segments: Vec<DraftSegment>,
}

impl Draft {
    fn text(text: String) -> Self {
        Self {
            segments: vec![DraftSegment::Text(text)],
        }
    }

    fn media(kind: MediaKind, url: String) -> Self {
        Self {
            segments: vec![DraftSegment::Media { kind, url }],
        }
    }
}

pub fn header(item: &FeedItem) -> String {
    format!("{}\n{}", item.time, item.username)
}

/// Compose drafts for one item, in field order: text, then video posters, then images.
/// Content with nothing usable still yields a header-only text message.
pub fn compose(item: &FeedItem) -> Vec<Draft> {
    let head = header(item);
    match &item.content {
        Content::Plain(body) if body.trim().is_empty() => vec![Draft::text(head)],
        Content::Plain(body) => vec![Draft::text(format!("{head}\n{body}"))],
        Content::Structured(s) => {
            let mut drafts = Vec::with_capacity(s.text.len() + s.video.len() + s.image.len());
            drafts.extend(s.text.iter().map(|t| Draft::text(format!("{head}\n{t}"))));
            drafts.extend(
                s.video
                    .iter()
                    .filter(|u| !u.trim().is_empty())
                    .map(|u| Draft::media(MediaKind::VideoPoster, u.clone())),
            );
            drafts.extend(
                s.image
                    .iter()
                    .filter(|u| !u.trim().is_empty())
                    .map(|u| Draft::media(MediaKind::Image, u.clone())),
            );
            if drafts.is_empty() {
                drafts.push(Draft::text(head));
            }
            drafts
        }
    }
}
