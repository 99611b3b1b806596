// src/error.rs
//! Error taxonomy for the relay pipeline.
//!
//! "Not ready" is not an error: sources and the snapshot parser report it as `Ok(None)`.
//! Every variant here is caught at an operation boundary and degrades to skip-and-continue,
//! except `Config`, which only bootstrap code raises.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, RelayError>;

#[derive(Error, Debug)]
pub enum RelayError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("malformed snapshot: {0}")]
    MalformedSnapshot(String),

    #[error("media fetch failed for {url}: {reason}")]
    MediaFetch { url: String, reason: String },

    #[error("delivery failed: {0}")]
    Delivery(String),

    #[error("snapshot source error: {0}")]
    Source(String),

    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    #[error("JSON error: {source}")]
    Json {
        #[from]
        source: serde_json::Error,
    },
}

impl From<toml::de::Error> for RelayError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}
