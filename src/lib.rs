// src/lib.rs
// Public library surface for the binaries and integration tests.

pub mod compose;
pub mod config;
pub mod cursor;
pub mod dedup;
pub mod error;
pub mod ingest;
pub mod media;
pub mod metrics;
pub mod notify;
pub mod pipeline;

// ---- Re-exports for stable public API ----
pub use crate::config::RelayConfig;
pub use crate::error::{RelayError, Result};
pub use crate::notify::{DeliveryJob, DeliveryQueue, Destination};
pub use crate::pipeline::{BatchReport, Relay};
