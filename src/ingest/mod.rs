// src/ingest/mod.rs
pub mod scheduler;
pub mod source;
pub mod types;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram};
use once_cell::sync::OnceCell;
use serde_json::Value;

use crate::error::{RelayError, Result};
use crate::ingest::types::RawItem;

/// One-time metrics registration (so series show up on /metrics).
pub(crate) fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("relay_snapshots_total", "Snapshots that carried feed items.");
        describe_counter!(
            "relay_snapshot_not_ready_total",
            "Poll ticks where the page was not ready yet."
        );
        describe_counter!(
            "relay_snapshot_malformed_total",
            "Snapshots dropped because they were not a JSON array."
        );
        describe_counter!(
            "relay_source_errors_total",
            "Snapshot source transport errors."
        );
        describe_counter!("relay_items_new_total", "Feed items that passed dedup.");
        describe_counter!(
            "relay_items_skipped_total",
            "Snapshot entries dropped as unparseable, untimed or already seen."
        );
        describe_counter!(
            "relay_media_fetch_failures_total",
            "Media downloads that failed or timed out."
        );
        describe_histogram!("relay_media_fetch_ms", "Media download time in milliseconds.");
        describe_counter!("relay_delivery_success_total", "Messages accepted (2xx).");
        describe_counter!(
            "relay_delivery_failures_total",
            "Messages rejected or lost in transport."
        );
        describe_counter!("relay_heartbeats_total", "Heartbeat messages enqueued.");
        describe_gauge!(
            "relay_last_batch_ts",
            "Unix ts when the last batch was processed."
        );
    });
}

/// Parse an extraction result.
///
/// `Ok(None)` means "not ready": empty text, `null`, or an empty array. Anything that is
/// not a JSON array is a `MalformedSnapshot`. Individual entries that do not look like a
/// feed item are skipped so one odd card does not sink the batch.
pub fn parse_snapshot(raw: &str) -> Result<Option<Vec<RawItem>>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed == "null" {
        return Ok(None);
    }

    let value: Value = serde_json::from_str(trimmed)
        .map_err(|e| RelayError::MalformedSnapshot(format!("not JSON: {e}")))?;
    let entries = match value {
        Value::Array(entries) => entries,
        other => {
            return Err(RelayError::MalformedSnapshot(format!(
                "expected an array, got {}",
                json_kind(&other)
            )))
        }
    };
    if entries.is_empty() {
        return Ok(None);
    }

    let mut items = Vec::with_capacity(entries.len());
    for (idx, entry) in entries.into_iter().enumerate() {
        match serde_json::from_value::<RawItem>(entry) {
            Ok(item) => items.push(item),
            Err(e) => {
                tracing::warn!(index = idx, error = %e, "skipping unparseable snapshot entry");
                counter!("relay_items_skipped_total").increment(1);
            }
        }
    }
    Ok(Some(items))
}

fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
