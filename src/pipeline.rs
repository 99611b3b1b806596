// src/pipeline.rs
use chrono::{NaiveDateTime, Utc};
use metrics::{counter, gauge};
use std::sync::Arc;

use crate::compose::compose;
use crate::cursor::{Cursor, CursorStore};
use crate::dedup;
use crate::error::Result;
use crate::ingest::{self, types::RawItem};
use crate::media::MediaFetcher;
use crate::notify::{DeliveryJob, DeliveryQueue, Destination};

pub const ITEM_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub received: usize,
    pub new_items: usize,
    pub untimed: usize,
    pub already_seen: usize,
    pub enqueued: usize,
    /// Drafts that lost every segment (all media failed).
    pub dropped_messages: usize,
}

/// Owns the cursor and turns snapshots into delivery jobs.
///
/// Single writer: the poller task owns the `Relay`, so cursor mutation and persistence
/// happen on one execution context.
pub struct Relay {
    store: CursorStore,
    cursor: Cursor,
    fetcher: MediaFetcher,
    queue: DeliveryQueue,
    destination: Arc<Destination>,
}

impl Relay {
    pub async fn open(
        store: CursorStore,
        fetcher: MediaFetcher,
        queue: DeliveryQueue,
        destination: Arc<Destination>,
    ) -> Self {
        ingest::ensure_metrics_described();
        let cursor = store.load().await;
        Self {
            store,
            cursor,
            fetcher,
            queue,
            destination,
        }
    }

    pub fn cursor(&self) -> &Cursor {
        &self.cursor
    }

    /// Parse and process a raw extraction result. `Ok(None)` means not ready.
    pub async fn handle_snapshot(&mut self, raw: &str) -> Result<Option<BatchReport>> {
        match ingest::parse_snapshot(raw)? {
            None => Ok(None),
            Some(items) => Ok(Some(self.process_batch(items).await)),
        }
    }

    /// Dedup, compose, resolve media, enqueue, then persist the advanced cursor.
    pub async fn process_batch(&mut self, raw: Vec<RawItem>) -> BatchReport {
        counter!("relay_snapshots_total").increment(1);
        let received = raw.len();
        let outcome = dedup::process(raw, &self.cursor);

        let mut report = BatchReport {
            received,
            new_items: outcome.items.len(),
            untimed: outcome.untimed,
            already_seen: outcome.seen,
            ..BatchReport::default()
        };
        counter!("relay_items_new_total").increment(report.new_items as u64);
        counter!("relay_items_skipped_total")
            .increment((report.untimed + report.already_seen) as u64);

        for item in &outcome.items {
            if NaiveDateTime::parse_from_str(&item.time, ITEM_TIME_FORMAT).is_err() {
                tracing::warn!(time = %item.time, "item time is not YYYY-MM-DD HH:MM:SS; ordering may be off");
            }
            tracing::info!(time = %item.time, username = %item.username, "new feed item");

            for (n, draft) in compose(item).into_iter().enumerate() {
                let name_hint = format!("{}_{}_{n}", item.time, item.username);
                let Some(message) = self.fetcher.resolve_draft(draft, &name_hint).await else {
                    report.dropped_messages += 1;
                    continue;
                };
                let job = DeliveryJob::new(Arc::clone(&self.destination), message);
                match self.queue.enqueue(job) {
                    Ok(()) => report.enqueued += 1,
                    Err(e) => tracing::error!(error = %e, "could not enqueue message"),
                }
            }
        }

        self.cursor = outcome.cursor;
        if let Err(e) = self.store.save(&self.cursor).await {
            tracing::warn!(path = %self.store.path().display(), error = %e, "cursor save failed");
        }
        gauge!("relay_last_batch_ts").set(Utc::now().timestamp() as f64);

        tracing::info!(
            received = report.received,
            new = report.new_items,
            enqueued = report.enqueued,
            watermark = self.cursor.watermark().unwrap_or("-"),
            "batch processed"
        );
        report
    }
}
