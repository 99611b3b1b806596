// src/dedup.rs
use std::collections::HashSet;

use crate::cursor::Cursor;
use crate::ingest::types::{FeedItem, RawItem};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DedupOutcome {
    /// New items, oldest first.
    pub items: Vec<FeedItem>,
    /// Cursor advanced past `items`.
    pub cursor: Cursor,
    /// Entries without a `time`.
    pub untimed: usize,
    /// Entries the cursor had already seen.
    pub seen: usize,
}

/// Filter a snapshot against `cursor`, order survivors by `time` ascending and advance the
/// cursor. Pure: `cursor` itself is left untouched.
///
/// The sort is stable, so items sharing a timestamp keep snapshot order. With a seen-set
/// cursor a timestamp accepted earlier in the same batch counts as seen.
pub fn process(raw: Vec<RawItem>, cursor: &Cursor) -> DedupOutcome {
    let track_batch = matches!(cursor, Cursor::SeenSet(_));
    let mut batch_times: HashSet<String> = HashSet::new();
    let mut untimed = 0usize;
    let mut seen = 0usize;
    let mut items = Vec::with_capacity(raw.len());

    for it in raw {
        let Some(time) = it.time.filter(|t| !t.trim().is_empty()) else {
            untimed += 1;
            continue;
        };
        if !cursor.is_new(&time) || (track_batch && !batch_times.insert(time.clone())) {
            seen += 1;
            continue;
        }
        items.push(FeedItem {
            time,
            username: it.username,
            content: it.content,
        });
    }

    items.sort_by(|a, b| a.time.cmp(&b.time));

    let mut next = cursor.clone();
    next.advance(items.iter().map(|it| it.time.as_str()));

    DedupOutcome {
        items,
        cursor: next,
        untimed,
        seen,
    }
}
