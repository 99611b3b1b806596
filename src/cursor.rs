// src/cursor.rs
//! Persisted dedup boundary: a single watermark timestamp or a bounded seen-set.
//!
//! Both forms live in one plain-text file, one timestamp per line, newest first. The file
//! is rewritten whole on every save so it never grows past the seen-set capacity.

use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::error::Result;

pub const SEEN_SET_CAPACITY: usize = 50;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DedupStrategy {
    /// New iff `time > last_time`.
    #[default]
    Watermark,
    /// New iff `time` is not among the last `SEEN_SET_CAPACITY` seen values.
    SeenSet,
}

/// FIFO of recently seen timestamps (newest at the front) plus a membership index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeenSet {
    order: VecDeque<String>,
    members: HashSet<String>,
    capacity: usize,
}

impl Default for SeenSet {
    fn default() -> Self {
        Self::with_capacity(SEEN_SET_CAPACITY)
    }
}

impl SeenSet {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            order: VecDeque::with_capacity(capacity),
            members: HashSet::with_capacity(capacity),
            capacity,
        }
    }

    pub fn contains(&self, time: &str) -> bool {
        self.members.contains(time)
    }

    /// Record `time` as the newest entry, evicting from the old end past capacity.
    pub fn push_newest(&mut self, time: String) {
        if !self.members.insert(time.clone()) {
            return;
        }
        self.order.push_front(time);
        while self.order.len() > self.capacity {
            if let Some(evicted) = self.order.pop_back() {
                self.members.remove(&evicted);
            }
        }
    }

    /// Rebuild from lines in file order (newest first).
    fn from_newest_first<I: IntoIterator<Item = String>>(lines: I, capacity: usize) -> Self {
        let mut set = Self::with_capacity(capacity);
        for line in lines {
            if set.order.len() >= set.capacity {
                break;
            }
            if set.members.insert(line.clone()) {
                set.order.push_back(line);
            }
        }
        set
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn iter_newest_first(&self) -> impl Iterator<Item = &String> {
        self.order.iter()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cursor {
    Watermark(Option<String>),
    SeenSet(SeenSet),
}

impl Cursor {
    pub fn empty(strategy: DedupStrategy) -> Self {
        match strategy {
            DedupStrategy::Watermark => Cursor::Watermark(None),
            DedupStrategy::SeenSet => Cursor::SeenSet(SeenSet::default()),
        }
    }

    pub fn strategy(&self) -> DedupStrategy {
        match self {
            Cursor::Watermark(_) => DedupStrategy::Watermark,
            Cursor::SeenSet(_) => DedupStrategy::SeenSet,
        }
    }

    pub fn is_new(&self, time: &str) -> bool {
        match self {
            Cursor::Watermark(None) => true,
            Cursor::Watermark(Some(last)) => time > last.as_str(),
            Cursor::SeenSet(set) => !set.contains(time),
        }
    }

    /// Advance past `times`, which must already be in ascending order.
    pub fn advance<'a, I: IntoIterator<Item = &'a str>>(&mut self, times: I) {
        match self {
            Cursor::Watermark(last) => {
                for t in times {
                    if last.as_deref().map_or(true, |l| t > l) {
                        *last = Some(t.to_string());
                    }
                }
            }
            Cursor::SeenSet(set) => {
                for t in times {
                    set.push_newest(t.to_string());
                }
            }
        }
    }

    pub fn watermark(&self) -> Option<&str> {
        match self {
            Cursor::Watermark(last) => last.as_deref(),
            Cursor::SeenSet(set) => set.iter_newest_first().next().map(String::as_str),
        }
    }

    /// Lines as persisted, newest first.
    pub fn to_lines(&self) -> Vec<String> {
        match self {
            Cursor::Watermark(last) => last.iter().cloned().collect(),
            Cursor::SeenSet(set) => set.iter_newest_first().cloned().collect(),
        }
    }

    /// Inverse of `to_lines`; blank lines are ignored. A seen-set file read as a watermark
    /// yields its newest line.
    pub fn from_lines<I, S>(strategy: DedupStrategy, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut lines = lines
            .into_iter()
            .map(|l| l.as_ref().trim().to_string())
            .filter(|l| !l.is_empty());
        match strategy {
            DedupStrategy::Watermark => Cursor::Watermark(lines.next()),
            DedupStrategy::SeenSet => {
                Cursor::SeenSet(SeenSet::from_newest_first(lines, SEEN_SET_CAPACITY))
            }
        }
    }
}

/// File-backed persistence for a `Cursor`.
#[derive(Debug, Clone)]
pub struct CursorStore {
    path: PathBuf,
    strategy: DedupStrategy,
}

impl CursorStore {
    pub fn new(path: impl Into<PathBuf>, strategy: DedupStrategy) -> Self {
        Self {
            path: path.into(),
            strategy,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn strategy(&self) -> DedupStrategy {
        self.strategy
    }

    /// A missing or unreadable file starts from an empty cursor.
    pub async fn load(&self) -> Cursor {
        match fs::read_to_string(&self.path).await {
            Ok(s) => {
                let cursor = Cursor::from_lines(self.strategy, s.lines());
                tracing::info!(
                    path = %self.path.display(),
                    entries = cursor.to_lines().len(),
                    "cursor loaded"
                );
                cursor
            }
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "no cursor file; starting empty");
                Cursor::empty(self.strategy)
            }
        }
    }

    /// Rewrite the whole file (temp file + rename).
    pub async fn save(&self, cursor: &Cursor) -> Result<()> {
        let mut body = cursor.to_lines().join("\n");
        if !body.is_empty() {
            body.push('\n');
        }
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        fs::write(&tmp, body).await?;
        fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn watermark_is_strictly_greater() {
        let c = Cursor::Watermark(Some("2024-01-01 00:00:05".into()));
        assert!(!c.is_new("2024-01-01 00:00:04"));
        assert!(!c.is_new("2024-01-01 00:00:05"));
        assert!(c.is_new("2024-01-01 00:00:06"));
        assert!(Cursor::Watermark(None).is_new("anything"));
    }

    #[test]
    fn seen_set_evicts_oldest_past_capacity() {
        let mut set = SeenSet::with_capacity(3);
        assert!(set.is_empty());
        for t in ["a", "b", "c", "d"] {
            set.push_newest(t.to_string());
        }
        assert_eq!(set.len(), 3);
        assert!(!set.contains("a"));
        assert_eq!(
            set.iter_newest_first().cloned().collect::<Vec<_>>(),
            vec!["d", "c", "b"]
        );
    }

    #[test]
    fn seen_set_file_read_as_watermark_takes_first_line() {
        let c = Cursor::from_lines(DedupStrategy::Watermark, ["", "t3", "t2", "t1"]);
        assert_eq!(c, Cursor::Watermark(Some("t3".into())));
    }

    #[test]
    fn seen_set_load_caps_at_capacity() {
        let lines: Vec<String> = (0..80).map(|i| format!("t{i:03}")).collect();
        let c = Cursor::from_lines(DedupStrategy::SeenSet, &lines);
        assert_eq!(c.to_lines().len(), SEEN_SET_CAPACITY);
        assert_eq!(c.to_lines()[0], "t000");
    }

    #[tokio::test]
    async fn save_then_load_keeps_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let store = CursorStore::new(dir.path().join("state/time.txt"), DedupStrategy::SeenSet);
        let mut c = store.load().await;
        assert_eq!(c, Cursor::empty(DedupStrategy::SeenSet));
        assert_eq!(c.strategy(), store.strategy());
        c.advance(["t1", "t2"]);
        store.save(&c).await.unwrap();

        let raw = std::fs::read_to_string(store.path()).unwrap();
        assert_eq!(raw, "t2\nt1\n");
        assert_eq!(store.load().await, c);
    }
}
