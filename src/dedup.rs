//! Per-run URL deduplication.
//!
//! One [`EntryDeduplicator`] lives for one orchestrator run and is shared by
//! every source pipeline of that run. When a URL surfaces through several
//! channels or sources, the first sighting wins and later ones are suppressed.

use std::collections::HashSet;

#[derive(Debug, Default)]
pub struct EntryDeduplicator {
    seen: HashSet<String>,
}

impl EntryDeduplicator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seen(&self, url: &str) -> bool {
        self.seen.contains(url)
    }

    pub fn mark_seen(&mut self, url: impl Into<String>) {
        self.seen.insert(url.into());
    }

    /// Mark `url` and report whether it was new.
    pub fn first_sighting(&mut self, url: &str) -> bool {
        if self.seen(url) {
            return false;
        }
        self.mark_seen(url);
        true
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
