//! Bounded backlog of played dialogue and chosen options.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Speaker label used for backlog entries that record a choice.
pub const CHOICE_SPEAKER: &str = "Choice";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub speaker: String,
    pub content: String,
}

/// Most recent entries first out when the capacity is exceeded.
#[derive(Debug, Clone)]
pub struct HistoryLog {
    capacity: usize,
    entries: VecDeque<HistoryEntry>,
}

impl HistoryLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity.min(256)),
        }
    }

    pub fn push(&mut self, speaker: &str, content: &str) {
        if self.capacity == 0 {
            return;
        }
        self.entries.push_back(HistoryEntry {
            speaker: speaker.to_string(),
            content: content.to_string(),
        });
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }

    pub fn push_choice(&mut self, label: &str) {
        self.push(CHOICE_SPEAKER, label);
    }

    /// Replace the backlog, keeping only the newest `capacity` entries.
    pub fn replace(&mut self, entries: Vec<HistoryEntry>) {
        self.entries.clear();
        for entry in entries {
            self.push(&entry.speaker, &entry.content);
        }
    }

    pub fn entries(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    pub fn to_vec(&self) -> Vec<HistoryEntry> {
        self.entries.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oldest_entries_are_evicted() {
        let mut log = HistoryLog::new(2);
        log.push("A", "one");
        log.push("B", "two");
        log.push_choice("Go left");
        let entries = log.to_vec();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].content, "two");
        assert_eq!(entries[1].speaker, CHOICE_SPEAKER);
    }

    #[test]
    fn replace_honors_capacity() {
        let mut log = HistoryLog::new(1);
        log.replace(vec![
            HistoryEntry {
                speaker: "A".to_string(),
                content: "old".to_string(),
            },
            HistoryEntry {
                speaker: "B".to_string(),
                content: "new".to_string(),
            },
        ]);
        assert_eq!(log.len(), 1);
        assert_eq!(log.entries().next().map(|e| e.content.as_str()), Some("new"));
    }

    #[test]
    fn zero_capacity_records_nothing() {
        let mut log = HistoryLog::new(0);
        log.push("A", "ignored");
        assert!(log.is_empty());
    }
}
