use serde::{Deserialize, Serialize};

/// One element of a serialized navigation path. An entry's step list is
/// root-first and is sufficient to replay the nested open/closed + query
/// state it was recorded from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "step")]
pub enum HistoryStep {
    Search { querystring: String },
    Article { url: String, page: u32 },
    Section { kind: String, querystring: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub steps: Vec<HistoryStep>,
    pub title: String,
    pub url: String,
}

/// Recording stand-in for the browser History API: a linear stack with a
/// cursor, supporting push/replace and back/forward traversal.
#[derive(Debug, Default)]
pub struct BrowserHistory {
    entries: Vec<HistoryEntry>,
    current: usize,
}

impl BrowserHistory {
    pub fn push(&mut self, entry: HistoryEntry) {
        if !self.entries.is_empty() {
            self.entries.truncate(self.current + 1);
        }
        self.entries.push(entry);
        self.current = self.entries.len() - 1;
    }

    pub fn replace(&mut self, entry: HistoryEntry) {
        if self.entries.is_empty() {
            self.entries.push(entry);
            self.current = 0;
        } else {
            self.entries[self.current] = entry;
        }
    }

    pub fn current(&self) -> Option<&HistoryEntry> {
        self.entries.get(self.current)
    }

    pub fn back(&mut self) -> Option<&HistoryEntry> {
        if self.current == 0 {
            return None;
        }
        self.current -= 1;
        self.entries.get(self.current)
    }

    pub fn forward(&mut self) -> Option<&HistoryEntry> {
        if self.current + 1 >= self.entries.len() {
            return None;
        }
        self.current += 1;
        self.entries.get(self.current)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }
}
