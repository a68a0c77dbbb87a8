//! Bounded record of executed input lines.

use std::{cell::RefCell, collections::VecDeque, rc::Rc};

use command_contract::Reply;

/// One executed line and the reply it produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    /// Input line as typed.
    pub text: String,
    /// Reply the invocation ended with, if any.
    pub reply: Option<Reply>,
}

#[derive(Debug, Default)]
struct HistoryState {
    capacity: usize,
    entries: VecDeque<HistoryEntry>,
}

/// Shared, bounded command history. The oldest entry is evicted once `capacity` is exceeded; a
/// capacity of zero disables recording.
#[derive(Debug, Clone, Default)]
pub struct CommandHistory {
    inner: Rc<RefCell<HistoryState>>,
}

impl CommandHistory {
    /// Creates an empty history holding at most `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Rc::new(RefCell::new(HistoryState {
                capacity,
                entries: VecDeque::with_capacity(capacity.min(256)),
            })),
        }
    }

    /// Appends a line. Blank lines are ignored.
    pub fn push(&self, text: impl Into<String>, reply: Option<Reply>) {
        let text = text.into();
        let mut state = self.inner.borrow_mut();
        if state.capacity == 0 || text.trim().is_empty() {
            return;
        }
        state.entries.push_back(HistoryEntry { text, reply });
        while state.entries.len() > state.capacity {
            state.entries.pop_front();
        }
    }

    /// Entries, oldest first.
    pub fn entries(&self) -> Vec<HistoryEntry> {
        self.inner.borrow().entries.iter().cloned().collect()
    }

    /// Most recent entry.
    pub fn last(&self) -> Option<HistoryEntry> {
        self.inner.borrow().entries.back().cloned()
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.inner.borrow().entries.len()
    }

    /// Whether nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.inner.borrow().entries.is_empty()
    }

    /// Maximum number of stored entries.
    pub fn capacity(&self) -> usize {
        self.inner.borrow().capacity
    }

    /// Drops every entry.
    pub fn clear(&self) {
        self.inner.borrow_mut().entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn evicts_oldest_past_capacity() {
        let history = CommandHistory::new(2);
        for line in ["a", "b", "   ", "c"] {
            history.push(line, None);
        }
        let texts = history
            .entries()
            .into_iter()
            .map(|entry| entry.text)
            .collect::<Vec<_>>();
        assert_eq!(texts, vec!["b".to_string(), "c".to_string()]);
    }

    #[test]
    fn zero_capacity_records_nothing() {
        let history = CommandHistory::new(0);
        history.push("ping", None);
        assert!(history.is_empty());
    }
}
