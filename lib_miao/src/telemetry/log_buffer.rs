use std::collections::{HashSet, VecDeque};

use crate::models::{LogEntry, LogKey};

/// Maximum number of log entries kept for the view.
pub const LOG_BUFFER_CAPACITY: usize = 500;

/// # Log Buffer
///
/// Newest-first sequence of log entries with identity-key deduplication.
///
/// Invariants:
/// - `keys` holds exactly the keys of `entries`, so no two entries share a key.
/// - `entries.len() <= capacity`; overflow evicts the tail, which is the
///   oldest entry by insertion order (not by timestamp).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogBuffer {
    entries: VecDeque<LogEntry>,
    keys: HashSet<LogKey>,
    capacity: usize,
}

impl Default for LogBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl LogBuffer {
    pub fn new() -> Self {
        Self::with_capacity(LOG_BUFFER_CAPACITY)
    }

    /// A capacity of zero is treated as one.
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            keys: HashSet::with_capacity(capacity),
            capacity,
        }
    }

    /// Prepends `entry` unless an entry with the same key is present.
    ///
    /// Returns `false` for a duplicate, leaving the buffer untouched.
    pub fn insert(&mut self, entry: LogEntry) -> bool {
        if !self.keys.insert(entry.key()) {
            return false;
        }
        self.entries.push_front(entry);
        if self.entries.len() > self.capacity {
            if let Some(evicted) = self.entries.pop_back() {
                self.keys.remove(&evicted.key());
            }
        }
        true
    }

    /// Replaces the whole buffer with `entries`, given newest-first.
    ///
    /// Keys are rebuilt from scratch; a repeated key keeps its first
    /// (newest) occurrence, and anything past the capacity is dropped.
    pub fn replace_all(&mut self, entries: impl IntoIterator<Item = LogEntry>) {
        self.entries.clear();
        self.keys.clear();
        for entry in entries {
            if self.entries.len() == self.capacity {
                break;
            }
            if self.keys.insert(entry.key()) {
                self.entries.push_back(entry);
            }
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.keys.clear();
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

    pub fn contains(&self, entry: &LogEntry) -> bool {
        self.keys.contains(&entry.key())
    }

    /// Newest first.
    pub fn iter(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter()
    }

    pub fn snapshot(&self) -> Vec<LogEntry> {
        self.entries.iter().cloned().collect()
    }

    /// Flat text export, one `time [LEVEL] message` line per entry, newest first.
    pub fn export_text(&self) -> String {
        let mut out = String::new();
        for entry in &self.entries {
            out.push_str(&entry.to_string());
            out.push('\n');
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::LogLevel;

    fn entry(n: usize) -> LogEntry {
        LogEntry::new(format!("2024-05-01T10:00:{:02}Z", n % 60), LogLevel::Info, format!("line {n}"))
    }

    #[test]
    fn duplicate_insert_is_a_no_op() {
        let mut once = LogBuffer::new();
        once.insert(entry(1));

        let mut twice = LogBuffer::new();
        assert!(twice.insert(entry(1)));
        assert!(!twice.insert(entry(1)));

        assert_eq!(once, twice);
        assert_eq!(twice.len(), 1);
    }

    #[test]
    fn newest_first() {
        let mut buffer = LogBuffer::new();
        buffer.insert(entry(1));
        buffer.insert(entry(2));
        let order: Vec<_> = buffer.iter().map(|e| e.message.clone()).collect();
        assert_eq!(order, vec!["line 2", "line 1"]);
    }

    #[test]
    fn arrival_order_wins_over_timestamp() {
        let mut buffer = LogBuffer::new();
        buffer.insert(LogEntry::new("2024-05-01T12:00:00Z", LogLevel::Info, "late"));
        buffer.insert(LogEntry::new("2024-05-01T08:00:00Z", LogLevel::Info, "older but arrived last"));
        assert_eq!(buffer.iter().next().unwrap().message, "older but arrived last");
    }

    #[test]
    fn evicts_tail_past_capacity() {
        let mut buffer = LogBuffer::new();
        for n in 0..LOG_BUFFER_CAPACITY {
            buffer.insert(entry(n));
        }
        assert_eq!(buffer.len(), LOG_BUFFER_CAPACITY);
        let tail = buffer.iter().last().cloned().unwrap();
        assert_eq!(tail, entry(0));

        buffer.insert(entry(LOG_BUFFER_CAPACITY));
        assert_eq!(buffer.len(), LOG_BUFFER_CAPACITY);
        assert!(!buffer.contains(&tail));
        assert_eq!(buffer.iter().last().cloned().unwrap(), entry(1));

        // The evicted key is forgotten, so the entry can come back.
        assert!(buffer.insert(tail.clone()));
        assert_eq!(buffer.iter().next().unwrap(), &tail);
        assert_eq!(buffer.len(), LOG_BUFFER_CAPACITY);
    }

    #[test]
    fn never_exceeds_capacity() {
        let mut buffer = LogBuffer::with_capacity(8);
        for n in 0..100 {
            buffer.insert(entry(n));
            buffer.insert(entry(n / 2));
            assert!(buffer.len() <= 8);
        }
    }

    #[test]
    fn replace_all_rebuilds_keys_and_trims() {
        let mut buffer = LogBuffer::with_capacity(3);
        buffer.insert(entry(42));

        buffer.replace_all(vec![entry(5), entry(4), entry(5), entry(3), entry(2), entry(1)]);
        let order: Vec<_> = buffer.iter().map(|e| e.message.clone()).collect();
        assert_eq!(order, vec!["line 5", "line 4", "line 3"]);
        assert!(!buffer.contains(&entry(42)));
        assert!(!buffer.insert(entry(4)));
        assert!(buffer.insert(entry(42)));
    }

    #[test]
    fn clear_forgets_keys() {
        let mut buffer = LogBuffer::new();
        buffer.insert(entry(1));
        buffer.clear();
        assert!(buffer.is_empty());
        assert!(buffer.insert(entry(1)));
    }

    #[test]
    fn export_is_one_line_per_entry() {
        let mut buffer = LogBuffer::new();
        buffer.insert(LogEntry::new("2024-05-01T10:00:00Z", LogLevel::Debug, "first"));
        buffer.insert(LogEntry::new("2024-05-01T10:00:01Z", LogLevel::Error, "second"));
        assert_eq!(
            buffer.export_text(),
            "2024-05-01T10:00:01Z [ERROR] second\n2024-05-01T10:00:00Z [DEBUG] first\n"
        );
        assert_eq!(LogBuffer::new().export_text(), "");
    }
}
