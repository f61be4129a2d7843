//! Bounded, pausable buffer of log entries.

use std::collections::VecDeque;

use rdwatch_types::LogEntry;

/// Default number of entries kept.
pub const DEFAULT_LOG_CAPACITY: usize = 1000;

/// Ordered log entries, oldest first, capped at a fixed capacity.
///
/// When full, appending evicts the oldest entry. While paused, appends are
/// dropped (and counted) so a reader can inspect a frozen view without
/// the stream being interrupted.
#[derive(Debug, Clone)]
pub struct EventBuffer {
    entries: VecDeque<LogEntry>,
    capacity: usize,
    paused: bool,
    discarded: u64,
}

impl Default for EventBuffer {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_LOG_CAPACITY)
    }
}

impl EventBuffer {
    /// Create an empty buffer holding at most `capacity` entries.
    ///
    /// A capacity of 0 is raised to 1.
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
            paused: false,
            discarded: 0,
        }
    }

    /// Append an entry, evicting the oldest when full.
    ///
    /// Returns `false` if the buffer is paused and the entry was dropped.
    pub fn append(&mut self, entry: LogEntry) -> bool {
        if self.paused {
            self.discarded += 1;
            return false;
        }
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
        true
    }

    pub fn pause(&mut self) {
        self.paused = true;
    }

    pub fn resume(&mut self) {
        self.paused = false;
    }

    /// Flip the pause state, returning the new one.
    pub fn toggle_pause(&mut self) -> bool {
        self.paused = !self.paused;
        self.paused
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Remove every entry. Works while paused too.
    pub fn clear(&mut self) {
        self.entries.clear();
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

    /// Entries dropped because the buffer was paused.
    pub fn discarded(&self) -> u64 {
        self.discarded
    }

    /// Iterate oldest to newest.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &LogEntry> + ExactSizeIterator {
        self.entries.iter()
    }

    /// The most recent entry.
    pub fn latest(&self) -> Option<&LogEntry> {
        self.entries.back()
    }

    pub fn to_vec(&self) -> Vec<LogEntry> {
        self.entries.iter().cloned().collect()
    }

    /// Entries matching `query` (case-insensitive), oldest first.
    ///
    /// An empty query matches everything.
    pub fn search<'a>(&'a self, query: &'a str) -> impl Iterator<Item = &'a LogEntry> + 'a {
        self.entries
            .iter()
            .filter(move |entry| query.is_empty() || entry.matches(query))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(n: usize) -> LogEntry {
        LogEntry::new("2024-01-01T00:00:00Z", "INFO", format!("entry {n}"))
    }

    fn messages(buffer: &EventBuffer) -> Vec<String> {
        buffer
            .iter()
            .filter_map(|e| e.display_message().map(str::to_string))
            .collect()
    }

    #[test]
    fn test_default_capacity() {
        assert_eq!(EventBuffer::default().capacity(), 1000);
    }

    #[test]
    fn test_evicts_oldest_at_capacity() {
        let mut buffer = EventBuffer::default();
        for n in 0..1000 {
            assert!(buffer.append(entry(n)));
        }
        assert_eq!(buffer.len(), 1000);

        buffer.append(entry(1000));
        assert_eq!(buffer.len(), 1000);
        assert_eq!(
            buffer.iter().next().unwrap().display_message(),
            Some("entry 1")
        );
        assert_eq!(buffer.latest().unwrap().display_message(), Some("entry 1000"));
    }

    #[test]
    fn test_never_exceeds_small_capacity() {
        let mut buffer = EventBuffer::with_capacity(3);
        for n in 0..10 {
            buffer.append(entry(n));
            assert!(buffer.len() <= 3);
        }
        assert_eq!(messages(&buffer), vec!["entry 7", "entry 8", "entry 9"]);
    }

    #[test]
    fn test_paused_append_is_noop() {
        let mut buffer = EventBuffer::with_capacity(10);
        buffer.append(entry(0));
        buffer.pause();

        assert!(!buffer.append(entry(1)));
        assert!(!buffer.append(entry(2)));
        assert_eq!(messages(&buffer), vec!["entry 0"]);
        assert_eq!(buffer.discarded(), 2);

        buffer.resume();
        assert!(buffer.append(entry(3)));
        assert_eq!(messages(&buffer), vec!["entry 0", "entry 3"]);
    }

    #[test]
    fn test_toggle_pause() {
        let mut buffer = EventBuffer::default();
        assert!(buffer.toggle_pause());
        assert!(buffer.is_paused());
        assert!(!buffer.toggle_pause());
        assert!(!buffer.is_paused());
    }

    #[test]
    fn test_clear_while_paused() {
        let mut buffer = EventBuffer::default();
        buffer.append(entry(0));
        buffer.pause();
        buffer.clear();
        assert!(buffer.is_empty());
        assert!(buffer.is_paused());
    }

    #[test]
    fn test_zero_capacity_is_raised() {
        let mut buffer = EventBuffer::with_capacity(0);
        buffer.append(entry(0));
        buffer.append(entry(1));
        assert_eq!(messages(&buffer), vec!["entry 1"]);
    }

    #[test]
    fn test_search() {
        let mut buffer = EventBuffer::default();
        buffer.append(LogEntry::new("t", "INFO", "Listening on 0.0.0.0:1080"));
        buffer.append(LogEntry::new("t", "WARN", "dial failed"));
        buffer.append(LogEntry::new("t", "INFO", "config reloaded"));

        let hits: Vec<_> = buffer.search("LISTEN").collect();
        assert_eq!(hits.len(), 1);

        assert_eq!(buffer.search("warn").count(), 1);
        assert_eq!(buffer.search("").count(), 3);
        assert_eq!(buffer.to_vec().len(), 3);
    }
}
