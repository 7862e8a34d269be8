//! Bounded in-memory audit trail shared by all wallet sessions.
//!
//! Newest entries first, capped length, process-lifetime only. Any
//! presentation layer reads it through [`LogSink::snapshot`].

use std::collections::VecDeque;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Maximum number of retained entries.
pub const LOG_CAP: usize = 200;

/// One timestamped audit line.
#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
    pub at: DateTime<Utc>,
    pub message: String,
}

/// Append-only, bounded, newest-first log sequence.
#[derive(Debug)]
pub struct LogSink {
    entries: Mutex<VecDeque<LogEntry>>,
    cap: usize,
}

impl LogSink {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(LOG_CAP)),
            cap: LOG_CAP,
        }
    }

    /// Prepend a timestamped entry, evicting the oldest entries past the cap.
    pub fn append(&self, message: impl Into<String>) {
        let entry = LogEntry {
            at: Utc::now(),
            message: message.into(),
        };
        let mut entries = self.entries.lock().unwrap();
        entries.push_front(entry);
        entries.truncate(self.cap);
    }

    /// Empty the sequence.
    pub fn clear(&self) {
        self.entries.lock().unwrap().clear();
    }

    /// Read-only copy, newest first.
    pub fn snapshot(&self) -> Vec<LogEntry> {
        self.entries.lock().unwrap().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for LogSink {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_caps_at_200_newest_first() {
        let sink = LogSink::new();
        for i in 0..250 {
            sink.append(format!("entry {i}"));
        }
        let entries = sink.snapshot();
        assert_eq!(entries.len(), 200);
        assert_eq!(entries[0].message, "entry 249");
        assert_eq!(entries[199].message, "entry 50");
    }

    #[test]
    fn clear_empties_the_sequence() {
        let sink = LogSink::new();
        sink.append("one");
        sink.append("two");
        sink.clear();
        assert!(sink.is_empty());
    }

    #[test]
    fn concurrent_appends_never_exceed_cap() {
        use std::sync::Arc;

        let sink = Arc::new(LogSink::new());
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let sink = sink.clone();
                std::thread::spawn(move || {
                    for i in 0..100 {
                        sink.append(format!("t{t} {i}"));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(sink.len(), 200);
    }
}
