use std::collections::{HashMap, VecDeque};
use std::sync::mpsc::Receiver;
use std::time::SystemTime;

use parking_lot::Mutex;

#[derive(Clone, Debug, PartialEq)]
pub enum ErrorLevel {
    Warning,
    Error,
}

/// A WARN or ERROR event captured from the tracing pipeline.
#[derive(Clone, Debug)]
pub struct ErrorEntry {
    pub timestamp: SystemTime,
    pub level: ErrorLevel,
    pub message: String,
    pub target: String,
    pub fields: HashMap<String, String>,
}

impl ErrorEntry {
    /// Conversation the event was logged for, if it carried a `conv_id` field.
    pub fn conversation_id(&self) -> Option<&str> {
        self.fields.get("conv_id").map(String::as_str)
    }
}

/// Bounded log of recent warnings and errors, oldest evicted first.
pub struct ErrorStore {
    entries: Mutex<VecDeque<ErrorEntry>>,
    max_entries: usize,
}

impl ErrorStore {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::new()),
            max_entries: max_entries.max(1),
        }
    }

    pub fn add_entry(&self, entry: ErrorEntry) {
        let mut entries = self.entries.lock();
        entries.push_back(entry);
        while entries.len() > self.max_entries {
            entries.pop_front();
        }
    }

    /// Move everything currently queued on the collector channel into the store.
    pub fn drain_from(&self, receiver: &Receiver<ErrorEntry>) -> usize {
        let mut count = 0;
        while let Ok(entry) = receiver.try_recv() {
            self.add_entry(entry);
            count += 1;
        }
        count
    }

    pub fn entries(&self) -> Vec<ErrorEntry> {
        self.entries.lock().iter().cloned().collect()
    }

    pub fn error_count(&self) -> usize {
        self.count(ErrorLevel::Error)
    }

    pub fn warning_count(&self) -> usize {
        self.count(ErrorLevel::Warning)
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    fn count(&self, level: ErrorLevel) -> usize {
        self.entries
            .lock()
            .iter()
            .filter(|e| e.level == level)
            .count()
    }
}
