use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{SystemTime, UNIX_EPOCH};

use log::{Level, log_enabled};

use super::*;

/// A single logged protocol message or status line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct LogEntry {
    pub ts_ms: u128,
    pub message: String,
}

/// Bounded rolling log of the messages exchanged on one session.
///
/// Appends come from the operation path and the notification listener;
/// draining empties the log for reporting. Each append and drain holds the
/// lock for its whole duration, so entries are never split or lost between
/// the two. When full, the oldest entry is dropped.
#[derive(Debug, Clone)]
pub struct MessageLog {
    capacity: usize,
    entries: Arc<Mutex<VecDeque<LogEntry>>>,
}

impl Default for MessageLog {
    fn default() -> Self {
        Self::new(config::MESSAGE_LOG_CAPACITY)
    }
}

impl MessageLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    fn guard(&self) -> MutexGuard<'_, VecDeque<LogEntry>> {
        // Entries are pushed whole, so a poisoned lock still holds valid data.
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn append(&self, message: impl Into<String>) {
        let entry = LogEntry {
            ts_ms: now_ms(),
            message: message.into(),
        };
        let mut guard = self.guard();
        if guard.len() == self.capacity {
            guard.pop_front();
        }
        guard.push_back(entry);
    }

    /// Logs a `<hello>`; the full capability list is kept only when debug
    /// logging is enabled.
    pub fn append_hello(&self, direction: &str, hello: &str, capabilities: usize) {
        if log_enabled!(Level::Debug) {
            self.append(format!("{direction} hello:\n{hello}"));
        } else {
            self.append(format!(
                "{direction} hello with {capabilities} capabilities (abridged)"
            ));
        }
    }

    pub fn len(&self) -> usize {
        self.guard().len()
    }

    pub fn is_empty(&self) -> bool {
        self.guard().is_empty()
    }

    /// Copies the current entries without clearing them.
    pub fn snapshot(&self) -> Vec<LogEntry> {
        self.guard().iter().cloned().collect()
    }

    /// Removes and returns every entry.
    pub fn drain(&self) -> Vec<LogEntry> {
        self.guard().drain(..).collect()
    }

    /// Removes every entry and joins the messages with newlines.
    pub fn drain_text(&self) -> String {
        self.drain()
            .into_iter()
            .map(|e| e.message)
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Export entries as JSONL.
    pub fn to_jsonl(&self) -> Result<String, NetconfError> {
        let entries = self.snapshot();
        let mut lines = Vec::with_capacity(entries.len());
        for entry in entries {
            let line = serde_json::to_string(&entry)
                .map_err(|e| NetconfError::Internal(format!("message log encode error: {e}")))?;
            lines.push(line);
        }
        Ok(lines.join("\n"))
    }
}

fn now_ms() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0)
}
