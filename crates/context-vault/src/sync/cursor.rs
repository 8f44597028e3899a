//! Per-session high-water marks for one synchronizer instance.
use chrono::{DateTime, Utc};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CursorEntry {
    /// Messages parsed from the transcript on the last check.
    pub message_count: usize,
    pub last_checked: DateTime<Utc>,
}

/// In-memory only. A fresh cursor knows nothing, so the synchronizer falls
/// back to the archive's persisted count on first contact with a session.
#[derive(Debug, Default)]
pub struct SyncCursor {
    entries: HashMap<String, CursorEntry>,
}

impl SyncCursor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, session_id: &str) -> Option<&CursorEntry> {
        self.entries.get(session_id)
    }

    pub fn message_count(&self, session_id: &str) -> Option<usize> {
        self.entries.get(session_id).map(|e| e.message_count)
    }

    pub fn record(&mut self, session_id: &str, message_count: usize) {
        self.entries.insert(
            session_id.to_string(),
            CursorEntry { message_count, last_checked: Utc::now() },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
