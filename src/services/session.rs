use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionEntry {
    pub question: String,
    pub answer: String,
    pub timestamp: DateTime<Utc>,
}

impl SessionEntry {
    pub fn new(question: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            answer: answer.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Question/answer history keyed by session id.
///
/// Entries within one session keep insertion order. Shared by handle
/// (`Arc<SessionStore>`), never as a global.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: Mutex<HashMap<String, Vec<SessionEntry>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, session_id: &str) -> Vec<SessionEntry> {
        self.sessions
            .lock()
            .get(session_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn append(&self, session_id: &str, entry: SessionEntry) {
        self.sessions
            .lock()
            .entry(session_id.to_string())
            .or_default()
            .push(entry);
    }

    /// Returns whether the session existed.
    pub fn delete(&self, session_id: &str) -> bool {
        self.sessions.lock().remove(session_id).is_some()
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn append_preserves_order_within_session() {
        let store = SessionStore::new();
        store.append("s1", SessionEntry::new("q1", "a1"));
        store.append("s1", SessionEntry::new("q2", "a2"));
        store.append("s2", SessionEntry::new("other", "x"));

        let history = store.get("s1");
        let questions: Vec<&str> = history.iter().map(|e| e.question.as_str()).collect();
        assert_eq!(questions, vec!["q1", "q2"]);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn unknown_session_is_empty() {
        let store = SessionStore::new();
        assert!(store.get("missing").is_empty());
        assert!(!store.delete("missing"));
    }

    #[test]
    fn delete_clears_only_that_session() {
        let store = SessionStore::new();
        store.append("a", SessionEntry::new("q", "a"));
        store.append("b", SessionEntry::new("q", "a"));
        assert!(store.delete("a"));
        assert!(store.get("a").is_empty());
        assert_eq!(store.get("b").len(), 1);
    }

    #[test]
    fn stores_are_isolated() {
        let first = SessionStore::new();
        let second = SessionStore::new();
        first.append("s", SessionEntry::new("q", "a"));
        assert!(second.is_empty());
    }

    #[test]
    fn concurrent_appends_are_all_kept() {
        let store = Arc::new(SessionStore::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for j in 0..25 {
                        store.append("shared", SessionEntry::new(format!("{}-{}", i, j), "a"));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(store.get("shared").len(), 200);
    }
}
