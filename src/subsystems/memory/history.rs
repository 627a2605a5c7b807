//! Rolling per-user conversation window.
//!
//! Each user id maps to an oldest-first list of turns capped at
//! `2 × max_pairs`. Overflow drops whole exchanges from the front, so the
//! retained window always opens with a `User` turn.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use tracing::trace;

use crate::llm::{Role, Turn};

/// Shared map of user id → history. Clone the surrounding `Arc`, not this.
#[derive(Debug)]
pub struct HistoryStore {
    max_pairs: usize,
    conversations: Mutex<HashMap<String, Vec<Turn>>>,
}

impl HistoryStore {
    /// `max_pairs` is the number of user/assistant exchanges remembered.
    pub fn new(max_pairs: usize) -> Self {
        Self { max_pairs, conversations: Mutex::new(HashMap::new()) }
    }

    /// Upper bound on stored turns per user.
    pub fn max_turns(&self) -> usize {
        self.max_pairs * 2
    }

    /// Snapshot of the stored history, oldest first.
    ///
    /// An unknown user gets an empty history, which is created on the spot.
    pub fn get(&self, user_id: &str) -> Vec<Turn> {
        self.lock().entry(user_id.to_string()).or_default().clone()
    }

    /// Append one turn, then trim the front back under the cap.
    pub fn append(&self, user_id: &str, role: Role, content: impl Into<String>) {
        let max_turns = self.max_turns();
        let mut map = self.lock();
        let turns = map.entry(user_id.to_string()).or_default();
        turns.push(Turn::new(role, content));

        let before = turns.len();
        truncate(turns, max_turns);
        if turns.len() != before {
            trace!(user_id, dropped = before - turns.len(), "history window trimmed");
        }
    }

    /// Number of stored turns for `user_id` (0 when unknown).
    pub fn len(&self, user_id: &str) -> usize {
        self.lock().get(user_id).map_or(0, Vec::len)
    }

    /// Drop one user's history.
    pub fn evict(&self, user_id: &str) {
        self.lock().remove(user_id);
    }

    /// Forget every conversation.
    pub fn reset(&self) {
        self.lock().clear();
    }

    /// Number of users with a history entry.
    pub fn user_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Vec<Turn>>> {
        // A panic mid-append leaves a consistent map; keep serving it.
        self.conversations.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn truncate(turns: &mut Vec<Turn>, max_turns: usize) {
    if max_turns == 0 {
        turns.clear();
        return;
    }
    while turns.len() > max_turns {
        let n = 2.min(turns.len());
        turns.drain(..n);
    }
    let leading = turns.iter().take_while(|t| t.role != Role::User).count();
    turns.drain(..leading);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exchange(store: &HistoryStore, user: &str, n: usize) {
        store.append(user, Role::User, format!("question {n}"));
        store.append(user, Role::Assistant, format!("answer {n}"));
    }

    #[test]
    fn unknown_user_gets_empty_history() {
        let store = HistoryStore::new(8);
        assert!(store.get("919800000001").is_empty());
        assert_eq!(store.user_count(), 1);
        assert_eq!(store.len("nobody"), 0);
    }

    #[test]
    fn append_keeps_order() {
        let store = HistoryStore::new(8);
        exchange(&store, "u", 1);
        let h = store.get("u");
        assert_eq!(h.len(), 2);
        assert_eq!(h[0].role, Role::User);
        assert_eq!(h[0].content, "question 1");
        assert_eq!(h[1].role, Role::Assistant);
    }

    #[test]
    fn twenty_exchanges_keep_last_eight() {
        let store = HistoryStore::new(8);
        for n in 1..=20 {
            exchange(&store, "u", n);
            assert!(store.len("u") <= 16);
            assert_eq!(store.get("u")[0].role, Role::User);
        }
        let h = store.get("u");
        assert_eq!(h.len(), 16);
        assert_eq!(h[0].content, "question 13");
        assert_eq!(h[15].content, "answer 20");
    }

    #[test]
    fn window_opens_with_user_turn_after_odd_overflow() {
        let store = HistoryStore::new(1);
        store.append("u", Role::User, "a");
        store.append("u", Role::Assistant, "b");
        store.append("u", Role::User, "c");
        let h = store.get("u");
        assert_eq!(h.len(), 1);
        assert_eq!(h[0].content, "c");
        assert_eq!(h[0].role, Role::User);
    }

    #[test]
    fn zero_window_stores_nothing() {
        let store = HistoryStore::new(0);
        exchange(&store, "u", 1);
        assert_eq!(store.len("u"), 0);
    }

    #[test]
    fn users_are_isolated() {
        let store = HistoryStore::new(8);
        exchange(&store, "a", 1);
        exchange(&store, "b", 1);
        exchange(&store, "b", 2);
        assert_eq!(store.len("a"), 2);
        assert_eq!(store.len("b"), 4);
    }

    #[test]
    fn evict_and_reset() {
        let store = HistoryStore::new(8);
        exchange(&store, "a", 1);
        exchange(&store, "b", 1);
        store.evict("a");
        assert_eq!(store.len("a"), 0);
        assert_eq!(store.len("b"), 2);
        store.reset();
        assert_eq!(store.user_count(), 0);
    }
}
