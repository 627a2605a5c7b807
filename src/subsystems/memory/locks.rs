//! Per-user serialization.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// One async mutex per user id, created on first use.
///
/// Hold the guard for the whole request; a second message from the same
/// guest waits, messages from other guests do not. Entries nobody holds or
/// waits on are pruned on the next acquire, so the map tracks active guests
/// only.
#[derive(Debug, Default)]
pub struct UserLocks {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl UserLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, user_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            map.retain(|id, lock| id == user_id || Arc::strong_count(lock) > 1);
            map.entry(user_id.to_string()).or_default().clone()
        };
        lock.lock_owned().await
    }

    /// Number of tracked user ids.
    pub fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn same_user_waits() {
        let locks = Arc::new(UserLocks::new());
        let guard = locks.acquire("u").await;

        let l = locks.clone();
        let waiter = tokio::spawn(async move {
            let _g = l.acquire("u").await;
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), waiter).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn other_users_proceed() {
        let locks = UserLocks::new();
        let _a = locks.acquire("a").await;
        tokio::time::timeout(Duration::from_millis(100), locks.acquire("b"))
            .await
            .expect("independent user must not block");
    }

    #[tokio::test]
    async fn idle_entries_are_pruned() {
        let locks = UserLocks::new();
        for guest in ["a", "b", "c"] {
            drop(locks.acquire(guest).await);
        }
        assert_eq!(locks.len(), 1);

        let held = locks.acquire("d").await;
        let _e = locks.acquire("e").await;
        assert_eq!(locks.len(), 2);
        drop(held);
        drop(locks.acquire("f").await);
        assert_eq!(locks.len(), 2);
    }
}
