//! Per-key async mutual exclusion
//!
//! Serializes lookup-or-create through commit for messages that address the
//! same external entity, while messages for different entities run in
//! parallel. Entries are dropped from the map once nobody holds or waits on
//! them.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type LockMap<K> = Arc<Mutex<HashMap<K, Slot>>>;

/// A key's mutex and the number of guards holding or waiting on it
#[derive(Default)]
struct Slot {
    mutex: Arc<AsyncMutex<()>>,
    users: usize,
}

pub struct KeyedLock<K> {
    locks: LockMap<K>,
}

impl<K> Default for KeyedLock<K> {
    fn default() -> Self {
        Self {
            locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl<K: Eq + Hash + Ord + Clone> KeyedLock<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until `key` is free and take it
    ///
    /// Cancel safe: dropping the future while it waits releases its claim on
    /// the map entry.
    pub async fn lock(&self, key: K) -> KeyedGuard<K> {
        let mutex = {
            let mut locks = self.locks.lock().unwrap_or_else(|p| p.into_inner());
            let slot = locks.entry(key.clone()).or_default();
            slot.users += 1;
            slot.mutex.clone()
        };

        let mut pending = KeyedGuard {
            key,
            guard: None,
            locks: self.locks.clone(),
        };
        pending.guard = Some(mutex.lock_owned().await);
        pending
    }

    /// Take several keys in ascending order
    ///
    /// Duplicate keys are taken once. A fixed order keeps two batches with
    /// overlapping keys from deadlocking.
    pub async fn lock_many(&self, keys: impl IntoIterator<Item = K>) -> Vec<KeyedGuard<K>> {
        let mut keys: Vec<K> = keys.into_iter().collect();
        keys.sort();
        keys.dedup();

        let mut guards = Vec::with_capacity(keys.len());
        for key in keys {
            guards.push(self.lock(key).await);
        }
        guards
    }

    /// Number of keys currently held or waited on
    pub fn active_keys(&self) -> usize {
        self.locks.lock().unwrap_or_else(|p| p.into_inner()).len()
    }
}

/// Releases its key when dropped
///
/// Also created before the wait in [`KeyedLock::lock`], so an abandoned wait
/// gives its slot back the same way.
pub struct KeyedGuard<K: Eq + Hash> {
    key: K,
    guard: Option<OwnedMutexGuard<()>>,
    locks: LockMap<K>,
}

impl<K: Eq + Hash> KeyedGuard<K> {
    pub fn key(&self) -> &K {
        &self.key
    }
}

impl<K: Eq + Hash> Drop for KeyedGuard<K> {
    fn drop(&mut self) {
        self.guard.take();

        let mut locks = self.locks.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(slot) = locks.get_mut(&self.key) {
            slot.users -= 1;
            if slot.users == 0 {
                locks.remove(&self.key);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_key_is_exclusive() {
        let locks = Arc::new(KeyedLock::new());
        let guard = locks.lock(1).await;

        let contender = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _guard = locks.lock(1).await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        drop(guard);
        contender.await.unwrap();
        assert_eq!(locks.active_keys(), 0);
    }

    #[tokio::test]
    async fn test_different_keys_do_not_block() {
        let locks = KeyedLock::new();
        let _a = locks.lock("a").await;

        let b = tokio::time::timeout(Duration::from_millis(100), locks.lock("b")).await;
        assert!(b.is_ok());
        assert_eq!(locks.active_keys(), 2);
    }

    #[tokio::test]
    async fn test_lock_many_sorts_and_dedups() {
        let locks = KeyedLock::new();
        let guards = locks.lock_many(vec![3, 1, 3, 2]).await;

        let keys: Vec<i32> = guards.iter().map(|g| *g.key()).collect();
        assert_eq!(keys, vec![1, 2, 3]);

        drop(guards);
        assert_eq!(locks.active_keys(), 0);
    }

    #[tokio::test]
    async fn test_abandoned_wait_does_not_leak_entry() {
        let locks = KeyedLock::new();
        let holder = locks.lock(1).await;

        let waited = tokio::time::timeout(Duration::from_millis(20), locks.lock(1)).await;
        assert!(waited.is_err());
        assert_eq!(locks.active_keys(), 1);

        drop(holder);
        assert_eq!(locks.active_keys(), 0);

        // The key is still usable after the abandoned wait
        let again = tokio::time::timeout(Duration::from_millis(100), locks.lock(1)).await;
        assert!(again.is_ok());
    }
}
