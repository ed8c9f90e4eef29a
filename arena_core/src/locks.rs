//! Per-entity async locks.
//!
//! A [`KeyedLocks`] hands out one tokio mutex per key. Guards are owned, so a
//! caller can hold them across `.await` points and they release on every
//! return path.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Entries beyond this many trigger a sweep of unused locks
const PRUNE_THRESHOLD: usize = 1024;

/// Guard for one key
pub type KeyGuard = OwnedMutexGuard<()>;

/// Map of lazily-created mutexes
pub struct KeyedLocks<K> {
    locks: Mutex<HashMap<K, Arc<Mutex<()>>>>,
}

impl<K> Default for KeyedLocks<K> {
    fn default() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
        }
    }
}

impl<K: Eq + Hash + Ord + Copy> KeyedLocks<K> {
    pub fn new() -> Self {
        Self::default()
    }

    async fn handle(&self, key: K) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        if locks.len() > PRUNE_THRESHOLD {
            // Only the map holds an unused lock.
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        }
        Arc::clone(locks.entry(key).or_default())
    }

    /// Wait for exclusive access to `key`
    pub async fn acquire(&self, key: K) -> KeyGuard {
        self.handle(key).await.lock_owned().await
    }

    /// Lock several keys in ascending order, skipping duplicates
    pub async fn acquire_many(&self, keys: impl IntoIterator<Item = K>) -> Vec<KeyGuard> {
        let mut keys: Vec<K> = keys.into_iter().collect();
        keys.sort_unstable();
        keys.dedup();

        let mut guards = Vec::with_capacity(keys.len());
        for key in keys {
            guards.push(self.acquire(key).await);
        }
        guards
    }

    /// Number of tracked keys
    pub async fn len(&self) -> usize {
        self.locks.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
