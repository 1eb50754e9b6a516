//! crates/timecharge_core/src/serializer.rs
//!
//! Serializes ledger mutations per key. Each key gets its own async mutex,
//! created on first use and dropped from the arena once nobody holds or
//! waits for it, so unrelated users never contend.

use dashmap::DashMap;
use std::hash::Hash;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

pub struct KeyedLocks<K>
where
    K: Eq + Hash + Clone,
{
    arena: Arc<DashMap<K, Arc<Mutex<()>>>>,
}

impl<K> Default for KeyedLocks<K>
where
    K: Eq + Hash + Clone,
{
    fn default() -> Self {
        Self {
            arena: Arc::new(DashMap::new()),
        }
    }
}

impl<K> KeyedLocks<K>
where
    K: Eq + Hash + Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for exclusive access to `key`. Released when the guard drops,
    /// on every exit path.
    pub async fn lock(&self, key: K) -> KeyGuard<K> {
        let mutex = self.arena.entry(key.clone()).or_default().clone();
        let guard = mutex.lock_owned().await;
        KeyGuard {
            key,
            arena: self.arena.clone(),
            _guard: guard,
        }
    }

    /// Number of keys currently held or awaited.
    pub fn active_keys(&self) -> usize {
        self.arena.len()
    }
}

/// Exclusive access to one key.
pub struct KeyGuard<K>
where
    K: Eq + Hash + Clone,
{
    key: K,
    arena: Arc<DashMap<K, Arc<Mutex<()>>>>,
    _guard: OwnedMutexGuard<()>,
}

impl<K> Drop for KeyGuard<K>
where
    K: Eq + Hash + Clone,
{
    fn drop(&mut self) {
        // The arena and this guard's mutex handle are the only references
        // when nobody else is waiting. Waiters clone the handle under the
        // shard lock, so the check cannot race with a new arrival.
        self.arena
            .remove_if(&self.key, |_, mutex| Arc::strong_count(mutex) <= 2);
    }
}
