// src/locks.rs
//! Per-key async mutual exclusion.
//!
//! Used to serialize read-modify-write sequences per author and per
//! (poll, voter) inside one process. Slots are dropped again once nobody
//! holds or waits on them.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

#[derive(Debug)]
pub struct KeyedLocks<K> {
    slots: Mutex<HashMap<K, Arc<AsyncMutex<()>>>>,
}

impl<K> Default for KeyedLocks<K> {
    fn default() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
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

    /// Wait for exclusive access to `key`. Released when the guard drops.
    pub async fn lock(&self, key: K) -> OwnedMutexGuard<()> {
        let slot = {
            let mut slots = self.slots.lock();
            // Only the map holds an idle slot's Arc.
            slots.retain(|_, slot| Arc::strong_count(slot) > 1);
            slots.entry(key).or_default().clone()
        };
        slot.lock_owned().await
    }

    /// Keys currently held or waited on.
    #[cfg(test)]
    pub fn active(&self) -> usize {
        self.slots
            .lock()
            .values()
            .filter(|slot| Arc::strong_count(slot) > 1)
            .count()
    }
}
