//! Named mutual exclusion keyed by string
//!
//! Each key gets a single-slot async mutex on first use. The registry entry
//! is dropped again once nobody holds or waits on the slot, so the map only
//! ever contains keys with work in flight.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{Mutex as SlotMutex, OwnedMutexGuard};
use tracing::trace;

type Slot = Arc<SlotMutex<()>>;

/// Registry of per-key slots
#[derive(Debug, Default)]
pub struct KeyedLock {
    slots: Mutex<HashMap<String, Slot>>,
}

impl KeyedLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the slot for `key`, waiting while another caller holds it
    pub async fn acquire(&self, key: &str) -> KeyGuard<'_> {
        let (slot, waiting) = {
            let mut slots = self.registry();
            let slot = slots.entry(key.to_string()).or_default();
            (Arc::clone(slot), Arc::clone(slot))
        };
        // Built before waiting so a cancelled acquire still cleans up the entry.
        let mut guard = KeyGuard {
            owner: self,
            key: key.to_string(),
            slot,
            permit: None,
        };
        guard.permit = Some(waiting.lock_owned().await);
        trace!("acquired slot for {}", key);
        guard
    }

    /// Number of keys currently held or waited on
    pub fn in_flight(&self) -> usize {
        self.registry().len()
    }

    /// Whether `key` is currently held or waited on
    pub fn contains(&self, key: &str) -> bool {
        self.registry().contains_key(key)
    }

    fn registry(&self) -> MutexGuard<'_, HashMap<String, Slot>> {
        // The map is always left consistent, so a poisoned lock is still usable.
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Holds a key's slot until dropped
#[derive(Debug)]
pub struct KeyGuard<'a> {
    owner: &'a KeyedLock,
    key: String,
    slot: Slot,
    permit: Option<OwnedMutexGuard<()>>,
}

impl KeyGuard<'_> {
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Release the slot now instead of at end of scope
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for KeyGuard<'_> {
    fn drop(&mut self) {
        drop(self.permit.take());

        // Clones are only made under the registry lock, so a count of two
        // (registry + this guard) means no waiter still needs the entry.
        let mut slots = self.owner.registry();
        let unused = slots
            .get(&self.key)
            .is_some_and(|slot| Arc::ptr_eq(slot, &self.slot) && Arc::strong_count(slot) == 2);
        if unused {
            slots.remove(&self.key);
            trace!("released last holder of {}", self.key);
        }
    }
}
