//! Synchronization primitives for the rendering pipeline.
//!
//! - [`KeyedLocks`]: one mutex per key, created on demand and dropped when
//!   nobody holds or waits for it. Lock identity depends only on the key,
//!   never on which in-memory object happens to describe it.
//! - [`ResizeSlots`]: a counting semaphore bounding how many CPU-heavy
//!   operations run at once. Slots are returned by an RAII guard, so an
//!   error or panic in the guarded work cannot leak one.
//!
//! Poisoned mutexes are recovered rather than propagated: the protected
//! state is either `()` or a counter that stays consistent across a panic.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

fn relock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A table of mutexes keyed by `K`.
#[derive(Debug)]
pub struct KeyedLocks<K> {
    table: Mutex<HashMap<K, Arc<Mutex<()>>>>,
}

impl<K: Eq + Hash + Clone> KeyedLocks<K> {
    pub fn new() -> Self {
        Self {
            table: Mutex::new(HashMap::new()),
        }
    }

    /// Run `f` while holding the lock for `key`. Calls for different keys
    /// run concurrently; calls for the same key run one at a time.
    pub fn with_lock<R>(&self, key: &K, f: impl FnOnce() -> R) -> R {
        let held = Held {
            table: &self.table,
            key,
            lock: relock(&self.table).entry(key.clone()).or_default().clone(),
        };
        // Dropped before `held`, so the key is unlocked before cleanup
        let _guard = relock(&held.lock);
        f()
    }

    /// Number of keys currently locked or waited on.
    pub fn len(&self) -> usize {
        relock(&self.table).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K: Eq + Hash + Clone> Default for KeyedLocks<K> {
    fn default() -> Self {
        Self::new()
    }
}

/// One caller's claim on a key. Dropping it, on return or unwind, removes
/// the key from the table when no other caller holds or waits for it.
struct Held<'a, K: Eq + Hash> {
    table: &'a Mutex<HashMap<K, Arc<Mutex<()>>>>,
    key: &'a K,
    lock: Arc<Mutex<()>>,
}

impl<K: Eq + Hash> Drop for Held<'_, K> {
    fn drop(&mut self) {
        // The table holds one reference and we hold another. Anything more
        // is a waiter that cloned it under the table lock, which we now hold.
        let mut table = relock(self.table);
        if Arc::strong_count(&self.lock) == 2 {
            table.remove(self.key);
        }
    }
}

/// Counting semaphore with a fixed number of slots.
#[derive(Debug)]
pub struct ResizeSlots {
    capacity: usize,
    available: Mutex<usize>,
    freed: Condvar,
}

/// A held slot; dropping it hands the slot back.
#[derive(Debug)]
pub struct SlotGuard<'a> {
    slots: &'a ResizeSlots,
}

impl ResizeSlots {
    /// `capacity` is raised to 1 if zero.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            available: Mutex::new(capacity),
            freed: Condvar::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Block until a slot is free and take it.
    pub fn acquire(&self) -> SlotGuard<'_> {
        let mut available = relock(&self.available);
        while *available == 0 {
            available = self
                .freed
                .wait(available)
                .unwrap_or_else(PoisonError::into_inner);
        }
        *available -= 1;
        SlotGuard { slots: self }
    }

    /// Slots currently taken.
    pub fn in_use(&self) -> usize {
        self.capacity - *relock(&self.available)
    }
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        let mut available = relock(&self.slots.available);
        *available += 1;
        self.slots.freed.notify_one();
    }
}
