//! Compile-once cache shared by the builder and formatter levels.
//!
//! Each key owns a slot. A lookup clones the slot handle under the map's read
//! lock, releases the map, then locks the slot. The first caller to lock an
//! empty slot compiles; concurrent callers for the same key block on the slot
//! and reuse the value. Different keys compile in parallel.
//!
//! Lock order: the map lock is never acquired while a slot lock is held by
//! the same thread.

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::hash::Hash;
use core::num::NonZeroUsize;
use core::sync::atomic::{AtomicU64, Ordering};

use indexmap::{Equivalent, IndexMap};
use parking_lot::{Mutex, RwLock};

/// How a lookup was satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Lookup {
    /// The value was already cached
    Hit,
    /// This caller compiled the value
    Compiled {
        /// Entries evicted to stay within capacity
        evicted: usize,
    },
}

struct Slot<V> {
    value: Mutex<Option<Arc<V>>>,
    last_used: AtomicU64,
}

impl<V> Slot<V> {
    fn new(tick: u64) -> Self {
        Self {
            value: Mutex::new(None),
            last_used: AtomicU64::new(tick),
        }
    }
}

pub(crate) struct OnceCache<K, V> {
    entries: RwLock<IndexMap<K, Arc<Slot<V>>>>,
    capacity: Option<NonZeroUsize>,
    clock: AtomicU64,
}

impl<K, V> core::fmt::Debug for OnceCache<K, V> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("OnceCache")
            .field("slots", &self.entries.read().len())
            .field("capacity", &self.capacity)
            .finish_non_exhaustive()
    }
}

impl<K: Hash + Eq, V> OnceCache<K, V> {
    pub(crate) fn new(capacity: Option<NonZeroUsize>) -> Self {
        Self {
            entries: RwLock::new(IndexMap::new()),
            capacity,
            clock: AtomicU64::new(0),
        }
    }

    /// Returns the cached value for `key`, compiling it with `compile` if absent.
    ///
    /// A failed compile is not cached: the slot is removed again, so the
    /// cache looks as it did before the call.
    pub(crate) fn get_or_try_insert_with<Q, E>(
        &self,
        key: &Q,
        compile: impl FnOnce() -> Result<V, E>,
    ) -> Result<(Arc<V>, Lookup), E>
    where
        Q: ?Sized + Hash + Equivalent<K> + alloc::borrow::ToOwned,
        Q::Owned: Into<K>,
    {
        let tick = self.clock.fetch_add(1, Ordering::Relaxed);

        // Fast path: read lock only
        let existing = self.entries.read().get(key).cloned();
        let slot = match existing {
            Some(slot) => slot,
            None => {
                let mut entries = self.entries.write();
                match entries.get(key) {
                    Some(slot) => Arc::clone(slot),
                    None => {
                        let slot = Arc::new(Slot::new(tick));
                        entries.insert(key.to_owned().into(), Arc::clone(&slot));
                        slot
                    }
                }
            }
        };
        slot.last_used.store(tick, Ordering::Relaxed);

        let mut guard = slot.value.lock();
        if let Some(value) = guard.as_ref() {
            return Ok((Arc::clone(value), Lookup::Hit));
        }

        match compile() {
            Ok(value) => {
                let value = Arc::new(value);
                *guard = Some(Arc::clone(&value));
                drop(guard);
                let evicted = self.settle(key, &slot);
                Ok((value, Lookup::Compiled { evicted }))
            }
            Err(err) => {
                drop(guard);
                self.discard(key, &slot);
                Err(err)
            }
        }
    }

    /// Makes sure a freshly compiled slot is reachable, then evicts least
    /// recently used entries beyond capacity.
    fn settle<Q>(&self, key: &Q, slot: &Arc<Slot<V>>) -> usize
    where
        Q: ?Sized + Hash + Equivalent<K> + alloc::borrow::ToOwned,
        Q::Owned: Into<K>,
    {
        let mut entries = self.entries.write();
        // the slot may have been dropped by a failed compile or an eviction
        // while this caller was waiting on it
        if entries.get(key).is_none() {
            entries.insert(key.to_owned().into(), Arc::clone(slot));
        }

        let Some(capacity) = self.capacity else {
            return 0;
        };

        let mut evicted = 0;
        while entries.len() > capacity.get() {
            let victim = entries
                .iter()
                .enumerate()
                .filter(|(_, (_, candidate))| !Arc::ptr_eq(candidate, slot))
                .min_by_key(|(_, (_, candidate))| candidate.last_used.load(Ordering::Relaxed))
                .map(|(index, _)| index);
            let Some(victim) = victim else {
                break;
            };
            entries.shift_remove_index(victim);
            evicted += 1;
        }
        evicted
    }

    fn discard<Q>(&self, key: &Q, slot: &Arc<Slot<V>>)
    where
        Q: ?Sized + Hash + Equivalent<K>,
    {
        let mut entries = self.entries.write();
        let stale = entries
            .get(key)
            .is_some_and(|current| Arc::ptr_eq(current, slot) && current.value.lock().is_none());
        if stale {
            entries.shift_remove(key);
        }
    }

    fn slots(&self) -> Vec<Arc<Slot<V>>> {
        self.entries.read().values().cloned().collect()
    }

    /// Every compiled value, in insertion order.
    pub(crate) fn ready_values(&self) -> Vec<Arc<V>> {
        self.slots()
            .into_iter()
            .filter_map(|slot| slot.value.lock().clone())
            .collect()
    }

    /// Number of compiled values.
    pub(crate) fn len(&self) -> usize {
        self.slots()
            .into_iter()
            .filter(|slot| slot.value.lock().is_some())
            .count()
    }
}
