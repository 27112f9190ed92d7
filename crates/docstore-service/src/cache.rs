//! Cache slots with load coalescing and dirty tracking.
//!
//! Per key, a slot moves through:
//!
//! ```text
//! Absent --lookup--> Loading --finish--> Present | Absent (miss) | Absent (failed)
//! Present --store_written--> Present (dirty) --mark_clean--> Present
//! Present --remove / clear--> Absent
//! ```
//!
//! While a key is `Loading`, further lookups subscribe to the in-flight load
//! instead of starting their own. The outcome is broadcast while the state
//! lock is held, so no subscriber can miss it.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::broadcast;
use tracing::warn;

use crate::error::{ServiceError, ServiceResult, Target};

/// Result of one repository load: a document, a miss, or a failure.
pub(crate) type LoadOutcome<D> = ServiceResult<Option<D>>;

pub(crate) enum Lookup<D> {
    /// The document is cached.
    Hit(D),
    /// Another caller is loading; await its outcome.
    Wait(broadcast::Receiver<LoadOutcome<D>>),
    /// Nobody is loading. The caller must load and call `finish_load`.
    Lead,
}

struct Entry<D> {
    doc: D,
    dirty: bool,
    version: u64,
}

struct InFlight<D> {
    tx: broadcast::Sender<LoadOutcome<D>>,
    /// Set when the slot was written, removed, or cleared during the load.
    /// The loaded value is still delivered to waiters but not cached.
    invalidated: bool,
}

struct CacheState<K, D> {
    entries: BTreeMap<K, Entry<D>>,
    loading: BTreeMap<K, InFlight<D>>,
    next_version: u64,
}

impl<K: Ord, D> CacheState<K, D> {
    fn bump(&mut self) -> u64 {
        self.next_version += 1;
        self.next_version
    }

    fn invalidate(&mut self, key: &K) {
        if let Some(flight) = self.loading.get_mut(key) {
            flight.invalidated = true;
        }
    }
}

/// A dirty slot awaiting persistence.
pub(crate) struct DirtySlot<K, D> {
    pub key: K,
    pub doc: D,
    pub version: u64,
}

/// The shared cache of one storage service.
///
/// The singleton service uses `K = ()`.
pub(crate) struct CacheSlots<K, D> {
    state: Mutex<CacheState<K, D>>,
}

impl<K: Ord + Clone, D: Clone> CacheSlots<K, D> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(CacheState {
                entries: BTreeMap::new(),
                loading: BTreeMap::new(),
                next_version: 0,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CacheState<K, D>> {
        // Every critical section leaves the maps consistent before it can
        // panic, so a poisoned lock is safe to reuse.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Peek at the cached document without touching the repository.
    pub fn get(&self, key: &K) -> Option<D> {
        self.lock().entries.get(key).map(|e| e.doc.clone())
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_dirty(&self, key: &K) -> bool {
        self.lock().entries.get(key).is_some_and(|e| e.dirty)
    }

    /// Resolve a read: cached, already loading, or the caller leads a load.
    pub fn lookup(&self, key: &K) -> Lookup<D> {
        let mut state = self.lock();
        if let Some(entry) = state.entries.get(key) {
            return Lookup::Hit(entry.doc.clone());
        }
        if let Some(flight) = state.loading.get(key) {
            return Lookup::Wait(flight.tx.subscribe());
        }
        let (tx, _) = broadcast::channel(1);
        state.loading.insert(
            key.clone(),
            InFlight {
                tx,
                invalidated: false,
            },
        );
        Lookup::Lead
    }

    /// Complete the load started by a [`Lookup::Lead`].
    ///
    /// A document written while the load was in flight wins over the loaded
    /// one. Returns the outcome delivered to every waiter.
    pub fn finish_load(&self, key: &K, outcome: LoadOutcome<D>) -> LoadOutcome<D> {
        let mut state = self.lock();
        let flight = state.loading.remove(key);
        let invalidated = flight.as_ref().is_some_and(|f| f.invalidated);

        let resolved = match state.entries.get(key) {
            Some(entry) => Ok(Some(entry.doc.clone())),
            None => {
                if let (Ok(Some(doc)), false) = (&outcome, invalidated) {
                    let version = state.bump();
                    state.entries.insert(
                        key.clone(),
                        Entry {
                            doc: doc.clone(),
                            dirty: false,
                            version,
                        },
                    );
                }
                outcome
            }
        };

        if let Some(flight) = flight {
            // No receivers is fine: nobody else was waiting.
            let _ = flight.tx.send(resolved.clone());
        }
        resolved
    }

    /// Cache a document read from the repository outside of a coalesced
    /// load. An unsaved write already in the slot is kept and returned.
    pub fn store_loaded(&self, key: K, doc: D) -> D {
        let mut state = self.lock();
        if let Some(entry) = state.entries.get(&key) {
            if entry.dirty {
                return entry.doc.clone();
            }
        }
        let version = state.bump();
        state.entries.insert(
            key,
            Entry {
                doc: doc.clone(),
                dirty: false,
                version,
            },
        );
        doc
    }

    /// Replace the slot with a freshly reloaded document, or drop it on a
    /// miss. Returns `true` if an unsaved write was discarded.
    pub fn replace(&self, key: K, doc: Option<D>) -> bool {
        let mut state = self.lock();
        state.invalidate(&key);
        match doc {
            Some(doc) => {
                let version = state.bump();
                state
                    .entries
                    .insert(
                        key,
                        Entry {
                            doc,
                            dirty: false,
                            version,
                        },
                    )
                    .is_some_and(|old| old.dirty)
            }
            None => state.entries.remove(&key).is_some_and(|old| old.dirty),
        }
    }

    /// Record a write. The slot is dirty until [`mark_clean`](Self::mark_clean)
    /// is called with the returned version.
    pub fn store_written(&self, key: K, doc: D) -> u64 {
        let mut state = self.lock();
        state.invalidate(&key);
        let version = state.bump();
        state.entries.insert(
            key,
            Entry {
                doc,
                dirty: true,
                version,
            },
        );
        version
    }

    /// Mark the slot persisted, unless it was written again since `version`.
    pub fn mark_clean(&self, key: &K, version: u64) {
        if let Some(entry) = self.lock().entries.get_mut(key) {
            if entry.version == version {
                entry.dirty = false;
            }
        }
    }

    /// Evict one slot. Returns the document and whether it was dirty.
    pub fn remove(&self, key: &K) -> Option<(D, bool)> {
        let mut state = self.lock();
        state.invalidate(key);
        state.entries.remove(key).map(|e| (e.doc, e.dirty))
    }

    /// Evict everything. Returns the number of dirty slots dropped.
    pub fn clear(&self) -> usize {
        let mut state = self.lock();
        for flight in state.loading.values_mut() {
            flight.invalidated = true;
        }
        let dirty = state.entries.values().filter(|e| e.dirty).count();
        state.entries.clear();
        dirty
    }

    /// Snapshot of every dirty slot.
    pub fn dirty(&self) -> Vec<DirtySlot<K, D>> {
        self.lock()
            .entries
            .iter()
            .filter(|(_, e)| e.dirty)
            .map(|(k, e)| DirtySlot {
                key: k.clone(),
                doc: e.doc.clone(),
                version: e.version,
            })
            .collect()
    }
}

/// Ownership of one in-flight load.
///
/// Finishing consumes the guard. If the guard is dropped unfinished (the load
/// panicked or its task never ran) waiters are released with a worker error.
pub(crate) struct PendingLoad<K: Ord + Clone, D: Clone> {
    cache: Arc<CacheSlots<K, D>>,
    key: Option<K>,
    op: &'static str,
    target: Target,
}

impl<K: Ord + Clone, D: Clone> PendingLoad<K, D> {
    pub fn new(cache: Arc<CacheSlots<K, D>>, key: K, op: &'static str, target: Target) -> Self {
        Self {
            cache,
            key: Some(key),
            op,
            target,
        }
    }

    pub fn finish(mut self, outcome: LoadOutcome<D>) -> LoadOutcome<D> {
        match self.key.take() {
            Some(key) => self.cache.finish_load(&key, outcome),
            None => outcome,
        }
    }
}

impl<K: Ord + Clone, D: Clone> Drop for PendingLoad<K, D> {
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            warn!(op = self.op, target = %self.target, "load abandoned");
            let err = ServiceError::worker(self.op, self.target.clone(), "load abandoned");
            let _ = self.cache.finish_load(&key, Err(err));
        }
    }
}

/// Await the outcome of a load led by another caller.
pub(crate) async fn wait_for_load<D: Clone>(
    mut rx: broadcast::Receiver<LoadOutcome<D>>,
    op: &'static str,
    target: Target,
) -> LoadOutcome<D> {
    match rx.recv().await {
        Ok(outcome) => outcome,
        Err(e) => Err(ServiceError::worker(op, target, e)),
    }
}
