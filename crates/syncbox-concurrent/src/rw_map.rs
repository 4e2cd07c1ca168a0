use crossbeam_utils::CachePadded;
use hashbrown::hash_map::{Entry, HashMap as HbHashMap};
use parking_lot::RwLock;
use rustc_hash::FxHasher;
use std::borrow::Borrow;
use std::fmt;
use std::hash::{BuildHasherDefault, Hash};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use syncbox_core::{Diagnostics, MapPolicy, MapSnapshot, MAP_TYPVER};
use tracing::{debug, trace};

/// Shared-ownership handle to a stored value. Stays valid after the entry is removed.
pub type Handle<V> = Arc<V>;

type Table<K, V> = HbHashMap<K, Handle<V>, BuildHasherDefault<FxHasher>>;

/// Reader-writer locked hash map with `Arc` values and a configurable collision policy.
///
/// Lookups, scans and snapshots share the lock; `add*`, `remove` and `clear`
/// take it exclusively. The lock is `parking_lot::RwLock`, which is task-fair:
/// once a writer is queued, new readers wait behind it, so neither side starves.
///
/// Collision policy, checked in this order when the key already exists:
/// 1. `fail_on_collision`: return `None`, leave the entry alone
/// 2. `replace_existing`: overwrite and return the new handle
/// 3. otherwise: return the existing handle
pub struct ConcurrentMap<K, V> {
    table: RwLock<Table<K, V>>,
    replace_existing: AtomicBool,
    fail_on_collision: AtomicBool,
    adds: CachePadded<AtomicU64>,
    removes: CachePadded<AtomicU64>,
}

impl<K: Eq + Hash, V> ConcurrentMap<K, V> {
    pub fn new() -> Self {
        Self::with_policy(MapPolicy::default())
    }

    pub fn with_policy(policy: MapPolicy) -> Self {
        Self::from_table(Table::default(), policy)
    }

    pub fn with_capacity(n: usize) -> Self {
        Self::from_table(
            Table::with_capacity_and_hasher(n, BuildHasherDefault::<FxHasher>::default()),
            MapPolicy::default(),
        )
    }

    fn from_table(table: Table<K, V>, policy: MapPolicy) -> Self {
        Self {
            table: RwLock::new(table),
            replace_existing: AtomicBool::new(policy.replace_existing),
            fail_on_collision: AtomicBool::new(policy.fail_on_collision),
            adds: CachePadded::new(AtomicU64::new(0)),
            removes: CachePadded::new(AtomicU64::new(0)),
        }
    }

    /// Store `value` under `key`, wrapping it in a new handle.
    ///
    /// Returns the stored handle, the existing one on a non-replacing
    /// collision, or `None` when the collision is rejected.
    pub fn add(&self, key: K, value: V) -> Option<Handle<V>> {
        self.insert_with(key, None, move |_| Arc::new(value))
    }

    /// Store an already shared handle under `key`.
    pub fn add_shared(&self, key: K, handle: Handle<V>) -> Option<Handle<V>> {
        self.insert_with(key, None, move |_| handle)
    }

    /// Build the value lazily from the key.
    ///
    /// `factory` runs under the write lock, and only if the value will actually
    /// be stored. It must not touch this map.
    pub fn add_with<F, R>(&self, key: K, factory: F) -> Option<Handle<V>>
    where
        F: FnOnce(&K) -> R,
        R: Into<Handle<V>>,
    {
        self.insert_with(key, None, move |k| factory(k).into())
    }

    /// Like [`add`](Self::add), with a per-call policy instead of the shared flags.
    pub fn add_with_policy(&self, key: K, value: V, policy: MapPolicy) -> Option<Handle<V>> {
        self.insert_with(key, Some(policy), move |_| Arc::new(value))
    }

    fn insert_with<F>(&self, key: K, policy: Option<MapPolicy>, make: F) -> Option<Handle<V>>
    where
        F: FnOnce(&K) -> Handle<V>,
    {
        let mut table = self.table.write();
        // One read of the flags per call, so a concurrent toggle never splits a decision
        let policy = policy.unwrap_or_else(|| self.policy());

        match table.entry(key) {
            Entry::Vacant(slot) => {
                let handle = make(slot.key());
                slot.insert(handle.clone());
                self.adds.fetch_add(1, Ordering::Release);
                Some(handle)
            }
            Entry::Occupied(mut slot) => {
                if policy.fail_on_collision {
                    trace!("collision rejected");
                    return None;
                }
                if !policy.replace_existing {
                    trace!("collision, returning existing entry");
                    return Some(slot.get().clone());
                }
                let handle = make(slot.key());
                slot.insert(handle.clone());
                self.adds.fetch_add(1, Ordering::Release);
                trace!("collision, replaced existing entry");
                Some(handle)
            }
        }
    }

    /// Erase `key`, handing back its handle.
    pub fn remove<Q>(&self, key: &Q) -> Option<Handle<V>>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let mut table = self.table.write();
        let removed = table.remove(key);
        if removed.is_some() {
            self.removes.fetch_add(1, Ordering::Release);
        }
        removed
    }

    /// Remove every entry; returns how many were dropped from the table.
    pub fn clear(&self) -> usize {
        let mut table = self.table.write();
        let n = table.len();
        table.clear();
        self.removes.fetch_add(n as u64, Ordering::Release);
        debug!("cleared {} entries", n);
        n
    }

    pub fn find<Q>(&self, key: &Q) -> Option<Handle<V>>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.table.read().get(key).cloned()
    }

    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.table.read().contains_key(key)
    }

    /// Return the first entry accepted by `predicate`.
    ///
    /// The read lock is held for the whole walk, which stalls writers; keep the
    /// predicate short and never call back into this map from it. Iteration
    /// order is unspecified.
    pub fn scan<F>(&self, mut predicate: F) -> Option<Handle<V>>
    where
        F: FnMut(&K, &Handle<V>) -> bool,
    {
        let table = self.table.read();
        table
            .iter()
            .find(|&(k, v)| predicate(k, v))
            .map(|(_, v)| v.clone())
    }

    pub fn size(&self) -> usize {
        self.table.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.read().is_empty()
    }
}

impl<K, V> ConcurrentMap<K, V> {
    #[inline]
    pub fn add_counter(&self) -> u64 {
        self.adds.load(Ordering::Acquire)
    }

    #[inline]
    pub fn remove_counter(&self) -> u64 {
        self.removes.load(Ordering::Acquire)
    }

    pub fn replace_existing(&self) -> bool {
        self.replace_existing.load(Ordering::Acquire)
    }

    pub fn set_replace_existing(&self, on: bool) {
        self.replace_existing.store(on, Ordering::Release);
    }

    pub fn fail_on_collision(&self) -> bool {
        self.fail_on_collision.load(Ordering::Acquire)
    }

    pub fn set_fail_on_collision(&self, on: bool) {
        self.fail_on_collision.store(on, Ordering::Release);
    }

    pub fn policy(&self) -> MapPolicy {
        MapPolicy {
            replace_existing: self.replace_existing(),
            fail_on_collision: self.fail_on_collision(),
        }
    }

    pub fn set_policy(&self, policy: MapPolicy) {
        self.set_replace_existing(policy.replace_existing);
        self.set_fail_on_collision(policy.fail_on_collision);
    }
}

impl<K: Eq + Hash, V> Default for ConcurrentMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> fmt::Debug for ConcurrentMap<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConcurrentMap")
            .field("size", &self.table.read().len())
            .field("adds", &self.add_counter())
            .field("removes", &self.remove_counter())
            .field("policy", &self.policy())
            .finish()
    }
}

impl<K, V> Diagnostics for ConcurrentMap<K, V> {
    type Snapshot = MapSnapshot;

    fn snapshot(&self) -> MapSnapshot {
        let table = self.table.read();
        MapSnapshot {
            typver: MAP_TYPVER.to_string(),
            adds: self.add_counter(),
            removes: self.remove_counter(),
            replace_existing: self.replace_existing(),
            fail_on_collision: self.fail_on_collision(),
            size: table.len(),
        }
    }
}
