// src/core/database/core.rs

use crate::core::KyaniteError;
use crate::core::pubsub::PubSubHub;
use crate::core::state::ServerStats;
use crate::core::storage::{StoredValue, Value};
use bytes::Bytes;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use rand::SeedableRng;
use rand::seq::IteratorRandom;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use super::eviction::PoolEntry;

/// Milliseconds since the unix epoch; the time base for the expire index.
pub fn now_unix_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum PushDirection {
    Left,
    Right,
}

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum PopDirection {
    Left,
    Right,
}

/// A session waiting for data on a key (blocking list pop).
#[derive(Debug, Clone)]
pub struct Waiter {
    pub session_id: u64,
    pub direction: PopDirection,
    /// Destination key for the atomic pop-and-push form.
    pub target: Option<Bytes>,
}

/// `Db` is one logical database. All structural state lives in `DbInner`
/// behind the database's single reader/writer lock; the atomics outside the
/// lock serve lock-free introspection (`DBSIZE`, memory accounting).
#[derive(Debug)]
pub struct Db {
    pub index: usize,
    inner: RwLock<DbInner>,
    used_memory: Arc<AtomicUsize>,
    key_count: Arc<AtomicUsize>,
    /// Running average TTL of sampled volatile keys, maintained by the
    /// active expiration cycle.
    pub avg_ttl_ms: AtomicU64,
}

impl Db {
    pub fn new(index: usize, stats: Arc<ServerStats>) -> Self {
        let used_memory = Arc::new(AtomicUsize::new(0));
        let key_count = Arc::new(AtomicUsize::new(0));
        Self {
            index,
            inner: RwLock::new(DbInner::new(
                index,
                used_memory.clone(),
                key_count.clone(),
                stats,
            )),
            used_memory,
            key_count,
            avg_ttl_ms: AtomicU64::new(0),
        }
    }

    /// Acquires the database lock in shared mode. Read-only commands use this.
    pub fn read(&self) -> RwLockReadGuard<'_, DbInner> {
        self.inner.read()
    }

    /// Acquires the database lock in exclusive mode.
    pub fn write(&self) -> RwLockWriteGuard<'_, DbInner> {
        self.inner.write()
    }

    /// Total number of keys, counted without taking the lock. Includes keys
    /// that are past their deadline but not yet reaped.
    pub fn key_count(&self) -> usize {
        self.key_count.load(Ordering::Relaxed)
    }

    /// Estimated bytes held by this database's keyspace.
    pub fn used_memory(&self) -> usize {
        self.used_memory.load(Ordering::Relaxed)
    }
}

/// The lock-protected structural state of one database.
#[derive(Debug)]
pub struct DbInner {
    pub index: usize,
    keyspace: HashMap<Bytes, StoredValue>,
    /// Absolute unix-millisecond deadlines. Invariant: subset of `keyspace`.
    expires: HashMap<Bytes, u64>,
    /// Sessions blocked per key, FIFO.
    blocked: HashMap<Bytes, VecDeque<Waiter>>,
    /// Reverse index: blocked session id -> keys it waits on.
    blocked_sessions: HashMap<u64, Vec<Bytes>>,
    /// Keys that just received data and have waiters to serve.
    ready_keys: VecDeque<Bytes>,
    ready_set: HashSet<Bytes>,
    /// WATCH index: key -> watching session ids.
    watched: HashMap<Bytes, HashSet<u64>>,
    /// Sessions whose watched keys were modified since they watched; drained
    /// by the command router while the write lock is still held.
    dirty_watchers: Vec<u64>,
    /// Publish/subscribe fan-out for channels homed in this database.
    pub pubsub: PubSubHub,
    /// Candidate buffer for the eviction policy, ascending idle order.
    pub(super) eviction_pool: Vec<PoolEntry>,
    used_memory: Arc<AtomicUsize>,
    key_count: Arc<AtomicUsize>,
    stats: Arc<ServerStats>,
}

impl DbInner {
    fn new(
        index: usize,
        used_memory: Arc<AtomicUsize>,
        key_count: Arc<AtomicUsize>,
        stats: Arc<ServerStats>,
    ) -> Self {
        Self {
            index,
            keyspace: HashMap::new(),
            expires: HashMap::new(),
            blocked: HashMap::new(),
            blocked_sessions: HashMap::new(),
            ready_keys: VecDeque::new(),
            ready_set: HashSet::new(),
            watched: HashMap::new(),
            dirty_watchers: Vec::new(),
            pubsub: PubSubHub::new(),
            eviction_pool: Vec::new(),
            used_memory,
            key_count,
            stats,
        }
    }

    fn adjust_memory(&self, delta: isize) {
        if delta >= 0 {
            self.used_memory.fetch_add(delta as usize, Ordering::Relaxed);
        } else {
            self.used_memory.fetch_sub((-delta) as usize, Ordering::Relaxed);
        }
    }

    // --- Keyspace primitives ---

    /// Looks up a key for reading. A key past its deadline is reported
    /// absent; reaping is left to the write path and the active cycle.
    pub fn lookup_read(&self, key: &Bytes, now_ms: u64) -> Option<&StoredValue> {
        if self.check_expired(key, now_ms) {
            self.stats.keyspace_misses.fetch_add(1, Ordering::Relaxed);
            return None;
        }
        let found = self.keyspace.get(key);
        if found.is_some() {
            self.stats.keyspace_hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.stats.keyspace_misses.fetch_add(1, Ordering::Relaxed);
        }
        found
    }

    /// Looks up a key for writing, lazily deleting it first if expired.
    pub fn lookup_write(&mut self, key: &Bytes, now_ms: u64) -> Option<&mut StoredValue> {
        self.expire_if_needed(key, now_ms);
        self.keyspace.get_mut(key)
    }

    /// A live entry without touching the hit/miss statistics. Internal
    /// machinery (blocking wake-ups, eviction) uses this.
    pub(super) fn peek_live(&self, key: &Bytes, now_ms: u64) -> Option<&StoredValue> {
        if self.check_expired(key, now_ms) {
            return None;
        }
        self.keyspace.get(key)
    }

    /// Inserts a new key. Precondition: the key is absent.
    pub fn add(&mut self, key: Bytes, value: StoredValue) -> Result<(), KyaniteError> {
        if self.keyspace.contains_key(&key) {
            return Err(KyaniteError::KeyExists);
        }
        self.adjust_memory((key.len() + value.size) as isize);
        self.key_count.fetch_add(1, Ordering::Relaxed);
        self.keyspace.insert(key, value);
        Ok(())
    }

    /// Replaces the value of an existing key. Precondition: the key is present.
    pub fn overwrite(&mut self, key: Bytes, value: StoredValue) -> Result<(), KyaniteError> {
        let Some(old) = self.keyspace.get_mut(&key) else {
            return Err(KyaniteError::KeyNotFound);
        };
        let delta = value.size as isize - old.size as isize;
        *old = value;
        self.adjust_memory(delta);
        Ok(())
    }

    /// Add-or-overwrite. An existing expire survives only if `keep_ttl`.
    pub fn set(&mut self, key: Bytes, value: StoredValue, keep_ttl: bool) {
        if !keep_ttl {
            self.expires.remove(&key);
        }
        match self.keyspace.get_mut(&key) {
            Some(old) => {
                let delta = value.size as isize - old.size as isize;
                *old = value;
                self.adjust_memory(delta);
            }
            None => {
                self.adjust_memory((key.len() + value.size) as isize);
                self.key_count.fetch_add(1, Ordering::Relaxed);
                self.keyspace.insert(key, value);
            }
        }
    }

    /// Removes a key, its expire entry and its watch dirtiness in one step.
    pub fn delete(&mut self, key: &Bytes) -> bool {
        match self.keyspace.remove(key) {
            Some(old) => {
                self.adjust_memory(-((key.len() + old.size) as isize));
                self.key_count.fetch_sub(1, Ordering::Relaxed);
                self.expires.remove(key);
                self.signal_modified_key(key);
                true
            }
            None => false,
        }
    }

    /// Moves `src` to `dst`, carrying the expire along and replacing any
    /// previous value at `dst`. Fails when `src` is absent.
    pub fn rename(&mut self, src: &Bytes, dst: &Bytes, now_ms: u64) -> Result<(), KyaniteError> {
        self.expire_if_needed(src, now_ms);
        if !self.keyspace.contains_key(src) {
            return Err(KyaniteError::KeyNotFound);
        }
        let expire = self.get_expire(src);
        let Some(value) = self.keyspace.remove(src) else {
            return Err(KyaniteError::KeyNotFound);
        };
        self.adjust_memory(-((src.len() + value.size) as isize));
        self.key_count.fetch_sub(1, Ordering::Relaxed);
        self.expires.remove(src);
        self.signal_modified_key(src);

        self.set(dst.clone(), value, false);
        if let Some(at) = expire {
            self.expires.insert(dst.clone(), at);
        }
        self.signal_modified_key(dst);
        self.signal_key_ready(dst);
        Ok(())
    }

    /// A uniformly random live key, or None when the database is empty.
    pub fn random_key(&self, now_ms: u64) -> Option<Bytes> {
        let mut rng = rand::rngs::SmallRng::from_entropy();
        self.keyspace
            .keys()
            .filter(|key| !self.check_expired(key, now_ms))
            .choose(&mut rng)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.keyspace.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keyspace.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &Bytes> {
        self.keyspace.keys()
    }

    /// Flushes the whole database in one locked phase, invoking the callback
    /// for every removed key. Watchers of any key in the database turn dirty.
    pub fn empty(&mut self, mut on_removed: impl FnMut(&Bytes)) -> usize {
        let removed = self.keyspace.len();
        let watcher_ids: Vec<u64> = self.watched.values().flatten().copied().collect();
        self.dirty_watchers.extend(watcher_ids);
        for key in self.keyspace.keys() {
            on_removed(key);
        }
        self.keyspace.clear();
        self.expires.clear();
        self.ready_keys.clear();
        self.ready_set.clear();
        self.eviction_pool.clear();
        self.used_memory.store(0, Ordering::Relaxed);
        self.key_count.store(0, Ordering::Relaxed);
        removed
    }

    // --- Mutation helpers keeping metadata and accounting in sync ---

    /// Applies `f` to a live entry, refreshing its access time, cached size
    /// and the database memory counter. Containers emptied by `f` are
    /// removed from the keyspace. Returns None when the key is absent.
    pub fn update<R>(
        &mut self,
        key: &Bytes,
        now_ms: u64,
        lru_clock: u32,
        f: impl FnOnce(&mut StoredValue) -> R,
    ) -> Option<R> {
        self.expire_if_needed(key, now_ms);
        let entry = self.keyspace.get_mut(key)?;
        let old_size = entry.size;
        let result = f(entry);
        entry.touch(lru_clock);
        let new_size = entry.size;
        let emptied = entry.data.is_empty_container();
        self.adjust_memory(new_size as isize - old_size as isize);
        if emptied {
            self.delete(key);
        }
        Some(result)
    }

    /// Like [`update`], but creates the entry with `default` when absent.
    pub fn update_or_create<R>(
        &mut self,
        key: &Bytes,
        now_ms: u64,
        lru_clock: u32,
        default: impl FnOnce() -> Value,
        f: impl FnOnce(&mut StoredValue) -> R,
    ) -> R {
        self.expire_if_needed(key, now_ms);
        if !self.keyspace.contains_key(key) {
            let value = StoredValue::new(default(), lru_clock);
            self.adjust_memory((key.len() + value.size) as isize);
            self.key_count.fetch_add(1, Ordering::Relaxed);
            self.keyspace.insert(key.clone(), value);
        }
        // The entry exists now; reuse the common path.
        self.update(key, now_ms, lru_clock, f)
            .expect("entry inserted above")
    }

    // --- Expiration ---

    /// True if the key carries a deadline at or before `now_ms`.
    pub fn check_expired(&self, key: &Bytes, now_ms: u64) -> bool {
        self.expires.get(key).is_some_and(|&at| at <= now_ms)
    }

    /// Deletes the key if it is past its deadline. Returns true on deletion.
    pub fn expire_if_needed(&mut self, key: &Bytes, now_ms: u64) -> bool {
        if !self.check_expired(key, now_ms) {
            return false;
        }
        self.delete(key);
        self.stats.expired_keys.fetch_add(1, Ordering::Relaxed);
        true
    }

    /// Attaches a deadline to an existing key. Returns false if the key is absent.
    pub fn set_expire(&mut self, key: &Bytes, at_ms: u64) -> bool {
        if !self.keyspace.contains_key(key) {
            return false;
        }
        self.expires.insert(key.clone(), at_ms);
        true
    }

    pub fn get_expire(&self, key: &Bytes) -> Option<u64> {
        self.expires.get(key).copied()
    }

    /// Removes a deadline, keeping the key. Returns true if one was removed.
    pub fn remove_expire(&mut self, key: &Bytes) -> bool {
        self.expires.remove(key).is_some()
    }

    pub fn expires_len(&self) -> usize {
        self.expires.len()
    }

    /// A random sample of up to `count` entries from the expire index.
    pub fn sample_expires(&self, count: usize) -> Vec<(Bytes, u64)> {
        let mut rng = rand::rngs::SmallRng::from_entropy();
        self.expires
            .iter()
            .choose_multiple(&mut rng, count)
            .into_iter()
            .map(|(k, &at)| (k.clone(), at))
            .collect()
    }

    /// Shrinks oversized tables whose fill ratio dropped below the low-water
    /// mark. Invoked by the background maintenance loop.
    pub fn resize_tables(&mut self) {
        const MIN_CAPACITY: usize = 128;
        if self.keyspace.capacity() > MIN_CAPACITY
            && self.keyspace.capacity() > self.keyspace.len().saturating_mul(4)
        {
            self.keyspace.shrink_to_fit();
        }
        if self.expires.capacity() > MIN_CAPACITY
            && self.expires.capacity() > self.expires.len().saturating_mul(4)
        {
            self.expires.shrink_to_fit();
        }
    }

    // --- Watched keys (optimistic transactions) ---

    /// Registers a WATCH on `key` for `session_id`.
    pub fn watch_key(&mut self, key: Bytes, session_id: u64) {
        self.watched.entry(key).or_default().insert(session_id);
    }

    /// Drops the given session's WATCHes on the listed keys.
    pub fn unwatch_keys(&mut self, keys: &[Bytes], session_id: u64) {
        for key in keys {
            if let Some(watchers) = self.watched.get_mut(key) {
                watchers.remove(&session_id);
                if watchers.is_empty() {
                    self.watched.remove(key);
                }
            }
        }
    }

    /// Marks every watcher of `key` as dirty. Called by every path that
    /// structurally modifies a key: writes, deletes, expiration, eviction.
    pub fn signal_modified_key(&mut self, key: &Bytes) {
        if let Some(watchers) = self.watched.get(key) {
            let ids: Vec<u64> = watchers.iter().copied().collect();
            self.dirty_watchers.extend(ids);
        }
    }

    /// Drains the dirty-watcher buffer. The router calls this while still
    /// holding the write lock so EXEC observes the flags in commit order.
    pub fn take_dirty_watchers(&mut self) -> Vec<u64> {
        std::mem::take(&mut self.dirty_watchers)
    }

    // --- Blocked / ready keys ---

    /// Registers a session as blocked on each of `keys`.
    pub fn register_waiter(&mut self, keys: &[Bytes], waiter: Waiter) {
        for key in keys {
            self.blocked
                .entry(key.clone())
                .or_default()
                .push_back(waiter.clone());
        }
        self.blocked_sessions
            .insert(waiter.session_id, keys.to_vec());
    }

    /// Removes a blocked session from every queue it is in. Returns true if
    /// the session was still registered (i.e. no wake-up raced the caller).
    pub fn cancel_waiter(&mut self, session_id: u64) -> bool {
        let Some(keys) = self.blocked_sessions.remove(&session_id) else {
            return false;
        };
        for key in keys {
            if let Some(queue) = self.blocked.get_mut(&key) {
                queue.retain(|w| w.session_id != session_id);
                if queue.is_empty() {
                    self.blocked.remove(&key);
                }
            }
        }
        true
    }

    /// True if any session is blocked on `key`.
    pub fn has_waiters(&self, key: &Bytes) -> bool {
        self.blocked.get(key).is_some_and(|q| !q.is_empty())
    }

    /// Promotes `key` into the ready set if sessions are blocked on it.
    /// Called by write commands that add data to a key.
    pub fn signal_key_ready(&mut self, key: &Bytes) {
        if self.has_waiters(key) && self.ready_set.insert(key.clone()) {
            self.ready_keys.push_back(key.clone());
        }
    }

    pub fn pop_ready_key(&mut self) -> Option<Bytes> {
        let key = self.ready_keys.pop_front()?;
        self.ready_set.remove(&key);
        Some(key)
    }

    pub fn has_ready_keys(&self) -> bool {
        !self.ready_keys.is_empty()
    }

    pub(super) fn pop_front_waiter(&mut self, key: &Bytes) -> Option<Waiter> {
        let queue = self.blocked.get_mut(key)?;
        let waiter = queue.pop_front()?;
        if queue.is_empty() {
            self.blocked.remove(key);
        }
        // Forget the session's other registrations; it is being served.
        if let Some(keys) = self.blocked_sessions.remove(&waiter.session_id) {
            for other in keys {
                if other != *key
                    && let Some(other_queue) = self.blocked.get_mut(&other)
                {
                    other_queue.retain(|w| w.session_id != waiter.session_id);
                    if other_queue.is_empty() {
                        self.blocked.remove(&other);
                    }
                }
            }
        }
        Some(waiter)
    }

    pub(super) fn record_eviction(&self) {
        self.stats.evicted_keys.fetch_add(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::storage::StrValue;

    fn test_db() -> Db {
        Db::new(0, Arc::new(ServerStats::new()))
    }

    fn string_value(payload: &[u8]) -> StoredValue {
        StoredValue::new(Value::Str(StrValue::from_bytes(payload)), 0)
    }

    fn key(s: &str) -> Bytes {
        Bytes::copy_from_slice(s.as_bytes())
    }

    #[test]
    fn add_rejects_duplicates() {
        let db = test_db();
        let mut inner = db.write();
        inner.add(key("k"), string_value(b"v")).unwrap();
        assert!(matches!(
            inner.add(key("k"), string_value(b"w")),
            Err(KyaniteError::KeyExists)
        ));
        assert_eq!(inner.len(), 1);
    }

    #[test]
    fn overwrite_requires_presence() {
        let db = test_db();
        let mut inner = db.write();
        assert!(matches!(
            inner.overwrite(key("k"), string_value(b"v")),
            Err(KyaniteError::KeyNotFound)
        ));
        inner.add(key("k"), string_value(b"v")).unwrap();
        inner.overwrite(key("k"), string_value(b"w")).unwrap();
        assert_eq!(inner.len(), 1);
    }

    #[test]
    fn delete_is_idempotent_and_removes_expire() {
        let db = test_db();
        let mut inner = db.write();
        inner.add(key("k"), string_value(b"v")).unwrap();
        inner.set_expire(&key("k"), u64::MAX);
        assert!(inner.delete(&key("k")));
        assert!(!inner.delete(&key("k")));
        assert_eq!(inner.get_expire(&key("k")), None);
        assert_eq!(inner.expires_len(), 0);
    }

    #[test]
    fn expired_key_is_absent_to_readers_and_reaped_by_writers() {
        let db = test_db();
        let mut inner = db.write();
        inner.add(key("k"), string_value(b"v")).unwrap();
        inner.set_expire(&key("k"), 1000);

        assert!(inner.lookup_read(&key("k"), 999).is_some());
        assert!(inner.lookup_read(&key("k"), 1000).is_none());
        // The entry is still physically present after a read.
        assert_eq!(inner.len(), 1);

        assert!(inner.lookup_write(&key("k"), 1000).is_none());
        assert_eq!(inner.len(), 0);
    }

    #[test]
    fn memory_accounting_tracks_mutations() {
        let db = test_db();
        {
            let mut inner = db.write();
            inner.add(key("k"), string_value(&[b'x'; 100])).unwrap();
        }
        let before = db.used_memory();
        assert!(before >= 100);
        {
            let mut inner = db.write();
            inner.delete(&key("k"));
        }
        assert_eq!(db.used_memory(), 0);
        assert_eq!(db.key_count(), 0);
    }

    #[test]
    fn update_removes_emptied_containers() {
        let db = test_db();
        let mut inner = db.write();
        inner
            .add(
                key("l"),
                StoredValue::new(Value::List(VecDeque::from([key("a")])), 0),
            )
            .unwrap();
        let popped = inner.update(&key("l"), 0, 0, |entry| match &mut entry.data {
            Value::List(items) => items.pop_front(),
            _ => None,
        });
        assert_eq!(popped, Some(Some(key("a"))));
        assert!(inner.lookup_read(&key("l"), 0).is_none());
        assert_eq!(inner.len(), 0);
    }

    #[test]
    fn modified_watched_key_dirties_watchers() {
        let db = test_db();
        let mut inner = db.write();
        inner.watch_key(key("k"), 7);
        inner.set(key("k"), string_value(b"v"), false);
        inner.signal_modified_key(&key("k"));
        assert_eq!(inner.take_dirty_watchers(), vec![7]);
        assert!(inner.take_dirty_watchers().is_empty());
    }

    #[test]
    fn waiter_registration_roundtrip() {
        let db = test_db();
        let mut inner = db.write();
        let waiter = Waiter {
            session_id: 3,
            direction: PopDirection::Left,
            target: None,
        };
        inner.register_waiter(&[key("a"), key("b")], waiter);
        assert!(inner.has_waiters(&key("a")));

        inner.signal_key_ready(&key("a"));
        inner.signal_key_ready(&key("a"));
        assert_eq!(inner.pop_ready_key(), Some(key("a")));
        assert_eq!(inner.pop_ready_key(), None);

        assert!(inner.cancel_waiter(3));
        assert!(!inner.cancel_waiter(3));
        assert!(!inner.has_waiters(&key("b")));
    }

    #[test]
    fn serving_one_key_clears_other_registrations() {
        let db = test_db();
        let mut inner = db.write();
        inner.register_waiter(
            &[key("a"), key("b")],
            Waiter {
                session_id: 9,
                direction: PopDirection::Left,
                target: None,
            },
        );
        let served = inner.pop_front_waiter(&key("a")).unwrap();
        assert_eq!(served.session_id, 9);
        assert!(!inner.has_waiters(&key("b")));
        assert!(!inner.cancel_waiter(9));
    }
}
