// src/core/state/client.rs

//! The client registry: the only cross-thread view of a session. Workers own
//! the sessions themselves; other threads see just this handle.

use dashmap::DashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Instant;

/// The cross-thread-visible part of a session. Everything here is readable
/// and writable without touching the owning worker.
#[derive(Debug)]
pub struct ClientHandle {
    pub id: u64,
    pub addr: SocketAddr,
    pub created: Instant,
    /// The session's current database, mirrored here for observability.
    pub db_index: AtomicUsize,
    /// Set when a key this session WATCHes is modified; checked by EXEC.
    dirty_cas: AtomicBool,
}

impl ClientHandle {
    /// Atomically reads and clears the dirty-CAS flag.
    pub fn take_dirty_cas(&self) -> bool {
        self.dirty_cas.swap(false, Ordering::AcqRel)
    }

    pub fn mark_dirty_cas(&self) {
        self.dirty_cas.store(true, Ordering::Release);
    }
}

/// All live client handles, keyed by session id. Session ids are assigned
/// here, monotonically, and never reused.
#[derive(Debug, Default)]
pub struct ClientRegistry {
    clients: DashMap<u64, Arc<ClientHandle>>,
    next_id: AtomicU64,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a freshly accepted connection and returns its handle.
    pub fn register(&self, addr: SocketAddr) -> Arc<ClientHandle> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let handle = Arc::new(ClientHandle {
            id,
            addr,
            created: Instant::now(),
            db_index: AtomicUsize::new(0),
            dirty_cas: AtomicBool::new(false),
        });
        self.clients.insert(id, handle.clone());
        handle
    }

    pub fn unregister(&self, id: u64) {
        self.clients.remove(&id);
    }

    pub fn get(&self, id: u64) -> Option<Arc<ClientHandle>> {
        self.clients.get(&id).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Flags the given session as having a dirtied WATCH set.
    pub fn mark_dirty_cas(&self, id: u64) {
        if let Some(entry) = self.clients.get(&id) {
            entry.value().mark_dirty_cas();
        }
    }
}
