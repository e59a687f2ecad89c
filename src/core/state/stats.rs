// src/core/state/stats.rs

//! Server-wide statistics. All counters are relaxed atomics; readers
//! (INFO, tests) tolerate slightly stale values.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

#[derive(Debug, Default)]
pub struct ServerStats {
    /// Connections accepted since startup.
    pub total_connections: AtomicU64,
    /// Connections closed at accept time because maxclients was reached.
    pub rejected_connections: AtomicU64,
    /// Commands processed since startup.
    pub total_commands: AtomicU64,
    /// Keys removed because their deadline passed (lazy + active cycles).
    pub expired_keys: AtomicU64,
    /// Keys removed by the maxmemory eviction policy.
    pub evicted_keys: AtomicU64,
    pub keyspace_hits: AtomicU64,
    pub keyspace_misses: AtomicU64,
    /// High-water mark of total used memory, sampled by the cron loops.
    pub peak_memory: AtomicUsize,
}

impl ServerStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection_accepted(&self) {
        self.total_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_rejected(&self) {
        self.rejected_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn command_processed(&self) {
        self.total_commands.fetch_add(1, Ordering::Relaxed);
    }

    /// Raises the peak-memory high-water mark if `used` exceeds it.
    pub fn sample_peak_memory(&self, used: usize) {
        self.peak_memory.fetch_max(used, Ordering::Relaxed);
    }

    /// Resets the resettable counters (`CONFIG RESETSTAT`).
    pub fn reset(&self) {
        self.total_connections.store(0, Ordering::Relaxed);
        self.rejected_connections.store(0, Ordering::Relaxed);
        self.total_commands.store(0, Ordering::Relaxed);
        self.expired_keys.store(0, Ordering::Relaxed);
        self.evicted_keys.store(0, Ordering::Relaxed);
        self.keyspace_hits.store(0, Ordering::Relaxed);
        self.keyspace_misses.store(0, Ordering::Relaxed);
    }
}
