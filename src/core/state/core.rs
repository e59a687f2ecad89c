// src/core/state/core.rs

//! Defines the central `ServerState` struct, holding all shared server-wide state.

use super::client::ClientRegistry;
use super::stats::ServerStats;
use crate::config::Config;
use crate::core::KyaniteError;
use crate::core::database::Db;
use crate::core::slowlog::SlowLog;
use crate::server::handoff::ToDispatcher;
use parking_lot::RwLock;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Instant, SystemTime, UNIX_EPOCH};
use tokio::sync::{broadcast, mpsc};

/// Capacity of the worker -> dispatcher message channel.
const DISPATCHER_CHANNEL_CAPACITY: usize = 1024;

/// Contains the initialized state plus the receiving ends of channels that
/// the spawner hands to their owning loops. Created once during startup.
pub struct ServerInit {
    /// The fully initialized, shared server state.
    pub state: Arc<ServerState>,
    /// Receives park/wake traffic for the dispatcher loop.
    pub dispatcher_rx: mpsc::Receiver<ToDispatcher>,
}

/// The central struct holding all shared, server-wide state.
///
/// Wrapped in an `Arc` and passed explicitly to every loop and session
/// driver; there are no hidden globals besides the allocator.
#[derive(Debug)]
pub struct ServerState {
    /// All logical databases, created at startup and never destroyed.
    pub dbs: Vec<Arc<Db>>,
    /// Cross-thread handles for every live session.
    pub clients: ClientRegistry,
    /// The authoritative runtime configuration; loops read through their
    /// once-per-second `HotConfig` snapshot instead of this lock.
    pub config: Arc<RwLock<Config>>,
    pub stats: Arc<ServerStats>,
    /// The bounded global slow-query log.
    pub slowlog: SlowLog,
    /// Side-channel into the dispatcher for blocking-session traffic.
    pub dispatcher_tx: mpsc::Sender<ToDispatcher>,
    /// Cooperative shutdown: every loop subscribes and exits on receipt.
    pub shutdown_tx: broadcast::Sender<()>,
    /// The 24-bit wrapping LRU clock, advanced by worker cron ticks.
    lru_clock: AtomicU32,
    pub start_time: Instant,
    /// Random hex identifier for this server run, reported by INFO.
    pub run_id: String,
}

impl ServerState {
    /// Initializes the entire server state from the given configuration.
    /// This is the factory for the server's shared context.
    pub fn initialize(config: Config) -> Result<ServerInit, KyaniteError> {
        let mut run_id_bytes = [0u8; 20];
        getrandom::fill(&mut run_id_bytes)
            .map_err(|e| KyaniteError::Internal(e.to_string()))?;
        let run_id = hex::encode(run_id_bytes);

        let stats = Arc::new(ServerStats::new());
        let dbs = (0..config.databases)
            .map(|index| Arc::new(Db::new(index, stats.clone())))
            .collect();

        let (dispatcher_tx, dispatcher_rx) = mpsc::channel(DISPATCHER_CHANNEL_CAPACITY);
        let (shutdown_tx, _) = broadcast::channel(1);

        let slowlog = SlowLog::new(config.slowlog_max_len);

        let state = Arc::new(Self {
            dbs,
            clients: ClientRegistry::new(),
            config: Arc::new(RwLock::new(config)),
            stats,
            slowlog,
            dispatcher_tx,
            shutdown_tx,
            lru_clock: AtomicU32::new(current_lru_clock()),
            start_time: Instant::now(),
            run_id,
        });

        Ok(ServerInit {
            state,
            dispatcher_rx,
        })
    }

    /// Retrieves a database by index.
    pub fn get_db(&self, index: usize) -> Option<Arc<Db>> {
        self.dbs.get(index).cloned()
    }

    /// Estimated total keyspace memory across all databases.
    pub fn total_used_memory(&self) -> usize {
        self.dbs.iter().map(|db| db.used_memory()).sum()
    }

    /// Total key count across all databases.
    pub fn total_key_count(&self) -> usize {
        self.dbs.iter().map(|db| db.key_count()).sum()
    }

    /// The current value of the shared LRU clock.
    pub fn lru_clock(&self) -> u32 {
        self.lru_clock.load(Ordering::Relaxed)
    }

    /// Advances the LRU clock to the current wall-clock second. Idempotent;
    /// every worker cron tick calls it.
    pub fn tick_lru_clock(&self) {
        self.lru_clock
            .store(current_lru_clock(), Ordering::Relaxed);
    }

    /// Requests a cooperative shutdown of every loop.
    pub fn begin_shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }
}

/// Seconds since the unix epoch, truncated onto the 24-bit LRU clock.
fn current_lru_clock() -> u32 {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    (secs & 0x00FF_FFFF) as u32
}
