// src/core/tasks/expiration.rs

//! Active, sampling-based expiration.
//!
//! Two cycles share one algorithm: the background loop runs the **slow**
//! cycle (larger budget, 16 databases per invocation, resuming round-robin
//! where the previous invocation stopped), and each worker's cron runs the
//! **fast** cycle (1 ms budget, spaced at least 2 ms apart). A database is
//! re-sampled while more than a quarter of its sample was expired.

use crate::core::database::now_unix_ms;
use crate::core::state::ServerState;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Keys sampled from a database's expire index per round.
const EXPIRE_SAMPLE: usize = 20;
/// Databases visited per slow-cycle invocation.
const DBS_PER_SLOW_CYCLE: usize = 16;
/// The fast cycle's time budget.
const FAST_CYCLE_BUDGET: Duration = Duration::from_millis(1);
/// Minimum spacing between two fast cycles on the same worker.
const FAST_CYCLE_SPACING: Duration = Duration::from_millis(2);

/// Per-worker bookkeeping for the fast cycle.
#[derive(Debug, Default)]
pub struct FastCycleState {
    last_run: Option<Instant>,
    cursor: usize,
}

/// The background expiration loop (slow cycles).
pub async fn run(state: Arc<ServerState>) {
    let hz = state.config.read().hz.max(1);
    let mut interval = tokio::time::interval(Duration::from_millis((1000 / hz).max(1) as u64));
    let mut shutdown_rx = state.shutdown_tx.subscribe();
    let mut cursor = 0usize;

    info!("active expiration loop started (hz {hz})");
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                info!("active expiration loop stopped");
                return;
            }
            _ = interval.tick() => {
                slow_cycle(&state, &mut cursor);
            }
        }
    }
}

/// One slow-cycle invocation. The budget caps the cycle at 25% of the cron
/// period, i.e. `1_000_000 * 25 / hz / 100` microseconds.
pub fn slow_cycle(state: &Arc<ServerState>, cursor: &mut usize) {
    let hz = state.config.read().hz.max(1) as u64;
    let budget = Duration::from_micros(1_000_000 * 25 / hz / 100);
    expire_cycle(state, cursor, budget, DBS_PER_SLOW_CYCLE);
}

/// The worker-driven fast cycle: tiny budget, skipped entirely when the
/// previous one ran less than [`FAST_CYCLE_SPACING`] ago.
pub fn fast_cycle(state: &Arc<ServerState>, fast: &mut FastCycleState) {
    if let Some(last) = fast.last_run
        && last.elapsed() < FAST_CYCLE_SPACING
    {
        return;
    }
    fast.last_run = Some(Instant::now());
    expire_cycle(state, &mut fast.cursor, FAST_CYCLE_BUDGET, state.dbs.len());
}

/// The shared cycle body: sample, delete expired, repeat while the expired
/// fraction stays above 25% and the budget lasts. The write lock is taken
/// per sampling batch and released in between so commands can interleave.
fn expire_cycle(
    state: &Arc<ServerState>,
    cursor: &mut usize,
    budget: Duration,
    dbs_limit: usize,
) {
    let started = Instant::now();
    let now_ms = now_unix_ms();
    let db_count = state.dbs.len();
    if db_count == 0 {
        return;
    }

    for _ in 0..dbs_limit.min(db_count) {
        let db = &state.dbs[*cursor % db_count];
        *cursor = cursor.wrapping_add(1);

        loop {
            let (sampled, expired, dirty, ttl_sum, ttl_count) = {
                let mut inner = db.write();
                let sample = inner.sample_expires(EXPIRE_SAMPLE);
                let sampled = sample.len();
                let mut expired = 0usize;
                let mut ttl_sum = 0u64;
                let mut ttl_count = 0u64;
                for (key, at) in sample {
                    if at <= now_ms {
                        if inner.expire_if_needed(&key, now_ms) {
                            expired += 1;
                        }
                    } else {
                        ttl_sum += at - now_ms;
                        ttl_count += 1;
                    }
                }
                let dirty = inner.take_dirty_watchers();
                (sampled, expired, dirty, ttl_sum, ttl_count)
            };
            for id in dirty {
                state.clients.mark_dirty_cas(id);
            }
            if expired > 0 {
                debug!(db = db.index, expired, "active cycle reaped expired keys");
            }

            // Keep a smoothed average TTL per database for observability.
            if ttl_count > 0 {
                let sample_avg = ttl_sum / ttl_count;
                let old = db.avg_ttl_ms.load(Ordering::Relaxed);
                let smoothed = if old == 0 {
                    sample_avg
                } else {
                    (old * 15 + sample_avg) / 16
                };
                db.avg_ttl_ms.store(smoothed, Ordering::Relaxed);
            }

            if sampled == 0 || expired * 4 <= EXPIRE_SAMPLE {
                break;
            }
            if started.elapsed() >= budget {
                return;
            }
        }

        if started.elapsed() >= budget {
            return;
        }
    }
}
