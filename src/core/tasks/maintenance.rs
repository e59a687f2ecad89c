// src/core/tasks/maintenance.rs

//! The periodic maintenance loop: shrinks oversized hash tables, prunes
//! subscriber-less pub/sub channels, and samples peak memory.

use crate::core::state::ServerState;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

const MAINTENANCE_PERIOD: Duration = Duration::from_secs(1);

pub async fn run(state: Arc<ServerState>) {
    let mut interval = tokio::time::interval(MAINTENANCE_PERIOD);
    let mut shutdown_rx = state.shutdown_tx.subscribe();

    info!("maintenance loop started");
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                info!("maintenance loop stopped");
                return;
            }
            _ = interval.tick() => tick(&state),
        }
    }
}

fn tick(state: &Arc<ServerState>) {
    let mut purged_channels = 0usize;
    for db in &state.dbs {
        let mut inner = db.write();
        inner.resize_tables();
        purged_channels += inner.pubsub.purge_idle();
    }
    if purged_channels > 0 {
        debug!(purged_channels, "pruned idle pub/sub channels");
    }
    state
        .stats
        .sample_peak_memory(state.total_used_memory());
}
