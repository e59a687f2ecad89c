// src/server/initialization.rs

//! Server bring-up: state construction and listener binding.

use crate::config::Config;
use crate::core::state::{ServerInit, ServerState};
use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

pub struct ServerContext {
    pub state: Arc<ServerState>,
    pub init: ServerInit,
    pub listeners: Vec<TcpListener>,
    pub local_addrs: Vec<SocketAddr>,
}

/// Initializes all server components before the loops start.
pub async fn setup(config: Config) -> Result<ServerContext> {
    log_startup_info(&config);

    let listen_addrs = config.listen_addrs();
    let init = ServerState::initialize(config)?;
    let state = init.state.clone();

    let mut listeners = Vec::with_capacity(listen_addrs.len());
    let mut local_addrs = Vec::with_capacity(listen_addrs.len());
    for addr in &listen_addrs {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("cannot listen on {addr}"))?;
        let local = listener
            .local_addr()
            .with_context(|| format!("cannot resolve local address of {addr}"))?;
        info!("listening on {local}");
        listeners.push(listener);
        local_addrs.push(local);
    }

    Ok(ServerContext {
        state,
        init,
        listeners,
        local_addrs,
    })
}

fn log_startup_info(config: &Config) {
    info!(
        "starting kyanite {}: {} worker threads, {} databases, maxclients {}",
        env!("CARGO_PKG_VERSION"),
        config.threads,
        config.databases,
        config.maxclients,
    );
    if config.maxmemory > 0 {
        info!(
            "maxmemory {} bytes, policy {}",
            config.maxmemory, config.maxmemory_policy
        );
    }
}
