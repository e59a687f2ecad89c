// src/server/mod.rs

use crate::config::Config;
use crate::core::state::ServerState;
use crate::core::tasks;
use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::info;

pub mod dispatcher;
pub mod handoff;
pub mod initialization;
pub mod worker;

/// Capacity of each worker's hand-off queue.
const WORKER_QUEUE_CAPACITY: usize = 1024;

/// A running server: the dispatcher, worker and background loops, plus the
/// resolved listen addresses (useful with port 0 in tests).
pub struct Server {
    pub local_addrs: Vec<SocketAddr>,
    state: Arc<ServerState>,
    dispatcher: JoinHandle<()>,
}

impl Server {
    /// Binds the listeners and spawns every loop. Returns once the server is
    /// accepting connections.
    pub async fn start(config: Config) -> Result<Server> {
        let threads = config.threads;
        let ctx = initialization::setup(config).await?;
        let state = ctx.state;

        let mut worker_txs = Vec::with_capacity(threads);
        for id in 0..threads {
            let (tx, rx) = mpsc::channel(WORKER_QUEUE_CAPACITY);
            worker_txs.push(tx);
            tokio::spawn(worker::Worker::new(id, state.clone(), rx).run());
        }

        // Background maintenance loops.
        tokio::spawn(tasks::expiration::run(state.clone()));
        tokio::spawn(tasks::maintenance::run(state.clone()));

        let dispatcher = tokio::spawn(
            dispatcher::Dispatcher::new(
                state.clone(),
                ctx.listeners,
                worker_txs,
                ctx.init.dispatcher_rx,
            )
            .run(),
        );

        info!("ready to accept connections");
        Ok(Server {
            local_addrs: ctx.local_addrs,
            state,
            dispatcher,
        })
    }

    pub fn state(&self) -> &Arc<ServerState> {
        &self.state
    }

    /// Requests a cooperative shutdown and waits for the dispatcher to stop.
    pub async fn shutdown(self) {
        self.state.begin_shutdown();
        let _ = self.dispatcher.await;
    }
}

/// The main server entry point: start, wait for a shutdown trigger, stop.
pub async fn run(config: Config) -> Result<()> {
    let server = Server::start(config).await?;
    let mut internal_shutdown = server.state.shutdown_tx.subscribe();

    tokio::select! {
        _ = await_shutdown_signal() => {
            info!("shutdown signal received");
        }
        // SHUTDOWN command or a fatal loop error.
        _ = internal_shutdown.recv() => {
            info!("internal shutdown requested");
        }
    }

    server.shutdown().await;
    info!("bye");
    Ok(())
}

/// Waits for SIGINT or SIGTERM (Ctrl+C elsewhere).
async fn await_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut sigint = match signal(SignalKind::interrupt()) {
            Ok(s) => s,
            Err(e) => {
                tracing::error!("cannot install SIGINT handler: {e}");
                std::future::pending::<()>().await;
                return;
            }
        };
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(s) => s,
            Err(e) => {
                tracing::error!("cannot install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
                return;
            }
        };
        tokio::select! {
            _ = sigint.recv() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
