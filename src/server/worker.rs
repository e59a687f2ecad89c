// src/server/worker.rs

//! A worker event loop: owns a set of sessions, drives their request
//! lifecycles, and runs its per-loop cron (config snapshot refresh, LRU
//! clock tick, peak-memory sampling, the fast expiration cycle).

use super::handoff::{Handoff, ToDispatcher};
use crate::connection::driver::{SessionDriver, SessionExit, SharedHotConfig};
use crate::connection::session::Session;
use crate::core::handler;
use crate::core::protocol::RespCodec;
use crate::core::state::ServerState;
use crate::core::tasks::expiration::{self, FastCycleState};
use futures::StreamExt;
use futures::stream::FuturesUnordered;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_util::codec::Framed;
use tracing::{debug, info};

/// How long a shutting-down worker keeps polling its sessions so queued
/// replies can drain.
const SHUTDOWN_DRAIN: Duration = Duration::from_millis(500);

pub struct Worker {
    pub id: usize,
    state: Arc<ServerState>,
    handoff_rx: mpsc::Receiver<Handoff>,
    hot: SharedHotConfig,
}

impl Worker {
    pub fn new(id: usize, state: Arc<ServerState>, handoff_rx: mpsc::Receiver<Handoff>) -> Self {
        let hot = Arc::new(parking_lot::RwLock::new(Arc::new(state.config.read().hot())));
        Self {
            id,
            state,
            handoff_rx,
            hot,
        }
    }

    pub async fn run(mut self) {
        let mut sessions = FuturesUnordered::new();
        let hz = self.hot.read().hz.max(1);
        let mut cron = tokio::time::interval(Duration::from_millis((1000 / hz).max(1) as u64));
        let mut shutdown_rx = self.state.shutdown_tx.subscribe();
        let mut fast_expire = FastCycleState::default();
        let mut last_config_refresh = Instant::now();

        debug!(worker = self.id, "worker loop started");

        loop {
            tokio::select! {
                biased;

                _ = shutdown_rx.recv() => break,

                Some(handoff) = self.handoff_rx.recv() => match handoff {
                    Handoff::NewConn { stream, addr, handle } => {
                        let _ = stream.set_nodelay(true);
                        let auth_required = self.hot.read().requirepass.is_some();
                        let session = Session::new(addr, handle, auth_required);
                        debug!(worker = self.id, session = session.id, %addr, "session attached");
                        sessions.push(
                            SessionDriver::new(
                                Framed::new(stream, RespCodec),
                                session,
                                self.state.clone(),
                                self.hot.clone(),
                                self.state.shutdown_tx.subscribe(),
                            )
                            .run(),
                        );
                    }
                    Handoff::Resume { parked, reply } => {
                        let super::handoff::ParkedSession { framed, mut session } = *parked;
                        debug!(worker = self.id, session = session.id, "session resumed");
                        session.pending_wake = Some(reply);
                        sessions.push(
                            SessionDriver::new(
                                framed,
                                session,
                                self.state.clone(),
                                self.hot.clone(),
                                self.state.shutdown_tx.subscribe(),
                            )
                            .run(),
                        );
                    }
                },

                Some(exit) = sessions.next(), if !sessions.is_empty() => {
                    self.handle_exit(exit).await;
                }

                _ = cron.tick() => {
                    self.cron_tick(&mut fast_expire, &mut last_config_refresh);
                }
            }
        }

        // Give in-flight sessions a moment to flush and exit on the shutdown
        // signal they received themselves.
        let drain_deadline = tokio::time::sleep(SHUTDOWN_DRAIN);
        tokio::pin!(drain_deadline);
        while !sessions.is_empty() {
            tokio::select! {
                _ = &mut drain_deadline => break,
                Some(exit) = sessions.next() => self.handle_exit(exit).await,
            }
        }
        info!(worker = self.id, "worker loop stopped");
    }

    async fn handle_exit(&self, exit: SessionExit) {
        match exit {
            SessionExit::Closed(mut session) => {
                debug!(worker = self.id, session = session.id, "session closed");
                handler::cleanup_session(&self.state, &mut session);
            }
            SessionExit::Block { parked, blocked } => {
                debug!(
                    worker = self.id,
                    session = parked.session.id,
                    "session parked for blocking command"
                );
                if self
                    .state
                    .dispatcher_tx
                    .send(ToDispatcher::Park { parked, blocked })
                    .await
                    .is_err()
                {
                    debug!(worker = self.id, "dispatcher gone; dropping parked session");
                }
            }
        }
    }

    /// The per-loop cron. Runs every `1000/hz` ms.
    fn cron_tick(&self, fast_expire: &mut FastCycleState, last_config_refresh: &mut Instant) {
        self.state.tick_lru_clock();
        self.state
            .stats
            .sample_peak_memory(self.state.total_used_memory());

        // Refresh the hot-config snapshot once per second.
        if last_config_refresh.elapsed() >= Duration::from_secs(1) {
            *last_config_refresh = Instant::now();
            *self.hot.write() = Arc::new(self.state.config.read().hot());
        }

        expiration::fast_cycle(&self.state, fast_expire);
    }
}
