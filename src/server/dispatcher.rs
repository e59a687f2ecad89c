// src/server/dispatcher.rs

//! The single dispatcher loop: accepts connections on every bound address,
//! round-robins them to the workers, and owns the migration protocol for
//! blocked sessions (parking, deadline timers, wake routing).
//!
//! Every cross-loop hand-off serialises through this one task, which is what
//! guarantees a session is never polled by two loops at once.

use super::handoff::{Handoff, ParkedSession, ToDispatcher};
use crate::config::HotConfig;
use crate::core::RespValue;
use crate::core::handler;
use crate::core::state::ServerState;
use crate::server::handoff::BlockedOn;
use futures::StreamExt;
use futures::stream::{SelectAll, select_all};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_stream::wrappers::TcpListenerStream;
use tokio_util::time::delay_queue::{self, DelayQueue};
use tracing::{debug, info, warn};

pub struct Dispatcher {
    state: Arc<ServerState>,
    listeners: Vec<TcpListener>,
    workers: Vec<mpsc::Sender<Handoff>>,
    rx: mpsc::Receiver<ToDispatcher>,
    next_worker: usize,
}

/// A parked session together with what it is blocked on.
struct Parked {
    parked: Box<ParkedSession>,
    blocked: BlockedOn,
}

impl Dispatcher {
    pub fn new(
        state: Arc<ServerState>,
        listeners: Vec<TcpListener>,
        workers: Vec<mpsc::Sender<Handoff>>,
        rx: mpsc::Receiver<ToDispatcher>,
    ) -> Self {
        Self {
            state,
            listeners,
            workers,
            rx,
            next_worker: 0,
        }
    }

    pub async fn run(mut self) {
        let mut incoming: SelectAll<TcpListenerStream> = select_all(
            std::mem::take(&mut self.listeners)
                .into_iter()
                .map(TcpListenerStream::new),
        );

        let mut parked: HashMap<u64, Parked> = HashMap::new();
        // Wakes that raced ahead of their Park message.
        let mut pending_wakes: HashMap<u64, RespValue> = HashMap::new();
        let mut deadlines: DelayQueue<u64> = DelayQueue::new();
        let mut deadline_keys: HashMap<u64, delay_queue::Key> = HashMap::new();

        let mut hot = Arc::new(self.state.config.read().hot());
        let mut config_refresh = tokio::time::interval(Duration::from_secs(1));
        let mut shutdown_rx = self.state.shutdown_tx.subscribe();

        info!("dispatcher started with {} workers", self.workers.len());

        loop {
            tokio::select! {
                biased;

                _ = shutdown_rx.recv() => break,

                Some(conn) = incoming.next() => match conn {
                    Ok(stream) => self.accept(stream, &hot).await,
                    Err(e) => warn!("accept failed: {e}"),
                },

                Some(msg) = self.rx.recv() => match msg {
                    ToDispatcher::Park { parked: session, blocked } => {
                        let id = session.session.id;
                        // A wake may already be waiting if the serving worker
                        // beat the park message here.
                        if let Some(reply) = pending_wakes.remove(&id) {
                            self.resume(session, reply).await;
                        } else {
                            if let Some(deadline) = blocked.deadline {
                                let key = deadlines
                                    .insert_at(id, tokio::time::Instant::from_std(deadline));
                                deadline_keys.insert(id, key);
                            }
                            debug!(session = id, "session parked");
                            parked.insert(id, Parked { parked: session, blocked });
                        }
                    }
                    ToDispatcher::Wake { session_id, reply } => {
                        match parked.remove(&session_id) {
                            Some(entry) => {
                                if let Some(key) = deadline_keys.remove(&session_id) {
                                    deadlines.try_remove(&key);
                                }
                                self.resume(entry.parked, reply).await;
                            }
                            None => {
                                pending_wakes.insert(session_id, reply);
                            }
                        }
                    }
                },

                Some(expired) = deadlines.next(), if !deadlines.is_empty() => {
                    let id = expired.into_inner();
                    deadline_keys.remove(&id);
                    self.handle_deadline(id, &mut parked).await;
                }

                _ = config_refresh.tick() => {
                    hot = Arc::new(self.state.config.read().hot());
                }
            }
        }

        // Shutdown: tear down everything still parked.
        for (_, mut entry) in parked.drain() {
            handler::cleanup_session(&self.state, &mut entry.parked.session);
        }
        info!("dispatcher stopped");
    }

    /// Accepts one connection: enforce maxclients, register the client, hand
    /// the socket to the next worker round-robin.
    async fn accept(&mut self, stream: TcpStream, hot: &HotConfig) {
        let Ok(addr) = stream.peer_addr() else {
            return;
        };
        if self.state.clients.len() >= hot.maxclients {
            self.state.stats.connection_rejected();
            debug!(%addr, "connection rejected: maxclients reached");
            return;
        }
        self.state.stats.connection_accepted();
        let handle = self.state.clients.register(addr);
        let id = handle.id;

        let worker = self.next_worker;
        self.next_worker = (self.next_worker + 1) % self.workers.len();
        if self.workers[worker]
            .send(Handoff::NewConn { stream, addr, handle })
            .await
            .is_err()
        {
            warn!(worker, "worker hand-off channel closed; dropping connection");
            self.state.clients.unregister(id);
        }
    }

    /// Re-dispatches a woken session to the next worker round-robin.
    async fn resume(&mut self, parked: Box<ParkedSession>, reply: RespValue) {
        let id = parked.session.id;
        let worker = self.next_worker;
        self.next_worker = (self.next_worker + 1) % self.workers.len();
        debug!(session = id, worker, "session resumed");
        if self.workers[worker]
            .send(Handoff::Resume { parked, reply })
            .await
            .is_err()
        {
            warn!(worker, session = id, "worker gone; dropping resumed session");
        }
    }

    /// A blocking deadline fired. If the session is still registered in the
    /// blocked-key index it timed out and gets a null-array; if not, a wake
    /// is already in flight and will resume it instead.
    async fn handle_deadline(&mut self, id: u64, parked: &mut HashMap<u64, Parked>) {
        let Some(entry) = parked.remove(&id) else {
            return;
        };
        let still_blocked = self
            .state
            .get_db(entry.blocked.db_index)
            .is_some_and(|db| db.write().cancel_waiter(id));
        if still_blocked {
            debug!(session = id, "blocking command timed out");
            self.resume(entry.parked, RespValue::NullArray).await;
        } else {
            // The wake is racing the timer; park again until it lands.
            parked.insert(id, entry);
        }
    }
}
