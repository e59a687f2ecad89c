// src/connection/driver.rs

//! Drives one session: reads frames, routes commands, writes replies, and
//! pushes subscription messages. Runs inside the owning worker's loop; a
//! blocking command makes the driver return the session for parking.

use super::session::Session;
use crate::config::HotConfig;
use crate::core::KyaniteError;
use crate::core::handler::{self, Flow};
use crate::core::protocol::{RespCodec, RespFrame, RespValue};
use crate::core::state::ServerState;
use crate::server::handoff::{BlockedOn, ParkedSession};
use futures::{SinkExt, StreamExt};
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio_util::codec::Framed;
use tracing::{debug, warn};

/// A worker's shared view of the hot configuration, refreshed by its cron.
pub type SharedHotConfig = Arc<RwLock<Arc<HotConfig>>>;

/// Why the driver returned the session to its worker.
#[derive(Debug)]
pub enum SessionExit {
    /// The connection is done; the worker tears the session down.
    Closed(Box<Session>),
    /// A blocking command found no data; migrate to the dispatcher.
    Block {
        parked: Box<ParkedSession>,
        blocked: BlockedOn,
    },
}

/// What to do after one request/reply exchange.
enum Verdict {
    Continue,
    Close,
    Block(BlockedOn),
}

pub struct SessionDriver {
    framed: Framed<TcpStream, RespCodec>,
    session: Session,
    state: Arc<ServerState>,
    hot: SharedHotConfig,
    shutdown_rx: broadcast::Receiver<()>,
}

impl SessionDriver {
    pub fn new(
        framed: Framed<TcpStream, RespCodec>,
        session: Session,
        state: Arc<ServerState>,
        hot: SharedHotConfig,
        shutdown_rx: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            framed,
            session,
            state,
            hot,
            shutdown_rx,
        }
    }

    pub async fn run(mut self) -> SessionExit {
        // A session resuming from a blocking command owes its client a reply
        // before anything else happens.
        if let Some(reply) = self.session.pending_wake.take()
            && self.framed.send(reply.into()).await.is_err()
        {
            return SessionExit::Closed(Box::new(self.session));
        }

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown_rx.recv() => {
                    debug!("session {}: shutting down", self.session.id);
                    let _ = self.framed.flush().await;
                    return SessionExit::Closed(Box::new(self.session));
                }

                Some((channel, message)) = self.session.channel_subs.next(),
                    if !self.session.channel_subs.is_empty() =>
                {
                    if self.push_channel_message(channel, message).await.is_err() {
                        return SessionExit::Closed(Box::new(self.session));
                    }
                }

                Some((pattern, message)) = self.session.pattern_subs.next(),
                    if !self.session.pattern_subs.is_empty() =>
                {
                    if self.push_pattern_message(pattern, message).await.is_err() {
                        return SessionExit::Closed(Box::new(self.session));
                    }
                }

                frame = self.framed.next() => match frame {
                    None => {
                        debug!("session {}: connection closed by peer", self.session.id);
                        return SessionExit::Closed(Box::new(self.session));
                    }
                    Some(Err(KyaniteError::Io(e))) => {
                        debug!("session {}: read error: {e}", self.session.id);
                        return SessionExit::Closed(Box::new(self.session));
                    }
                    Some(Err(e)) => {
                        // Protocol violations get one error line, then the
                        // connection is dropped.
                        warn!("session {}: protocol error: {e}", self.session.id);
                        let _ = self.framed.send(RespFrame::Error(e.to_string())).await;
                        return SessionExit::Closed(Box::new(self.session));
                    }
                    Some(Ok(frame)) => {
                        let hot = self.hot.read().clone();
                        let flow =
                            handler::dispatch(&self.state, &mut self.session, &hot, frame).await;
                        match self.write_flow(flow).await {
                            Ok(Verdict::Continue) => {}
                            Ok(Verdict::Close) | Err(_) => {
                                return SessionExit::Closed(Box::new(self.session));
                            }
                            Ok(Verdict::Block(blocked)) => {
                                return SessionExit::Block {
                                    parked: Box::new(ParkedSession {
                                        framed: self.framed,
                                        session: self.session,
                                    }),
                                    blocked,
                                };
                            }
                        }
                    }
                },
            }
        }
    }

    async fn push_channel_message(
        &mut self,
        channel: bytes::Bytes,
        message: Result<bytes::Bytes, tokio_stream::wrappers::errors::BroadcastStreamRecvError>,
    ) -> Result<(), KyaniteError> {
        match message {
            Ok(payload) => {
                let push = RespValue::Array(vec![
                    RespValue::BulkString("message".into()),
                    RespValue::BulkString(channel),
                    RespValue::BulkString(payload),
                ]);
                self.framed.send(push.into()).await
            }
            Err(lag) => {
                // A lagged subscriber skips ahead; dropped messages are the
                // documented cost of falling behind.
                debug!("session {}: subscriber lagged: {lag}", self.session.id);
                Ok(())
            }
        }
    }

    async fn push_pattern_message(
        &mut self,
        pattern: bytes::Bytes,
        message: Result<
            crate::core::pubsub::PatternMessage,
            tokio_stream::wrappers::errors::BroadcastStreamRecvError,
        >,
    ) -> Result<(), KyaniteError> {
        match message {
            Ok((channel, payload)) => {
                let push = RespValue::Array(vec![
                    RespValue::BulkString("pmessage".into()),
                    RespValue::BulkString(pattern),
                    RespValue::BulkString(channel),
                    RespValue::BulkString(payload),
                ]);
                self.framed.send(push.into()).await
            }
            Err(lag) => {
                debug!("session {}: pattern subscriber lagged: {lag}", self.session.id);
                Ok(())
            }
        }
    }

    /// Writes the router's replies and reports what happens next.
    async fn write_flow(&mut self, flow: Flow) -> Result<Verdict, KyaniteError> {
        match flow {
            Flow::Reply(reply) => {
                self.framed.send(reply.into()).await?;
            }
            Flow::Replies(replies) => {
                for reply in replies {
                    self.framed.feed(reply.into()).await?;
                }
                self.framed.flush().await?;
            }
            Flow::Close(reply) => {
                if let Some(reply) = reply {
                    let _ = self.framed.send(reply.into()).await;
                }
                return Ok(Verdict::Close);
            }
            Flow::Block(blocked) => {
                return Ok(Verdict::Block(blocked));
            }
        }
        Ok(Verdict::Continue)
    }
}
