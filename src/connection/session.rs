// src/connection/session.rs

//! Defines the state associated with a single client session.

use crate::core::Command;
use crate::core::pubsub::PatternMessage;
use crate::core::state::ClientHandle;
use bytes::Bytes;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use tokio_stream::StreamMap;
use tokio_stream::wrappers::BroadcastStream;

/// The session's protocol-level state machine. Blocking is not a variant
/// here: a blocked session leaves its worker entirely and the blocking state
/// travels with it to the dispatcher.
#[derive(Debug, Default)]
pub enum SessionMode {
    #[default]
    Normal,
    /// Inside a `MULTI` block, accumulating staged commands.
    InMulti {
        queued: Vec<Command>,
        /// Set when a command failed to queue; `EXEC` will abort.
        aborted: bool,
    },
}

/// Everything a worker owns about one client, apart from the framed socket
/// (which the driver holds separately so reads and subscription pushes can
/// be polled concurrently).
#[derive(Debug)]
pub struct Session {
    pub id: u64,
    pub addr: SocketAddr,
    /// The cross-thread-visible registry entry.
    pub handle: Arc<ClientHandle>,
    /// The database this session operates on (`SELECT`).
    pub db_index: usize,
    pub authenticated: bool,
    /// Granted by authenticating with the administrative password.
    pub admin: bool,
    pub mode: SessionMode,
    /// Keys this session WATCHes, tagged with their database.
    pub watched: Vec<(usize, Bytes)>,
    /// Active channel subscriptions, keyed by channel name.
    pub channel_subs: StreamMap<Bytes, BroadcastStream<Bytes>>,
    /// Active pattern subscriptions, keyed by pattern.
    pub pattern_subs: StreamMap<Bytes, BroadcastStream<PatternMessage>>,
    /// A reply queued while the session was parked, written before the
    /// driver resumes reading.
    pub pending_wake: Option<crate::core::RespValue>,
}

impl Session {
    pub fn new(addr: SocketAddr, handle: Arc<ClientHandle>, auth_required: bool) -> Self {
        Self {
            id: handle.id,
            addr,
            handle,
            db_index: 0,
            authenticated: !auth_required,
            admin: false,
            mode: SessionMode::Normal,
            watched: Vec::new(),
            channel_subs: StreamMap::new(),
            pattern_subs: StreamMap::new(),
            pending_wake: None,
        }
    }

    /// True while at least one channel or pattern subscription is active;
    /// most commands are refused in this mode.
    pub fn is_subscribed(&self) -> bool {
        !self.channel_subs.is_empty() || !self.pattern_subs.is_empty()
    }

    pub fn subscription_count(&self) -> usize {
        self.channel_subs.len() + self.pattern_subs.len()
    }

    pub fn in_multi(&self) -> bool {
        matches!(self.mode, SessionMode::InMulti { .. })
    }

    /// Switches databases, mirroring the index into the registry handle.
    pub fn select_db(&mut self, index: usize) {
        self.db_index = index;
        self.handle.db_index.store(index, Ordering::Relaxed);
    }
}
