// src/server/handoff.rs

//! The typed hand-off units that travel between the dispatcher and the
//! workers. These replace the wake-byte + untyped-queue protocol of a
//! classic multi-threaded event-loop design: the channel send is the wake.

use crate::connection::Session;
use crate::core::RespValue;
use crate::core::protocol::RespCodec;
use crate::core::state::ClientHandle;
use bytes::Bytes;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpStream;
use tokio_util::codec::Framed;

/// A session at rest: its framed socket plus all worker-owned state, bundled
/// so it can travel between loops without being polled anywhere.
#[derive(Debug)]
pub struct ParkedSession {
    pub framed: Framed<TcpStream, RespCodec>,
    pub session: Session,
}

/// What a parked session is waiting for.
#[derive(Debug, Clone)]
pub struct BlockedOn {
    pub db_index: usize,
    pub keys: Vec<Bytes>,
    /// None blocks until data arrives, with no timeout.
    pub deadline: Option<Instant>,
}

/// Dispatcher -> worker hand-off.
#[derive(Debug)]
pub enum Handoff {
    /// A freshly accepted connection, already registered with the client
    /// registry.
    NewConn {
        stream: TcpStream,
        addr: SocketAddr,
        handle: Arc<ClientHandle>,
    },
    /// A previously parked session returning to service. `reply` is written
    /// before the session resumes reading.
    Resume {
        parked: Box<ParkedSession>,
        reply: RespValue,
    },
}

/// Worker -> dispatcher traffic.
#[derive(Debug)]
pub enum ToDispatcher {
    /// A session that must block: unlinked from its worker, to be held until
    /// woken or timed out.
    Park {
        parked: Box<ParkedSession>,
        blocked: BlockedOn,
    },
    /// A blocked session was served; the dispatcher re-dispatches it with
    /// this reply.
    Wake { session_id: u64, reply: RespValue },
}
