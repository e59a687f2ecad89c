// src/core/database/context.rs

use super::core::{Db, DbInner};
use crate::core::KyaniteError;
use crate::core::state::ServerState;
use parking_lot::{RwLockReadGuard, RwLockWriteGuard};
use std::sync::Arc;

/// The database lock held for the duration of one logical command,
/// parameterised by access mode. Read-only commands run under `Shared`;
/// anything that can modify the database runs under `Exclusive`.
pub enum DbGuard<'a> {
    Shared(RwLockReadGuard<'a, DbInner>),
    Exclusive(RwLockWriteGuard<'a, DbInner>),
}

impl<'a> DbGuard<'a> {
    pub fn inner(&self) -> &DbInner {
        match self {
            DbGuard::Shared(guard) => guard,
            DbGuard::Exclusive(guard) => guard,
        }
    }

    /// Mutable access to the database. Fails if the command was routed with
    /// a shared lock; that indicates a mis-flagged command, not a user error.
    pub fn inner_mut(&mut self) -> Result<&mut DbInner, KyaniteError> {
        match self {
            DbGuard::Exclusive(guard) => Ok(&mut *guard),
            DbGuard::Shared(_) => Err(KyaniteError::Internal(
                "write access requested under a shared database lock".to_string(),
            )),
        }
    }
}

/// `ExecutionContext` provides all the state and the held lock required to
/// execute one command. Handlers never retain references past the guard's
/// lifetime; the context is built, the command runs, the context is dropped.
pub struct ExecutionContext<'a> {
    pub state: &'a Arc<ServerState>,
    pub db: &'a Arc<Db>,
    pub guard: DbGuard<'a>,
    pub session_id: u64,
    /// Wall clock for expiration decisions, sampled once per command.
    pub now_ms: u64,
    /// The 24-bit LRU clock value for access-time stamping.
    pub lru_clock: u32,
}

impl ExecutionContext<'_> {
    pub fn inner(&self) -> &DbInner {
        self.guard.inner()
    }

    pub fn inner_mut(&mut self) -> Result<&mut DbInner, KyaniteError> {
        self.guard.inner_mut()
    }
}
