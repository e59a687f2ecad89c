// src/core/commands/command_trait.rs

//! Defines the core traits and flags shared by all executable commands.

use crate::core::database::ExecutionContext;
use crate::core::protocol::RespFrame;
use crate::core::{KyaniteError, RespValue};
use bitflags::bitflags;

bitflags! {
    /// Flags that describe the properties and behavior of a command.
    /// The router uses them to pick the lock mode, gate authentication and
    /// run the memory check ahead of allocating commands.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub struct CommandFlags: u32 {
        /// The command modifies the dataset and takes the exclusive lock.
        const WRITE        = 1 << 0;
        /// The command only reads data and may run under the shared lock.
        const READONLY     = 1 << 1;
        /// The command is denied while used memory exceeds `maxmemory`.
        const DENY_OOM     = 1 << 2;
        /// A transaction-control command (`MULTI`, `EXEC`, ...); never queued.
        const TRANSACTION  = 1 << 3;
        /// The command may park the session (blocking list pops).
        const BLOCKING     = 1 << 4;
        /// Allowed before authentication.
        const NO_AUTH      = 1 << 5;
        /// Handled by the session driver / router rather than `execute`.
        const SESSION      = 1 << 6;
    }
}

/// The execution logic of a data command, run with the database lock held.
/// Implementations are synchronous: the lock must never cross an await point.
pub trait ExecutableCommand {
    fn execute(&self, ctx: &mut ExecutionContext<'_>) -> Result<RespValue, KyaniteError>;
}

/// A trait for parsing a command's arguments from a slice of `RespFrame`s
/// (everything after the command name).
pub trait ParseCommand: Sized {
    fn parse(args: &[RespFrame]) -> Result<Self, KyaniteError>;
}
