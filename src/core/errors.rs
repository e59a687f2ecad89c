// src/core/errors.rs

//! Defines the primary error type for the entire application.

use std::num::{ParseFloatError, ParseIntError};
use std::sync::Arc;
use thiserror::Error;

/// The main error enum, representing all possible failures within the server.
/// Using `thiserror` allows for clean error definitions and automatic `From` trait implementations.
///
/// The `Display` rendering of each variant is exactly what goes on the wire
/// after the `-` prefix, so variants that map to a well-known error class
/// (`WRONGTYPE`, `OOM`, `NOAUTH`, ...) spell the class in their message.
#[derive(Error, Debug, Clone)]
pub enum KyaniteError {
    #[error("ERR io error: {0}")]
    Io(Arc<std::io::Error>),

    #[error("incomplete frame")]
    IncompleteFrame,

    #[error("ERR Protocol error: {0}")]
    ProtocolError(String),

    #[error("ERR unknown command '{0}'")]
    UnknownCommand(String),

    #[error("ERR syntax error")]
    SyntaxError,

    #[error("ERR wrong number of arguments for '{0}' command")]
    WrongArgumentCount(String),

    #[error("WRONGTYPE Operation against a key holding the wrong kind of value")]
    WrongType,

    #[error("ERR value is not an integer or out of range")]
    NotAnInteger,

    #[error("ERR value is not a valid float")]
    NotAFloat,

    #[error("ERR increment or decrement would overflow")]
    Overflow,

    #[error("ERR no such key")]
    KeyNotFound,

    #[error("ERR key already exists")]
    KeyExists,

    #[error("ERR index out of range")]
    IndexOutOfRange,

    #[error("ERR timeout is not an integer or out of range")]
    InvalidTimeout,

    #[error("ERR timeout is negative")]
    NegativeTimeout,

    #[error("NOAUTH Authentication required.")]
    AuthRequired,

    #[error("NOAUTH Administrative permission required.")]
    AdminRequired,

    #[error("ERR invalid password")]
    InvalidPassword,

    #[error("ERR Client sent AUTH, but no password is set")]
    NoPasswordConfigured,

    #[error("ERR invalid DB index")]
    InvalidDbIndex,

    #[error("OOM command not allowed when used memory > 'maxmemory'.")]
    MaxMemoryReached,

    #[error("LOADING Kyanite is loading the dataset in memory")]
    Loading,

    #[error("BUSY Kyanite is busy running a long operation")]
    Busy,

    #[error("ERR {0} without MULTI")]
    NotInMulti(&'static str),

    #[error("ERR MULTI calls can not be nested")]
    NestedMulti,

    #[error("ERR WATCH inside MULTI is not allowed")]
    WatchInMulti,

    #[error("EXECABORT Transaction discarded because of previous errors.")]
    ExecAborted,

    #[error("ERR {0}")]
    InvalidState(String),

    #[error("ERR {0}")]
    Generic(String),

    #[error("ERR internal error: {0}")]
    Internal(String),
}

impl KyaniteError {
    /// Renders the error into the RESP wire form, without the trailing CRLF.
    pub fn to_resp_line(&self) -> String {
        format!("-{self}")
    }
}

// --- From trait implementations for easy error conversion ---

impl From<std::io::Error> for KyaniteError {
    fn from(e: std::io::Error) -> Self {
        KyaniteError::Io(Arc::new(e))
    }
}

impl From<ParseIntError> for KyaniteError {
    fn from(_: ParseIntError) -> Self {
        KyaniteError::NotAnInteger
    }
}

impl From<ParseFloatError> for KyaniteError {
    fn from(_: ParseFloatError) -> Self {
        KyaniteError::NotAFloat
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn well_known_error_classes_keep_their_prefix() {
        assert!(KyaniteError::WrongType.to_resp_line().starts_with("-WRONGTYPE"));
        assert!(KyaniteError::MaxMemoryReached.to_resp_line().starts_with("-OOM"));
        assert!(KyaniteError::AuthRequired.to_resp_line().starts_with("-NOAUTH"));
        assert!(KyaniteError::SyntaxError.to_resp_line().starts_with("-ERR"));
    }
}
