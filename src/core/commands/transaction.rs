// src/core/commands/transaction.rs

//! Transaction-control commands (`MULTI`/`EXEC`/`DISCARD`/`WATCH`/`UNWATCH`).
//! The staging and commit logic lives in the command router; these structs
//! only parse.

use crate::core::KyaniteError;
use crate::core::commands::command_trait::ParseCommand;
use crate::core::commands::helpers::extract_bytes;
use crate::core::protocol::RespFrame;
use bytes::Bytes;

#[derive(Debug, Clone)]
pub struct Multi;

impl ParseCommand for Multi {
    fn parse(args: &[RespFrame]) -> Result<Self, KyaniteError> {
        if !args.is_empty() {
            return Err(KyaniteError::WrongArgumentCount("multi".to_string()));
        }
        Ok(Multi)
    }
}

#[derive(Debug, Clone)]
pub struct Exec;

impl ParseCommand for Exec {
    fn parse(args: &[RespFrame]) -> Result<Self, KyaniteError> {
        if !args.is_empty() {
            return Err(KyaniteError::WrongArgumentCount("exec".to_string()));
        }
        Ok(Exec)
    }
}

#[derive(Debug, Clone)]
pub struct Discard;

impl ParseCommand for Discard {
    fn parse(args: &[RespFrame]) -> Result<Self, KyaniteError> {
        if !args.is_empty() {
            return Err(KyaniteError::WrongArgumentCount("discard".to_string()));
        }
        Ok(Discard)
    }
}

/// `WATCH key [key ...]`
#[derive(Debug, Clone)]
pub struct Watch {
    pub keys: Vec<Bytes>,
}

impl ParseCommand for Watch {
    fn parse(args: &[RespFrame]) -> Result<Self, KyaniteError> {
        if args.is_empty() {
            return Err(KyaniteError::WrongArgumentCount("watch".to_string()));
        }
        Ok(Watch {
            keys: args.iter().map(extract_bytes).collect::<Result<_, _>>()?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct Unwatch;

impl ParseCommand for Unwatch {
    fn parse(args: &[RespFrame]) -> Result<Self, KyaniteError> {
        if !args.is_empty() {
            return Err(KyaniteError::WrongArgumentCount("unwatch".to_string()));
        }
        Ok(Unwatch)
    }
}
