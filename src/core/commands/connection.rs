// src/core/commands/connection.rs

//! Connection-level commands. These touch session state and are handled by
//! the session driver; the structs here only carry their parsed arguments.

use crate::core::KyaniteError;
use crate::core::commands::command_trait::ParseCommand;
use crate::core::commands::helpers::{arg_eq, extract_bytes, extract_i64};
use crate::core::protocol::RespFrame;
use bytes::Bytes;

/// `PING [message]`
#[derive(Debug, Clone)]
pub struct Ping {
    pub message: Option<Bytes>,
}

impl ParseCommand for Ping {
    fn parse(args: &[RespFrame]) -> Result<Self, KyaniteError> {
        match args {
            [] => Ok(Ping { message: None }),
            [message] => Ok(Ping {
                message: Some(extract_bytes(message)?),
            }),
            _ => Err(KyaniteError::WrongArgumentCount("ping".to_string())),
        }
    }
}

/// `ECHO message`
#[derive(Debug, Clone)]
pub struct Echo {
    pub message: Bytes,
}

impl ParseCommand for Echo {
    fn parse(args: &[RespFrame]) -> Result<Self, KyaniteError> {
        match args {
            [message] => Ok(Echo {
                message: extract_bytes(message)?,
            }),
            _ => Err(KyaniteError::WrongArgumentCount("echo".to_string())),
        }
    }
}

/// `AUTH password`
#[derive(Debug, Clone)]
pub struct Auth {
    pub password: String,
}

impl ParseCommand for Auth {
    fn parse(args: &[RespFrame]) -> Result<Self, KyaniteError> {
        match args {
            [password] => {
                let raw = extract_bytes(password)?;
                Ok(Auth {
                    password: String::from_utf8_lossy(&raw).into_owned(),
                })
            }
            _ => Err(KyaniteError::WrongArgumentCount("auth".to_string())),
        }
    }
}

/// `SELECT index`
#[derive(Debug, Clone)]
pub struct Select {
    pub index: i64,
}

impl ParseCommand for Select {
    fn parse(args: &[RespFrame]) -> Result<Self, KyaniteError> {
        match args {
            [index] => Ok(Select {
                index: extract_i64(index).map_err(|_| KyaniteError::InvalidDbIndex)?,
            }),
            _ => Err(KyaniteError::WrongArgumentCount("select".to_string())),
        }
    }
}

/// `QUIT`
#[derive(Debug, Clone)]
pub struct Quit;

impl ParseCommand for Quit {
    fn parse(args: &[RespFrame]) -> Result<Self, KyaniteError> {
        if !args.is_empty() {
            return Err(KyaniteError::WrongArgumentCount("quit".to_string()));
        }
        Ok(Quit)
    }
}

/// `SHUTDOWN [NOSAVE]`
#[derive(Debug, Clone)]
pub struct Shutdown {
    pub nosave: bool,
}

impl ParseCommand for Shutdown {
    fn parse(args: &[RespFrame]) -> Result<Self, KyaniteError> {
        match args {
            [] => Ok(Shutdown { nosave: false }),
            [flag] if arg_eq(flag, "nosave") => Ok(Shutdown { nosave: true }),
            _ => Err(KyaniteError::SyntaxError),
        }
    }
}
