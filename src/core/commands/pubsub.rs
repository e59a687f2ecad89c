// src/core/commands/pubsub.rs

//! Publish/subscribe commands. `PUBLISH` executes like a data command under
//! the database's exclusive lock; the subscription commands mutate session
//! state and are handled by the session driver.

use crate::core::commands::command_trait::{ExecutableCommand, ParseCommand};
use crate::core::commands::helpers::extract_bytes;
use crate::core::database::ExecutionContext;
use crate::core::protocol::RespFrame;
use crate::core::{KyaniteError, RespValue};
use bytes::Bytes;

/// `PUBLISH channel message`
#[derive(Debug, Clone)]
pub struct Publish {
    pub channel: Bytes,
    pub message: Bytes,
}

impl ParseCommand for Publish {
    fn parse(args: &[RespFrame]) -> Result<Self, KyaniteError> {
        if args.len() != 2 {
            return Err(KyaniteError::WrongArgumentCount("publish".to_string()));
        }
        Ok(Publish {
            channel: extract_bytes(&args[0])?,
            message: extract_bytes(&args[1])?,
        })
    }
}

impl ExecutableCommand for Publish {
    fn execute(&self, ctx: &mut ExecutionContext<'_>) -> Result<RespValue, KyaniteError> {
        let inner = ctx.inner_mut()?;
        let receivers = inner.pubsub.publish(&self.channel, self.message.clone());
        Ok(RespValue::Integer(receivers as i64))
    }
}

/// `SUBSCRIBE channel [channel ...]` / `PSUBSCRIBE pattern [pattern ...]`
#[derive(Debug, Clone)]
pub struct Subscribe {
    pub targets: Vec<Bytes>,
    pub patterns: bool,
}

impl Subscribe {
    pub fn parse(args: &[RespFrame], name: &'static str, patterns: bool) -> Result<Self, KyaniteError> {
        if args.is_empty() {
            return Err(KyaniteError::WrongArgumentCount(name.to_string()));
        }
        Ok(Subscribe {
            targets: args.iter().map(extract_bytes).collect::<Result<_, _>>()?,
            patterns,
        })
    }
}

/// `UNSUBSCRIBE [channel ...]` / `PUNSUBSCRIBE [pattern ...]`
/// An empty target list unsubscribes from everything of that kind.
#[derive(Debug, Clone)]
pub struct Unsubscribe {
    pub targets: Vec<Bytes>,
    pub patterns: bool,
}

impl Unsubscribe {
    pub fn parse(args: &[RespFrame], patterns: bool) -> Result<Self, KyaniteError> {
        Ok(Unsubscribe {
            targets: args.iter().map(extract_bytes).collect::<Result<_, _>>()?,
            patterns,
        })
    }
}
