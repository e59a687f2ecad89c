// src/core/commands/keyspace.rs

//! Generic keyspace commands: existence, deletion, expiration, inspection.

use crate::core::commands::command_trait::{ExecutableCommand, ParseCommand};
use crate::core::commands::helpers::{extract_bytes, extract_i64, glob_match};
use crate::core::database::ExecutionContext;
use crate::core::protocol::RespFrame;
use crate::core::{KyaniteError, RespValue};
use bytes::Bytes;

/// `DEL key [key ...]`
#[derive(Debug, Clone)]
pub struct Del {
    pub keys: Vec<Bytes>,
}

impl ParseCommand for Del {
    fn parse(args: &[RespFrame]) -> Result<Self, KyaniteError> {
        if args.is_empty() {
            return Err(KyaniteError::WrongArgumentCount("del".to_string()));
        }
        Ok(Del {
            keys: args.iter().map(extract_bytes).collect::<Result<_, _>>()?,
        })
    }
}

impl ExecutableCommand for Del {
    fn execute(&self, ctx: &mut ExecutionContext<'_>) -> Result<RespValue, KyaniteError> {
        let now = ctx.now_ms;
        let inner = ctx.inner_mut()?;
        let mut deleted = 0i64;
        for key in &self.keys {
            // Keys past their deadline count as already gone.
            if inner.expire_if_needed(key, now) {
                continue;
            }
            if inner.delete(key) {
                deleted += 1;
            }
        }
        Ok(RespValue::Integer(deleted))
    }
}

/// `EXISTS key [key ...]`
#[derive(Debug, Clone)]
pub struct Exists {
    pub keys: Vec<Bytes>,
}

impl ParseCommand for Exists {
    fn parse(args: &[RespFrame]) -> Result<Self, KyaniteError> {
        if args.is_empty() {
            return Err(KyaniteError::WrongArgumentCount("exists".to_string()));
        }
        Ok(Exists {
            keys: args.iter().map(extract_bytes).collect::<Result<_, _>>()?,
        })
    }
}

impl ExecutableCommand for Exists {
    fn execute(&self, ctx: &mut ExecutionContext<'_>) -> Result<RespValue, KyaniteError> {
        let now = ctx.now_ms;
        let inner = ctx.inner();
        let found = self
            .keys
            .iter()
            .filter(|key| inner.lookup_read(key, now).is_some())
            .count();
        Ok(RespValue::Integer(found as i64))
    }
}

/// The `EXPIRE`/`PEXPIRE`/`EXPIREAT`/`PEXPIREAT` quartet, normalised to one
/// shape: a value, the unit it is in, and whether it is absolute.
#[derive(Debug, Clone)]
pub struct Expire {
    pub key: Bytes,
    pub value: i64,
    pub unit_ms: i64,
    pub absolute: bool,
}

impl Expire {
    pub fn parse(
        args: &[RespFrame],
        name: &'static str,
        unit_ms: i64,
        absolute: bool,
    ) -> Result<Self, KyaniteError> {
        if args.len() != 2 {
            return Err(KyaniteError::WrongArgumentCount(name.to_string()));
        }
        Ok(Expire {
            key: extract_bytes(&args[0])?,
            value: extract_i64(&args[1])?,
            unit_ms,
            absolute,
        })
    }
}

impl ExecutableCommand for Expire {
    fn execute(&self, ctx: &mut ExecutionContext<'_>) -> Result<RespValue, KyaniteError> {
        let now = ctx.now_ms;
        let inner = ctx.inner_mut()?;
        if inner.lookup_write(&self.key, now).is_none() {
            return Ok(RespValue::Integer(0));
        }
        let at_ms = if self.absolute {
            self.value.saturating_mul(self.unit_ms)
        } else {
            (now as i64).saturating_add(self.value.saturating_mul(self.unit_ms))
        };

        // A deadline in the past deletes the key outright.
        if at_ms <= now as i64 {
            inner.delete(&self.key);
            return Ok(RespValue::Integer(1));
        }
        inner.set_expire(&self.key, at_ms as u64);
        inner.signal_modified_key(&self.key);
        Ok(RespValue::Integer(1))
    }
}

/// `TTL key` / `PTTL key`
#[derive(Debug, Clone)]
pub struct Ttl {
    pub key: Bytes,
    pub in_ms: bool,
}

impl Ttl {
    pub fn parse(args: &[RespFrame], name: &'static str, in_ms: bool) -> Result<Self, KyaniteError> {
        if args.len() != 1 {
            return Err(KyaniteError::WrongArgumentCount(name.to_string()));
        }
        Ok(Ttl {
            key: extract_bytes(&args[0])?,
            in_ms,
        })
    }
}

impl ExecutableCommand for Ttl {
    fn execute(&self, ctx: &mut ExecutionContext<'_>) -> Result<RespValue, KyaniteError> {
        let now = ctx.now_ms;
        let inner = ctx.inner();
        if inner.lookup_read(&self.key, now).is_none() {
            return Ok(RespValue::Integer(-2));
        }
        let Some(at) = inner.get_expire(&self.key) else {
            return Ok(RespValue::Integer(-1));
        };
        let remaining_ms = at.saturating_sub(now);
        let reported = if self.in_ms {
            remaining_ms
        } else {
            (remaining_ms + 500) / 1000
        };
        Ok(RespValue::Integer(reported as i64))
    }
}

/// `PERSIST key`
#[derive(Debug, Clone)]
pub struct Persist {
    pub key: Bytes,
}

impl ParseCommand for Persist {
    fn parse(args: &[RespFrame]) -> Result<Self, KyaniteError> {
        if args.len() != 1 {
            return Err(KyaniteError::WrongArgumentCount("persist".to_string()));
        }
        Ok(Persist {
            key: extract_bytes(&args[0])?,
        })
    }
}

impl ExecutableCommand for Persist {
    fn execute(&self, ctx: &mut ExecutionContext<'_>) -> Result<RespValue, KyaniteError> {
        let now = ctx.now_ms;
        let inner = ctx.inner_mut()?;
        if inner.lookup_write(&self.key, now).is_none() {
            return Ok(RespValue::Integer(0));
        }
        let removed = inner.remove_expire(&self.key);
        if removed {
            inner.signal_modified_key(&self.key);
        }
        Ok(RespValue::Integer(removed as i64))
    }
}

/// `TYPE key`
#[derive(Debug, Clone)]
pub struct TypeCmd {
    pub key: Bytes,
}

impl ParseCommand for TypeCmd {
    fn parse(args: &[RespFrame]) -> Result<Self, KyaniteError> {
        if args.len() != 1 {
            return Err(KyaniteError::WrongArgumentCount("type".to_string()));
        }
        Ok(TypeCmd {
            key: extract_bytes(&args[0])?,
        })
    }
}

impl ExecutableCommand for TypeCmd {
    fn execute(&self, ctx: &mut ExecutionContext<'_>) -> Result<RespValue, KyaniteError> {
        let now = ctx.now_ms;
        let name = match ctx.inner().lookup_read(&self.key, now) {
            Some(entry) => entry.data.type_name(),
            None => "none",
        };
        Ok(RespValue::SimpleString(name.to_string()))
    }
}

/// `KEYS pattern`
#[derive(Debug, Clone)]
pub struct Keys {
    pub pattern: Bytes,
}

impl ParseCommand for Keys {
    fn parse(args: &[RespFrame]) -> Result<Self, KyaniteError> {
        if args.len() != 1 {
            return Err(KyaniteError::WrongArgumentCount("keys".to_string()));
        }
        Ok(Keys {
            pattern: extract_bytes(&args[0])?,
        })
    }
}

impl ExecutableCommand for Keys {
    fn execute(&self, ctx: &mut ExecutionContext<'_>) -> Result<RespValue, KyaniteError> {
        let now = ctx.now_ms;
        let inner = ctx.inner();
        let matched = inner
            .keys()
            .filter(|key| !inner.check_expired(key, now))
            .filter(|key| glob_match(&self.pattern, key))
            .cloned()
            .map(RespValue::BulkString)
            .collect();
        Ok(RespValue::Array(matched))
    }
}

/// `RANDOMKEY`
#[derive(Debug, Clone)]
pub struct RandomKey;

impl ParseCommand for RandomKey {
    fn parse(args: &[RespFrame]) -> Result<Self, KyaniteError> {
        if !args.is_empty() {
            return Err(KyaniteError::WrongArgumentCount("randomkey".to_string()));
        }
        Ok(RandomKey)
    }
}

impl ExecutableCommand for RandomKey {
    fn execute(&self, ctx: &mut ExecutionContext<'_>) -> Result<RespValue, KyaniteError> {
        let now = ctx.now_ms;
        match ctx.inner().random_key(now) {
            Some(key) => Ok(RespValue::BulkString(key)),
            None => Ok(RespValue::Null),
        }
    }
}

/// `RENAME source destination`
#[derive(Debug, Clone)]
pub struct Rename {
    pub source: Bytes,
    pub destination: Bytes,
}

impl ParseCommand for Rename {
    fn parse(args: &[RespFrame]) -> Result<Self, KyaniteError> {
        if args.len() != 2 {
            return Err(KyaniteError::WrongArgumentCount("rename".to_string()));
        }
        Ok(Rename {
            source: extract_bytes(&args[0])?,
            destination: extract_bytes(&args[1])?,
        })
    }
}

impl ExecutableCommand for Rename {
    fn execute(&self, ctx: &mut ExecutionContext<'_>) -> Result<RespValue, KyaniteError> {
        let now = ctx.now_ms;
        let inner = ctx.inner_mut()?;
        inner.rename(&self.source, &self.destination, now)?;
        Ok(RespValue::ok())
    }
}

/// `FLUSHDB`: removes every key of the current database in one locked phase.
#[derive(Debug, Clone)]
pub struct FlushDb;

impl ParseCommand for FlushDb {
    fn parse(args: &[RespFrame]) -> Result<Self, KyaniteError> {
        if !args.is_empty() {
            return Err(KyaniteError::WrongArgumentCount("flushdb".to_string()));
        }
        Ok(FlushDb)
    }
}

impl ExecutableCommand for FlushDb {
    fn execute(&self, ctx: &mut ExecutionContext<'_>) -> Result<RespValue, KyaniteError> {
        let inner = ctx.inner_mut()?;
        inner.empty(|_| {});
        Ok(RespValue::ok())
    }
}

/// `OBJECT ENCODING|IDLETIME key`
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ObjectSubcommand {
    Encoding,
    IdleTime,
}

#[derive(Debug, Clone)]
pub struct ObjectCmd {
    pub subcommand: ObjectSubcommand,
    pub key: Bytes,
}

impl ParseCommand for ObjectCmd {
    fn parse(args: &[RespFrame]) -> Result<Self, KyaniteError> {
        if args.len() != 2 {
            return Err(KyaniteError::WrongArgumentCount("object".to_string()));
        }
        let sub = extract_bytes(&args[0])?;
        let subcommand = match sub.to_ascii_lowercase().as_slice() {
            b"encoding" => ObjectSubcommand::Encoding,
            b"idletime" => ObjectSubcommand::IdleTime,
            _ => {
                return Err(KyaniteError::Generic(format!(
                    "Unknown OBJECT subcommand '{}'",
                    String::from_utf8_lossy(&sub)
                )));
            }
        };
        Ok(ObjectCmd {
            subcommand,
            key: extract_bytes(&args[1])?,
        })
    }
}

impl ExecutableCommand for ObjectCmd {
    fn execute(&self, ctx: &mut ExecutionContext<'_>) -> Result<RespValue, KyaniteError> {
        let now = ctx.now_ms;
        let lru = ctx.lru_clock;
        let Some(entry) = ctx.inner().lookup_read(&self.key, now) else {
            return Err(KyaniteError::KeyNotFound);
        };
        Ok(match self.subcommand {
            ObjectSubcommand::Encoding => {
                RespValue::BulkString(entry.data.encoding_name().into())
            }
            ObjectSubcommand::IdleTime => RespValue::Integer(entry.idle_time(lru) as i64),
        })
    }
}
