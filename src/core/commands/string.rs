// src/core/commands/string.rs

//! The string command family.

use crate::core::commands::command_trait::{ExecutableCommand, ParseCommand};
use crate::core::commands::helpers::{extract_bytes, extract_i64};
use crate::core::database::ExecutionContext;
use crate::core::protocol::RespFrame;
use crate::core::storage::{StoredValue, StrValue, Value};
use crate::core::{KyaniteError, RespValue};
use bytes::Bytes;

fn as_string<'v>(value: &'v Value) -> Result<&'v StrValue, KyaniteError> {
    match value {
        Value::Str(s) => Ok(s),
        _ => Err(KyaniteError::WrongType),
    }
}

/// `GET key`
#[derive(Debug, Clone)]
pub struct Get {
    pub key: Bytes,
}

impl ParseCommand for Get {
    fn parse(args: &[RespFrame]) -> Result<Self, KyaniteError> {
        if args.len() != 1 {
            return Err(KyaniteError::WrongArgumentCount("get".to_string()));
        }
        Ok(Get {
            key: extract_bytes(&args[0])?,
        })
    }
}

impl ExecutableCommand for Get {
    fn execute(&self, ctx: &mut ExecutionContext<'_>) -> Result<RespValue, KyaniteError> {
        let now = ctx.now_ms;
        match ctx.inner().lookup_read(&self.key, now) {
            Some(entry) => Ok(RespValue::BulkString(as_string(&entry.data)?.as_bytes())),
            None => Ok(RespValue::Null),
        }
    }
}

/// Defines the condition for `SET` execution (`NX` or `XX`).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum SetCondition {
    #[default]
    None,
    IfExists,    // XX
    IfNotExists, // NX
}

/// TTL options accepted by `SET` and its variants.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub enum TtlOption {
    /// No TTL given; an existing expire is removed.
    #[default]
    None,
    Seconds(i64),
    Milliseconds(i64),
    UnixSeconds(i64),
    UnixMilliseconds(i64),
    /// KEEPTTL: leave any existing expire untouched.
    KeepExisting,
}

/// `SET key value [EX s|PX ms|EXAT ts|PXAT ts|KEEPTTL] [NX|XX] [GET]`
#[derive(Debug, Clone, Default)]
pub struct Set {
    pub key: Bytes,
    pub value: Bytes,
    pub ttl: TtlOption,
    pub condition: SetCondition,
    pub get: bool,
}

impl ParseCommand for Set {
    fn parse(args: &[RespFrame]) -> Result<Self, KyaniteError> {
        if args.len() < 2 {
            return Err(KyaniteError::WrongArgumentCount("set".to_string()));
        }
        let mut cmd = Set {
            key: extract_bytes(&args[0])?,
            value: extract_bytes(&args[1])?,
            ..Default::default()
        };

        let mut i = 2;
        while i < args.len() {
            let opt = extract_bytes(&args[i])?;
            let take_value = |i: usize| -> Result<i64, KyaniteError> {
                args.get(i + 1)
                    .ok_or(KyaniteError::SyntaxError)
                    .and_then(extract_i64)
            };
            match opt.to_ascii_lowercase().as_slice() {
                b"ex" => {
                    if cmd.ttl != TtlOption::None {
                        return Err(KyaniteError::SyntaxError);
                    }
                    cmd.ttl = TtlOption::Seconds(take_value(i)?);
                    i += 2;
                }
                b"px" => {
                    if cmd.ttl != TtlOption::None {
                        return Err(KyaniteError::SyntaxError);
                    }
                    cmd.ttl = TtlOption::Milliseconds(take_value(i)?);
                    i += 2;
                }
                b"exat" => {
                    if cmd.ttl != TtlOption::None {
                        return Err(KyaniteError::SyntaxError);
                    }
                    cmd.ttl = TtlOption::UnixSeconds(take_value(i)?);
                    i += 2;
                }
                b"pxat" => {
                    if cmd.ttl != TtlOption::None {
                        return Err(KyaniteError::SyntaxError);
                    }
                    cmd.ttl = TtlOption::UnixMilliseconds(take_value(i)?);
                    i += 2;
                }
                b"keepttl" => {
                    if cmd.ttl != TtlOption::None {
                        return Err(KyaniteError::SyntaxError);
                    }
                    cmd.ttl = TtlOption::KeepExisting;
                    i += 1;
                }
                b"nx" => {
                    if cmd.condition != SetCondition::None {
                        return Err(KyaniteError::SyntaxError);
                    }
                    cmd.condition = SetCondition::IfNotExists;
                    i += 1;
                }
                b"xx" => {
                    if cmd.condition != SetCondition::None {
                        return Err(KyaniteError::SyntaxError);
                    }
                    cmd.condition = SetCondition::IfExists;
                    i += 1;
                }
                b"get" => {
                    cmd.get = true;
                    i += 1;
                }
                _ => return Err(KyaniteError::SyntaxError),
            }
        }
        Ok(cmd)
    }
}

impl Set {
    /// The absolute deadline this SET attaches, if any.
    fn deadline_ms(&self, now_ms: u64) -> Result<Option<u64>, KyaniteError> {
        let invalid =
            |what: &str| KyaniteError::Generic(format!("invalid expire time in '{what}' command"));
        let at = match self.ttl {
            TtlOption::None | TtlOption::KeepExisting => return Ok(None),
            TtlOption::Seconds(s) => {
                if s <= 0 {
                    return Err(invalid("set"));
                }
                now_ms + (s as u64) * 1000
            }
            TtlOption::Milliseconds(ms) => {
                if ms <= 0 {
                    return Err(invalid("set"));
                }
                now_ms + ms as u64
            }
            TtlOption::UnixSeconds(ts) => (ts.max(0) as u64) * 1000,
            TtlOption::UnixMilliseconds(ts) => ts.max(0) as u64,
        };
        Ok(Some(at))
    }
}

impl ExecutableCommand for Set {
    fn execute(&self, ctx: &mut ExecutionContext<'_>) -> Result<RespValue, KyaniteError> {
        let now = ctx.now_ms;
        let lru = ctx.lru_clock;
        let deadline = self.deadline_ms(now)?;
        let inner = ctx.inner_mut()?;

        let existing = inner.lookup_write(&self.key, now);
        let exists = existing.is_some();

        let old_value = if self.get {
            match existing {
                Some(entry) => Some(as_string(&entry.data)?.as_bytes()),
                None => None,
            }
        } else {
            None
        };

        let allowed = match self.condition {
            SetCondition::None => true,
            SetCondition::IfExists => exists,
            SetCondition::IfNotExists => !exists,
        };
        if !allowed {
            return Ok(match old_value {
                Some(old) => RespValue::BulkString(old),
                None => RespValue::Null,
            });
        }

        let keep_ttl = self.ttl == TtlOption::KeepExisting;
        let value = StoredValue::new(Value::Str(StrValue::from_bytes(&self.value)), lru);
        inner.set(self.key.clone(), value, keep_ttl);
        if let Some(at) = deadline {
            inner.set_expire(&self.key, at);
        }
        inner.signal_modified_key(&self.key);

        Ok(if self.get {
            match old_value {
                Some(old) => RespValue::BulkString(old),
                None => RespValue::Null,
            }
        } else {
            RespValue::ok()
        })
    }
}

/// `SETNX key value`
#[derive(Debug, Clone)]
pub struct SetNx {
    pub key: Bytes,
    pub value: Bytes,
}

impl ParseCommand for SetNx {
    fn parse(args: &[RespFrame]) -> Result<Self, KyaniteError> {
        if args.len() != 2 {
            return Err(KyaniteError::WrongArgumentCount("setnx".to_string()));
        }
        Ok(SetNx {
            key: extract_bytes(&args[0])?,
            value: extract_bytes(&args[1])?,
        })
    }
}

impl ExecutableCommand for SetNx {
    fn execute(&self, ctx: &mut ExecutionContext<'_>) -> Result<RespValue, KyaniteError> {
        let now = ctx.now_ms;
        let lru = ctx.lru_clock;
        let inner = ctx.inner_mut()?;
        if inner.lookup_write(&self.key, now).is_some() {
            return Ok(RespValue::Integer(0));
        }
        let value = StoredValue::new(Value::Str(StrValue::from_bytes(&self.value)), lru);
        inner.set(self.key.clone(), value, false);
        inner.signal_modified_key(&self.key);
        Ok(RespValue::Integer(1))
    }
}

/// `SETEX key seconds value` / `PSETEX key ms value`
#[derive(Debug, Clone)]
pub struct SetWithTtl {
    pub key: Bytes,
    pub value: Bytes,
    pub ttl_ms: i64,
    pub name: &'static str,
}

impl SetWithTtl {
    pub fn parse(args: &[RespFrame], name: &'static str, unit_ms: i64) -> Result<Self, KyaniteError> {
        if args.len() != 3 {
            return Err(KyaniteError::WrongArgumentCount(name.to_string()));
        }
        let ttl = extract_i64(&args[1])?;
        Ok(SetWithTtl {
            key: extract_bytes(&args[0])?,
            value: extract_bytes(&args[2])?,
            ttl_ms: ttl.saturating_mul(unit_ms),
            name,
        })
    }
}

impl ExecutableCommand for SetWithTtl {
    fn execute(&self, ctx: &mut ExecutionContext<'_>) -> Result<RespValue, KyaniteError> {
        if self.ttl_ms <= 0 {
            return Err(KyaniteError::Generic(format!(
                "invalid expire time in '{}' command",
                self.name
            )));
        }
        let now = ctx.now_ms;
        let lru = ctx.lru_clock;
        let inner = ctx.inner_mut()?;
        let value = StoredValue::new(Value::Str(StrValue::from_bytes(&self.value)), lru);
        inner.set(self.key.clone(), value, false);
        inner.set_expire(&self.key, now + self.ttl_ms as u64);
        inner.signal_modified_key(&self.key);
        Ok(RespValue::ok())
    }
}

/// `MGET key [key ...]`
#[derive(Debug, Clone)]
pub struct MGet {
    pub keys: Vec<Bytes>,
}

impl ParseCommand for MGet {
    fn parse(args: &[RespFrame]) -> Result<Self, KyaniteError> {
        if args.is_empty() {
            return Err(KyaniteError::WrongArgumentCount("mget".to_string()));
        }
        Ok(MGet {
            keys: args.iter().map(extract_bytes).collect::<Result<_, _>>()?,
        })
    }
}

impl ExecutableCommand for MGet {
    fn execute(&self, ctx: &mut ExecutionContext<'_>) -> Result<RespValue, KyaniteError> {
        let now = ctx.now_ms;
        let inner = ctx.inner();
        let values = self
            .keys
            .iter()
            .map(|key| match inner.lookup_read(key, now) {
                // Non-string values read as nil here, by convention.
                Some(entry) => match &entry.data {
                    Value::Str(s) => RespValue::BulkString(s.as_bytes()),
                    _ => RespValue::Null,
                },
                None => RespValue::Null,
            })
            .collect();
        Ok(RespValue::Array(values))
    }
}

/// `MSET key value [key value ...]`
#[derive(Debug, Clone)]
pub struct MSet {
    pub pairs: Vec<(Bytes, Bytes)>,
}

impl ParseCommand for MSet {
    fn parse(args: &[RespFrame]) -> Result<Self, KyaniteError> {
        if args.is_empty() || args.len() % 2 != 0 {
            return Err(KyaniteError::WrongArgumentCount("mset".to_string()));
        }
        let pairs = args
            .chunks_exact(2)
            .map(|pair| Ok((extract_bytes(&pair[0])?, extract_bytes(&pair[1])?)))
            .collect::<Result<_, KyaniteError>>()?;
        Ok(MSet { pairs })
    }
}

impl ExecutableCommand for MSet {
    fn execute(&self, ctx: &mut ExecutionContext<'_>) -> Result<RespValue, KyaniteError> {
        let lru = ctx.lru_clock;
        let inner = ctx.inner_mut()?;
        for (key, payload) in &self.pairs {
            let value = StoredValue::new(Value::Str(StrValue::from_bytes(payload)), lru);
            inner.set(key.clone(), value, false);
            inner.signal_modified_key(key);
        }
        Ok(RespValue::ok())
    }
}

/// `APPEND key value`
#[derive(Debug, Clone)]
pub struct Append {
    pub key: Bytes,
    pub value: Bytes,
}

impl ParseCommand for Append {
    fn parse(args: &[RespFrame]) -> Result<Self, KyaniteError> {
        if args.len() != 2 {
            return Err(KyaniteError::WrongArgumentCount("append".to_string()));
        }
        Ok(Append {
            key: extract_bytes(&args[0])?,
            value: extract_bytes(&args[1])?,
        })
    }
}

impl ExecutableCommand for Append {
    fn execute(&self, ctx: &mut ExecutionContext<'_>) -> Result<RespValue, KyaniteError> {
        let now = ctx.now_ms;
        let lru = ctx.lru_clock;
        let inner = ctx.inner_mut()?;
        let new_len = inner.update_or_create(
            &self.key,
            now,
            lru,
            || Value::Str(StrValue::from_bytes(b"")),
            |entry| match &entry.data {
                Value::Str(s) => {
                    let mut combined = s.as_bytes().to_vec();
                    combined.extend_from_slice(&self.value);
                    let len = combined.len();
                    entry.data = Value::Str(StrValue::from_bytes(&combined));
                    Ok(len)
                }
                _ => Err(KyaniteError::WrongType),
            },
        )?;
        inner.signal_modified_key(&self.key);
        Ok(RespValue::Integer(new_len as i64))
    }
}

/// `STRLEN key`
#[derive(Debug, Clone)]
pub struct Strlen {
    pub key: Bytes,
}

impl ParseCommand for Strlen {
    fn parse(args: &[RespFrame]) -> Result<Self, KyaniteError> {
        if args.len() != 1 {
            return Err(KyaniteError::WrongArgumentCount("strlen".to_string()));
        }
        Ok(Strlen {
            key: extract_bytes(&args[0])?,
        })
    }
}

impl ExecutableCommand for Strlen {
    fn execute(&self, ctx: &mut ExecutionContext<'_>) -> Result<RespValue, KyaniteError> {
        let now = ctx.now_ms;
        match ctx.inner().lookup_read(&self.key, now) {
            Some(entry) => Ok(RespValue::Integer(as_string(&entry.data)?.len() as i64)),
            None => Ok(RespValue::Integer(0)),
        }
    }
}

/// `INCR`/`DECR`/`INCRBY`/`DECRBY`, all reduced to one signed delta.
#[derive(Debug, Clone)]
pub struct IncrBy {
    pub key: Bytes,
    pub delta: i64,
}

impl IncrBy {
    pub fn parse(args: &[RespFrame], name: &'static str, sign: i64, explicit: bool) -> Result<Self, KyaniteError> {
        let expected = if explicit { 2 } else { 1 };
        if args.len() != expected {
            return Err(KyaniteError::WrongArgumentCount(name.to_string()));
        }
        let delta = if explicit { extract_i64(&args[1])? } else { 1 };
        let delta = delta.checked_mul(sign).ok_or(KyaniteError::Overflow)?;
        Ok(IncrBy {
            key: extract_bytes(&args[0])?,
            delta,
        })
    }
}

impl ExecutableCommand for IncrBy {
    fn execute(&self, ctx: &mut ExecutionContext<'_>) -> Result<RespValue, KyaniteError> {
        let now = ctx.now_ms;
        let lru = ctx.lru_clock;
        let inner = ctx.inner_mut()?;
        let new_value = inner.update_or_create(
            &self.key,
            now,
            lru,
            || Value::Str(StrValue::Int(0)),
            |entry| {
                let current = match &entry.data {
                    Value::Str(StrValue::Int(i)) => *i,
                    Value::Str(_) => return Err(KyaniteError::NotAnInteger),
                    _ => return Err(KyaniteError::WrongType),
                };
                let next = current
                    .checked_add(self.delta)
                    .ok_or(KyaniteError::Overflow)?;
                entry.data = Value::Str(StrValue::Int(next));
                Ok(next)
            },
        )?;
        inner.signal_modified_key(&self.key);
        Ok(RespValue::Integer(new_value))
    }
}

/// `GETRANGE key start end`
#[derive(Debug, Clone)]
pub struct GetRange {
    pub key: Bytes,
    pub start: i64,
    pub end: i64,
}

impl ParseCommand for GetRange {
    fn parse(args: &[RespFrame]) -> Result<Self, KyaniteError> {
        if args.len() != 3 {
            return Err(KyaniteError::WrongArgumentCount("getrange".to_string()));
        }
        Ok(GetRange {
            key: extract_bytes(&args[0])?,
            start: extract_i64(&args[1])?,
            end: extract_i64(&args[2])?,
        })
    }
}

impl ExecutableCommand for GetRange {
    fn execute(&self, ctx: &mut ExecutionContext<'_>) -> Result<RespValue, KyaniteError> {
        let now = ctx.now_ms;
        let Some(entry) = ctx.inner().lookup_read(&self.key, now) else {
            return Ok(RespValue::BulkString(Bytes::new()));
        };
        let payload = as_string(&entry.data)?.as_bytes();
        match crate::core::commands::helpers::normalize_range(self.start, self.end, payload.len()) {
            Some((start, end)) => Ok(RespValue::BulkString(payload.slice(start..=end))),
            None => Ok(RespValue::BulkString(Bytes::new())),
        }
    }
}
