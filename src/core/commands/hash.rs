// src/core/commands/hash.rs

//! The hash command family.

use crate::core::commands::command_trait::{ExecutableCommand, ParseCommand};
use crate::core::commands::helpers::{extract_bytes, extract_i64};
use crate::core::database::ExecutionContext;
use crate::core::protocol::RespFrame;
use crate::core::storage::Value;
use crate::core::{KyaniteError, RespValue};
use bytes::Bytes;
use indexmap::IndexMap;

fn expect_hash(value: &Value) -> Result<&IndexMap<Bytes, Bytes>, KyaniteError> {
    match value {
        Value::Hash(fields) => Ok(fields),
        _ => Err(KyaniteError::WrongType),
    }
}

/// `HSET key field value [field value ...]` (`HMSET` parses identically).
#[derive(Debug, Clone)]
pub struct HSet {
    pub key: Bytes,
    pub pairs: Vec<(Bytes, Bytes)>,
    /// HMSET replies +OK instead of the inserted-field count.
    pub legacy_reply: bool,
}

impl HSet {
    pub fn parse(args: &[RespFrame], name: &'static str, legacy_reply: bool) -> Result<Self, KyaniteError> {
        if args.len() < 3 || args.len() % 2 != 1 {
            return Err(KyaniteError::WrongArgumentCount(name.to_string()));
        }
        let pairs = args[1..]
            .chunks_exact(2)
            .map(|pair| Ok((extract_bytes(&pair[0])?, extract_bytes(&pair[1])?)))
            .collect::<Result<_, KyaniteError>>()?;
        Ok(HSet {
            key: extract_bytes(&args[0])?,
            pairs,
            legacy_reply,
        })
    }
}

impl ExecutableCommand for HSet {
    fn execute(&self, ctx: &mut ExecutionContext<'_>) -> Result<RespValue, KyaniteError> {
        let now = ctx.now_ms;
        let lru = ctx.lru_clock;
        let inner = ctx.inner_mut()?;
        if let Some(entry) = inner.lookup_write(&self.key, now) {
            expect_hash(&entry.data)?;
        }
        let inserted = inner.update_or_create(
            &self.key,
            now,
            lru,
            || Value::Hash(IndexMap::new()),
            |entry| match &mut entry.data {
                Value::Hash(fields) => self
                    .pairs
                    .iter()
                    .filter(|(field, value)| {
                        fields.insert(field.clone(), value.clone()).is_none()
                    })
                    .count(),
                _ => 0,
            },
        );
        inner.signal_modified_key(&self.key);
        Ok(if self.legacy_reply {
            RespValue::ok()
        } else {
            RespValue::Integer(inserted as i64)
        })
    }
}

/// `HSETNX key field value`
#[derive(Debug, Clone)]
pub struct HSetNx {
    pub key: Bytes,
    pub field: Bytes,
    pub value: Bytes,
}

impl ParseCommand for HSetNx {
    fn parse(args: &[RespFrame]) -> Result<Self, KyaniteError> {
        if args.len() != 3 {
            return Err(KyaniteError::WrongArgumentCount("hsetnx".to_string()));
        }
        Ok(HSetNx {
            key: extract_bytes(&args[0])?,
            field: extract_bytes(&args[1])?,
            value: extract_bytes(&args[2])?,
        })
    }
}

impl ExecutableCommand for HSetNx {
    fn execute(&self, ctx: &mut ExecutionContext<'_>) -> Result<RespValue, KyaniteError> {
        let now = ctx.now_ms;
        let lru = ctx.lru_clock;
        let inner = ctx.inner_mut()?;
        if let Some(entry) = inner.lookup_write(&self.key, now) {
            expect_hash(&entry.data)?;
        }
        let inserted = inner.update_or_create(
            &self.key,
            now,
            lru,
            || Value::Hash(IndexMap::new()),
            |entry| match &mut entry.data {
                Value::Hash(fields) => {
                    if fields.contains_key(&self.field) {
                        false
                    } else {
                        fields.insert(self.field.clone(), self.value.clone());
                        true
                    }
                }
                _ => false,
            },
        );
        if inserted {
            inner.signal_modified_key(&self.key);
        }
        Ok(RespValue::Integer(inserted as i64))
    }
}

/// `HGET key field`
#[derive(Debug, Clone)]
pub struct HGet {
    pub key: Bytes,
    pub field: Bytes,
}

impl ParseCommand for HGet {
    fn parse(args: &[RespFrame]) -> Result<Self, KyaniteError> {
        if args.len() != 2 {
            return Err(KyaniteError::WrongArgumentCount("hget".to_string()));
        }
        Ok(HGet {
            key: extract_bytes(&args[0])?,
            field: extract_bytes(&args[1])?,
        })
    }
}

impl ExecutableCommand for HGet {
    fn execute(&self, ctx: &mut ExecutionContext<'_>) -> Result<RespValue, KyaniteError> {
        let now = ctx.now_ms;
        let Some(entry) = ctx.inner().lookup_read(&self.key, now) else {
            return Ok(RespValue::Null);
        };
        match expect_hash(&entry.data)?.get(&self.field) {
            Some(value) => Ok(RespValue::BulkString(value.clone())),
            None => Ok(RespValue::Null),
        }
    }
}

/// `HMGET key field [field ...]`
#[derive(Debug, Clone)]
pub struct HMGet {
    pub key: Bytes,
    pub fields: Vec<Bytes>,
}

impl ParseCommand for HMGet {
    fn parse(args: &[RespFrame]) -> Result<Self, KyaniteError> {
        if args.len() < 2 {
            return Err(KyaniteError::WrongArgumentCount("hmget".to_string()));
        }
        Ok(HMGet {
            key: extract_bytes(&args[0])?,
            fields: args[1..].iter().map(extract_bytes).collect::<Result<_, _>>()?,
        })
    }
}

impl ExecutableCommand for HMGet {
    fn execute(&self, ctx: &mut ExecutionContext<'_>) -> Result<RespValue, KyaniteError> {
        let now = ctx.now_ms;
        let entry = ctx.inner().lookup_read(&self.key, now);
        let fields = match &entry {
            Some(entry) => Some(expect_hash(&entry.data)?),
            None => None,
        };
        let values = self
            .fields
            .iter()
            .map(|field| match fields.and_then(|f| f.get(field)) {
                Some(value) => RespValue::BulkString(value.clone()),
                None => RespValue::Null,
            })
            .collect();
        Ok(RespValue::Array(values))
    }
}

/// `HDEL key field [field ...]`
#[derive(Debug, Clone)]
pub struct HDel {
    pub key: Bytes,
    pub fields: Vec<Bytes>,
}

impl ParseCommand for HDel {
    fn parse(args: &[RespFrame]) -> Result<Self, KyaniteError> {
        if args.len() < 2 {
            return Err(KyaniteError::WrongArgumentCount("hdel".to_string()));
        }
        Ok(HDel {
            key: extract_bytes(&args[0])?,
            fields: args[1..].iter().map(extract_bytes).collect::<Result<_, _>>()?,
        })
    }
}

impl ExecutableCommand for HDel {
    fn execute(&self, ctx: &mut ExecutionContext<'_>) -> Result<RespValue, KyaniteError> {
        let now = ctx.now_ms;
        let lru = ctx.lru_clock;
        let inner = ctx.inner_mut()?;
        if let Some(entry) = inner.lookup_write(&self.key, now) {
            expect_hash(&entry.data)?;
        } else {
            return Ok(RespValue::Integer(0));
        }
        let removed = inner
            .update(&self.key, now, lru, |entry| match &mut entry.data {
                Value::Hash(fields) => self
                    .fields
                    .iter()
                    .filter(|field| fields.shift_remove(*field).is_some())
                    .count(),
                _ => 0,
            })
            .unwrap_or(0);
        if removed > 0 {
            inner.signal_modified_key(&self.key);
        }
        Ok(RespValue::Integer(removed as i64))
    }
}

/// `HLEN` / `HEXISTS` / `HKEYS` / `HVALS` / `HGETALL`: read-only accessors.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HashReadKind {
    Len,
    Exists,
    Keys,
    Vals,
    GetAll,
}

#[derive(Debug, Clone)]
pub struct HashRead {
    pub key: Bytes,
    pub field: Option<Bytes>,
    pub kind: HashReadKind,
}

impl HashRead {
    pub fn parse(args: &[RespFrame], name: &'static str, kind: HashReadKind) -> Result<Self, KyaniteError> {
        let wants_field = kind == HashReadKind::Exists;
        let expected = if wants_field { 2 } else { 1 };
        if args.len() != expected {
            return Err(KyaniteError::WrongArgumentCount(name.to_string()));
        }
        Ok(HashRead {
            key: extract_bytes(&args[0])?,
            field: if wants_field {
                Some(extract_bytes(&args[1])?)
            } else {
                None
            },
            kind,
        })
    }
}

impl ExecutableCommand for HashRead {
    fn execute(&self, ctx: &mut ExecutionContext<'_>) -> Result<RespValue, KyaniteError> {
        let now = ctx.now_ms;
        let entry = ctx.inner().lookup_read(&self.key, now);
        let fields = match &entry {
            Some(entry) => Some(expect_hash(&entry.data)?),
            None => None,
        };
        Ok(match self.kind {
            HashReadKind::Len => {
                RespValue::Integer(fields.map_or(0, |f| f.len()) as i64)
            }
            HashReadKind::Exists => {
                let field = self.field.as_ref().ok_or(KyaniteError::SyntaxError)?;
                RespValue::Integer(fields.is_some_and(|f| f.contains_key(field)) as i64)
            }
            HashReadKind::Keys => RespValue::Array(
                fields
                    .map(|f| f.keys().cloned().map(RespValue::BulkString).collect())
                    .unwrap_or_default(),
            ),
            HashReadKind::Vals => RespValue::Array(
                fields
                    .map(|f| f.values().cloned().map(RespValue::BulkString).collect())
                    .unwrap_or_default(),
            ),
            HashReadKind::GetAll => RespValue::Array(
                fields
                    .map(|f| {
                        f.iter()
                            .flat_map(|(k, v)| {
                                [
                                    RespValue::BulkString(k.clone()),
                                    RespValue::BulkString(v.clone()),
                                ]
                            })
                            .collect()
                    })
                    .unwrap_or_default(),
            ),
        })
    }
}

/// `HINCRBY key field increment`
#[derive(Debug, Clone)]
pub struct HIncrBy {
    pub key: Bytes,
    pub field: Bytes,
    pub delta: i64,
}

impl ParseCommand for HIncrBy {
    fn parse(args: &[RespFrame]) -> Result<Self, KyaniteError> {
        if args.len() != 3 {
            return Err(KyaniteError::WrongArgumentCount("hincrby".to_string()));
        }
        Ok(HIncrBy {
            key: extract_bytes(&args[0])?,
            field: extract_bytes(&args[1])?,
            delta: extract_i64(&args[2])?,
        })
    }
}

impl ExecutableCommand for HIncrBy {
    fn execute(&self, ctx: &mut ExecutionContext<'_>) -> Result<RespValue, KyaniteError> {
        let now = ctx.now_ms;
        let lru = ctx.lru_clock;
        let inner = ctx.inner_mut()?;
        if let Some(entry) = inner.lookup_write(&self.key, now) {
            expect_hash(&entry.data)?;
        }
        let new_value = inner.update_or_create(
            &self.key,
            now,
            lru,
            || Value::Hash(IndexMap::new()),
            |entry| match &mut entry.data {
                Value::Hash(fields) => {
                    let current = match fields.get(&self.field) {
                        Some(raw) => std::str::from_utf8(raw)
                            .map_err(|_| KyaniteError::NotAnInteger)?
                            .parse::<i64>()
                            .map_err(|_| KyaniteError::NotAnInteger)?,
                        None => 0,
                    };
                    let next = current
                        .checked_add(self.delta)
                        .ok_or(KyaniteError::Overflow)?;
                    let mut buf = itoa::Buffer::new();
                    fields.insert(
                        self.field.clone(),
                        Bytes::copy_from_slice(buf.format(next).as_bytes()),
                    );
                    Ok(next)
                }
                _ => Err(KyaniteError::WrongType),
            },
        )?;
        inner.signal_modified_key(&self.key);
        Ok(RespValue::Integer(new_value))
    }
}
