// src/core/commands/set.rs

//! The set command family.

use crate::core::commands::command_trait::{ExecutableCommand, ParseCommand};
use crate::core::commands::helpers::{extract_bytes, extract_i64};
use crate::core::database::ExecutionContext;
use crate::core::protocol::RespFrame;
use crate::core::storage::Value;
use crate::core::{KyaniteError, RespValue};
use bytes::Bytes;
use rand::SeedableRng;
use rand::seq::IteratorRandom;
use std::collections::HashSet;

fn expect_set(value: &Value) -> Result<&HashSet<Bytes>, KyaniteError> {
    match value {
        Value::Set(members) => Ok(members),
        _ => Err(KyaniteError::WrongType),
    }
}

/// `SADD key member [member ...]`
#[derive(Debug, Clone)]
pub struct SAdd {
    pub key: Bytes,
    pub members: Vec<Bytes>,
}

impl ParseCommand for SAdd {
    fn parse(args: &[RespFrame]) -> Result<Self, KyaniteError> {
        if args.len() < 2 {
            return Err(KyaniteError::WrongArgumentCount("sadd".to_string()));
        }
        Ok(SAdd {
            key: extract_bytes(&args[0])?,
            members: args[1..].iter().map(extract_bytes).collect::<Result<_, _>>()?,
        })
    }
}

impl ExecutableCommand for SAdd {
    fn execute(&self, ctx: &mut ExecutionContext<'_>) -> Result<RespValue, KyaniteError> {
        let now = ctx.now_ms;
        let lru = ctx.lru_clock;
        let inner = ctx.inner_mut()?;
        if let Some(entry) = inner.lookup_write(&self.key, now) {
            expect_set(&entry.data)?;
        }
        let added = inner.update_or_create(
            &self.key,
            now,
            lru,
            || Value::Set(HashSet::new()),
            |entry| match &mut entry.data {
                Value::Set(members) => self
                    .members
                    .iter()
                    .filter(|m| members.insert((*m).clone()))
                    .count(),
                _ => 0,
            },
        );
        if added > 0 {
            inner.signal_modified_key(&self.key);
        }
        Ok(RespValue::Integer(added as i64))
    }
}

/// `SREM key member [member ...]`
#[derive(Debug, Clone)]
pub struct SRem {
    pub key: Bytes,
    pub members: Vec<Bytes>,
}

impl ParseCommand for SRem {
    fn parse(args: &[RespFrame]) -> Result<Self, KyaniteError> {
        if args.len() < 2 {
            return Err(KyaniteError::WrongArgumentCount("srem".to_string()));
        }
        Ok(SRem {
            key: extract_bytes(&args[0])?,
            members: args[1..].iter().map(extract_bytes).collect::<Result<_, _>>()?,
        })
    }
}

impl ExecutableCommand for SRem {
    fn execute(&self, ctx: &mut ExecutionContext<'_>) -> Result<RespValue, KyaniteError> {
        let now = ctx.now_ms;
        let lru = ctx.lru_clock;
        let inner = ctx.inner_mut()?;
        if let Some(entry) = inner.lookup_write(&self.key, now) {
            expect_set(&entry.data)?;
        } else {
            return Ok(RespValue::Integer(0));
        }
        let removed = inner
            .update(&self.key, now, lru, |entry| match &mut entry.data {
                Value::Set(members) => self
                    .members
                    .iter()
                    .filter(|m| members.remove(*m))
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

/// `SCARD` / `SISMEMBER` / `SMEMBERS`: read-only accessors.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SetReadKind {
    Card,
    IsMember,
    Members,
}

#[derive(Debug, Clone)]
pub struct SetRead {
    pub key: Bytes,
    pub member: Option<Bytes>,
    pub kind: SetReadKind,
}

impl SetRead {
    pub fn parse(args: &[RespFrame], name: &'static str, kind: SetReadKind) -> Result<Self, KyaniteError> {
        let wants_member = kind == SetReadKind::IsMember;
        let expected = if wants_member { 2 } else { 1 };
        if args.len() != expected {
            return Err(KyaniteError::WrongArgumentCount(name.to_string()));
        }
        Ok(SetRead {
            key: extract_bytes(&args[0])?,
            member: if wants_member {
                Some(extract_bytes(&args[1])?)
            } else {
                None
            },
            kind,
        })
    }
}

impl ExecutableCommand for SetRead {
    fn execute(&self, ctx: &mut ExecutionContext<'_>) -> Result<RespValue, KyaniteError> {
        let now = ctx.now_ms;
        let entry = ctx.inner().lookup_read(&self.key, now);
        let members = match &entry {
            Some(entry) => Some(expect_set(&entry.data)?),
            None => None,
        };
        Ok(match self.kind {
            SetReadKind::Card => RespValue::Integer(members.map_or(0, |m| m.len()) as i64),
            SetReadKind::IsMember => {
                let member = self.member.as_ref().ok_or(KyaniteError::SyntaxError)?;
                RespValue::Integer(members.is_some_and(|m| m.contains(member)) as i64)
            }
            SetReadKind::Members => RespValue::Array(
                members
                    .map(|m| m.iter().cloned().map(RespValue::BulkString).collect())
                    .unwrap_or_default(),
            ),
        })
    }
}

/// `SPOP key` / `SRANDMEMBER key [count]`
#[derive(Debug, Clone)]
pub struct SPop {
    pub key: Bytes,
    pub remove: bool,
    pub count: Option<i64>,
}

impl SPop {
    pub fn parse(args: &[RespFrame], name: &'static str, remove: bool) -> Result<Self, KyaniteError> {
        if args.is_empty() || args.len() > 2 {
            return Err(KyaniteError::WrongArgumentCount(name.to_string()));
        }
        let count = match args.get(1) {
            Some(frame) => Some(extract_i64(frame)?),
            None => None,
        };
        Ok(SPop {
            key: extract_bytes(&args[0])?,
            remove,
            count,
        })
    }
}

impl SPop {
    fn pick(&self, members: &HashSet<Bytes>) -> Result<Vec<Bytes>, KyaniteError> {
        let mut rng = rand::rngs::SmallRng::from_entropy();
        let wanted = self.count.unwrap_or(1);
        if wanted < 0 && self.remove {
            return Err(KyaniteError::IndexOutOfRange);
        }
        Ok(if wanted < 0 {
            // SRANDMEMBER with a negative count may repeat members.
            (0..wanted.unsigned_abs())
                .filter_map(|_| members.iter().choose(&mut rng).cloned())
                .collect()
        } else {
            members
                .iter()
                .choose_multiple(&mut rng, wanted as usize)
                .into_iter()
                .cloned()
                .collect()
        })
    }

    fn empty_reply(&self) -> RespValue {
        match self.count {
            Some(_) => RespValue::Array(Vec::new()),
            None => RespValue::Null,
        }
    }

    fn reply(&self, picked: Vec<Bytes>) -> RespValue {
        match self.count {
            Some(_) => RespValue::Array(picked.into_iter().map(RespValue::BulkString).collect()),
            None => match picked.into_iter().next() {
                Some(member) => RespValue::BulkString(member),
                None => RespValue::Null,
            },
        }
    }
}

impl ExecutableCommand for SPop {
    fn execute(&self, ctx: &mut ExecutionContext<'_>) -> Result<RespValue, KyaniteError> {
        let now = ctx.now_ms;
        let lru = ctx.lru_clock;

        // SRANDMEMBER runs under the shared lock and never mutates.
        if !self.remove {
            let Some(entry) = ctx.inner().lookup_read(&self.key, now) else {
                return Ok(self.empty_reply());
            };
            let picked = self.pick(expect_set(&entry.data)?)?;
            return Ok(self.reply(picked));
        }

        let inner = ctx.inner_mut()?;
        let Some(entry) = inner.lookup_write(&self.key, now) else {
            return Ok(self.empty_reply());
        };
        let picked = self.pick(expect_set(&entry.data)?)?;
        if !picked.is_empty() {
            inner.update(&self.key, now, lru, |entry| {
                if let Value::Set(members) = &mut entry.data {
                    for member in &picked {
                        members.remove(member);
                    }
                }
            });
            inner.signal_modified_key(&self.key);
        }
        Ok(self.reply(picked))
    }
}

/// `SINTER` / `SUNION` / `SDIFF`
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SetAlgebraKind {
    Inter,
    Union,
    Diff,
}

#[derive(Debug, Clone)]
pub struct SetAlgebra {
    pub keys: Vec<Bytes>,
    pub kind: SetAlgebraKind,
}

impl SetAlgebra {
    pub fn parse(args: &[RespFrame], name: &'static str, kind: SetAlgebraKind) -> Result<Self, KyaniteError> {
        if args.is_empty() {
            return Err(KyaniteError::WrongArgumentCount(name.to_string()));
        }
        Ok(SetAlgebra {
            keys: args.iter().map(extract_bytes).collect::<Result<_, _>>()?,
            kind,
        })
    }
}

impl ExecutableCommand for SetAlgebra {
    fn execute(&self, ctx: &mut ExecutionContext<'_>) -> Result<RespValue, KyaniteError> {
        let now = ctx.now_ms;
        let inner = ctx.inner();

        let mut sets: Vec<&HashSet<Bytes>> = Vec::with_capacity(self.keys.len());
        let empty = HashSet::new();
        for key in &self.keys {
            match inner.lookup_read(key, now) {
                Some(entry) => sets.push(expect_set(&entry.data)?),
                None => sets.push(&empty),
            }
        }

        let result: HashSet<Bytes> = match self.kind {
            SetAlgebraKind::Union => sets.iter().flat_map(|s| s.iter().cloned()).collect(),
            SetAlgebraKind::Inter => {
                let (first, rest) = match sets.split_first() {
                    Some(split) => split,
                    None => return Ok(RespValue::Array(Vec::new())),
                };
                first
                    .iter()
                    .filter(|m| rest.iter().all(|s| s.contains(*m)))
                    .cloned()
                    .collect()
            }
            SetAlgebraKind::Diff => {
                let (first, rest) = match sets.split_first() {
                    Some(split) => split,
                    None => return Ok(RespValue::Array(Vec::new())),
                };
                first
                    .iter()
                    .filter(|m| !rest.iter().any(|s| s.contains(*m)))
                    .cloned()
                    .collect()
            }
        };

        Ok(RespValue::Array(
            result.into_iter().map(RespValue::BulkString).collect(),
        ))
    }
}
