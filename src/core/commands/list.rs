// src/core/commands/list.rs

//! The list command family, including the blocking pop forms.

use crate::core::commands::command_trait::{ExecutableCommand, ParseCommand};
use crate::core::commands::helpers::{extract_bytes, extract_i64, extract_timeout_secs, normalize_range};
use crate::core::database::{DbInner, ExecutionContext, PopDirection, PushDirection};
use crate::core::protocol::RespFrame;
use crate::core::storage::Value;
use crate::core::{KyaniteError, RespValue};
use bytes::Bytes;
use std::collections::VecDeque;

fn expect_list(entry: &Value) -> Result<&VecDeque<Bytes>, KyaniteError> {
    match entry {
        Value::List(items) => Ok(items),
        _ => Err(KyaniteError::WrongType),
    }
}

/// Pops one element from a live list, with type checking and key cleanup.
fn pop_one(
    inner: &mut DbInner,
    key: &Bytes,
    now_ms: u64,
    lru: u32,
    direction: PopDirection,
) -> Result<Option<Bytes>, KyaniteError> {
    if let Some(entry) = inner.lookup_write(key, now_ms) {
        expect_list(&entry.data)?;
    } else {
        return Ok(None);
    }
    let popped = inner
        .update(key, now_ms, lru, |entry| match &mut entry.data {
            Value::List(items) => match direction {
                PopDirection::Left => items.pop_front(),
                PopDirection::Right => items.pop_back(),
            },
            _ => None,
        })
        .flatten();
    if popped.is_some() {
        inner.signal_modified_key(key);
    }
    Ok(popped)
}

/// The shared pop-and-push step of `RPOPLPUSH` and its blocking form.
pub fn rpoplpush_logic(
    ctx: &mut ExecutionContext<'_>,
    source: &Bytes,
    destination: &Bytes,
) -> Result<Option<Bytes>, KyaniteError> {
    let now = ctx.now_ms;
    let lru = ctx.lru_clock;
    let inner = ctx.inner_mut()?;

    // The destination must be absent or a list before anything moves.
    if let Some(entry) = inner.lookup_write(destination, now) {
        expect_list(&entry.data)?;
    }

    let Some(value) = pop_one(inner, source, now, lru, PopDirection::Right)? else {
        return Ok(None);
    };
    inner.update_or_create(
        destination,
        now,
        lru,
        || Value::List(VecDeque::new()),
        |entry| {
            if let Value::List(items) = &mut entry.data {
                items.push_front(value.clone());
            }
        },
    );
    inner.signal_modified_key(destination);
    inner.signal_key_ready(destination);
    Ok(Some(value))
}

/// The immediate half of a blocking pop: tries each key in order and serves
/// the first one holding data. Returns None when every key is empty.
pub fn try_pop_first(
    ctx: &mut ExecutionContext<'_>,
    keys: &[Bytes],
    direction: PopDirection,
) -> Result<Option<RespValue>, KyaniteError> {
    let now = ctx.now_ms;
    let lru = ctx.lru_clock;
    let inner = ctx.inner_mut()?;
    for key in keys {
        if let Some(value) = pop_one(inner, key, now, lru, direction)? {
            return Ok(Some(RespValue::Array(vec![
                RespValue::BulkString(key.clone()),
                RespValue::BulkString(value),
            ])));
        }
    }
    Ok(None)
}

/// `LPUSH`/`RPUSH`/`LPUSHX`/`RPUSHX`
#[derive(Debug, Clone)]
pub struct Push {
    pub key: Bytes,
    pub values: Vec<Bytes>,
    pub direction: PushDirection,
    /// The X variants refuse to create a missing key.
    pub require_existing: bool,
}

impl Push {
    pub fn parse(
        args: &[RespFrame],
        name: &'static str,
        direction: PushDirection,
        require_existing: bool,
    ) -> Result<Self, KyaniteError> {
        if args.len() < 2 {
            return Err(KyaniteError::WrongArgumentCount(name.to_string()));
        }
        Ok(Push {
            key: extract_bytes(&args[0])?,
            values: args[1..].iter().map(extract_bytes).collect::<Result<_, _>>()?,
            direction,
            require_existing,
        })
    }
}

impl ExecutableCommand for Push {
    fn execute(&self, ctx: &mut ExecutionContext<'_>) -> Result<RespValue, KyaniteError> {
        let now = ctx.now_ms;
        let lru = ctx.lru_clock;
        let inner = ctx.inner_mut()?;

        match inner.lookup_write(&self.key, now) {
            Some(entry) => {
                expect_list(&entry.data)?;
            }
            None if self.require_existing => return Ok(RespValue::Integer(0)),
            None => {}
        }

        let new_len = inner.update_or_create(
            &self.key,
            now,
            lru,
            || Value::List(VecDeque::new()),
            |entry| match &mut entry.data {
                Value::List(items) => {
                    for value in &self.values {
                        match self.direction {
                            PushDirection::Left => items.push_front(value.clone()),
                            PushDirection::Right => items.push_back(value.clone()),
                        }
                    }
                    items.len()
                }
                _ => 0,
            },
        );
        inner.signal_modified_key(&self.key);
        inner.signal_key_ready(&self.key);
        Ok(RespValue::Integer(new_len as i64))
    }
}

/// `LPOP key` / `RPOP key`
#[derive(Debug, Clone)]
pub struct Pop {
    pub key: Bytes,
    pub direction: PopDirection,
}

impl Pop {
    pub fn parse(
        args: &[RespFrame],
        name: &'static str,
        direction: PopDirection,
    ) -> Result<Self, KyaniteError> {
        if args.len() != 1 {
            return Err(KyaniteError::WrongArgumentCount(name.to_string()));
        }
        Ok(Pop {
            key: extract_bytes(&args[0])?,
            direction,
        })
    }
}

impl ExecutableCommand for Pop {
    fn execute(&self, ctx: &mut ExecutionContext<'_>) -> Result<RespValue, KyaniteError> {
        let now = ctx.now_ms;
        let lru = ctx.lru_clock;
        let inner = ctx.inner_mut()?;
        match pop_one(inner, &self.key, now, lru, self.direction)? {
            Some(value) => Ok(RespValue::BulkString(value)),
            None => Ok(RespValue::Null),
        }
    }
}

/// `LLEN key`
#[derive(Debug, Clone)]
pub struct LLen {
    pub key: Bytes,
}

impl ParseCommand for LLen {
    fn parse(args: &[RespFrame]) -> Result<Self, KyaniteError> {
        if args.len() != 1 {
            return Err(KyaniteError::WrongArgumentCount("llen".to_string()));
        }
        Ok(LLen {
            key: extract_bytes(&args[0])?,
        })
    }
}

impl ExecutableCommand for LLen {
    fn execute(&self, ctx: &mut ExecutionContext<'_>) -> Result<RespValue, KyaniteError> {
        let now = ctx.now_ms;
        match ctx.inner().lookup_read(&self.key, now) {
            Some(entry) => Ok(RespValue::Integer(expect_list(&entry.data)?.len() as i64)),
            None => Ok(RespValue::Integer(0)),
        }
    }
}

/// `LRANGE key start stop`
#[derive(Debug, Clone)]
pub struct LRange {
    pub key: Bytes,
    pub start: i64,
    pub stop: i64,
}

impl ParseCommand for LRange {
    fn parse(args: &[RespFrame]) -> Result<Self, KyaniteError> {
        if args.len() != 3 {
            return Err(KyaniteError::WrongArgumentCount("lrange".to_string()));
        }
        Ok(LRange {
            key: extract_bytes(&args[0])?,
            start: extract_i64(&args[1])?,
            stop: extract_i64(&args[2])?,
        })
    }
}

impl ExecutableCommand for LRange {
    fn execute(&self, ctx: &mut ExecutionContext<'_>) -> Result<RespValue, KyaniteError> {
        let now = ctx.now_ms;
        let Some(entry) = ctx.inner().lookup_read(&self.key, now) else {
            return Ok(RespValue::Array(Vec::new()));
        };
        let items = expect_list(&entry.data)?;
        let Some((start, stop)) = normalize_range(self.start, self.stop, items.len()) else {
            return Ok(RespValue::Array(Vec::new()));
        };
        let values = items
            .iter()
            .skip(start)
            .take(stop - start + 1)
            .cloned()
            .map(RespValue::BulkString)
            .collect();
        Ok(RespValue::Array(values))
    }
}

/// `LINDEX key index`
#[derive(Debug, Clone)]
pub struct LIndex {
    pub key: Bytes,
    pub index: i64,
}

impl ParseCommand for LIndex {
    fn parse(args: &[RespFrame]) -> Result<Self, KyaniteError> {
        if args.len() != 2 {
            return Err(KyaniteError::WrongArgumentCount("lindex".to_string()));
        }
        Ok(LIndex {
            key: extract_bytes(&args[0])?,
            index: extract_i64(&args[1])?,
        })
    }
}

fn resolve_index(index: i64, len: usize) -> Option<usize> {
    let len = len as i64;
    let resolved = if index < 0 { len + index } else { index };
    if resolved < 0 || resolved >= len {
        None
    } else {
        Some(resolved as usize)
    }
}

impl ExecutableCommand for LIndex {
    fn execute(&self, ctx: &mut ExecutionContext<'_>) -> Result<RespValue, KyaniteError> {
        let now = ctx.now_ms;
        let Some(entry) = ctx.inner().lookup_read(&self.key, now) else {
            return Ok(RespValue::Null);
        };
        let items = expect_list(&entry.data)?;
        match resolve_index(self.index, items.len()).and_then(|i| items.get(i)) {
            Some(value) => Ok(RespValue::BulkString(value.clone())),
            None => Ok(RespValue::Null),
        }
    }
}

/// `LSET key index value`
#[derive(Debug, Clone)]
pub struct LSet {
    pub key: Bytes,
    pub index: i64,
    pub value: Bytes,
}

impl ParseCommand for LSet {
    fn parse(args: &[RespFrame]) -> Result<Self, KyaniteError> {
        if args.len() != 3 {
            return Err(KyaniteError::WrongArgumentCount("lset".to_string()));
        }
        Ok(LSet {
            key: extract_bytes(&args[0])?,
            index: extract_i64(&args[1])?,
            value: extract_bytes(&args[2])?,
        })
    }
}

impl ExecutableCommand for LSet {
    fn execute(&self, ctx: &mut ExecutionContext<'_>) -> Result<RespValue, KyaniteError> {
        let now = ctx.now_ms;
        let lru = ctx.lru_clock;
        let inner = ctx.inner_mut()?;
        if inner.lookup_write(&self.key, now).is_none() {
            return Err(KyaniteError::KeyNotFound);
        }
        let result = inner
            .update(&self.key, now, lru, |entry| match &mut entry.data {
                Value::List(items) => {
                    let len = items.len();
                    match resolve_index(self.index, len) {
                        Some(i) => {
                            items[i] = self.value.clone();
                            Ok(())
                        }
                        None => Err(KyaniteError::IndexOutOfRange),
                    }
                }
                _ => Err(KyaniteError::WrongType),
            })
            .unwrap_or(Err(KyaniteError::KeyNotFound));
        result?;
        inner.signal_modified_key(&self.key);
        Ok(RespValue::ok())
    }
}

/// `LREM key count value`
#[derive(Debug, Clone)]
pub struct LRem {
    pub key: Bytes,
    pub count: i64,
    pub value: Bytes,
}

impl ParseCommand for LRem {
    fn parse(args: &[RespFrame]) -> Result<Self, KyaniteError> {
        if args.len() != 3 {
            return Err(KyaniteError::WrongArgumentCount("lrem".to_string()));
        }
        Ok(LRem {
            key: extract_bytes(&args[0])?,
            count: extract_i64(&args[1])?,
            value: extract_bytes(&args[2])?,
        })
    }
}

impl ExecutableCommand for LRem {
    fn execute(&self, ctx: &mut ExecutionContext<'_>) -> Result<RespValue, KyaniteError> {
        let now = ctx.now_ms;
        let lru = ctx.lru_clock;
        let inner = ctx.inner_mut()?;
        if let Some(entry) = inner.lookup_write(&self.key, now) {
            expect_list(&entry.data)?;
        } else {
            return Ok(RespValue::Integer(0));
        }
        let removed = inner
            .update(&self.key, now, lru, |entry| match &mut entry.data {
                Value::List(items) => {
                    let limit = self.count.unsigned_abs() as usize;
                    let mut removed = 0usize;
                    if self.count >= 0 {
                        // Head to tail; limit 0 removes every occurrence.
                        items.retain(|item| {
                            if *item == self.value && (limit == 0 || removed < limit) {
                                removed += 1;
                                false
                            } else {
                                true
                            }
                        });
                    } else {
                        let mut kept: VecDeque<Bytes> = VecDeque::with_capacity(items.len());
                        while let Some(item) = items.pop_back() {
                            if item == self.value && removed < limit {
                                removed += 1;
                            } else {
                                kept.push_front(item);
                            }
                        }
                        *items = kept;
                    }
                    removed
                }
                _ => 0,
            })
            .unwrap_or(0);
        if removed > 0 {
            inner.signal_modified_key(&self.key);
        }
        Ok(RespValue::Integer(removed as i64))
    }
}

/// `LTRIM key start stop`
#[derive(Debug, Clone)]
pub struct LTrim {
    pub key: Bytes,
    pub start: i64,
    pub stop: i64,
}

impl ParseCommand for LTrim {
    fn parse(args: &[RespFrame]) -> Result<Self, KyaniteError> {
        if args.len() != 3 {
            return Err(KyaniteError::WrongArgumentCount("ltrim".to_string()));
        }
        Ok(LTrim {
            key: extract_bytes(&args[0])?,
            start: extract_i64(&args[1])?,
            stop: extract_i64(&args[2])?,
        })
    }
}

impl ExecutableCommand for LTrim {
    fn execute(&self, ctx: &mut ExecutionContext<'_>) -> Result<RespValue, KyaniteError> {
        let now = ctx.now_ms;
        let lru = ctx.lru_clock;
        let inner = ctx.inner_mut()?;
        if let Some(entry) = inner.lookup_write(&self.key, now) {
            expect_list(&entry.data)?;
        } else {
            return Ok(RespValue::ok());
        }
        inner.update(&self.key, now, lru, |entry| {
            if let Value::List(items) = &mut entry.data {
                match normalize_range(self.start, self.stop, items.len()) {
                    Some((start, stop)) => {
                        items.drain(..start);
                        items.truncate(stop - start + 1);
                    }
                    // An inverted or out-of-range window empties the list.
                    None => items.clear(),
                }
            }
        });
        inner.signal_modified_key(&self.key);
        Ok(RespValue::ok())
    }
}

/// `RPOPLPUSH source destination`
#[derive(Debug, Clone)]
pub struct RPopLPush {
    pub source: Bytes,
    pub destination: Bytes,
}

impl ParseCommand for RPopLPush {
    fn parse(args: &[RespFrame]) -> Result<Self, KyaniteError> {
        if args.len() != 2 {
            return Err(KyaniteError::WrongArgumentCount("rpoplpush".to_string()));
        }
        Ok(RPopLPush {
            source: extract_bytes(&args[0])?,
            destination: extract_bytes(&args[1])?,
        })
    }
}

impl ExecutableCommand for RPopLPush {
    fn execute(&self, ctx: &mut ExecutionContext<'_>) -> Result<RespValue, KyaniteError> {
        match rpoplpush_logic(ctx, &self.source, &self.destination)? {
            Some(value) => Ok(RespValue::BulkString(value)),
            None => Ok(RespValue::Null),
        }
    }
}

/// `BLPOP key [key ...] timeout` / `BRPOP ...`
#[derive(Debug, Clone)]
pub struct BlockingPop {
    pub keys: Vec<Bytes>,
    pub timeout_secs: u64,
    pub direction: PopDirection,
}

impl BlockingPop {
    pub fn parse(
        args: &[RespFrame],
        name: &'static str,
        direction: PopDirection,
    ) -> Result<Self, KyaniteError> {
        if args.len() < 2 {
            return Err(KyaniteError::WrongArgumentCount(name.to_string()));
        }
        let Some((timeout_frame, key_frames)) = args.split_last() else {
            return Err(KyaniteError::WrongArgumentCount(name.to_string()));
        };
        Ok(BlockingPop {
            keys: key_frames.iter().map(extract_bytes).collect::<Result<_, _>>()?,
            timeout_secs: extract_timeout_secs(timeout_frame)?,
            direction,
        })
    }
}

/// `BRPOPLPUSH source destination timeout`
#[derive(Debug, Clone)]
pub struct BRPopLPush {
    pub source: Bytes,
    pub destination: Bytes,
    pub timeout_secs: u64,
}

impl ParseCommand for BRPopLPush {
    fn parse(args: &[RespFrame]) -> Result<Self, KyaniteError> {
        if args.len() != 3 {
            return Err(KyaniteError::WrongArgumentCount("brpoplpush".to_string()));
        }
        Ok(BRPopLPush {
            source: extract_bytes(&args[0])?,
            destination: extract_bytes(&args[1])?,
            timeout_secs: extract_timeout_secs(&args[2])?,
        })
    }
}
