// src/core/commands/zset.rs

//! The sorted-set command family.

use crate::core::commands::command_trait::{ExecutableCommand, ParseCommand};
use crate::core::commands::helpers::{arg_eq, extract_bytes, extract_f64, extract_i64, normalize_range};
use crate::core::database::ExecutionContext;
use crate::core::protocol::RespFrame;
use crate::core::protocol::resp_value::format_f64;
use crate::core::storage::zset::{ScoreBound, SortedSet, ZSetEntry};
use crate::core::storage::Value;
use crate::core::{KyaniteError, RespValue};
use bytes::Bytes;

fn expect_zset(value: &Value) -> Result<&SortedSet, KyaniteError> {
    match value {
        Value::ZSet(zset) => Ok(zset),
        _ => Err(KyaniteError::WrongType),
    }
}

fn entries_to_reply(entries: Vec<ZSetEntry>, with_scores: bool) -> RespValue {
    let mut reply = Vec::with_capacity(entries.len() * if with_scores { 2 } else { 1 });
    for entry in entries {
        reply.push(RespValue::BulkString(entry.member));
        if with_scores {
            reply.push(RespValue::BulkString(format_f64(entry.score).into()));
        }
    }
    RespValue::Array(reply)
}

/// `ZADD key [NX|XX] [CH] score member [score member ...]`
#[derive(Debug, Clone)]
pub struct ZAdd {
    pub key: Bytes,
    pub entries: Vec<(f64, Bytes)>,
    pub only_new: bool,      // NX
    pub only_existing: bool, // XX
    pub count_changed: bool, // CH
}

impl ParseCommand for ZAdd {
    fn parse(args: &[RespFrame]) -> Result<Self, KyaniteError> {
        if args.len() < 3 {
            return Err(KyaniteError::WrongArgumentCount("zadd".to_string()));
        }
        let key = extract_bytes(&args[0])?;
        let mut i = 1;
        let mut only_new = false;
        let mut only_existing = false;
        let mut count_changed = false;
        while i < args.len() {
            if arg_eq(&args[i], "nx") {
                only_new = true;
                i += 1;
            } else if arg_eq(&args[i], "xx") {
                only_existing = true;
                i += 1;
            } else if arg_eq(&args[i], "ch") {
                count_changed = true;
                i += 1;
            } else {
                break;
            }
        }
        if only_new && only_existing {
            return Err(KyaniteError::Generic(
                "XX and NX options at the same time are not compatible".to_string(),
            ));
        }
        let rest = &args[i..];
        if rest.is_empty() || rest.len() % 2 != 0 {
            return Err(KyaniteError::SyntaxError);
        }
        let entries = rest
            .chunks_exact(2)
            .map(|pair| Ok((extract_f64(&pair[0])?, extract_bytes(&pair[1])?)))
            .collect::<Result<_, KyaniteError>>()?;
        Ok(ZAdd {
            key,
            entries,
            only_new,
            only_existing,
            count_changed,
        })
    }
}

impl ExecutableCommand for ZAdd {
    fn execute(&self, ctx: &mut ExecutionContext<'_>) -> Result<RespValue, KyaniteError> {
        let now = ctx.now_ms;
        let lru = ctx.lru_clock;
        let inner = ctx.inner_mut()?;
        if let Some(entry) = inner.lookup_write(&self.key, now) {
            expect_zset(&entry.data)?;
        } else if self.only_existing {
            return Ok(RespValue::Integer(0));
        }
        let (added, changed) = inner.update_or_create(
            &self.key,
            now,
            lru,
            || Value::ZSet(SortedSet::new()),
            |entry| match &mut entry.data {
                Value::ZSet(zset) => {
                    let mut added = 0usize;
                    let mut changed = 0usize;
                    for (score, member) in &self.entries {
                        let existing = zset.score(member);
                        match existing {
                            Some(old) => {
                                if self.only_new {
                                    continue;
                                }
                                if old != *score {
                                    zset.insert(*score, member.clone());
                                    changed += 1;
                                }
                            }
                            None => {
                                if self.only_existing {
                                    continue;
                                }
                                zset.insert(*score, member.clone());
                                added += 1;
                            }
                        }
                    }
                    (added, changed)
                }
                _ => (0, 0),
            },
        );
        if added > 0 || changed > 0 {
            inner.signal_modified_key(&self.key);
        }
        let reported = if self.count_changed {
            added + changed
        } else {
            added
        };
        Ok(RespValue::Integer(reported as i64))
    }
}

/// `ZREM key member [member ...]`
#[derive(Debug, Clone)]
pub struct ZRem {
    pub key: Bytes,
    pub members: Vec<Bytes>,
}

impl ParseCommand for ZRem {
    fn parse(args: &[RespFrame]) -> Result<Self, KyaniteError> {
        if args.len() < 2 {
            return Err(KyaniteError::WrongArgumentCount("zrem".to_string()));
        }
        Ok(ZRem {
            key: extract_bytes(&args[0])?,
            members: args[1..].iter().map(extract_bytes).collect::<Result<_, _>>()?,
        })
    }
}

impl ExecutableCommand for ZRem {
    fn execute(&self, ctx: &mut ExecutionContext<'_>) -> Result<RespValue, KyaniteError> {
        let now = ctx.now_ms;
        let lru = ctx.lru_clock;
        let inner = ctx.inner_mut()?;
        if let Some(entry) = inner.lookup_write(&self.key, now) {
            expect_zset(&entry.data)?;
        } else {
            return Ok(RespValue::Integer(0));
        }
        let removed = inner
            .update(&self.key, now, lru, |entry| match &mut entry.data {
                Value::ZSet(zset) => self
                    .members
                    .iter()
                    .filter(|m| zset.remove(m).is_some())
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

/// `ZINCRBY key increment member`
#[derive(Debug, Clone)]
pub struct ZIncrBy {
    pub key: Bytes,
    pub increment: f64,
    pub member: Bytes,
}

impl ParseCommand for ZIncrBy {
    fn parse(args: &[RespFrame]) -> Result<Self, KyaniteError> {
        if args.len() != 3 {
            return Err(KyaniteError::WrongArgumentCount("zincrby".to_string()));
        }
        Ok(ZIncrBy {
            key: extract_bytes(&args[0])?,
            increment: extract_f64(&args[1])?,
            member: extract_bytes(&args[2])?,
        })
    }
}

impl ExecutableCommand for ZIncrBy {
    fn execute(&self, ctx: &mut ExecutionContext<'_>) -> Result<RespValue, KyaniteError> {
        let now = ctx.now_ms;
        let lru = ctx.lru_clock;
        let inner = ctx.inner_mut()?;
        if let Some(entry) = inner.lookup_write(&self.key, now) {
            expect_zset(&entry.data)?;
        }
        let new_score = inner.update_or_create(
            &self.key,
            now,
            lru,
            || Value::ZSet(SortedSet::new()),
            |entry| match &mut entry.data {
                Value::ZSet(zset) => {
                    let current = zset.score(&self.member).unwrap_or(0.0);
                    let next = current + self.increment;
                    if next.is_nan() {
                        return Err(KyaniteError::Generic(
                            "resulting score is not a number (NaN)".to_string(),
                        ));
                    }
                    zset.insert(next, self.member.clone());
                    Ok(next)
                }
                _ => Err(KyaniteError::WrongType),
            },
        )?;
        inner.signal_modified_key(&self.key);
        Ok(RespValue::BulkString(format_f64(new_score).into()))
    }
}

/// `ZSCORE` / `ZCARD` / `ZRANK` / `ZREVRANK`
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ZSetReadKind {
    Score,
    Card,
    Rank,
    RevRank,
}

#[derive(Debug, Clone)]
pub struct ZSetRead {
    pub key: Bytes,
    pub member: Option<Bytes>,
    pub kind: ZSetReadKind,
}

impl ZSetRead {
    pub fn parse(args: &[RespFrame], name: &'static str, kind: ZSetReadKind) -> Result<Self, KyaniteError> {
        let wants_member = kind != ZSetReadKind::Card;
        let expected = if wants_member { 2 } else { 1 };
        if args.len() != expected {
            return Err(KyaniteError::WrongArgumentCount(name.to_string()));
        }
        Ok(ZSetRead {
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

impl ExecutableCommand for ZSetRead {
    fn execute(&self, ctx: &mut ExecutionContext<'_>) -> Result<RespValue, KyaniteError> {
        let now = ctx.now_ms;
        let entry = ctx.inner().lookup_read(&self.key, now);
        let zset = match &entry {
            Some(entry) => Some(expect_zset(&entry.data)?),
            None => None,
        };
        Ok(match self.kind {
            ZSetReadKind::Card => RespValue::Integer(zset.map_or(0, |z| z.len()) as i64),
            ZSetReadKind::Score => {
                let member = self.member.as_ref().ok_or(KyaniteError::SyntaxError)?;
                match zset.and_then(|z| z.score(member)) {
                    Some(score) => RespValue::BulkString(format_f64(score).into()),
                    None => RespValue::Null,
                }
            }
            ZSetReadKind::Rank | ZSetReadKind::RevRank => {
                let member = self.member.as_ref().ok_or(KyaniteError::SyntaxError)?;
                match zset.and_then(|z| z.rank(member).map(|rank| (rank, z.len()))) {
                    Some((rank, len)) => {
                        let reported = if self.kind == ZSetReadKind::RevRank {
                            len - 1 - rank
                        } else {
                            rank
                        };
                        RespValue::Integer(reported as i64)
                    }
                    None => RespValue::Null,
                }
            }
        })
    }
}

/// `ZRANGE key start stop [WITHSCORES]` and `ZREVRANGE`.
#[derive(Debug, Clone)]
pub struct ZRange {
    pub key: Bytes,
    pub start: i64,
    pub stop: i64,
    pub with_scores: bool,
    pub reverse: bool,
}

impl ZRange {
    pub fn parse(args: &[RespFrame], name: &'static str, reverse: bool) -> Result<Self, KyaniteError> {
        if args.len() != 3 && args.len() != 4 {
            return Err(KyaniteError::WrongArgumentCount(name.to_string()));
        }
        let with_scores = match args.get(3) {
            Some(frame) if arg_eq(frame, "withscores") => true,
            Some(_) => return Err(KyaniteError::SyntaxError),
            None => false,
        };
        Ok(ZRange {
            key: extract_bytes(&args[0])?,
            start: extract_i64(&args[1])?,
            stop: extract_i64(&args[2])?,
            with_scores,
            reverse,
        })
    }
}

impl ExecutableCommand for ZRange {
    fn execute(&self, ctx: &mut ExecutionContext<'_>) -> Result<RespValue, KyaniteError> {
        let now = ctx.now_ms;
        let Some(entry) = ctx.inner().lookup_read(&self.key, now) else {
            return Ok(RespValue::Array(Vec::new()));
        };
        let zset = expect_zset(&entry.data)?;
        let len = zset.len();

        // Reverse ranges index from the tail; map them onto ascending ranks.
        let (start, stop) = (self.start, self.stop);
        let Some((lo, hi)) = (if self.reverse {
            normalize_range(start, stop, len)
                .map(|(lo, hi)| (len - 1 - hi, len - 1 - lo))
        } else {
            normalize_range(start, stop, len)
        }) else {
            return Ok(RespValue::Array(Vec::new()));
        };

        let mut entries = zset.range_by_rank(lo, hi);
        if self.reverse {
            entries.reverse();
        }
        Ok(entries_to_reply(entries, self.with_scores))
    }
}

/// `ZRANGEBYSCORE key min max [WITHSCORES]`
#[derive(Debug, Clone)]
pub struct ZRangeByScore {
    pub key: Bytes,
    pub min: ScoreBound,
    pub max: ScoreBound,
    pub with_scores: bool,
}

impl ParseCommand for ZRangeByScore {
    fn parse(args: &[RespFrame]) -> Result<Self, KyaniteError> {
        if args.len() != 3 && args.len() != 4 {
            return Err(KyaniteError::WrongArgumentCount("zrangebyscore".to_string()));
        }
        let parse_bound = |frame: &RespFrame| -> Result<ScoreBound, KyaniteError> {
            let raw = extract_bytes(frame)?;
            ScoreBound::parse(&raw).ok_or_else(|| {
                KyaniteError::Generic("min or max is not a float".to_string())
            })
        };
        let with_scores = match args.get(3) {
            Some(frame) if arg_eq(frame, "withscores") => true,
            Some(_) => return Err(KyaniteError::SyntaxError),
            None => false,
        };
        Ok(ZRangeByScore {
            key: extract_bytes(&args[0])?,
            min: parse_bound(&args[1])?,
            max: parse_bound(&args[2])?,
            with_scores,
        })
    }
}

impl ExecutableCommand for ZRangeByScore {
    fn execute(&self, ctx: &mut ExecutionContext<'_>) -> Result<RespValue, KyaniteError> {
        let now = ctx.now_ms;
        let Some(entry) = ctx.inner().lookup_read(&self.key, now) else {
            return Ok(RespValue::Array(Vec::new()));
        };
        let zset = expect_zset(&entry.data)?;
        Ok(entries_to_reply(
            zset.range_by_score(&self.min, &self.max),
            self.with_scores,
        ))
    }
}

/// `ZCOUNT key min max`
#[derive(Debug, Clone)]
pub struct ZCount {
    pub key: Bytes,
    pub min: ScoreBound,
    pub max: ScoreBound,
}

impl ParseCommand for ZCount {
    fn parse(args: &[RespFrame]) -> Result<Self, KyaniteError> {
        if args.len() != 3 {
            return Err(KyaniteError::WrongArgumentCount("zcount".to_string()));
        }
        let parse_bound = |frame: &RespFrame| -> Result<ScoreBound, KyaniteError> {
            let raw = extract_bytes(frame)?;
            ScoreBound::parse(&raw).ok_or_else(|| {
                KyaniteError::Generic("min or max is not a float".to_string())
            })
        };
        Ok(ZCount {
            key: extract_bytes(&args[0])?,
            min: parse_bound(&args[1])?,
            max: parse_bound(&args[2])?,
        })
    }
}

impl ExecutableCommand for ZCount {
    fn execute(&self, ctx: &mut ExecutionContext<'_>) -> Result<RespValue, KyaniteError> {
        let now = ctx.now_ms;
        let Some(entry) = ctx.inner().lookup_read(&self.key, now) else {
            return Ok(RespValue::Integer(0));
        };
        let zset = expect_zset(&entry.data)?;
        Ok(RespValue::Integer(
            zset.count_in_range(&self.min, &self.max) as i64
        ))
    }
}
