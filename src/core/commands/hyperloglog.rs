// src/core/commands/hyperloglog.rs

//! The HyperLogLog command family (dense representation only).

use crate::core::commands::command_trait::{ExecutableCommand, ParseCommand};
use crate::core::commands::helpers::extract_bytes;
use crate::core::database::ExecutionContext;
use crate::core::protocol::RespFrame;
use crate::core::storage::{HyperLogLog, Value};
use crate::core::{KyaniteError, RespValue};
use bytes::Bytes;

fn expect_hll(value: &Value) -> Result<&HyperLogLog, KyaniteError> {
    match value {
        Value::Hll(hll) => Ok(hll),
        _ => Err(KyaniteError::WrongType),
    }
}

/// `PFADD key [element ...]`
#[derive(Debug, Clone)]
pub struct PfAdd {
    pub key: Bytes,
    pub elements: Vec<Bytes>,
}

impl ParseCommand for PfAdd {
    fn parse(args: &[RespFrame]) -> Result<Self, KyaniteError> {
        if args.is_empty() {
            return Err(KyaniteError::WrongArgumentCount("pfadd".to_string()));
        }
        Ok(PfAdd {
            key: extract_bytes(&args[0])?,
            elements: args[1..].iter().map(extract_bytes).collect::<Result<_, _>>()?,
        })
    }
}

impl ExecutableCommand for PfAdd {
    fn execute(&self, ctx: &mut ExecutionContext<'_>) -> Result<RespValue, KyaniteError> {
        let now = ctx.now_ms;
        let lru = ctx.lru_clock;
        let inner = ctx.inner_mut()?;
        let existed = match inner.lookup_write(&self.key, now) {
            Some(entry) => {
                expect_hll(&entry.data)?;
                true
            }
            None => false,
        };
        let changed = inner.update_or_create(
            &self.key,
            now,
            lru,
            || Value::Hll(HyperLogLog::new()),
            |entry| match &mut entry.data {
                Value::Hll(hll) => self
                    .elements
                    .iter()
                    .fold(false, |changed, element| hll.add(element) || changed),
                _ => false,
            },
        );
        let created = !existed;
        if changed || created {
            inner.signal_modified_key(&self.key);
        }
        Ok(RespValue::Integer((changed || created) as i64))
    }
}

/// `PFCOUNT key [key ...]`
#[derive(Debug, Clone)]
pub struct PfCount {
    pub keys: Vec<Bytes>,
}

impl ParseCommand for PfCount {
    fn parse(args: &[RespFrame]) -> Result<Self, KyaniteError> {
        if args.is_empty() {
            return Err(KyaniteError::WrongArgumentCount("pfcount".to_string()));
        }
        Ok(PfCount {
            keys: args.iter().map(extract_bytes).collect::<Result<_, _>>()?,
        })
    }
}

impl ExecutableCommand for PfCount {
    fn execute(&self, ctx: &mut ExecutionContext<'_>) -> Result<RespValue, KyaniteError> {
        let now = ctx.now_ms;
        let inner = ctx.inner();
        // Multiple keys count the cardinality of their union.
        let mut merged: Option<HyperLogLog> = None;
        for key in &self.keys {
            let Some(entry) = inner.lookup_read(key, now) else {
                continue;
            };
            let hll = expect_hll(&entry.data)?;
            match &mut merged {
                Some(acc) => acc.merge(hll),
                None => merged = Some(hll.clone()),
            }
        }
        Ok(RespValue::Integer(
            merged.map_or(0, |hll| hll.count()) as i64
        ))
    }
}

/// `PFMERGE destkey [sourcekey ...]`
#[derive(Debug, Clone)]
pub struct PfMerge {
    pub destination: Bytes,
    pub sources: Vec<Bytes>,
}

impl ParseCommand for PfMerge {
    fn parse(args: &[RespFrame]) -> Result<Self, KyaniteError> {
        if args.is_empty() {
            return Err(KyaniteError::WrongArgumentCount("pfmerge".to_string()));
        }
        Ok(PfMerge {
            destination: extract_bytes(&args[0])?,
            sources: args[1..].iter().map(extract_bytes).collect::<Result<_, _>>()?,
        })
    }
}

impl ExecutableCommand for PfMerge {
    fn execute(&self, ctx: &mut ExecutionContext<'_>) -> Result<RespValue, KyaniteError> {
        let now = ctx.now_ms;
        let lru = ctx.lru_clock;
        let inner = ctx.inner_mut()?;

        // Collect the sources first so type errors surface before any write.
        let mut union = HyperLogLog::new();
        for key in &self.sources {
            if let Some(entry) = inner.lookup_read(key, now) {
                union.merge(expect_hll(&entry.data)?);
            }
        }
        if let Some(entry) = inner.lookup_write(&self.destination, now) {
            expect_hll(&entry.data)?;
        }

        inner.update_or_create(
            &self.destination,
            now,
            lru,
            || Value::Hll(HyperLogLog::new()),
            |entry| {
                if let Value::Hll(hll) = &mut entry.data {
                    hll.merge(&union);
                }
            },
        );
        inner.signal_modified_key(&self.destination);
        Ok(RespValue::ok())
    }
}
