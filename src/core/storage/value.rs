// src/core/storage/value.rs

//! Defines the core data structures for storing values in the database:
//! the `StoredValue` wrapper and the `Value` enum over data families.

use super::hll::HyperLogLog;
use super::zset::SortedSet;
use bytes::Bytes;
use indexmap::IndexMap;
use std::collections::{HashSet, VecDeque};

/// A hard limit on the size of a single string value to prevent DoS via
/// excessive allocation.
pub const MAX_STRING_SIZE: usize = 512 * 1024 * 1024; // 512MB

/// The longest string stored inline in `StrValue::Embedded`.
pub const EMBSTR_MAX_LEN: usize = 44;

/// The LRU clock wraps at 24 bits, matching the field width on `StoredValue`.
pub const LRU_CLOCK_MASK: u32 = (1 << 24) - 1;

/// The string family's three encodings as an explicit sum type.
/// Conversions between encodings are explicit; `Embedded` is a size-class
/// optimisation for short strings, not a distinct subtype.
#[derive(Debug, Clone, PartialEq)]
pub enum StrValue {
    /// The payload parses as a signed 64-bit decimal integer.
    Int(i64),
    /// Short payload stored inline, no heap indirection.
    Embedded { len: u8, buf: [u8; EMBSTR_MAX_LEN] },
    /// Arbitrary binary payload on the heap.
    Raw(Bytes),
}

impl StrValue {
    /// Builds the most compact encoding for the given payload.
    pub fn from_bytes(payload: &[u8]) -> Self {
        if let Some(i) = parse_strict_i64(payload) {
            return StrValue::Int(i);
        }
        if payload.len() <= EMBSTR_MAX_LEN {
            let mut buf = [0u8; EMBSTR_MAX_LEN];
            buf[..payload.len()].copy_from_slice(payload);
            return StrValue::Embedded {
                len: payload.len() as u8,
                buf,
            };
        }
        StrValue::Raw(Bytes::copy_from_slice(payload))
    }

    /// Materialises the payload bytes regardless of encoding.
    pub fn as_bytes(&self) -> Bytes {
        match self {
            StrValue::Int(i) => {
                let mut buf = itoa::Buffer::new();
                Bytes::copy_from_slice(buf.format(*i).as_bytes())
            }
            StrValue::Embedded { len, buf } => Bytes::copy_from_slice(&buf[..*len as usize]),
            StrValue::Raw(b) => b.clone(),
        }
    }

    /// The payload length in bytes.
    pub fn len(&self) -> usize {
        match self {
            StrValue::Int(i) => {
                let mut buf = itoa::Buffer::new();
                buf.format(*i).len()
            }
            StrValue::Embedded { len, .. } => *len as usize,
            StrValue::Raw(b) => b.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The integer payload, if the encoding is `Int`.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            StrValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn encoding_name(&self) -> &'static str {
        match self {
            StrValue::Int(_) => "int",
            StrValue::Embedded { .. } => "embstr",
            StrValue::Raw(_) => "raw",
        }
    }
}

/// Strict decimal i64 parse: no leading zeros (except "0" itself), no sign
/// on zero, no whitespace. Mirrors what the string family treats as an
/// integer-encodable payload.
fn parse_strict_i64(payload: &[u8]) -> Option<i64> {
    if payload.is_empty() || payload.len() > 20 {
        return None;
    }
    let s = std::str::from_utf8(payload).ok()?;
    let parsed: i64 = s.parse().ok()?;
    // Reject forms that don't round-trip (e.g. "+1", "007").
    let mut buf = itoa::Buffer::new();
    if buf.format(parsed).as_bytes() != payload {
        return None;
    }
    Some(parsed)
}

/// The polymorphic value type over all supported data families.
#[derive(Debug, Clone)]
pub enum Value {
    Str(StrValue),
    List(VecDeque<Bytes>),
    Set(HashSet<Bytes>),
    Hash(IndexMap<Bytes, Bytes>),
    ZSet(SortedSet),
    Hll(HyperLogLog),
}

impl Value {
    /// The family name reported by `TYPE`.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Str(_) | Value::Hll(_) => "string",
            Value::List(_) => "list",
            Value::Set(_) => "set",
            Value::Hash(_) => "hash",
            Value::ZSet(_) => "zset",
        }
    }

    /// The encoding name reported by `OBJECT ENCODING`.
    pub fn encoding_name(&self) -> &'static str {
        match self {
            Value::Str(s) => s.encoding_name(),
            Value::List(_) => "quicklist",
            Value::Set(_) => "hashtable",
            Value::Hash(_) => "hashtable",
            Value::ZSet(_) => "skiplist",
            Value::Hll(_) => "raw",
        }
    }

    /// An estimate of the heap footprint of this value, used for the
    /// `maxmemory` accounting. Deliberately cheap rather than exact.
    pub fn memory_usage(&self) -> usize {
        match self {
            Value::Str(StrValue::Int(_)) => std::mem::size_of::<i64>(),
            Value::Str(StrValue::Embedded { .. }) => EMBSTR_MAX_LEN,
            Value::Str(StrValue::Raw(b)) => b.len(),
            Value::List(items) => items.iter().map(|v| v.len() + 16).sum(),
            Value::Set(members) => members.iter().map(|m| m.len() + 32).sum(),
            Value::Hash(fields) => fields.iter().map(|(k, v)| k.len() + v.len() + 48).sum(),
            Value::ZSet(zset) => zset.memory_usage(),
            Value::Hll(_) => HyperLogLog::REGISTER_COUNT,
        }
    }

    /// True for container families that must be removed from the keyspace
    /// once their last element is gone.
    pub fn is_empty_container(&self) -> bool {
        match self {
            Value::Str(_) | Value::Hll(_) => false,
            Value::List(items) => items.is_empty(),
            Value::Set(members) => members.is_empty(),
            Value::Hash(fields) => fields.is_empty(),
            Value::ZSet(zset) => zset.is_empty(),
        }
    }
}

/// A wrapper for all values stored in the database, carrying the payload and
/// per-object metadata.
#[derive(Debug, Clone)]
pub struct StoredValue {
    pub data: Value,
    /// Last-access timestamp on the 24-bit wrapping LRU clock (seconds).
    pub lru: u32,
    /// The cached result of `data.memory_usage()` plus bookkeeping overhead.
    pub size: usize,
}

impl StoredValue {
    pub fn new(data: Value, lru_clock: u32) -> Self {
        let size = data.memory_usage();
        Self {
            data,
            lru: lru_clock & LRU_CLOCK_MASK,
            size,
        }
    }

    /// Refreshes the access timestamp and the cached size after a mutation.
    pub fn touch(&mut self, lru_clock: u32) {
        self.lru = lru_clock & LRU_CLOCK_MASK;
        self.size = self.data.memory_usage();
    }

    /// Seconds since the last access, handling clock wrap-around.
    pub fn idle_time(&self, lru_clock: u32) -> u32 {
        let clock = lru_clock & LRU_CLOCK_MASK;
        if clock >= self.lru {
            clock - self.lru
        } else {
            clock + (LRU_CLOCK_MASK - self.lru) + 1
        }
    }
}
