// src/core/storage/mod.rs

//! Value representation for the keyspace: the polymorphic object type,
//! per-family containers, and encoding metadata.

pub mod hll;
pub mod value;
pub mod zset;

pub use hll::HyperLogLog;
pub use value::{StoredValue, StrValue, Value};
pub use zset::SortedSet;
