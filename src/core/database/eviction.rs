// src/core/database/eviction.rs

//! The maxmemory eviction machinery: per-database candidate pools and the
//! `free_memory_if_needed` entry point run by workers ahead of memory-hungry
//! commands.

use super::core::{DbInner, now_unix_ms};
use crate::config::{EvictionPolicy, HotConfig};
use crate::core::KyaniteError;
use crate::core::state::ServerState;
use bytes::Bytes;
use rand::seq::IteratorRandom;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use tracing::debug;

/// Size bound of the per-database candidate pool.
const EVICTION_POOL_SIZE: usize = 16;

/// One eviction candidate. `idle` is the policy's badness metric: larger
/// means a better candidate. The pool is kept in ascending `idle` order, so
/// the best candidate sits at the tail.
#[derive(Debug, Clone)]
pub struct PoolEntry {
    pub key: Bytes,
    pub idle: u64,
}

impl DbInner {
    /// Samples `sample_count` keys from the policy's candidate set and merges
    /// them into the eviction pool.
    pub fn fill_eviction_pool(
        &mut self,
        policy: EvictionPolicy,
        sample_count: usize,
        lru_clock: u32,
        now_ms: u64,
    ) {
        let mut rng = rand::rngs::SmallRng::from_entropy();

        let sampled: Vec<Bytes> = if policy.is_volatile() {
            self.sample_expires(sample_count)
                .into_iter()
                .map(|(key, _)| key)
                .collect()
        } else {
            self.keys()
                .choose_multiple(&mut rng, sample_count)
                .into_iter()
                .cloned()
                .collect()
        };

        for key in sampled {
            if self.check_expired(&key, now_ms) {
                // Expired candidates are reclaimed by the expiry cycle; the
                // pool only tracks live keys.
                continue;
            }
            let idle = match policy {
                EvictionPolicy::AllkeysLru | EvictionPolicy::VolatileLru => {
                    match self.lookup_read(&key, now_ms) {
                        Some(entry) => entry.idle_time(lru_clock) as u64,
                        None => continue,
                    }
                }
                EvictionPolicy::AllkeysRandom | EvictionPolicy::VolatileRandom => {
                    rng.r#gen::<u64>()
                }
                EvictionPolicy::VolatileTtl => match self.get_expire(&key) {
                    // Sooner deadlines make better candidates.
                    Some(at) => u64::MAX - at,
                    None => continue,
                },
                EvictionPolicy::NoEviction => return,
            };

            if self.eviction_pool.iter().any(|entry| entry.key == key) {
                continue;
            }
            let pos = self
                .eviction_pool
                .partition_point(|entry| entry.idle < idle);
            self.eviction_pool.insert(pos, PoolEntry { key, idle });
        }

        // Drop the weakest candidates when over capacity.
        while self.eviction_pool.len() > EVICTION_POOL_SIZE {
            self.eviction_pool.remove(0);
        }
    }

    /// Evicts the best pool candidate that is still live. Returns the evicted
    /// key, or None when the pool has no usable candidate.
    pub fn evict_best_candidate(
        &mut self,
        policy: EvictionPolicy,
        now_ms: u64,
    ) -> Option<Bytes> {
        while let Some(candidate) = self.eviction_pool.pop() {
            // The pool may be stale: the key can be gone or, for volatile
            // policies, have lost its expire since sampling.
            if self.check_expired(&candidate.key, now_ms) {
                continue;
            }
            if policy.is_volatile() && self.get_expire(&candidate.key).is_none() {
                continue;
            }
            if self.delete(&candidate.key) {
                self.record_eviction();
                return Some(candidate.key);
            }
        }
        None
    }
}

/// Brings used memory back under `maxmemory` before a write command runs.
/// With `noeviction`, callers receive `OOM` while memory is over the limit.
pub fn free_memory_if_needed(
    state: &Arc<ServerState>,
    hot: &HotConfig,
) -> Result<(), KyaniteError> {
    if hot.maxmemory == 0 {
        return Ok(());
    }
    let mut used = state.total_used_memory();
    if used <= hot.maxmemory {
        return Ok(());
    }
    if hot.maxmemory_policy == EvictionPolicy::NoEviction {
        return Err(KyaniteError::MaxMemoryReached);
    }

    let lru_clock = state.lru_clock();
    let now_ms = now_unix_ms();

    while used > hot.maxmemory {
        let mut evicted_this_round = false;
        for db in &state.dbs {
            if db.key_count() == 0 {
                continue;
            }
            let evicted = {
                let mut inner = db.write();
                inner.fill_eviction_pool(
                    hot.maxmemory_policy,
                    hot.maxmemory_samples,
                    lru_clock,
                    now_ms,
                );
                inner.evict_best_candidate(hot.maxmemory_policy, now_ms)
            };
            if let Some(key) = evicted {
                debug!(
                    db = db.index,
                    key = %String::from_utf8_lossy(&key),
                    "evicted key to reclaim memory"
                );
                evicted_this_round = true;
                used = state.total_used_memory();
                if used <= hot.maxmemory {
                    return Ok(());
                }
            }
        }
        if !evicted_this_round {
            return Err(KyaniteError::MaxMemoryReached);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::database::Db;
    use crate::core::state::ServerStats;
    use crate::core::storage::{StoredValue, StrValue, Value};

    fn key(s: &str) -> Bytes {
        Bytes::copy_from_slice(s.as_bytes())
    }

    fn populated_db(n: usize) -> Db {
        let db = Db::new(0, Arc::new(ServerStats::new()));
        {
            let mut inner = db.write();
            for i in 0..n {
                inner
                    .add(
                        key(&format!("key-{i}")),
                        StoredValue::new(Value::Str(StrValue::from_bytes(b"value")), 0),
                    )
                    .unwrap();
            }
        }
        db
    }

    #[test]
    fn volatile_policy_only_considers_keys_with_expires() {
        let db = populated_db(10);
        let mut inner = db.write();
        inner.set_expire(&key("key-3"), u64::MAX);

        inner.fill_eviction_pool(EvictionPolicy::VolatileTtl, 10, 0, 0);
        let evicted = inner.evict_best_candidate(EvictionPolicy::VolatileTtl, 0);
        assert_eq!(evicted, Some(key("key-3")));
        assert!(
            inner
                .evict_best_candidate(EvictionPolicy::VolatileTtl, 0)
                .is_none()
        );
    }

    #[test]
    fn lru_policy_prefers_idler_keys() {
        let db = Db::new(0, Arc::new(ServerStats::new()));
        let mut inner = db.write();
        // key "old" last touched at clock 0, key "new" at clock 100.
        inner
            .add(key("old"), StoredValue::new(Value::Str(StrValue::from_bytes(b"v")), 0))
            .unwrap();
        inner
            .add(key("new"), StoredValue::new(Value::Str(StrValue::from_bytes(b"v")), 100))
            .unwrap();

        inner.fill_eviction_pool(EvictionPolicy::AllkeysLru, 10, 100, 0);
        assert_eq!(
            inner.evict_best_candidate(EvictionPolicy::AllkeysLru, 0),
            Some(key("old"))
        );
    }

    #[test]
    fn pool_is_bounded() {
        let db = populated_db(64);
        let mut inner = db.write();
        inner.fill_eviction_pool(EvictionPolicy::AllkeysRandom, 64, 0, 0);
        assert!(inner.eviction_pool.len() <= EVICTION_POOL_SIZE);
    }
}
