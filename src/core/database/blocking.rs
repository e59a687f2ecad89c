// src/core/database/blocking.rs

//! Serving of ready keys: the worker-side half of the blocking-command
//! machinery. Sessions park at the dispatcher; the worker whose write made a
//! key ready pops the data and produces the wake-ups, all under the database
//! write lock so no other client can observe the moved values.

use super::core::{DbInner, PopDirection};
use crate::core::RespValue;
use crate::core::storage::Value;
use bytes::Bytes;
use std::collections::VecDeque;

/// A reply destined for a parked session, produced while serving ready keys.
#[derive(Debug)]
pub struct SessionWake {
    pub session_id: u64,
    pub reply: RespValue,
}

impl DbInner {
    /// Drains the ready-key set, handing list elements to blocked sessions in
    /// FIFO order. Pop-and-push waiters have their destination push applied
    /// here as well, atomically under the same lock; the destination key is
    /// then signalled in turn so chained waiters are served in the same pass.
    pub fn serve_ready_keys(&mut self, now_ms: u64, lru_clock: u32) -> Vec<SessionWake> {
        let mut wakes = Vec::new();

        while let Some(key) = self.pop_ready_key() {
            loop {
                let has_data = matches!(
                    self.peek_live(&key, now_ms).map(|entry| &entry.data),
                    Some(Value::List(items)) if !items.is_empty()
                );
                if !has_data {
                    break;
                }
                let Some(waiter) = self.pop_front_waiter(&key) else {
                    break;
                };

                let popped = self
                    .update(&key, now_ms, lru_clock, |entry| match &mut entry.data {
                        Value::List(items) => match waiter.direction {
                            PopDirection::Left => items.pop_front(),
                            PopDirection::Right => items.pop_back(),
                        },
                        _ => None,
                    })
                    .flatten();
                let Some(value) = popped else {
                    break;
                };
                self.signal_modified_key(&key);

                let reply = match &waiter.target {
                    Some(target) => {
                        self.push_to_target(target, value.clone(), now_ms, lru_clock);
                        RespValue::BulkString(value)
                    }
                    None => RespValue::Array(vec![
                        RespValue::BulkString(key.clone()),
                        RespValue::BulkString(value),
                    ]),
                };
                wakes.push(SessionWake {
                    session_id: waiter.session_id,
                    reply,
                });
            }
        }
        wakes
    }

    /// The destination push of a served pop-and-push waiter. The value lands
    /// at the head of the target list, which may itself wake further sessions.
    fn push_to_target(&mut self, target: &Bytes, value: Bytes, now_ms: u64, lru_clock: u32) {
        self.update_or_create(
            target,
            now_ms,
            lru_clock,
            || Value::List(VecDeque::new()),
            |entry| {
                if let Value::List(items) = &mut entry.data {
                    items.push_front(value);
                }
            },
        );
        self.signal_modified_key(target);
        self.signal_key_ready(target);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::database::core::{Db, Waiter};
    use crate::core::state::ServerStats;
    use crate::core::storage::StoredValue;
    use std::sync::Arc;

    fn key(s: &str) -> Bytes {
        Bytes::copy_from_slice(s.as_bytes())
    }

    fn db_with_list(name: &str, items: &[&str]) -> Db {
        let db = Db::new(0, Arc::new(ServerStats::new()));
        {
            let mut inner = db.write();
            let list: VecDeque<Bytes> =
                items.iter().map(|s| key(s)).collect();
            inner
                .add(key(name), StoredValue::new(Value::List(list), 0))
                .unwrap();
        }
        db
    }

    #[test]
    fn fifo_waiters_are_served_in_registration_order() {
        let db = db_with_list("q", &["v1", "v2"]);
        let mut inner = db.write();
        for id in [1u64, 2] {
            inner.register_waiter(
                &[key("q")],
                Waiter {
                    session_id: id,
                    direction: PopDirection::Left,
                    target: None,
                },
            );
        }
        inner.signal_key_ready(&key("q"));
        let wakes = inner.serve_ready_keys(0, 0);
        assert_eq!(wakes.len(), 2);
        assert_eq!(wakes[0].session_id, 1);
        assert_eq!(
            wakes[0].reply,
            RespValue::Array(vec![
                RespValue::BulkString(key("q")),
                RespValue::BulkString(key("v1")),
            ])
        );
        assert_eq!(wakes[1].session_id, 2);
        // The emptied list is gone from the keyspace.
        assert!(inner.peek_live(&key("q"), 0).is_none());
    }

    #[test]
    fn excess_values_stay_in_the_list() {
        let db = db_with_list("q", &["a", "b", "c"]);
        let mut inner = db.write();
        inner.register_waiter(
            &[key("q")],
            Waiter {
                session_id: 5,
                direction: PopDirection::Left,
                target: None,
            },
        );
        inner.signal_key_ready(&key("q"));
        let wakes = inner.serve_ready_keys(0, 0);
        assert_eq!(wakes.len(), 1);
        match inner.peek_live(&key("q"), 0).map(|e| &e.data) {
            Some(Value::List(items)) => assert_eq!(items.len(), 2),
            other => panic!("expected list, got {other:?}"),
        }
    }

    #[test]
    fn pop_and_push_waiter_moves_value_to_target() {
        let db = db_with_list("src", &["moved"]);
        let mut inner = db.write();
        inner.register_waiter(
            &[key("src")],
            Waiter {
                session_id: 8,
                direction: PopDirection::Right,
                target: Some(key("dst")),
            },
        );
        inner.signal_key_ready(&key("src"));
        let wakes = inner.serve_ready_keys(0, 0);
        assert_eq!(wakes.len(), 1);
        assert_eq!(wakes[0].reply, RespValue::BulkString(key("moved")));
        match inner.peek_live(&key("dst"), 0).map(|e| &e.data) {
            Some(Value::List(items)) => {
                assert_eq!(items.front(), Some(&key("moved")));
            }
            other => panic!("expected list at dst, got {other:?}"),
        }
        assert!(inner.peek_live(&key("src"), 0).is_none());
    }

    #[test]
    fn chained_waiters_on_the_target_are_served_in_the_same_pass() {
        let db = db_with_list("src", &["x"]);
        let mut inner = db.write();
        // Session 1 moves src -> dst; session 2 blocks on dst.
        inner.register_waiter(
            &[key("src")],
            Waiter {
                session_id: 1,
                direction: PopDirection::Right,
                target: Some(key("dst")),
            },
        );
        inner.register_waiter(
            &[key("dst")],
            Waiter {
                session_id: 2,
                direction: PopDirection::Left,
                target: None,
            },
        );
        inner.signal_key_ready(&key("src"));
        let wakes = inner.serve_ready_keys(0, 0);
        assert_eq!(wakes.len(), 2);
        assert_eq!(wakes[1].session_id, 2);
        assert!(inner.peek_live(&key("dst"), 0).is_none());
    }
}
