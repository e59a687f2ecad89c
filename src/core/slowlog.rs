// src/core/slowlog.rs

//! The bounded, globally ordered log of commands that exceeded the
//! configured duration threshold. Backs the `SLOWLOG` command.

use crate::core::RespValue;
use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

/// At most this many arguments are copied into an entry.
const SLOWLOG_MAX_ARGS: usize = 32;
/// Arguments longer than this are truncated with a marker suffix.
const SLOWLOG_MAX_ARG_LEN: usize = 128;

/// One slow-query record.
#[derive(Debug, Clone)]
pub struct SlowLogEntry {
    /// Strictly increasing, never reused (survives RESET).
    pub id: u64,
    /// Unix time, seconds, when the command finished.
    pub unix_time: u64,
    /// Wall-clock execution time in microseconds.
    pub duration_us: u64,
    /// Command name followed by its (possibly truncated) arguments.
    pub args: Vec<Bytes>,
}

/// A bounded slow-query log under its own reader/writer lock. Entries are
/// kept newest-first; the tail is trimmed to `max_len`.
#[derive(Debug)]
pub struct SlowLog {
    entries: RwLock<VecDeque<SlowLogEntry>>,
    next_id: AtomicU64,
    max_len: AtomicUsize,
}

impl SlowLog {
    pub fn new(max_len: usize) -> Self {
        Self {
            entries: RwLock::new(VecDeque::new()),
            next_id: AtomicU64::new(0),
            max_len: AtomicUsize::new(max_len),
        }
    }

    /// Adjusts the bound, trimming immediately if it shrank.
    pub fn set_max_len(&self, max_len: usize) {
        self.max_len.store(max_len, Ordering::Relaxed);
        let mut entries = self.entries.write();
        while entries.len() > max_len {
            entries.pop_back();
        }
    }

    /// Records one slow command execution.
    pub fn record(&self, name: &str, args: &[Bytes], duration: Duration, unix_time: u64) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        let mut stored_args = Vec::with_capacity((args.len() + 1).min(SLOWLOG_MAX_ARGS));
        stored_args.push(Bytes::copy_from_slice(name.as_bytes()));
        for arg in args.iter().take(SLOWLOG_MAX_ARGS - 1) {
            if arg.len() > SLOWLOG_MAX_ARG_LEN {
                let mut truncated = arg.slice(..SLOWLOG_MAX_ARG_LEN).to_vec();
                truncated.extend_from_slice(
                    format!("... ({} more bytes)", arg.len() - SLOWLOG_MAX_ARG_LEN).as_bytes(),
                );
                stored_args.push(Bytes::from(truncated));
            } else {
                stored_args.push(arg.clone());
            }
        }

        let entry = SlowLogEntry {
            id,
            unix_time,
            duration_us: duration.as_micros() as u64,
            args: stored_args,
        };

        let max_len = self.max_len.load(Ordering::Relaxed);
        let mut entries = self.entries.write();
        entries.push_front(entry);
        while entries.len() > max_len {
            entries.pop_back();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn reset(&self) {
        self.entries.write().clear();
    }

    /// The `SLOWLOG GET [count]` reply: newest entries first.
    pub fn get(&self, count: Option<usize>) -> RespValue {
        let entries = self.entries.read();
        let count = count.unwrap_or(10).min(entries.len());
        let reply = entries
            .iter()
            .take(count)
            .map(|entry| {
                RespValue::Array(vec![
                    RespValue::Integer(entry.id as i64),
                    RespValue::Integer(entry.unix_time as i64),
                    RespValue::Integer(entry.duration_us as i64),
                    RespValue::Array(
                        entry
                            .args
                            .iter()
                            .cloned()
                            .map(RespValue::BulkString)
                            .collect(),
                    ),
                ])
            })
            .collect();
        RespValue::Array(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record_n(log: &SlowLog, n: usize) {
        for i in 0..n {
            log.record(
                "get",
                &[Bytes::from(format!("key-{i}"))],
                Duration::from_millis(20),
                1_700_000_000 + i as u64,
            );
        }
    }

    #[test]
    fn entries_are_trimmed_to_max_len() {
        let log = SlowLog::new(3);
        record_n(&log, 10);
        assert_eq!(log.len(), 3);
    }

    #[test]
    fn ids_keep_increasing_across_reset() {
        let log = SlowLog::new(8);
        record_n(&log, 2);
        log.reset();
        assert!(log.is_empty());
        record_n(&log, 1);
        match log.get(None) {
            RespValue::Array(entries) => {
                assert_eq!(entries.len(), 1);
                match &entries[0] {
                    RespValue::Array(fields) => assert_eq!(fields[0], RespValue::Integer(2)),
                    other => panic!("unexpected entry shape: {other:?}"),
                }
            }
            other => panic!("unexpected reply: {other:?}"),
        }
    }

    #[test]
    fn newest_entry_comes_first() {
        let log = SlowLog::new(8);
        record_n(&log, 3);
        match log.get(Some(2)) {
            RespValue::Array(entries) => {
                let first_id = match &entries[0] {
                    RespValue::Array(fields) => fields[0].clone(),
                    _ => panic!(),
                };
                assert_eq!(first_id, RespValue::Integer(2));
            }
            _ => panic!(),
        }
    }

    #[test]
    fn long_arguments_are_truncated() {
        let log = SlowLog::new(8);
        let big = Bytes::from(vec![b'x'; 1000]);
        log.record("set", &[Bytes::from_static(b"k"), big], Duration::from_secs(1), 0);
        match log.get(None) {
            RespValue::Array(entries) => match &entries[0] {
                RespValue::Array(fields) => match &fields[3] {
                    RespValue::Array(args) => match &args[2] {
                        RespValue::BulkString(arg) => {
                            assert!(arg.len() < 1000);
                            assert!(arg.ends_with(b"more bytes)"));
                        }
                        _ => panic!(),
                    },
                    _ => panic!(),
                },
                _ => panic!(),
            },
            _ => panic!(),
        }
    }
}
