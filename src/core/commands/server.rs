// src/core/commands/server.rs

//! Server introspection and administration commands: `INFO`, `CONFIG`,
//! `SLOWLOG`, `TIME`, `DBSIZE`, `FLUSHALL`. Parsing lives here together with
//! the reply builders the router calls; none of these take a database lock
//! through the regular data path.

use crate::config::EvictionPolicy;
use crate::core::KyaniteError;
use crate::core::commands::command_trait::ParseCommand;
use crate::core::commands::helpers::{arg_eq, extract_bytes, extract_i64, glob_match};
use crate::core::protocol::RespFrame;
use crate::core::state::ServerState;
use crate::core::RespValue;
use bytes::Bytes;
use std::str::FromStr;
use std::sync::atomic::Ordering;
use std::time::{SystemTime, UNIX_EPOCH};

/// `INFO [section]`
#[derive(Debug, Clone)]
pub struct Info {
    pub section: Option<String>,
}

impl ParseCommand for Info {
    fn parse(args: &[RespFrame]) -> Result<Self, KyaniteError> {
        match args {
            [] => Ok(Info { section: None }),
            [section] => {
                let raw = extract_bytes(section)?;
                Ok(Info {
                    section: Some(String::from_utf8_lossy(&raw).to_ascii_lowercase()),
                })
            }
            _ => Err(KyaniteError::WrongArgumentCount("info".to_string())),
        }
    }
}

/// `CONFIG GET pattern | SET name value | RESETSTAT`
#[derive(Debug, Clone)]
pub enum ConfigCmd {
    Get(Bytes),
    Set(String, Bytes),
    ResetStat,
}

impl ParseCommand for ConfigCmd {
    fn parse(args: &[RespFrame]) -> Result<Self, KyaniteError> {
        let Some(sub) = args.first() else {
            return Err(KyaniteError::WrongArgumentCount("config".to_string()));
        };
        if arg_eq(sub, "get") && args.len() == 2 {
            Ok(ConfigCmd::Get(extract_bytes(&args[1])?))
        } else if arg_eq(sub, "set") && args.len() == 3 {
            let name = extract_bytes(&args[1])?;
            Ok(ConfigCmd::Set(
                String::from_utf8_lossy(&name).to_ascii_lowercase(),
                extract_bytes(&args[2])?,
            ))
        } else if arg_eq(sub, "resetstat") && args.len() == 1 {
            Ok(ConfigCmd::ResetStat)
        } else {
            Err(KyaniteError::Generic(
                "CONFIG subcommand must be one of GET, SET, RESETSTAT".to_string(),
            ))
        }
    }
}

/// `SLOWLOG GET [count] | LEN | RESET`
#[derive(Debug, Clone)]
pub enum SlowlogCmd {
    Get(Option<usize>),
    Len,
    Reset,
}

impl ParseCommand for SlowlogCmd {
    fn parse(args: &[RespFrame]) -> Result<Self, KyaniteError> {
        let Some(sub) = args.first() else {
            return Err(KyaniteError::WrongArgumentCount("slowlog".to_string()));
        };
        if arg_eq(sub, "get") && args.len() <= 2 {
            let count = match args.get(1) {
                Some(frame) => {
                    let n = extract_i64(frame)?;
                    if n < 0 {
                        return Err(KyaniteError::NotAnInteger);
                    }
                    Some(n as usize)
                }
                None => None,
            };
            Ok(SlowlogCmd::Get(count))
        } else if arg_eq(sub, "len") && args.len() == 1 {
            Ok(SlowlogCmd::Len)
        } else if arg_eq(sub, "reset") && args.len() == 1 {
            Ok(SlowlogCmd::Reset)
        } else {
            Err(KyaniteError::Generic(
                "SLOWLOG subcommand must be one of GET, LEN, RESET".to_string(),
            ))
        }
    }
}

/// `TIME`
#[derive(Debug, Clone)]
pub struct Time;

impl ParseCommand for Time {
    fn parse(args: &[RespFrame]) -> Result<Self, KyaniteError> {
        if !args.is_empty() {
            return Err(KyaniteError::WrongArgumentCount("time".to_string()));
        }
        Ok(Time)
    }
}

/// `DBSIZE`
#[derive(Debug, Clone)]
pub struct DbSize;

impl ParseCommand for DbSize {
    fn parse(args: &[RespFrame]) -> Result<Self, KyaniteError> {
        if !args.is_empty() {
            return Err(KyaniteError::WrongArgumentCount("dbsize".to_string()));
        }
        Ok(DbSize)
    }
}

/// `FLUSHALL`
#[derive(Debug, Clone)]
pub struct FlushAll;

impl ParseCommand for FlushAll {
    fn parse(args: &[RespFrame]) -> Result<Self, KyaniteError> {
        if !args.is_empty() {
            return Err(KyaniteError::WrongArgumentCount("flushall".to_string()));
        }
        Ok(FlushAll)
    }
}

// --- Reply builders used by the command router ---

pub fn time_reply() -> RespValue {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    RespValue::Array(vec![
        RespValue::BulkString(now.as_secs().to_string().into()),
        RespValue::BulkString(now.subsec_micros().to_string().into()),
    ])
}

/// Renders the `INFO` sections, optionally filtered to one section.
pub fn info_reply(state: &ServerState, section: Option<&str>) -> RespValue {
    let mut out = String::new();
    let wants = |name: &str| section.is_none_or(|s| s == name || s == "all");

    if wants("server") {
        out.push_str("# Server\r\n");
        out.push_str(&format!("kyanite_version:{}\r\n", env!("CARGO_PKG_VERSION")));
        out.push_str(&format!("run_id:{}\r\n", state.run_id));
        out.push_str(&format!(
            "uptime_in_seconds:{}\r\n",
            state.start_time.elapsed().as_secs()
        ));
        let (port, threads, databases) = {
            let config = state.config.read();
            (config.port, config.threads, config.databases)
        };
        out.push_str(&format!("tcp_port:{port}\r\n"));
        out.push_str(&format!("worker_threads:{threads}\r\n"));
        out.push_str(&format!("databases:{databases}\r\n"));
        out.push_str("\r\n");
    }

    if wants("clients") {
        out.push_str("# Clients\r\n");
        out.push_str(&format!("connected_clients:{}\r\n", state.clients.len()));
        out.push_str("\r\n");
    }

    if wants("memory") {
        out.push_str("# Memory\r\n");
        out.push_str(&format!("used_memory:{}\r\n", state.total_used_memory()));
        out.push_str(&format!(
            "used_memory_peak:{}\r\n",
            state.stats.peak_memory.load(Ordering::Relaxed)
        ));
        let (maxmemory, policy) = {
            let config = state.config.read();
            (config.maxmemory, config.maxmemory_policy)
        };
        out.push_str(&format!("maxmemory:{maxmemory}\r\n"));
        out.push_str(&format!("maxmemory_policy:{policy}\r\n"));
        out.push_str("\r\n");
    }

    if wants("stats") {
        let stats = &state.stats;
        out.push_str("# Stats\r\n");
        out.push_str(&format!(
            "total_connections_received:{}\r\n",
            stats.total_connections.load(Ordering::Relaxed)
        ));
        out.push_str(&format!(
            "rejected_connections:{}\r\n",
            stats.rejected_connections.load(Ordering::Relaxed)
        ));
        out.push_str(&format!(
            "total_commands_processed:{}\r\n",
            stats.total_commands.load(Ordering::Relaxed)
        ));
        out.push_str(&format!(
            "expired_keys:{}\r\n",
            stats.expired_keys.load(Ordering::Relaxed)
        ));
        out.push_str(&format!(
            "evicted_keys:{}\r\n",
            stats.evicted_keys.load(Ordering::Relaxed)
        ));
        out.push_str(&format!(
            "keyspace_hits:{}\r\n",
            stats.keyspace_hits.load(Ordering::Relaxed)
        ));
        out.push_str(&format!(
            "keyspace_misses:{}\r\n",
            stats.keyspace_misses.load(Ordering::Relaxed)
        ));
        out.push_str("\r\n");
    }

    if wants("keyspace") {
        out.push_str("# Keyspace\r\n");
        for db in &state.dbs {
            let keys = db.key_count();
            if keys > 0 {
                let expires = db.read().expires_len();
                let avg_ttl = db.avg_ttl_ms.load(Ordering::Relaxed);
                out.push_str(&format!(
                    "db{}:keys={keys},expires={expires},avg_ttl={avg_ttl}\r\n",
                    db.index
                ));
            }
        }
        out.push_str("\r\n");
    }

    RespValue::BulkString(out.into())
}

/// `CONFIG GET` over the recognised parameter names.
pub fn config_get_reply(state: &ServerState, pattern: &Bytes) -> RespValue {
    let config = state.config.read();
    let entries: Vec<(&str, String)> = vec![
        ("databases", config.databases.to_string()),
        ("port", config.port.to_string()),
        ("threads", config.threads.to_string()),
        ("maxclients", config.maxclients.to_string()),
        ("maxmemory", config.maxmemory.to_string()),
        ("maxmemory-policy", config.maxmemory_policy.to_string()),
        ("maxmemory-samples", config.maxmemory_samples.to_string()),
        (
            "slowlog-log-slower-than",
            config.slowlog_log_slower_than.to_string(),
        ),
        ("slowlog-max-len", config.slowlog_max_len.to_string()),
        ("hz", config.hz.to_string()),
        ("dir", config.dir.clone().unwrap_or_default()),
    ];
    let mut reply = Vec::new();
    for (name, value) in entries {
        if glob_match(pattern, name.as_bytes()) {
            reply.push(RespValue::BulkString(name.into()));
            reply.push(RespValue::BulkString(value.into()));
        }
    }
    RespValue::Array(reply)
}

/// `CONFIG SET` for the dynamically adjustable parameters.
pub fn config_set(state: &ServerState, name: &str, value: &Bytes) -> Result<(), KyaniteError> {
    let text = String::from_utf8_lossy(value);
    let bad_value = || {
        KyaniteError::Generic(format!(
            "Invalid argument '{text}' for CONFIG SET '{name}'"
        ))
    };
    let mut config = state.config.write();
    match name {
        "maxmemory" => {
            config.maxmemory = text.parse().map_err(|_| bad_value())?;
        }
        "maxmemory-policy" => {
            config.maxmemory_policy =
                EvictionPolicy::from_str(&text).map_err(|_| bad_value())?;
        }
        "maxmemory-samples" => {
            let samples: usize = text.parse().map_err(|_| bad_value())?;
            if samples == 0 {
                return Err(bad_value());
            }
            config.maxmemory_samples = samples;
        }
        "slowlog-log-slower-than" => {
            config.slowlog_log_slower_than = text.parse().map_err(|_| bad_value())?;
        }
        "slowlog-max-len" => {
            let max_len: usize = text.parse().map_err(|_| bad_value())?;
            config.slowlog_max_len = max_len;
            state.slowlog.set_max_len(max_len);
        }
        "hz" => {
            let hz: u32 = text.parse().map_err(|_| bad_value())?;
            if !(1..=500).contains(&hz) {
                return Err(bad_value());
            }
            config.hz = hz;
        }
        "maxclients" => {
            config.maxclients = text.parse().map_err(|_| bad_value())?;
        }
        _ => {
            return Err(KyaniteError::Generic(format!(
                "Unsupported CONFIG parameter: {name}"
            )));
        }
    }
    Ok(())
}
