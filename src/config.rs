// src/config.rs

//! Manages server configuration: loading, resolving dynamic values, and validation.

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tracing::info;

/// The default port Kyanite listens on.
pub const DEFAULT_PORT: u16 = 55555;

/// Represents the different memory eviction strategies.
#[derive(
    Serialize,
    Deserialize,
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    strum_macros::Display,
    strum_macros::EnumString,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum EvictionPolicy {
    // Spelled without a dash on the wire, following convention.
    #[default]
    #[serde(rename = "noeviction")]
    #[strum(serialize = "noeviction")]
    NoEviction,
    AllkeysLru,
    VolatileLru,
    AllkeysRandom,
    VolatileRandom,
    VolatileTtl,
}

impl EvictionPolicy {
    /// True if the policy only ever considers keys carrying an expire.
    pub fn is_volatile(&self) -> bool {
        matches!(
            self,
            EvictionPolicy::VolatileLru | EvictionPolicy::VolatileRandom | EvictionPolicy::VolatileTtl
        )
    }
}

/// The full server configuration, deserialized from a TOML file.
/// Every field carries a default so a bare `kyanite` invocation works.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct Config {
    /// Addresses to listen on. Each entry is combined with `port`.
    #[serde(default = "default_bind")]
    pub bind: Vec<String>,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Number of worker event loops. Defaults to min(6, online cpus).
    #[serde(default = "default_threads")]
    pub threads: usize,
    /// Number of logical databases.
    #[serde(default = "default_databases")]
    pub databases: usize,
    /// Accept ceiling; connections beyond it are rejected at accept time.
    #[serde(default = "default_maxclients")]
    pub maxclients: usize,
    /// Eviction trigger in bytes. 0 means unlimited.
    #[serde(default)]
    pub maxmemory: usize,
    #[serde(default)]
    pub maxmemory_policy: EvictionPolicy,
    /// Eviction sample size per cycle.
    #[serde(default = "default_maxmemory_samples")]
    pub maxmemory_samples: usize,
    /// Threshold in microseconds; commands at least this slow are logged.
    /// Negative disables the slow log entirely.
    #[serde(default = "default_slowlog_log_slower_than")]
    pub slowlog_log_slower_than: i64,
    #[serde(default = "default_slowlog_max_len")]
    pub slowlog_max_len: usize,
    /// Optional password required before any other command.
    #[serde(default)]
    pub requirepass: Option<String>,
    /// Optional administrative password unlocking the gated command set.
    #[serde(default)]
    pub adminpass: Option<String>,
    /// Command names that require authentication with `adminpass`.
    #[serde(default)]
    pub commands_need_adminpass: HashSet<String>,
    /// Working directory; resolved to an absolute path at startup.
    #[serde(default)]
    pub dir: Option<String>,
    /// Background cron frequency (ticks per second).
    #[serde(default = "default_hz")]
    pub hz: u32,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_bind() -> Vec<String> {
    vec!["127.0.0.1".to_string()]
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_threads() -> usize {
    let cpus = std::thread::available_parallelism().map_or(1, |n| n.get());
    cpus.min(6)
}
fn default_databases() -> usize {
    6
}
fn default_maxclients() -> usize {
    10_000
}
fn default_maxmemory_samples() -> usize {
    5
}
fn default_slowlog_log_slower_than() -> i64 {
    10_000
}
fn default_slowlog_max_len() -> usize {
    128
}
fn default_hz() -> u32 {
    10
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
            threads: default_threads(),
            databases: default_databases(),
            maxclients: default_maxclients(),
            maxmemory: 0,
            maxmemory_policy: EvictionPolicy::default(),
            maxmemory_samples: default_maxmemory_samples(),
            slowlog_log_slower_than: default_slowlog_log_slower_than(),
            slowlog_max_len: default_slowlog_max_len(),
            requirepass: None,
            adminpass: None,
            commands_need_adminpass: HashSet::new(),
            dir: None,
            hz: default_hz(),
            log_level: default_log_level(),
        }
    }
}

impl Config {
    /// Loads the configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let settings = config::Config::builder()
            .add_source(config::File::from(path))
            .build()
            .with_context(|| format!("cannot read config file {}", path.display()))?;
        let config: Config = settings
            .try_deserialize()
            .with_context(|| format!("cannot parse config file {}", path.display()))?;
        Ok(config)
    }

    /// Validates the configuration and resolves dynamic values.
    /// Must be called once before the config is handed to the server.
    pub fn finalize(&mut self) -> Result<()> {
        if self.bind.is_empty() {
            return Err(anyhow!("at least one bind address is required"));
        }
        if self.threads == 0 {
            return Err(anyhow!("threads must be at least 1"));
        }
        if self.databases == 0 {
            return Err(anyhow!("databases must be at least 1"));
        }
        if !(1..=500).contains(&self.hz) {
            return Err(anyhow!("hz must be in 1..=500, got {}", self.hz));
        }
        if self.maxmemory > 0 && self.maxmemory_samples == 0 {
            return Err(anyhow!("maxmemory-samples must be at least 1"));
        }

        // Admin-gated commands are matched case-insensitively at dispatch time.
        self.commands_need_adminpass = self
            .commands_need_adminpass
            .iter()
            .map(|name| name.to_ascii_lowercase())
            .collect();

        if let Some(dir) = &self.dir {
            let resolved = std::fs::canonicalize(dir)
                .with_context(|| format!("cannot resolve dir {dir}"))?;
            std::env::set_current_dir(&resolved)
                .with_context(|| format!("cannot chdir to {}", resolved.display()))?;
            info!("working directory set to {}", resolved.display());
            self.dir = Some(resolved.to_string_lossy().into_owned());
        }
        Ok(())
    }

    /// The listen addresses, each bind host joined with the port.
    pub fn listen_addrs(&self) -> Vec<String> {
        self.bind
            .iter()
            .map(|host| format!("{host}:{}", self.port))
            .collect()
    }

    /// Extracts the read-mostly snapshot handed to each event loop.
    pub fn hot(&self) -> HotConfig {
        HotConfig {
            maxclients: self.maxclients,
            maxmemory: self.maxmemory,
            maxmemory_policy: self.maxmemory_policy,
            maxmemory_samples: self.maxmemory_samples,
            slowlog_log_slower_than: self.slowlog_log_slower_than,
            hz: self.hz,
            requirepass: self.requirepass.clone(),
            adminpass: self.adminpass.clone(),
            commands_need_adminpass: self.commands_need_adminpass.clone(),
        }
    }
}

/// A snapshot of the hot configuration values, refreshed once per second by
/// each loop so per-command reads never touch the authoritative lock.
#[derive(Debug, Clone)]
pub struct HotConfig {
    pub maxclients: usize,
    pub maxmemory: usize,
    pub maxmemory_policy: EvictionPolicy,
    pub maxmemory_samples: usize,
    pub slowlog_log_slower_than: i64,
    pub hz: u32,
    pub requirepass: Option<String>,
    pub adminpass: Option<String>,
    pub commands_need_adminpass: HashSet<String>,
}

impl Default for HotConfig {
    fn default() -> Self {
        Config::default().hot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let mut config = Config::default();
        config.finalize().unwrap();
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.databases, 6);
        assert_eq!(config.maxmemory, 0);
        assert!(config.threads >= 1 && config.threads <= 6);
    }

    #[test]
    fn eviction_policy_parses_kebab_case() {
        use std::str::FromStr;
        assert_eq!(
            EvictionPolicy::from_str("allkeys-lru").unwrap(),
            EvictionPolicy::AllkeysLru
        );
        assert_eq!(
            EvictionPolicy::from_str("noeviction").unwrap(),
            EvictionPolicy::NoEviction
        );
        assert!(EvictionPolicy::from_str("allkeys-lfu").is_err());
    }

    #[test]
    fn admin_command_names_are_lowercased() {
        let mut config = Config {
            commands_need_adminpass: ["FLUSHALL".to_string(), "Config".to_string()]
                .into_iter()
                .collect(),
            ..Default::default()
        };
        config.finalize().unwrap();
        assert!(config.commands_need_adminpass.contains("flushall"));
        assert!(config.commands_need_adminpass.contains("config"));
    }
}
