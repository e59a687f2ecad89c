use kyanite::config::{Config, DEFAULT_PORT, EvictionPolicy};
use std::io::Write;

#[test]
fn defaults_match_documented_values() {
    let config = Config::default();
    assert_eq!(config.port, DEFAULT_PORT);
    assert_eq!(config.databases, 6);
    assert_eq!(config.maxclients, 10_000);
    assert_eq!(config.maxmemory, 0);
    assert_eq!(config.maxmemory_policy, EvictionPolicy::NoEviction);
    assert_eq!(config.maxmemory_samples, 5);
    assert_eq!(config.slowlog_log_slower_than, 10_000);
    assert_eq!(config.slowlog_max_len, 128);
    assert_eq!(config.hz, 10);
}

#[test]
fn loads_a_toml_file() {
    let mut file = tempfile::NamedTempFile::with_suffix(".toml").unwrap();
    writeln!(
        file,
        r#"
port = 7000
threads = 2
databases = 4
maxmemory = 1048576
maxmemory-policy = "allkeys-lru"
maxmemory-samples = 7
slowlog-log-slower-than = 250
requirepass = "sekrit"
commands-need-adminpass = ["FLUSHALL", "CONFIG"]
"#
    )
    .unwrap();

    let mut config = Config::from_file(file.path()).unwrap();
    config.finalize().unwrap();

    assert_eq!(config.port, 7000);
    assert_eq!(config.threads, 2);
    assert_eq!(config.databases, 4);
    assert_eq!(config.maxmemory, 1_048_576);
    assert_eq!(config.maxmemory_policy, EvictionPolicy::AllkeysLru);
    assert_eq!(config.maxmemory_samples, 7);
    assert_eq!(config.slowlog_log_slower_than, 250);
    assert_eq!(config.requirepass.as_deref(), Some("sekrit"));
    assert!(config.commands_need_adminpass.contains("flushall"));
    assert!(config.commands_need_adminpass.contains("config"));
}

#[test]
fn rejects_unknown_fields() {
    let mut file = tempfile::NamedTempFile::with_suffix(".toml").unwrap();
    writeln!(file, "not-a-real-option = true").unwrap();
    assert!(Config::from_file(file.path()).is_err());
}

#[test]
fn rejects_zero_threads() {
    let mut config = Config {
        threads: 0,
        ..Default::default()
    };
    assert!(config.finalize().is_err());
}

#[test]
fn rejects_out_of_range_hz() {
    let mut config = Config {
        hz: 0,
        ..Default::default()
    };
    assert!(config.finalize().is_err());
    let mut config = Config {
        hz: 1000,
        ..Default::default()
    };
    assert!(config.finalize().is_err());
}

#[test]
fn missing_file_is_an_error() {
    assert!(Config::from_file("/definitely/not/here.toml").is_err());
}
