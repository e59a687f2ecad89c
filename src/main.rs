// src/main.rs

//! The main entry point for the Kyanite server binary.

use anyhow::{Context, Result, anyhow};
use kyanite::config::Config;
use kyanite::server;
use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::filter::EnvFilter;

const VERSION: &str = env!("CARGO_PKG_VERSION");

const USAGE: &str = "\
Usage: kyanite [options]

Options:
  -c, --conf-file <path>  load configuration from <path>
  -p <path>               write the process id to <path> at startup
  -o <path>               append log output to <path> instead of stderr
  -v <level>              log verbosity, 0 (quiet) .. 11 (everything)
  -h, --help              print this help and exit
  -V, --version           print the version and exit";

/// Parsed command-line options. Kept deliberately small; everything else
/// lives in the configuration file.
#[derive(Debug, Default)]
struct CliOptions {
    conf_file: Option<PathBuf>,
    pid_file: Option<PathBuf>,
    log_file: Option<PathBuf>,
    verbosity: Option<u8>,
}

fn parse_args(args: &[String]) -> Result<Option<CliOptions>> {
    let mut opts = CliOptions::default();
    let mut iter = args.iter().skip(1);

    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "-h" | "--help" => {
                println!("{USAGE}");
                return Ok(None);
            }
            "-V" | "--version" => {
                println!("kyanite version {VERSION}");
                return Ok(None);
            }
            "-c" | "--conf-file" => {
                let path = iter.next().ok_or_else(|| anyhow!("-c requires a path"))?;
                opts.conf_file = Some(PathBuf::from(path));
            }
            "-p" => {
                let path = iter.next().ok_or_else(|| anyhow!("-p requires a path"))?;
                opts.pid_file = Some(PathBuf::from(path));
            }
            "-o" => {
                let path = iter.next().ok_or_else(|| anyhow!("-o requires a path"))?;
                opts.log_file = Some(PathBuf::from(path));
            }
            "-v" => {
                let level = iter.next().ok_or_else(|| anyhow!("-v requires a level"))?;
                let level: u8 = level
                    .parse()
                    .map_err(|_| anyhow!("invalid verbosity level: {level}"))?;
                if level > 11 {
                    return Err(anyhow!("verbosity must be in 0..=11, got {level}"));
                }
                opts.verbosity = Some(level);
            }
            other => return Err(anyhow!("unknown argument: {other}\n{USAGE}")),
        }
    }
    Ok(Some(opts))
}

/// Maps the numeric `-v` verbosity onto a tracing filter directive.
fn verbosity_filter(level: u8) -> &'static str {
    match level {
        0 => "error",
        1..=2 => "warn",
        3..=5 => "info",
        6..=8 => "debug",
        _ => "trace",
    }
}

fn setup_logging(opts: &CliOptions, config: &Config) -> Result<()> {
    let directives = if let Some(v) = opts.verbosity {
        verbosity_filter(v).to_string()
    } else {
        env::var("RUST_LOG").unwrap_or_else(|_| config.log_level.clone())
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(directives))
        .compact();

    if let Some(path) = &opts.log_file {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("cannot open log file {}", path.display()))?;
        builder.with_ansi(false).with_writer(Arc::new(file)).init();
    } else {
        builder.with_ansi(true).init();
    }
    Ok(())
}

/// An RAII guard that removes the pid file on shutdown.
struct PidFile(PathBuf);

impl PidFile {
    fn create(path: PathBuf) -> Result<Self> {
        std::fs::write(&path, format!("{}\n", std::process::id()))
            .with_context(|| format!("cannot write pid file {}", path.display()))?;
        Ok(Self(path))
    }
}

impl Drop for PidFile {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.0) {
            eprintln!("failed to remove pid file {}: {e}", self.0.display());
        }
    }
}

#[tokio::main]
async fn main() {
    let args: Vec<String> = env::args().collect();

    let opts = match parse_args(&args) {
        Ok(Some(opts)) => opts,
        Ok(None) => return,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };

    let config = match load_config(&opts) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("configuration error: {e:#}");
            std::process::exit(1);
        }
    };

    if let Err(e) = setup_logging(&opts, &config) {
        eprintln!("logging setup error: {e:#}");
        std::process::exit(1);
    }

    let _pid_file = match opts.pid_file.clone().map(PidFile::create).transpose() {
        Ok(guard) => guard,
        Err(e) => {
            error!("startup error: {e:#}");
            std::process::exit(1);
        }
    };

    info!("kyanite version {VERSION} starting, pid {}", std::process::id());

    if let Err(e) = server::run(config).await {
        error!("server runtime error: {e:#}");
        std::process::exit(1);
    }
}

fn load_config(opts: &CliOptions) -> Result<Config> {
    let mut config = match &opts.conf_file {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    config.finalize()?;
    Ok(config)
}
