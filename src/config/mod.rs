//! Configuration module
//!
//! A run is configured from three layers, lowest precedence first: the
//! config file, `TALLY_*` environment variables, and command-line flags.
//! [`RunConfig::resolve`] merges them once; the result does not change for
//! the rest of the run.

pub mod env;
pub mod file;

pub use env::EnvConfig;
pub use file::ConfigFile;

use anyhow::{Context, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::net::{SocketAddr, ToSocketAddrs};

use crate::models::BacktraceFilter;
use crate::registry::MethodFilter;
use crate::reporter::ReporterOptions;
use crate::scheduler::{SignalConfig, StatusSignal};
use crate::utils::LogLevel;

/// Worker threads when nothing else says otherwise
pub const DEFAULT_WORKERS: usize = 2;

/// Seeds drawn at random stay below this bound
const SEED_BOUND: u64 = 0xFFFF;

/// Settings that may come from a config file
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub seed: Option<u64>,
    pub verbose: Option<bool>,
    pub workers: Option<usize>,
    pub filter: Option<String>,
    pub exclude: Option<String>,
    pub debug: Option<bool>,
    pub no_skip_message: Option<bool>,
    pub status_signal: Option<StatusSignal>,
    pub log_level: Option<LogLevel>,
}

/// Settings given on the command line
#[derive(Clone, Debug, Default)]
pub struct CliOverrides {
    pub seed: Option<u64>,
    pub verbose: bool,
    pub name: Option<String>,
    pub exclude: Option<String>,
    pub workers: Option<usize>,
    pub listen: Option<u16>,
    pub connect: Option<u16>,
    pub host: Option<String>,
    pub clients: Option<usize>,
    pub debug: bool,
    pub log_level: Option<LogLevel>,
}

/// Where the parallel suites run
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum ExecutionTarget {
    /// Local worker threads
    #[default]
    Local,
    /// Serve the work queue to `clients` remote processes
    Server { addr: SocketAddr, clients: usize },
    /// Drain a remote server's queue
    Client { addr: SocketAddr },
}

/// Fully resolved configuration of one run
#[derive(Clone, Debug)]
pub struct RunConfig {
    pub seed: u64,
    pub filter: Option<String>,
    pub exclude: Option<String>,
    pub verbose: bool,
    pub workers: usize,
    pub debug: bool,
    pub no_skip_message: bool,
    pub status_signal: StatusSignal,
    pub target: ExecutionTarget,
    pub log_level: LogLevel,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            filter: None,
            exclude: None,
            verbose: false,
            workers: DEFAULT_WORKERS,
            debug: false,
            no_skip_message: false,
            status_signal: StatusSignal::default(),
            target: ExecutionTarget::Local,
            log_level: LogLevel::default(),
        }
    }
}

impl RunConfig {
    /// Merge file, environment and command line, in rising precedence
    pub fn resolve(file: &AppConfig, env: &EnvConfig, cli: &CliOverrides) -> Result<Self> {
        let seed = cli
            .seed
            .or(env.seed)
            .or(file.seed)
            .unwrap_or_else(|| rand::rng().random_range(0..SEED_BOUND));

        let workers = cli
            .workers
            .or(env.workers)
            .or(file.workers)
            .unwrap_or(DEFAULT_WORKERS)
            .max(1);

        let target = match (cli.listen, cli.connect) {
            (Some(_), Some(_)) => anyhow::bail!("--listen and --connect cannot be combined"),
            (Some(port), None) => ExecutionTarget::Server {
                addr: socket_addr(cli.host.as_deref(), port)?,
                clients: cli.clients.unwrap_or(workers).max(1),
            },
            (None, Some(port)) => ExecutionTarget::Client {
                addr: socket_addr(cli.host.as_deref(), port)?,
            },
            (None, None) => ExecutionTarget::Local,
        };

        let config = Self {
            seed,
            filter: cli.name.clone().or_else(|| file.filter.clone()),
            exclude: cli.exclude.clone().or_else(|| file.exclude.clone()),
            verbose: cli.verbose || env.verbose.or(file.verbose).unwrap_or(false),
            workers,
            debug: cli.debug || env.debug.or(file.debug).unwrap_or(false),
            no_skip_message: env
                .no_skip_message
                .or(file.no_skip_message)
                .unwrap_or(false),
            status_signal: env
                .status_signal
                .or(file.status_signal)
                .unwrap_or_default(),
            target,
            log_level: cli
                .log_level
                .or(env.log_level)
                .or(file.log_level)
                .unwrap_or_default(),
        };

        config.method_filter()?;
        Ok(config)
    }

    /// The effective options as command-line flags, for the report header
    pub fn describe(&self) -> String {
        let mut args = vec!["--seed".to_string(), self.seed.to_string()];

        if let Some(name) = &self.filter {
            args.push("--name".to_string());
            args.push(shell_quote(name));
        }
        if let Some(exclude) = &self.exclude {
            args.push("--exclude".to_string());
            args.push(shell_quote(exclude));
        }
        if self.verbose {
            args.push("--verbose".to_string());
        }
        if self.debug {
            args.push("--debug".to_string());
        }
        match &self.target {
            ExecutionTarget::Local => {}
            ExecutionTarget::Server { addr, .. } => {
                args.push("--listen".to_string());
                args.push(addr.port().to_string());
            }
            ExecutionTarget::Client { addr } => {
                args.push("--connect".to_string());
                args.push(addr.port().to_string());
            }
        }

        args.join(" ")
    }

    pub fn method_filter(&self) -> Result<MethodFilter> {
        MethodFilter::parse(self.filter.as_deref(), self.exclude.as_deref())
            .context("Invalid --name or --exclude pattern")
    }

    pub fn backtrace_filter(&self) -> BacktraceFilter {
        BacktraceFilter::new(self.debug)
    }

    pub fn reporter_options(&self) -> ReporterOptions {
        ReporterOptions {
            verbose: self.verbose,
            no_skip_message: self.no_skip_message,
            run_options: self.describe(),
        }
    }

    pub fn signal_config(&self) -> SignalConfig {
        SignalConfig {
            status_signal: Some(self.status_signal),
            catch_interrupt: true,
        }
    }
}

fn socket_addr(host: Option<&str>, port: u16) -> Result<SocketAddr> {
    let host = host.unwrap_or("127.0.0.1");
    (host, port)
        .to_socket_addrs()
        .with_context(|| format!("Failed to resolve {host}:{port}"))?
        .next()
        .with_context(|| format!("No address found for {host}:{port}"))
}

/// Quote values a shell would split or expand
fn shell_quote(value: &str) -> String {
    let special = |c: char| c.is_whitespace() || "|&<>$()".contains(c);
    if value.contains(special) {
        format!("{value:?}")
    } else {
        value.to_string()
    }
}
