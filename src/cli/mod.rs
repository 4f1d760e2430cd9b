//! CLI argument parsing
//!
//! Defines command-line interface using clap, and the glue that turns the
//! parsed arguments into a configured run.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use crate::config::{CliOverrides, ConfigFile, EnvConfig, ExecutionTarget, RunConfig};
use crate::executor::{ClientExecutor, Executor, LocalParallelExecutor, ServerExecutor};
use crate::output::OutputSink;
use crate::registry::Registry;
use crate::reporter::{CompositeReporter, SharedReporter};
use crate::scheduler::Scheduler;
use crate::utils::{init_logger, LogLevel};

/// Test suite runner with local and distributed execution
#[derive(Parser, Debug)]
#[command(name = "tally")]
#[command(version)]
#[command(about = "Run registered test suites on worker threads or across machines")]
#[command(long_about = None)]
pub struct Args {
    /// Seed for the suite shuffle
    #[arg(short, long)]
    pub seed: Option<u64>,

    /// Show each test with its run time
    #[arg(short, long)]
    pub verbose: bool,

    /// Only run tests matching this name or /regex/
    #[arg(short, long)]
    pub name: Option<String>,

    /// Skip tests matching this name or /regex/
    #[arg(short, long)]
    pub exclude: Option<String>,

    /// Worker threads for parallel suites
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Serve parallel work to remote clients on this port
    #[arg(short, long, conflicts_with = "connect")]
    pub listen: Option<u16>,

    /// Take parallel work from a server on this port
    #[arg(short, long)]
    pub connect: Option<u16>,

    /// Address to listen on or connect to
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    /// Number of clients the server waits for (defaults to the worker count)
    #[arg(long)]
    pub clients: Option<usize>,

    /// Configuration file (YAML or JSON)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long)]
    pub log_level: Option<LogLevel>,

    /// Show full backtraces for errors
    #[arg(long)]
    pub debug: bool,

    /// List the environment variables and exit
    #[arg(long)]
    pub env_help: bool,
}

impl Args {
    pub fn overrides(&self) -> CliOverrides {
        CliOverrides {
            seed: self.seed,
            verbose: self.verbose,
            name: self.name.clone(),
            exclude: self.exclude.clone(),
            workers: self.workers,
            listen: self.listen,
            connect: self.connect,
            host: Some(self.host.clone()),
            clients: self.clients,
            debug: self.debug,
            log_level: self.log_level,
        }
    }
}

/// Resolve configuration, start logging, and run. Returns the verdict.
pub fn run(args: &Args, registry: Registry) -> Result<bool> {
    let env = EnvConfig::load();
    let config_path = args
        .config
        .clone()
        .or_else(|| env.config_file.as_ref().map(PathBuf::from));
    let file = ConfigFile::load_or_find(config_path.as_deref())?;
    let config = RunConfig::resolve(&file.run, &env, &args.overrides())?;

    init_logger(config.log_level);
    execute(&config, Arc::new(registry), OutputSink::stdout())
}

/// Run every selected test of `registry` as `config` says
pub fn execute(config: &RunConfig, registry: Arc<Registry>, io: OutputSink) -> Result<bool> {
    let filter = config.backtrace_filter();
    let scheduler = Scheduler::new(Arc::clone(&registry), filter.clone())
        .with_signals(config.signal_config());
    let plan = scheduler.plan(&config.method_filter()?, config.seed);
    let interrupt = scheduler.interrupt_flag();
    let mut config = config.clone();

    let mut executor: Box<dyn Executor> = match &mut config.target {
        ExecutionTarget::Local => Box::new(LocalParallelExecutor::new(
            config.workers,
            registry,
            filter,
        )),
        ExecutionTarget::Server { addr, clients } => {
            let server =
                ServerExecutor::bind(*addr, *clients, &registry)?.with_interrupt(interrupt);
            *addr = server.local_addr();
            io.write_line(&format!("Listening on {addr}"));
            io.flush();
            Box::new(server)
        }
        ExecutionTarget::Client { addr } => {
            info!("Running as a client of {}", addr);
            Box::new(ClientExecutor::new(*addr, registry, filter)?.with_interrupt(interrupt))
        }
    };

    let (reporter, _summary) = CompositeReporter::standard(io, config.reporter_options());
    let reporter: SharedReporter = Arc::new(reporter);

    scheduler
        .run(&plan, executor.as_mut(), reporter)
        .context("Test run failed")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::MemoryBuffer;
    use crate::registry::fixtures::{Foo, Mixed, Narrow};
    use std::net::SocketAddr;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_parse_flags() {
        let args = Args::parse_from([
            "tally", "-s", "42", "-v", "-n", "/parse/", "-e", "Foo#test_b", "-w", "8",
        ]);
        assert_eq!(args.seed, Some(42));
        assert!(args.verbose);
        assert_eq!(args.name.as_deref(), Some("/parse/"));
        assert_eq!(args.exclude.as_deref(), Some("Foo#test_b"));
        assert_eq!(args.workers, Some(8));
        assert_eq!(args.host, "127.0.0.1");
    }

    #[test]
    fn test_listen_and_connect_conflict() {
        assert!(Args::try_parse_from(["tally", "--listen", "1", "--connect", "2"]).is_err());

        let args = Args::try_parse_from(["tally", "--listen", "7000", "--clients", "3"]).unwrap();
        let overrides = args.overrides();
        assert_eq!(overrides.listen, Some(7000));
        assert_eq!(overrides.clients, Some(3));
    }

    #[test]
    fn test_log_level_flag() {
        let args = Args::parse_from(["tally", "--log-level", "debug"]);
        assert_eq!(args.log_level, Some(LogLevel::Debug));
        assert!(Args::try_parse_from(["tally", "--log-level", "chatty"]).is_err());
    }

    #[test]
    fn test_execute_local_run() {
        let registry = Arc::new(
            Registry::new()
                .with::<Foo>()
                .unwrap()
                .with::<Narrow>()
                .unwrap(),
        );
        let config = RunConfig {
            seed: 77,
            workers: 3,
            ..Default::default()
        };
        let (io, buffer) = OutputSink::memory();

        assert!(execute(&config, registry, io).unwrap());
        let out = buffer.contents();
        assert!(out.starts_with("Run options: --seed 77\n\n# Running:\n\n....."));
        assert!(out.contains("5 runs, 5 assertions, 0 failures, 0 errors, 0 skips"));
    }

    #[test]
    fn test_execute_reports_failures() {
        let registry = Arc::new(Registry::new().with::<Mixed>().unwrap());
        let config = RunConfig {
            seed: 1,
            ..Default::default()
        };
        let (io, buffer) = OutputSink::memory();

        assert!(!execute(&config, registry, io).unwrap());
        let out = buffer.contents();
        assert!(out.contains("4 runs, 2 assertions, 1 failures, 1 errors, 1 skips"));
        assert!(out.contains("Error:\nMixed#test_error:\nError: database unavailable"));
        assert!(out.contains("You have skipped tests. Run with --verbose for details."));
    }

    fn wait_for_listener(buffer: &MemoryBuffer) -> SocketAddr {
        for _ in 0..200 {
            let out = buffer.contents();
            if let Some(line) = out.lines().find(|l| l.starts_with("Listening on ")) {
                return line["Listening on ".len()..].parse().unwrap();
            }
            thread::sleep(Duration::from_millis(10));
        }
        panic!("server never announced its address");
    }

    #[test]
    fn test_execute_distributed_run() {
        let registry = Arc::new(
            Registry::new()
                .with::<Foo>()
                .unwrap()
                .with::<Narrow>()
                .unwrap(),
        );
        let server_config = RunConfig {
            seed: 5,
            target: ExecutionTarget::Server {
                addr: "127.0.0.1:0".parse().unwrap(),
                clients: 1,
            },
            ..Default::default()
        };
        let (server_io, server_out) = OutputSink::memory();

        let client = {
            let registry = Arc::clone(&registry);
            let server_out = server_out.clone();
            thread::spawn(move || {
                let addr = wait_for_listener(&server_out);
                let config = RunConfig {
                    seed: 5,
                    target: ExecutionTarget::Client { addr },
                    ..Default::default()
                };
                let (io, out) = OutputSink::memory();
                let passed = execute(&config, registry, io).unwrap();
                (passed, addr, out.contents())
            })
        };

        assert!(execute(&server_config, registry, server_io).unwrap());
        let (client_passed, addr, client_out) = client.join().unwrap();
        assert!(client_passed);
        assert_ne!(addr.port(), 0);

        let out = server_out.contents();
        let header = format!(
            "Listening on {addr}\nRun options: --seed 5 --listen {}\n",
            addr.port()
        );
        assert!(out.starts_with(&header));
        assert!(out.contains("5 runs, 5 assertions, 0 failures, 0 errors, 0 skips"));
        assert!(client_out.contains("5 runs, 5 assertions, 0 failures, 0 errors, 0 skips"));
    }
}
