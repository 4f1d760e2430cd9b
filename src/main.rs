//! Tally - test suite runner
//!
//! Runs the bundled self-check suites. Parallel suites go to local worker
//! threads, or to remote clients when started with `--listen`.
//!
//! ## Usage
//!
//! ```bash
//! # Run everything with four workers and a fixed seed
//! tally --workers 4 --seed 4242
//!
//! # Only parsing tests, verbosely
//! tally --name /Parsing/ --verbose
//!
//! # Distributed: one server waiting for two clients
//! tally --listen 7878 --clients 2
//! tally --connect 7878
//! ```

use anyhow::Result;
use clap::Parser;

use tally::cli::{self, Args};
use tally::config::env::env_help;
use tally::demo;

fn main() -> Result<()> {
    let args = Args::parse();

    if args.env_help {
        println!("{}", env_help());
        return Ok(());
    }

    let registry = demo::registry()?;
    let passed = cli::run(&args, registry)?;

    if !passed {
        std::process::exit(1);
    }
    Ok(())
}
