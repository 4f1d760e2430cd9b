//! Tally - test suite orchestration
//!
//! Discovers registered test suites, schedules their methods on local
//! worker threads or remote client processes, and folds every outcome into
//! one pass/fail verdict with a plain-text summary.
//!
//! ## Writing suites
//!
//! ```no_run
//! use tally::registry::{Registry, Suite, TestMethod};
//!
//! #[derive(Default)]
//! struct Greeting;
//!
//! impl Suite for Greeting {
//!     fn methods() -> Vec<TestMethod<Self>> {
//!         vec![TestMethod::new("test_hello", |_, ctx| {
//!             ctx.assert_eq("hello", "hello")?;
//!             Ok(())
//!         })]
//!     }
//! }
//!
//! let registry = Registry::new().with::<Greeting>().unwrap();
//! ```

pub mod cli;
pub mod config;
pub mod demo;
pub mod executor;
pub mod models;
pub mod output;
pub mod registry;
pub mod reporter;
pub mod scheduler;
pub mod utils;
