//! Test execution engine
//!
//! An [`Executor`] accepts work items (one test method each) and drives
//! them to completion. Two families exist: a local worker-thread pool and a
//! network-distributed server/client pair.

pub mod distributed;
mod parallel;
mod runner;

pub use distributed::{ClientExecutor, ServerExecutor};
pub use parallel::LocalParallelExecutor;
pub use runner::{run_and_record, run_one_method, run_work_item};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::models::BacktraceFilter;
use crate::registry::Registry;
use crate::reporter::SharedReporter;
use distributed::FrameError;

/// Executor errors
#[derive(Error, Debug)]
pub enum ExecutorError {
    #[error("Executor has not been started")]
    NotStarted,

    #[error("Work queue is closed")]
    QueueClosed,

    #[error("{0} worker thread(s) panicked")]
    WorkerPanicked(usize),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Protocol error: {0}")]
    Protocol(#[from] FrameError),

    #[error("Unexpected reply: expected {expected}, got {got}")]
    UnexpectedReply { expected: String, got: String },

    #[error("Server rejected client: {0}")]
    Rejected(String),

    #[error("Server error: {0}")]
    Remote(String),

    #[error("Interrupted while waiting for remote work")]
    Interrupted,
}

/// One `(suite, method)` pair to be executed exactly once
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkItem {
    pub suite: String,
    pub method: String,
}

impl WorkItem {
    pub fn new(suite: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            suite: suite.into(),
            method: method.into(),
        }
    }
}

impl fmt::Display for WorkItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.suite, self.method)
    }
}

/// Runs submitted work items to completion.
///
/// `start` is called once before any `submit`, with the reporter every
/// result must reach. `shutdown` blocks until all submitted work has run
/// and been recorded.
pub trait Executor: Send {
    fn start(&mut self, _reporter: SharedReporter) -> Result<(), ExecutorError> {
        Ok(())
    }

    fn submit(&mut self, item: WorkItem) -> Result<(), ExecutorError>;

    fn shutdown(&mut self) -> Result<(), ExecutorError>;

    /// False for executors that drain someone else's queue instead of
    /// accepting work from the local scheduler.
    fn owns_queue(&self) -> bool {
        true
    }
}

/// Executor that runs every item on the submitting thread
pub struct InlineExecutor {
    registry: Arc<Registry>,
    filter: BacktraceFilter,
    reporter: Option<SharedReporter>,
}

impl InlineExecutor {
    pub fn new(registry: Arc<Registry>, filter: BacktraceFilter) -> Self {
        Self {
            registry,
            filter,
            reporter: None,
        }
    }
}

impl Executor for InlineExecutor {
    fn start(&mut self, reporter: SharedReporter) -> Result<(), ExecutorError> {
        self.reporter = Some(reporter);
        Ok(())
    }

    fn submit(&mut self, item: WorkItem) -> Result<(), ExecutorError> {
        let reporter = self.reporter.as_ref().ok_or(ExecutorError::NotStarted)?;
        run_and_record(&self.registry, &item, &self.filter, reporter.as_ref());
        Ok(())
    }

    fn shutdown(&mut self) -> Result<(), ExecutorError> {
        Ok(())
    }
}
