//! Composite reporter
//!
//! Dispatches to an ordered list of reporters as one. Recording is done
//! under a single lock so that concurrent callers cannot interleave their
//! fan-out across the sub-reporters.

use std::sync::{Arc, Mutex, PoisonError};

use super::{ProgressReporter, Reporter, ReporterOptions, SharedReporter, SummaryReporter};
use crate::models::TestResult;
use crate::output::OutputSink;

/// Fans every call out to its sub-reporters
#[derive(Default)]
pub struct CompositeReporter {
    reporters: Vec<SharedReporter>,
    lock: Mutex<()>,
}

impl CompositeReporter {
    pub fn new(reporters: Vec<SharedReporter>) -> Self {
        Self {
            reporters,
            lock: Mutex::new(()),
        }
    }

    /// Summary followed by progress, both writing to `io`.
    ///
    /// The summary reporter is also returned so its statistics stay
    /// reachable after the run.
    pub fn standard(io: OutputSink, options: ReporterOptions) -> (Self, Arc<SummaryReporter>) {
        let progress = Arc::new(ProgressReporter::new(io.clone(), &options));
        let summary = Arc::new(SummaryReporter::new(io, options));
        let composite = Self::new(vec![summary.clone(), progress]);
        (composite, summary)
    }

    /// Add another reporter to the mix
    pub fn push(&mut self, reporter: SharedReporter) {
        self.reporters.push(reporter);
    }

    pub fn len(&self) -> usize {
        self.reporters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reporters.is_empty()
    }
}

impl Reporter for CompositeReporter {
    fn start(&self) {
        self.reporters.iter().for_each(|r| r.start());
    }

    fn prerecord(&self, suite: &str, method: &str) {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.reporters
            .iter()
            .for_each(|r| r.prerecord(suite, method));
    }

    fn record(&self, result: &TestResult) {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.reporters.iter().for_each(|r| r.record(result));
    }

    fn report(&self) {
        self.reporters.iter().for_each(|r| r.report());
    }

    fn passed(&self) -> bool {
        self.reporters.iter().all(|r| r.passed())
    }

    fn status(&self) -> Option<String> {
        self.reporters.iter().find_map(|r| r.status())
    }
}
