//! Reporter pipeline
//!
//! Reporters observe a run: a start signal, one `prerecord`/`record` pair
//! per test (possibly from many threads at once), and a final `report`.
//! Every reporter guards its own state, so all methods take `&self` and
//! reporters are shared as `Arc<dyn Reporter>`.

mod composite;
mod progress;
mod statistics;
mod summary;

pub use composite::CompositeReporter;
pub use progress::ProgressReporter;
pub use statistics::{Statistics, StatisticsReporter};
pub use summary::SummaryReporter;

use std::sync::Arc;

use crate::models::TestResult;

/// Observer of a test run
pub trait Reporter: Send + Sync {
    /// The run is starting
    fn start(&self) {}

    /// A test is about to run
    fn prerecord(&self, _suite: &str, _method: &str) {}

    /// A test has finished
    fn record(&self, _result: &TestResult) {}

    /// The run is over; print whatever summary this reporter produces
    fn report(&self) {}

    /// Did the run pass so far? Skips never fail a run.
    fn passed(&self) -> bool {
        true
    }

    /// Text describing the current state of the run, for status dumps
    fn status(&self) -> Option<String> {
        None
    }
}

pub type SharedReporter = Arc<dyn Reporter>;

/// Options shared by the text reporters
#[derive(Clone, Debug, Default)]
pub struct ReporterOptions {
    pub verbose: bool,
    pub no_skip_message: bool,
    /// Effective run options, echoed at the top of the report
    pub run_options: String,
}

#[cfg(test)]
pub(crate) mod fixtures {
    //! Reporters used by tests across the crate

    use super::*;
    use std::sync::{Mutex, PoisonError};

    /// Keeps every prerecord and result it sees
    #[derive(Default)]
    pub struct Collector {
        prerecords: Mutex<Vec<String>>,
        results: Mutex<Vec<TestResult>>,
    }

    impl Collector {
        pub fn prerecords(&self) -> Vec<String> {
            self.prerecords
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
        }

        pub fn results(&self) -> Vec<TestResult> {
            self.results
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
        }

        pub fn identifiers(&self) -> Vec<String> {
            self.results().iter().map(TestResult::identifier).collect()
        }
    }

    impl Reporter for Collector {
        fn prerecord(&self, suite: &str, method: &str) {
            self.prerecords
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(format!("{suite}#{method}"));
        }

        fn record(&self, result: &TestResult) {
            self.results
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(result.clone());
        }

        fn passed(&self) -> bool {
            self.results().iter().all(|r| r.passed() || r.skipped())
        }
    }
}
