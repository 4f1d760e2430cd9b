//! Statistics gathering
//!
//! Counts runs and assertions and keeps every result that did not cleanly
//! pass. Does no output of its own; the summary reporter builds on it.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use super::Reporter;
use crate::models::{Failure, TestResult};
use crate::utils::Timer;

/// Aggregate state of a run
#[derive(Clone, Debug, Default)]
pub struct Statistics {
    pub count: usize,
    pub assertions: usize,
    /// Results that failed, errored or were skipped, in recording order
    pub results: Vec<TestResult>,
    pub total_time: Option<Duration>,
    pub failures: usize,
    pub errors: usize,
    pub skips: usize,
}

impl Statistics {
    /// True iff every retained result is a skip
    pub fn passed(&self) -> bool {
        self.results.iter().all(TestResult::skipped)
    }
}

#[derive(Default)]
struct State {
    stats: Statistics,
    timer: Option<Timer>,
}

/// Reporter that gathers run statistics
#[derive(Default)]
pub struct StatisticsReporter {
    state: Mutex<State>,
}

impl StatisticsReporter {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Copy of the current statistics
    pub fn snapshot(&self) -> Statistics {
        self.lock().stats.clone()
    }
}

impl Reporter for StatisticsReporter {
    fn start(&self) {
        self.lock().timer = Some(Timer::start("run"));
    }

    fn record(&self, result: &TestResult) {
        let mut state = self.lock();
        state.stats.count += 1;
        state.stats.assertions += result.assertions();
        if !result.passed() || result.skipped() {
            state.stats.results.push(result.clone());
        }
    }

    fn report(&self) {
        let mut state = self.lock();
        let total_time = state.timer.take().map(Timer::stop).unwrap_or_default();

        let stats = &mut state.stats;
        stats.total_time = Some(total_time);
        stats.failures = 0;
        stats.errors = 0;
        stats.skips = 0;
        for result in &stats.results {
            match result.failure() {
                Some(Failure::Assertion { .. }) => stats.failures += 1,
                Some(Failure::UnexpectedError { .. }) => stats.errors += 1,
                Some(Failure::Skip { .. }) => stats.skips += 1,
                None => {}
            }
        }
    }

    fn passed(&self) -> bool {
        self.lock().stats.passed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BacktraceFilter;
    use std::sync::Arc;
    use std::thread;

    fn skip(method: &str) -> TestResult {
        TestResult::failed("Foo", method, Failure::skip("later"))
    }

    #[test]
    fn test_aggregation_of_mixed_results() {
        let reporter = StatisticsReporter::new();
        reporter.start();
        reporter.record(&TestResult::pass("Foo", "test_a", 2));
        reporter.record(&TestResult::pass("Foo", "test_b", 1));
        reporter.record(&skip("test_c"));
        reporter.record(&TestResult::failed("Foo", "test_d", Failure::assertion("bad")));
        reporter.record(&TestResult::failed(
            "Foo",
            "test_e",
            Failure::from_error(anyhow::anyhow!("boom"), &BacktraceFilter::default()),
        ));
        reporter.report();

        let stats = reporter.snapshot();
        assert_eq!(stats.count, 5);
        assert_eq!(stats.assertions, 3);
        assert_eq!(stats.failures, 1);
        assert_eq!(stats.errors, 1);
        assert_eq!(stats.skips, 1);
        assert_eq!(stats.results.len(), 3);
        assert!(stats.total_time.is_some());
        assert!(!reporter.passed());
    }

    #[test]
    fn test_skips_alone_pass() {
        let reporter = StatisticsReporter::new();
        reporter.start();
        reporter.record(&TestResult::pass("Foo", "test_a", 1));
        reporter.record(&skip("test_b"));
        reporter.record(&skip("test_c"));
        reporter.report();

        assert!(reporter.passed());
        assert_eq!(reporter.snapshot().skips, 2);
    }

    #[test]
    fn test_report_without_start() {
        let reporter = StatisticsReporter::new();
        reporter.report();
        assert_eq!(reporter.snapshot().total_time, Some(Duration::ZERO));
        assert!(reporter.passed());
    }

    #[test]
    fn test_concurrent_records_are_not_lost() {
        let reporter = Arc::new(StatisticsReporter::new());
        reporter.start();

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let reporter = Arc::clone(&reporter);
                thread::spawn(move || {
                    for i in 0..250 {
                        reporter.record(&TestResult::pass("Foo", format!("test_{t}_{i}"), 1));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        reporter.report();

        let stats = reporter.snapshot();
        assert_eq!(stats.count, 2000);
        assert_eq!(stats.assertions, 2000);
    }
}
