//! Summary reporter
//!
//! Prints the run header when the run starts, and failure details plus the
//! final counts when it ends.

use std::sync::{Mutex, PoisonError};

use super::{Reporter, ReporterOptions, Statistics, StatisticsReporter};
use crate::models::TestResult;
use crate::output::{OutputSink, ReportFormatter};

/// Statistics reporter that prints a header and a summary
pub struct SummaryReporter {
    stats: StatisticsReporter,
    io: OutputSink,
    options: ReporterOptions,
    formatter: ReportFormatter,
    old_sync: Mutex<Option<bool>>,
}

impl SummaryReporter {
    pub fn new(io: OutputSink, options: ReporterOptions) -> Self {
        let formatter =
            ReportFormatter::new(options.verbose).with_skip_hint(!options.no_skip_message);
        Self {
            stats: StatisticsReporter::new(),
            io,
            options,
            formatter,
            old_sync: Mutex::new(None),
        }
    }

    pub fn snapshot(&self) -> Statistics {
        self.stats.snapshot()
    }

    /// Numbered failure details gathered so far
    pub fn aggregated_results(&self) -> String {
        self.formatter.format_aggregated(&self.stats.snapshot().results)
    }
}

impl Reporter for SummaryReporter {
    fn start(&self) {
        self.stats.start();
        self.io
            .write_str(&self.formatter.format_header(&self.options.run_options));

        let previous = self.io.set_sync(true);
        *self.old_sync.lock().unwrap_or_else(PoisonError::into_inner) = Some(previous);
    }

    fn prerecord(&self, suite: &str, method: &str) {
        self.stats.prerecord(suite, method);
    }

    fn record(&self, result: &TestResult) {
        self.stats.record(result);
    }

    fn report(&self) {
        self.stats.report();

        if let Some(previous) = self
            .old_sync
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            self.io.set_sync(previous);
        }

        let stats = self.stats.snapshot();
        let mut text = String::new();
        if !self.options.verbose {
            text.push('\n');
        }
        text.push('\n');
        text.push_str(&self.formatter.format_statistics(&stats));
        text.push('\n');
        text.push_str(&self.formatter.format_aggregated(&stats.results));
        text.push_str(&self.formatter.format_summary(&stats));
        text.push('\n');

        self.io.write_str(&text);
        self.io.flush();
    }

    fn passed(&self) -> bool {
        self.stats.passed()
    }

    fn status(&self) -> Option<String> {
        Some(self.aggregated_results())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Failure;

    fn options(verbose: bool) -> ReporterOptions {
        ReporterOptions {
            verbose,
            no_skip_message: false,
            run_options: "--seed 42".to_string(),
        }
    }

    #[test]
    fn test_start_prints_header_and_enables_sync() {
        let (io, buffer) = OutputSink::memory();
        let reporter = SummaryReporter::new(io.clone(), options(false));

        reporter.start();
        assert_eq!(buffer.contents(), "Run options: --seed 42\n\n# Running:\n\n");
        assert!(io.is_sync());

        reporter.report();
        assert!(!io.is_sync());
    }

    #[test]
    fn test_report_lists_failures_and_counts() {
        let (io, buffer) = OutputSink::memory();
        let reporter = SummaryReporter::new(io, options(false));

        reporter.start();
        reporter.record(&TestResult::pass("Foo", "test_a", 3));
        reporter.record(&TestResult::failed("Foo", "test_b", Failure::assertion("off by one")));
        reporter.record(&TestResult::failed("Foo", "test_c", Failure::skip("later")));
        reporter.report();

        let out = buffer.contents();
        assert!(out.contains("Finished in "));
        assert!(out.contains("\n  1) Failure:\nFoo#test_b ["));
        assert!(out.contains("off by one"));
        assert!(!out.contains("Skipped:"));
        assert!(out.contains("3 runs, 3 assertions, 1 failures, 0 errors, 1 skips"));
        assert!(out.contains("You have skipped tests. Run with --verbose for details."));
        assert!(!reporter.passed());
    }

    #[test]
    fn test_status_shows_current_failures() {
        let (io, _buffer) = OutputSink::memory();
        let reporter = SummaryReporter::new(io, options(true));
        reporter.start();
        reporter.record(&TestResult::failed("Foo", "test_b", Failure::assertion("nope")));

        let status = reporter.status().unwrap();
        assert!(status.contains("  1) Failure:\nFoo#test_b"));
    }
}
