//! Progress reporter: one character per finished test

use super::{Reporter, ReporterOptions};
use crate::models::TestResult;
use crate::output::{OutputSink, ReportFormatter};

/// Prints `.`, `F`, `E` or `S` per test, with names and times when verbose
pub struct ProgressReporter {
    io: OutputSink,
    verbose: bool,
    formatter: ReportFormatter,
}

impl ProgressReporter {
    pub fn new(io: OutputSink, options: &ReporterOptions) -> Self {
        Self {
            io,
            verbose: options.verbose,
            formatter: ReportFormatter::new(options.verbose),
        }
    }
}

impl Reporter for ProgressReporter {
    fn prerecord(&self, suite: &str, method: &str) {
        if self.verbose {
            self.io
                .write_str(&self.formatter.format_prerecord(suite, method));
            self.io.flush();
        }
    }

    fn record(&self, result: &TestResult) {
        self.io.write_str(&self.formatter.format_progress(result));
    }
}
