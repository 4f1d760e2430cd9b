//! Plain-text formatting of run progress and summaries

use crate::models::TestResult;
use crate::reporter::Statistics;

const SKIP_HINT: &str = "You have skipped tests. Run with --verbose for details.";

/// Formats reporter output
#[derive(Clone, Copy, Debug, Default)]
pub struct ReportFormatter {
    verbose: bool,
    skip_hint: bool,
}

impl ReportFormatter {
    pub fn new(verbose: bool) -> Self {
        Self {
            verbose,
            skip_hint: true,
        }
    }

    /// Whether to append the re-run hint when tests were skipped
    pub fn with_skip_hint(mut self, enabled: bool) -> Self {
        self.skip_hint = enabled;
        self
    }

    pub fn format_header(&self, run_options: &str) -> String {
        format!("Run options: {run_options}\n\n# Running:\n\n")
    }

    /// `Suite#method = `, printed before a test in verbose mode
    pub fn format_prerecord(&self, suite: &str, method: &str) -> String {
        format!("{suite}#{method} = ")
    }

    /// The progress marker for one finished test
    pub fn format_progress(&self, result: &TestResult) -> String {
        let code = result.result_code().symbol();
        if self.verbose {
            format!("{:.2} s = {}\n", result.time().as_secs_f64(), code)
        } else {
            code.to_string()
        }
    }

    pub fn format_statistics(&self, stats: &Statistics) -> String {
        let secs = stats.total_time.unwrap_or_default().as_secs_f64();
        let (runs_per_sec, assertions_per_sec) = if secs > 0.0 {
            (stats.count as f64 / secs, stats.assertions as f64 / secs)
        } else {
            (0.0, 0.0)
        };
        format!(
            "Finished in {secs:.6}s, {runs_per_sec:.4} runs/s, {assertions_per_sec:.4} assertions/s."
        )
    }

    /// Numbered details of every failure; skips only in verbose mode
    pub fn format_aggregated(&self, results: &[TestResult]) -> String {
        let mut output = String::new();

        for (i, result) in results
            .iter()
            .filter(|r| self.verbose || !r.skipped())
            .enumerate()
        {
            let rendered = result.to_string();
            output.push_str(&format!("\n{:3}) {}", i + 1, rendered));
            if !rendered.ends_with('\n') {
                output.push('\n');
            }
        }

        output.push('\n');
        output
    }

    pub fn format_summary(&self, stats: &Statistics) -> String {
        let mut line = format!(
            "{} runs, {} assertions, {} failures, {} errors, {} skips",
            stats.count, stats.assertions, stats.failures, stats.errors, stats.skips
        );

        if self.skip_hint && !self.verbose && stats.results.iter().any(TestResult::skipped) {
            line.push_str("\n\n");
            line.push_str(SKIP_HINT);
        }

        line
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Failure;
    use std::time::Duration;

    fn stats(results: Vec<TestResult>) -> Statistics {
        Statistics {
            count: 4,
            assertions: 6,
            skips: results.iter().filter(|r| r.skipped()).count(),
            failures: results.len() - results.iter().filter(|r| r.skipped()).count(),
            errors: 0,
            total_time: Some(Duration::from_secs(2)),
            results,
        }
    }

    #[test]
    fn test_statistics_line() {
        let line = ReportFormatter::new(false).format_statistics(&stats(Vec::new()));
        assert_eq!(
            line,
            "Finished in 2.000000s, 2.0000 runs/s, 3.0000 assertions/s."
        );
    }

    #[test]
    fn test_statistics_line_without_elapsed_time() {
        let empty = Statistics::default();
        let line = ReportFormatter::new(false).format_statistics(&empty);
        assert!(line.starts_with("Finished in 0.000000s, 0.0000 runs/s"));
    }

    #[test]
    fn test_aggregated_numbers_failures_and_hides_skips() {
        let results = vec![
            TestResult::failed("Foo", "test_a", Failure::assertion("bad")),
            TestResult::failed("Foo", "test_b", Failure::skip("later")),
            TestResult::failed("Foo", "test_c", Failure::assertion("worse")),
        ];

        let quiet = ReportFormatter::new(false).format_aggregated(&results);
        assert!(quiet.starts_with("\n  1) Failure:\nFoo#test_a ["));
        assert!(quiet.contains("\n  2) Failure:\nFoo#test_c ["));
        assert!(!quiet.contains("Skipped"));

        let verbose = ReportFormatter::new(true).format_aggregated(&results);
        assert!(verbose.contains("\n  2) Skipped:\nFoo#test_b ["));
        assert!(verbose.contains("\n  3) Failure:"));
    }

    #[test]
    fn test_summary_skip_hint() {
        let results = vec![TestResult::failed("Foo", "test_b", Failure::skip("later"))];

        let line = ReportFormatter::new(false).format_summary(&stats(results.clone()));
        assert!(line.starts_with("4 runs, 6 assertions, 0 failures, 0 errors, 1 skips"));
        assert!(line.ends_with(SKIP_HINT));

        let verbose = ReportFormatter::new(true).format_summary(&stats(results.clone()));
        assert!(!verbose.contains(SKIP_HINT));

        let suppressed = ReportFormatter::new(false)
            .with_skip_hint(false)
            .format_summary(&stats(results));
        assert!(!suppressed.contains(SKIP_HINT));
    }

    #[test]
    fn test_progress_markers() {
        let fail = TestResult::failed("Foo", "test_a", Failure::assertion("bad"));
        assert_eq!(ReportFormatter::new(false).format_progress(&fail), "F");
        assert_eq!(ReportFormatter::new(true).format_progress(&fail), "0.00 s = F\n");
        assert_eq!(
            ReportFormatter::new(true).format_prerecord("Foo", "test_a"),
            "Foo#test_a = "
        );
    }
}
