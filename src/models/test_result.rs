//! Test result model
//!
//! A `TestResult` is the immutable record of one executed test method.
//! It owns all of its data so it can be sent to another process unchanged.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use super::failure::{Failure, SourceLocation};

/// Outcome category of a single test
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultCode {
    Pass,
    Failure,
    Error,
    Skip,
}

impl ResultCode {
    pub fn symbol(&self) -> char {
        match self {
            ResultCode::Pass => '.',
            ResultCode::Failure => 'F',
            ResultCode::Error => 'E',
            ResultCode::Skip => 'S',
        }
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

/// Result of a single test method execution
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TestResult {
    suite: String,
    method: String,
    assertions: usize,
    time: Duration,
    failures: Vec<Failure>,
    source_location: Option<SourceLocation>,
}

impl TestResult {
    pub fn new(
        suite: impl Into<String>,
        method: impl Into<String>,
        assertions: usize,
        time: Duration,
        failures: Vec<Failure>,
        source_location: Option<SourceLocation>,
    ) -> Self {
        Self {
            suite: suite.into(),
            method: method.into(),
            assertions,
            time,
            failures,
            source_location,
        }
    }

    /// A passing result with no recorded time, mostly useful in tests
    pub fn pass(suite: impl Into<String>, method: impl Into<String>, assertions: usize) -> Self {
        Self::new(suite, method, assertions, Duration::ZERO, Vec::new(), None)
    }

    /// A result carrying a single failure
    pub fn failed(suite: impl Into<String>, method: impl Into<String>, failure: Failure) -> Self {
        Self::new(suite, method, 0, Duration::ZERO, vec![failure], None)
    }

    pub fn suite(&self) -> &str {
        &self.suite
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn assertions(&self) -> usize {
        self.assertions
    }

    pub fn time(&self) -> Duration {
        self.time
    }

    pub fn failures(&self) -> &[Failure] {
        &self.failures
    }

    pub fn source_location(&self) -> Option<&SourceLocation> {
        self.source_location.as_ref()
    }

    /// The first recorded failure, which decides the classification
    pub fn failure(&self) -> Option<&Failure> {
        self.failures.first()
    }

    /// Did this run pass? Skipped runs do not pass.
    pub fn passed(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn skipped(&self) -> bool {
        self.failure().is_some_and(Failure::is_skip)
    }

    /// Did any failure come from an unexpected error?
    pub fn error(&self) -> bool {
        self.failures.iter().any(Failure::is_unexpected)
    }

    pub fn result_code(&self) -> ResultCode {
        match self.failure() {
            None => ResultCode::Pass,
            Some(Failure::Assertion { .. }) => ResultCode::Failure,
            Some(Failure::Skip { .. }) => ResultCode::Skip,
            Some(Failure::UnexpectedError { .. }) => ResultCode::Error,
        }
    }

    /// `Suite#method`
    pub fn identifier(&self) -> String {
        format!("{}#{}", self.suite, self.method)
    }

    /// `Suite#method [file:line]`, the location omitted for passes and errors
    pub fn location(&self) -> String {
        match self.failure().and_then(Failure::location) {
            Some(loc) if !self.error() => format!("{} [{}]", self.identifier(), loc),
            _ => self.identifier(),
        }
    }
}

impl fmt::Display for TestResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.passed() {
            return write!(f, "{}", self.location());
        }

        let location = self.location();
        let rendered: Vec<String> = self
            .failures
            .iter()
            .map(|failure| {
                format!(
                    "{}:\n{}:\n{}\n",
                    failure.result_label(),
                    location,
                    failure.message()
                )
            })
            .collect();
        write!(f, "{}", rendered.join("\n"))
    }
}
