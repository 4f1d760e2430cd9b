//! Per-test assertion context
//!
//! A fresh `TestContext` is handed to every test method. It counts
//! assertions and collects the failures raised by setup, body and teardown.

use std::fmt::Debug;
use std::panic::{self, AssertUnwindSafe};

use crate::models::{BacktraceFilter, Failure};

/// What a test body, setup or teardown returns
pub type TestOutcome = anyhow::Result<()>;

/// Assertion counter and failure collector for one test method
#[derive(Debug)]
pub struct TestContext {
    assertions: usize,
    failures: Vec<Failure>,
    filter: BacktraceFilter,
}

impl TestContext {
    pub fn new(filter: BacktraceFilter) -> Self {
        Self {
            assertions: 0,
            failures: Vec::new(),
            filter,
        }
    }

    pub fn assertions(&self) -> usize {
        self.assertions
    }

    pub fn failures(&self) -> &[Failure] {
        &self.failures
    }

    /// Count an assertion that holds by construction
    pub fn pass(&mut self) {
        self.assertions += 1;
    }

    #[track_caller]
    pub fn assert(&mut self, condition: bool, message: impl Into<String>) -> Result<(), Failure> {
        self.assertions += 1;
        if condition {
            Ok(())
        } else {
            Err(Failure::assertion(message))
        }
    }

    #[track_caller]
    pub fn refute(&mut self, condition: bool, message: impl Into<String>) -> Result<(), Failure> {
        self.assert(!condition, message)
    }

    #[track_caller]
    pub fn assert_eq<T: PartialEq + Debug>(&mut self, expected: T, actual: T) -> Result<(), Failure> {
        let message = format!("Expected: {expected:?}\n  Actual: {actual:?}");
        self.assert(expected == actual, message)
    }

    /// Fail unconditionally
    #[track_caller]
    pub fn flunk(&mut self, message: impl Into<String>) -> Result<(), Failure> {
        self.assert(false, message)
    }

    /// Stop the test and mark it skipped
    #[track_caller]
    pub fn skip(&mut self, message: impl Into<String>) -> Result<(), Failure> {
        Err(Failure::skip(message))
    }

    /// Run one phase of a test, converting errors and panics into failures
    pub(crate) fn capture(&mut self, phase: impl FnOnce(&mut TestContext) -> TestOutcome) {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| phase(self)));
        let failure = match outcome {
            Ok(Ok(())) => return,
            Ok(Err(error)) => Failure::from_error(error, &self.filter),
            Err(payload) => Failure::from_panic(payload, &self.filter),
        };
        self.failures.push(failure);
    }

    pub(crate) fn into_parts(self) -> (usize, Vec<Failure>) {
        (self.assertions, self.failures)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> TestContext {
        TestContext::new(BacktraceFilter::default())
    }

    #[test]
    fn test_assertions_are_counted() {
        let mut ctx = context();
        ctx.capture(|ctx| {
            ctx.assert(true, "one")?;
            ctx.assert_eq(2, 1 + 1)?;
            ctx.pass();
            Ok(())
        });
        assert_eq!(ctx.assertions(), 3);
        assert!(ctx.failures().is_empty());
    }

    #[test]
    fn test_failed_assertion_stops_phase() {
        let mut ctx = context();
        ctx.capture(|ctx| {
            ctx.assert_eq("a", "b")?;
            ctx.assert(true, "never reached")?;
            Ok(())
        });
        assert_eq!(ctx.assertions(), 1);
        assert_eq!(ctx.failures().len(), 1);
        assert!(ctx.failures()[0].message().contains("Expected: \"a\""));
    }

    #[test]
    fn test_skip_and_panic_are_captured() {
        let mut ctx = context();
        ctx.capture(|ctx| Ok(ctx.skip("needs network")?));
        ctx.capture(|_| panic!("teardown exploded"));
        let (assertions, failures) = ctx.into_parts();
        assert_eq!(assertions, 0);
        assert!(failures[0].is_skip());
        assert!(failures[1].is_unexpected());
        assert!(failures[1].message().contains("teardown exploded"));
    }
}
