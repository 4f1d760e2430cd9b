//! Single test method execution
//!
//! The one place where a test method is actually invoked. Every outcome,
//! including panics and unknown work items, comes back as a `TestResult`.

use std::time::Duration;
use tracing::{debug, error};

use super::WorkItem;
use crate::models::{BacktraceFilter, Failure, TestResult};
use crate::registry::{Registry, SuiteEntry, TestContext};
use crate::reporter::Reporter;
use crate::utils::Timer;

/// Run `method` of `suite` on a fresh instance and build its result
pub fn run_one_method(suite: &SuiteEntry, method: &str, filter: &BacktraceFilter) -> TestResult {
    let timer = Timer::start(format!("{}#{}", suite.name(), method));
    let mut ctx = TestContext::new(filter.clone());

    let found = suite.invoke(method, &mut ctx);
    let time = timer.stop();

    if !found {
        error!("Suite {} has no method {}", suite.name(), method);
        return unresolved(suite.name(), method, "unknown test method");
    }

    let (assertions, failures) = ctx.into_parts();
    debug!(
        "{}#{} finished with {} failure(s) in {:.6}s",
        suite.name(),
        method,
        failures.len(),
        time.as_secs_f64()
    );

    TestResult::new(
        suite.name(),
        method,
        assertions,
        time,
        failures,
        suite.location_of(method).cloned(),
    )
}

/// Resolve a work item against the registry and run it
pub fn run_work_item(registry: &Registry, item: &WorkItem, filter: &BacktraceFilter) -> TestResult {
    match registry.suite(&item.suite) {
        Some(suite) => run_one_method(suite, &item.method, filter),
        None => {
            error!("Work item {} names an unknown suite", item);
            unresolved(&item.suite, &item.method, "unknown suite")
        }
    }
}

/// Run a work item with the reporter's prerecord/record around it
pub fn run_and_record(
    registry: &Registry,
    item: &WorkItem,
    filter: &BacktraceFilter,
    reporter: &dyn Reporter,
) -> TestResult {
    reporter.prerecord(&item.suite, &item.method);
    let result = run_work_item(registry, item, filter);
    reporter.record(&result);
    result
}

fn unresolved(suite: &str, method: &str, reason: &str) -> TestResult {
    let failure = Failure::UnexpectedError {
        error_type: "UnknownWorkItem".to_string(),
        message: format!("{reason}: {suite}#{method}"),
        backtrace: vec!["No backtrace".to_string()],
    };
    TestResult::new(suite, method, 0, Duration::ZERO, vec![failure], None)
}
