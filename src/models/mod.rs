//! Data models for test execution
//!
//! Result records and the failure taxonomy shared by every executor and reporter.

mod failure;
mod test_result;

pub use failure::{BacktraceFilter, Failure, SourceLocation};
pub use test_result::{ResultCode, TestResult};
