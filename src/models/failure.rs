//! Failure taxonomy
//!
//! Classifies why a test did not cleanly pass, and filters backtraces so
//! that framework frames do not drown out the frames of the test itself.

use serde::{Deserialize, Serialize};
use std::any::Any;
use std::backtrace::{Backtrace, BacktraceStatus};
use std::fmt;
use std::panic::Location;
use thiserror::Error;

/// File and line a test method or assertion lives at
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceLocation {
    pub file: String,
    pub line: u32,
}

impl SourceLocation {
    pub fn new(file: impl Into<String>, line: u32) -> Self {
        Self {
            file: file.into(),
            line,
        }
    }

    /// Location of the caller of the enclosing `#[track_caller]` function
    #[track_caller]
    pub fn caller() -> Self {
        Location::caller().into()
    }
}

impl From<&Location<'_>> for SourceLocation {
    fn from(location: &Location<'_>) -> Self {
        Self::new(location.file(), location.line())
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

/// Why a test did not cleanly pass.
///
/// A `Failure` is raised from a test body as an [`anyhow::Error`] and
/// recovered by downcasting at the executor boundary. It carries only owned
/// data so that results holding it can cross a process boundary.
#[derive(Clone, Debug, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Failure {
    /// An assertion in the test body did not hold
    #[error("{message}")]
    Assertion {
        message: String,
        location: Option<SourceLocation>,
    },

    /// The test opted out of running
    #[error("{message}")]
    Skip {
        message: String,
        location: Option<SourceLocation>,
    },

    /// Any error not raised through the assertion helpers, including panics
    #[error("{error_type}: {message}")]
    UnexpectedError {
        error_type: String,
        message: String,
        backtrace: Vec<String>,
    },
}

impl Failure {
    #[track_caller]
    pub fn assertion(message: impl Into<String>) -> Self {
        Failure::Assertion {
            message: message.into(),
            location: Some(SourceLocation::caller()),
        }
    }

    #[track_caller]
    pub fn skip(message: impl Into<String>) -> Self {
        Failure::Skip {
            message: message.into(),
            location: Some(SourceLocation::caller()),
        }
    }

    /// Classify an error returned by a test body.
    ///
    /// Errors that are a `Failure` keep their variant; anything else is
    /// wrapped as `UnexpectedError` with a filtered backtrace.
    pub fn from_error(error: anyhow::Error, filter: &BacktraceFilter) -> Self {
        match error.downcast::<Failure>() {
            Ok(failure) => failure,
            Err(error) => {
                let frames = parse_backtrace(error.backtrace());
                Failure::UnexpectedError {
                    error_type: "Error".to_string(),
                    message: format!("{error:#}"),
                    backtrace: filter.filter(&frames),
                }
            }
        }
    }

    /// Wrap the payload of a caught panic
    pub fn from_panic(payload: Box<dyn Any + Send>, filter: &BacktraceFilter) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "Box<dyn Any>".to_string()
        };

        Failure::UnexpectedError {
            error_type: "panic".to_string(),
            message,
            backtrace: filter.filter(&[]),
        }
    }

    /// Single character summarising the failure: `F`, `S` or `E`
    pub fn result_code(&self) -> char {
        match self {
            Failure::Assertion { .. } => 'F',
            Failure::Skip { .. } => 'S',
            Failure::UnexpectedError { .. } => 'E',
        }
    }

    pub fn result_label(&self) -> &'static str {
        match self {
            Failure::Assertion { .. } => "Failure",
            Failure::Skip { .. } => "Skipped",
            Failure::UnexpectedError { .. } => "Error",
        }
    }

    pub fn location(&self) -> Option<&SourceLocation> {
        match self {
            Failure::Assertion { location, .. } | Failure::Skip { location, .. } => {
                location.as_ref()
            }
            Failure::UnexpectedError { .. } => None,
        }
    }

    /// Message as shown in the final report
    pub fn message(&self) -> String {
        match self {
            Failure::Assertion { message, .. } | Failure::Skip { message, .. } => message.clone(),
            Failure::UnexpectedError {
                error_type,
                message,
                backtrace,
            } => format!("{error_type}: {message}\n    {}", backtrace.join("\n    ")),
        }
    }

    pub fn is_skip(&self) -> bool {
        matches!(self, Failure::Skip { .. })
    }

    pub fn is_unexpected(&self) -> bool {
        matches!(self, Failure::UnexpectedError { .. })
    }
}

/// Symbol prefixes of frames that belong to the runner or the runtime
const INTERNAL_PREFIXES: &[&str] = &[
    "tally::",
    "anyhow::",
    "std::",
    "core::",
    "alloc::",
    "__rust",
    "rust_begin_unwind",
];

/// Removes runner and runtime frames from backtraces
#[derive(Clone, Debug)]
pub struct BacktraceFilter {
    prefixes: Vec<String>,
    debug: bool,
}

impl BacktraceFilter {
    pub fn new(debug: bool) -> Self {
        Self {
            prefixes: INTERNAL_PREFIXES.iter().map(|p| p.to_string()).collect(),
            debug,
        }
    }

    /// Treat frames starting with `prefix` as internal too
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefixes.push(prefix.into());
        self
    }

    fn is_internal(&self, frame: &str) -> bool {
        let symbol = frame.trim_start_matches('<');
        self.prefixes.iter().any(|p| symbol.starts_with(p.as_str()))
    }

    /// Filter `frames` down to the ones worth showing.
    ///
    /// Returns the whole trace untouched in debug mode.
    pub fn filter(&self, frames: &[String]) -> Vec<String> {
        if frames.is_empty() {
            return vec!["No backtrace".to_string()];
        }

        if self.debug {
            return frames.to_vec();
        }

        let mut kept: Vec<String> = frames
            .iter()
            .skip_while(|f| self.is_internal(f))
            .take_while(|f| !self.is_internal(f))
            .cloned()
            .collect();

        if kept.is_empty() {
            kept = frames
                .iter()
                .filter(|f| !self.is_internal(f))
                .cloned()
                .collect();
        }

        if kept.is_empty() {
            kept = frames.to_vec();
        }

        kept
    }
}

impl Default for BacktraceFilter {
    fn default() -> Self {
        Self::new(false)
    }
}

/// Turn a captured backtrace into one string per frame.
///
/// Frames read `symbol at file:line:col` when the location is known.
fn parse_backtrace(backtrace: &Backtrace) -> Vec<String> {
    if backtrace.status() != BacktraceStatus::Captured {
        return Vec::new();
    }
    parse_frames(&backtrace.to_string())
}

fn parse_frames(text: &str) -> Vec<String> {
    let mut frames: Vec<String> = Vec::new();

    for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if let Some(at) = line.strip_prefix("at ") {
            if let Some(last) = frames.last_mut() {
                last.push_str(" at ");
                last.push_str(at);
            }
            continue;
        }

        match line.split_once(": ") {
            Some((index, symbol)) if index.chars().all(|c| c.is_ascii_digit()) => {
                frames.push(symbol.to_string());
            }
            _ => frames.push(line.to_string()),
        }
    }

    frames
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frames(symbols: &[&str]) -> Vec<String> {
        symbols.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_result_codes() {
        assert_eq!(Failure::assertion("boom").result_code(), 'F');
        assert_eq!(Failure::skip("later").result_code(), 'S');
        let err = Failure::from_error(anyhow::anyhow!("io"), &BacktraceFilter::default());
        assert_eq!(err.result_code(), 'E');
        assert_eq!(err.result_label(), "Error");
    }

    #[test]
    fn test_assertion_records_caller_location() {
        let failure = Failure::assertion("nope");
        let location = failure.location().unwrap();
        assert!(location.file.ends_with("failure.rs"));
        assert!(location.line > 0);
    }

    #[test]
    fn test_from_error_keeps_failure_variant() {
        let err: anyhow::Error = Failure::skip("not on this platform").into();
        let failure = Failure::from_error(err, &BacktraceFilter::default());
        assert!(failure.is_skip());
        assert_eq!(failure.message(), "not on this platform");
    }

    #[test]
    fn test_from_error_wraps_foreign_error() {
        let err = anyhow::Error::from(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "fixture missing",
        ))
        .context("loading fixture");
        let failure = Failure::from_error(err, &BacktraceFilter::default());
        assert!(failure.is_unexpected());
        assert!(failure.message().contains("loading fixture: fixture missing"));
        assert!(failure.location().is_none());
    }

    #[test]
    fn test_from_panic_payloads() {
        let filter = BacktraceFilter::default();
        let failure = Failure::from_panic(Box::new("static str"), &filter);
        assert!(failure.message().starts_with("panic: static str"));
        let failure = Failure::from_panic(Box::new(String::from("owned")), &filter);
        assert!(failure.message().starts_with("panic: owned"));
        assert!(failure.message().contains("No backtrace"));
    }

    #[test]
    fn test_filter_keeps_user_frames() {
        let filter = BacktraceFilter::default();
        let trace = frames(&[
            "anyhow::error::<impl anyhow::Error>::msg",
            "my_tests::parser::test_rejects_empty",
            "my_tests::parser::helper",
            "tally::executor::runner::run_one_method",
            "my_tests::main",
        ]);
        assert_eq!(
            filter.filter(&trace),
            frames(&["my_tests::parser::test_rejects_empty", "my_tests::parser::helper"])
        );
    }

    #[test]
    fn test_filter_falls_back_to_whole_trace() {
        let filter = BacktraceFilter::default();
        let trace = frames(&["std::rt::lang_start", "core::ops::function::FnOnce::call_once"]);
        assert_eq!(filter.filter(&trace), trace);
        assert_eq!(filter.filter(&[]), frames(&["No backtrace"]));
    }

    #[test]
    fn test_filter_debug_mode_keeps_everything() {
        let filter = BacktraceFilter::new(true);
        let trace = frames(&["tally::scheduler::run", "my_tests::t"]);
        assert_eq!(filter.filter(&trace), trace);
    }

    #[test]
    fn test_filter_custom_prefix() {
        let filter = BacktraceFilter::default().with_prefix("my_tests::support::");
        let trace = frames(&["my_tests::support::assert_json", "my_tests::t"]);
        assert_eq!(filter.filter(&trace), frames(&["my_tests::t"]));
    }

    #[test]
    fn test_parse_frames() {
        let text = "   0: my_tests::t\n             at ./src/lib.rs:10:5\n   1: std::rt::lang_start\n";
        assert_eq!(
            parse_frames(text),
            frames(&["my_tests::t at ./src/lib.rs:10:5", "std::rt::lang_start"])
        );
    }

    #[test]
    fn test_failure_serde_is_tagged() {
        let json = serde_json::to_string(&Failure::Skip {
            message: "later".into(),
            location: None,
        })
        .unwrap();
        assert!(json.contains(r#""kind":"skip""#));
    }
}
