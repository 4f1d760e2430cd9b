//! Output formatting module
//!
//! Where report text goes, and what it looks like.

mod formatter;
mod sink;

pub use formatter::ReportFormatter;
pub use sink::{MemoryBuffer, OutputSink};
