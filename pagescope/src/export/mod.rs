//! Trace export functionality
//!
//! Committed timeline events can be written in Chrome Trace Event Format for
//! viewing in Perfetto or chrome://tracing.

pub mod chrome_trace;

pub use chrome_trace::ChromeTraceExporter;
