//! Pull-based script profiling
//!
//! - `identifiers`: collapses browser-internal script identifiers
//! - `js_event_fetcher`: polls the host activity profiler each tick

pub mod identifiers;
pub mod js_event_fetcher;

pub use identifiers::canonical_identifier;
pub use js_event_fetcher::{
    ActivityProfiler, JsEventFetcher, ProfilerEvent, ProfilerQuery, ProfilerReply, ProfilerState,
};
