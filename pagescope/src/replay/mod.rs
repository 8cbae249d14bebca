//! Session replay
//!
//! Drives the engine from a recorded session instead of a live host:
//! - `recording`: the JSON recording format
//! - `host`: profiler and request pipeline backed by the recording
//! - `driver`: applies entries against a manual clock and ticks

pub mod driver;
pub mod host;
pub mod recording;

pub use driver::{profiler_event_counts, ReplayDriver, StepOutcome, DEFAULT_DRAIN_LIMIT};
pub use host::{PipelineTaps, ReplayProfiler, ReplayRequest};
pub use recording::{EntryKind, RecordedEntry, RecordedProfiler, Recording, TapBehavior};
