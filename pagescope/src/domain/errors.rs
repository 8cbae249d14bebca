//! Structured error types for pagescope
//!
//! Using thiserror for automatic Display implementation and error chaining.
//!
//! [`TimelineError`] covers contract violations: they point at a wiring bug
//! and always propagate to the caller. [`TapError`] is the recoverable case
//! where a host primitive refuses instrumentation.

use super::types::EventType;
use log::error;
use std::fmt::Display;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TimelineError {
    #[error("Duplicate in-flight span for key {key} and type {event_type:?}")]
    DuplicateSpan { key: String, event_type: EventType },

    #[error("{count} in-flight spans match key {key} and type {event_type:?}; at most one may")]
    AmbiguousSpan { key: String, event_type: EventType, count: usize },

    #[error("No in-flight span for key {key} and type {event_type:?}")]
    NoSuchSpan { key: String, event_type: EventType },

    #[error("Span for key {key} already completed at {end_time_usec}us")]
    AlreadyComplete { key: String, end_time_usec: u64 },

    #[error("Span for key {key} completed at {end_time_usec}us before it started at {start_time_usec}us")]
    EndBeforeStart { key: String, start_time_usec: u64, end_time_usec: u64 },

    #[error("Span for key {key} starts at {start_time_usec}us, after its end {end_time_usec}us")]
    StartAfterEnd { key: String, start_time_usec: u64, end_time_usec: u64 },

    #[error("{0} already disposed")]
    Disposed(&'static str),

    #[error("Not currently adding events")]
    NotAddingEvents,

    #[error("done_adding_events called without a matching start_adding_events")]
    BracketUnderflow,

    #[error("Timeline manager has no active session")]
    NotStarted,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TapError {
    #[error("Response pipeline already wired; tap attached too late")]
    AlreadyWired,

    #[error("Request does not support pipeline taps")]
    Unsupported,
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadFailed(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Failed to write trace file: {0}")]
    WriteFailed(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum ReplayError {
    #[error("Failed to parse recording: {0}")]
    ParseFailed(String),

    #[error("Recording entry at {at_usec}us comes after an entry at {previous_usec}us")]
    EntryOutOfOrder { at_usec: u64, previous_usec: u64 },

    #[error("No response pipeline recorded for {0}")]
    UnknownPipeline(String),

    #[error(transparent)]
    Timeline(#[from] TimelineError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Error boundary for host-facing entry points
///
/// Logs and swallows the error so one faulty notification cannot take the
/// host down. Engine code propagates instead, except where it applies a
/// deferred host callback: each such callback is its own boundary. The
/// replay driver calls it around every host notification.
pub fn contain<T, E: Display>(context: &str, result: Result<T, E>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            error!("{context}: {e}");
            None
        }
    }
}
