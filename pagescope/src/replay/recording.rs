//! Recorded session format
//!
//! ```json
//! {
//!   "start_time_usec": 1700000000000000,
//!   "duration_usec": 400000,
//!   "profiler": { "state": "profiling", "events": [ ... ] },
//!   "entries": [
//!     { "at_usec": 0, "kind": "network", "url": "http://a/", "activity": { "socket": "resolving" } },
//!     { "at_usec": 900, "kind": "request_will_send", "url": "http://a/app.js" },
//!     { "at_usec": 4000, "kind": "data_delivered", "url": "http://a/app.js" },
//!     { "at_usec": 9000, "kind": "pipeline_closed", "url": "http://a/app.js" },
//!     { "at_usec": 300000, "kind": "stop" }
//!   ]
//! }
//! ```
//!
//! Entry times are relative to the session anchor and must be
//! non-decreasing. Without a `stop` entry the session stops at
//! `duration_usec`, or at the last entry.

use pagescope_common::NetworkActivity;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::domain::ReplayError;
use crate::profiling::{ProfilerEvent, ProfilerState};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recording {
    /// Session anchor, absolute host microseconds
    pub start_time_usec: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_usec: Option<u64>,
    /// Absent when the host had no script profiler
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profiler: Option<RecordedProfiler>,
    #[serde(default)]
    pub entries: Vec<RecordedEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedProfiler {
    #[serde(default = "default_profiler_state")]
    pub state: ProfilerState,
    #[serde(default)]
    pub events: Vec<ProfilerEvent>,
}

fn default_profiler_state() -> ProfilerState {
    ProfilerState::Profiling
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedEntry {
    pub at_usec: u64,
    #[serde(flatten)]
    pub kind: EntryKind,
}

/// One host notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EntryKind {
    Network {
        url: String,
        activity: NetworkActivity,
    },
    /// Undecoded host codes
    RawNetwork {
        url: String,
        activity_type: u32,
        subtype: u32,
    },
    RequestWillSend {
        url: String,
        #[serde(default)]
        from_cache: bool,
        #[serde(default)]
        aborted: bool,
        #[serde(default)]
        tap: TapBehavior,
    },
    DataDelivered {
        url: String,
    },
    PipelineClosed {
        url: String,
    },
    Stop,
}

/// How the recorded request pipeline reacts to a tap
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TapBehavior {
    #[default]
    Attachable,
    AlreadyWired,
    Unsupported,
}

impl Recording {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ReplayError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let recording: Recording = serde_json::from_str(&content)
            .map_err(|e| ReplayError::ParseFailed(format!("{}: {e}", path.display())))?;
        recording.validate()?;
        Ok(recording)
    }

    /// Check entry ordering
    pub fn validate(&self) -> Result<(), ReplayError> {
        let mut previous_usec = 0;
        for entry in &self.entries {
            if entry.at_usec < previous_usec {
                return Err(ReplayError::EntryOutOfOrder { at_usec: entry.at_usec, previous_usec });
            }
            previous_usec = entry.at_usec;
        }
        Ok(())
    }

    /// Session time at which collection stops
    #[must_use]
    pub fn stop_at_usec(&self) -> u64 {
        let explicit = self.entries.iter().find(|e| e.kind == EntryKind::Stop).map(|e| e.at_usec);
        let last = self.entries.last().map_or(0, |e| e.at_usec);
        explicit.or(self.duration_usec).unwrap_or(last)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pagescope_common::{ProfilerEventKind, SocketStatus};

    #[test]
    fn test_parse_entries() {
        let json = r#"{
            "start_time_usec": 1000,
            "entries": [
                { "at_usec": 0, "kind": "network", "url": "http://a/", "activity": { "socket": "resolving" } },
                { "at_usec": 5, "kind": "request_will_send", "url": "http://a/x", "tap": "already_wired" },
                { "at_usec": 9, "kind": "stop" }
            ]
        }"#;
        let recording: Recording = serde_json::from_str(json).unwrap();
        assert_eq!(
            recording.entries[0].kind,
            EntryKind::Network {
                url: "http://a/".to_string(),
                activity: NetworkActivity::Socket(SocketStatus::Resolving),
            }
        );
        assert!(matches!(
            recording.entries[1].kind,
            EntryKind::RequestWillSend { from_cache: false, tap: TapBehavior::AlreadyWired, .. }
        ));
        assert!(recording.profiler.is_none());
        assert_eq!(recording.stop_at_usec(), 9);
    }

    #[test]
    fn test_profiler_kinds_parse_by_name() {
        let json = r#"{
            "start_time_usec": 0,
            "profiler": { "events": [
                { "kind": "compile", "start_time_usec": 0, "duration_usec": 10,
                  "identifier": "http://a/app.js", "intensity": 4.0 },
                { "kind": "execute", "start_time_usec": 10, "duration_usec": 10,
                  "identifier": "http://a/app.js", "intensity": 0.5 }
            ] }
        }"#;
        let recording: Recording = serde_json::from_str(json).unwrap();
        let profiler = recording.profiler.unwrap();
        assert_eq!(profiler.state, ProfilerState::Profiling);
        let kinds: Vec<ProfilerEventKind> = profiler.events.iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![ProfilerEventKind::Compile, ProfilerEventKind::Execute]);

        let numeric = json.replace("\"compile\"", "7");
        assert!(serde_json::from_str::<Recording>(&numeric).is_err());
    }

    #[test]
    fn test_stop_time_fallbacks() {
        let mut recording = Recording {
            start_time_usec: 0,
            duration_usec: None,
            profiler: None,
            entries: vec![RecordedEntry {
                at_usec: 70,
                kind: EntryKind::DataDelivered { url: "u".to_string() },
            }],
        };
        assert_eq!(recording.stop_at_usec(), 70);
        recording.duration_usec = Some(500);
        assert_eq!(recording.stop_at_usec(), 500);
    }

    #[test]
    fn test_out_of_order_entries_rejected() {
        let recording = Recording {
            start_time_usec: 0,
            duration_usec: None,
            profiler: None,
            entries: vec![
                RecordedEntry { at_usec: 10, kind: EntryKind::Stop },
                RecordedEntry { at_usec: 5, kind: EntryKind::Stop },
            ],
        };
        assert!(matches!(
            recording.validate(),
            Err(ReplayError::EntryOutOfOrder { at_usec: 5, previous_usec: 10 })
        ));
    }
}
