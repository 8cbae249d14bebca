use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::{BTreeSet, HashMap};
use std::io::Write;

use crate::domain::{EventType, ExportError, TimelineEvent};
use crate::model::TimelineListener;

/// All timeline lanes live in one process
const TRACE_PID: u32 = 1;

/// Chrome Trace Event format
/// Spec: https://docs.google.com/document/d/1CvAClvFfyA5R-PhYUmn5OOQtYMH4h6I0nSsKchNAySU/preview
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChromeTraceEvent {
    /// Event name (span key for timeline events)
    name: String,
    /// Category for filtering/coloring
    cat: String,
    /// Phase: "X" = complete, "M" = metadata
    ph: String,
    /// Timestamp in microseconds
    ts: f64,
    /// Duration in microseconds ("X" events only)
    #[serde(skip_serializing_if = "Option::is_none")]
    dur: Option<f64>,
    pid: u32,
    /// One lane per event type
    tid: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    args: Option<HashMap<String, JsonValue>>,
}

/// Chrome Trace Format container
#[derive(Debug, Serialize)]
struct ChromeTrace {
    #[serde(rename = "traceEvents")]
    trace_events: Vec<ChromeTraceEvent>,
    #[serde(rename = "displayTimeUnit")]
    display_time_unit: String,
}

/// Records committed timeline batches for export
///
/// Provisional spans are republished every tick; a later event with the same
/// `(key, type, start)` replaces the earlier one, so each span is exported
/// once with its final extent.
#[derive(Debug, Default)]
pub struct ChromeTraceExporter {
    events: HashMap<(String, EventType, u64), TimelineEvent>,
    horizon_usec: u64,
}

impl ChromeTraceExporter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, event: &TimelineEvent) {
        let key = (event.key.clone(), event.event_type, event.start_time_usec);
        self.events.insert(key, event.clone());
    }

    /// Number of distinct spans recorded
    #[must_use]
    pub fn event_count(&self) -> usize {
        self.events.len()
    }

    #[must_use]
    pub fn horizon_usec(&self) -> u64 {
        self.horizon_usec
    }

    /// Export the trace to any writer (file, stdout, buffer, etc.)
    pub fn export<W: Write>(&self, writer: W) -> Result<(), ExportError> {
        let mut spans: Vec<&TimelineEvent> = self.events.values().collect();
        spans.sort_by(|a, b| {
            (a.start_time_usec, a.event_type, &a.key).cmp(&(b.start_time_usec, b.event_type, &b.key))
        });

        let mut lanes = BTreeSet::new();
        let mut trace_events: Vec<ChromeTraceEvent> = spans
            .into_iter()
            .map(|event| {
                lanes.insert(event.event_type);
                to_trace_event(event)
            })
            .collect();

        // Name each lane after its event type
        for event_type in lanes {
            let mut args = HashMap::new();
            args.insert("name".to_string(), serde_json::json!(event_type.label()));
            trace_events.push(ChromeTraceEvent {
                name: "thread_name".to_string(),
                cat: String::new(),
                ph: "M".to_string(),
                ts: 0.0,
                dur: None,
                pid: TRACE_PID,
                tid: event_type.ordinal(),
                args: Some(args),
            });
        }

        let trace = ChromeTrace { trace_events, display_time_unit: "ms".to_string() };
        serde_json::to_writer_pretty(writer, &trace)?;
        Ok(())
    }
}

#[allow(clippy::cast_precision_loss)]
fn to_trace_event(event: &TimelineEvent) -> ChromeTraceEvent {
    let mut args = HashMap::new();
    args.insert("key".to_string(), serde_json::json!(event.key));
    args.insert("intensity".to_string(), serde_json::json!(event.intensity));

    let cat = if event.event_type.is_request_event_type() { "network" } else { "script" };
    ChromeTraceEvent {
        name: event.key.clone(),
        cat: cat.to_string(),
        ph: "X".to_string(),
        ts: event.start_time_usec as f64,
        dur: Some(event.duration_usec as f64),
        pid: TRACE_PID,
        tid: event.event_type.ordinal(),
        args: Some(args),
    }
}

impl TimelineListener for ChromeTraceExporter {
    fn on_events_added(&mut self, events: &[TimelineEvent], horizon_usec: u64) {
        for event in events {
            self.record(event);
        }
        self.horizon_usec = horizon_usec;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(exporter: &ChromeTraceExporter) -> serde_json::Value {
        let mut buffer = Vec::new();
        exporter.export(&mut buffer).unwrap();
        serde_json::from_slice(&buffer).unwrap()
    }

    #[test]
    fn test_provisional_spans_are_overwritten() {
        let mut exporter = ChromeTraceExporter::new();
        let provisional = TimelineEvent::new("http://a/", 0, 20_000, EventType::DataAvailable, 1.0);
        let last = TimelineEvent::new("http://a/", 0, 22_001, EventType::DataAvailable, 1.0);
        exporter.on_events_added(&[provisional], 20_000);
        exporter.on_events_added(&[last], 40_000);

        assert_eq!(exporter.event_count(), 1);
        assert_eq!(exporter.horizon_usec(), 40_000);
        let json = parse(&exporter);
        let events = json["traceEvents"].as_array().unwrap();
        assert_eq!(events[0]["dur"], 22_001.0);
        assert_eq!(events[0]["ph"], "X");
        assert_eq!(events[0]["tid"], 7);
        assert_eq!(events[0]["args"]["key"], "http://a/");
    }

    #[test]
    fn test_lane_metadata() {
        let mut exporter = ChromeTraceExporter::new();
        exporter.on_events_added(
            &[
                TimelineEvent::new("http://a/", 0, 500, EventType::DnsLookup, 1.0),
                TimelineEvent::new("app.js", 0, 20_000, EventType::ScriptExecute, 0.4),
            ],
            20_000,
        );
        let json = parse(&exporter);
        let events = json["traceEvents"].as_array().unwrap();
        let metadata: Vec<&serde_json::Value> =
            events.iter().filter(|e| e["ph"] == "M").collect();
        assert_eq!(metadata.len(), 2);
        assert_eq!(metadata[0]["args"]["name"], "DNS lookup");
        assert_eq!(metadata[1]["tid"], 9);
        assert_eq!(json["displayTimeUnit"], "ms");
    }
}
