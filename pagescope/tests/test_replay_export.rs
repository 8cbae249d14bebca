use pagescope::config::TimelineConfig;
use pagescope::domain::{EventType, ReplayError};
use pagescope::export::ChromeTraceExporter;
use pagescope::replay::{profiler_event_counts, Recording, ReplayDriver};
use std::cell::RefCell;
use std::io::Write;
use std::rc::Rc;

const FIXTURE: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/simple_session.json");

fn replay_fixture() -> Rc<RefCell<ChromeTraceExporter>> {
    let recording = Recording::from_file(FIXTURE).expect("Failed to load fixture");
    let mut driver = ReplayDriver::new(recording, TimelineConfig::default()).expect("valid recording");
    let exporter = Rc::new(RefCell::new(ChromeTraceExporter::new()));
    driver.start(Box::new(exporter.clone())).expect("Failed to start replay");
    driver.run().expect("Replay failed");
    assert!(driver.is_finished());
    exporter
}

fn spans_of<'a>(trace: &'a serde_json::Value, name: &str, tid: u32) -> Vec<&'a serde_json::Value> {
    trace["traceEvents"]
        .as_array()
        .expect("traceEvents is an array")
        .iter()
        .filter(|e| e["ph"] == "X" && e["name"] == name && e["tid"] == tid)
        .collect()
}

#[test]
fn test_fixture_loads() {
    let recording = Recording::from_file(FIXTURE).expect("Failed to load fixture");
    assert_eq!(recording.stop_at_usec(), 400_000);
    assert_eq!(profiler_event_counts(&recording), (1, 2));
}

#[test]
fn test_replay_exports_valid_chrome_trace() {
    let exporter = replay_fixture();
    let mut buffer = Vec::new();
    exporter.borrow().export(&mut buffer).expect("Failed to export trace");

    let json_str = String::from_utf8(buffer).expect("Invalid UTF-8");
    let parsed: serde_json::Value = serde_json::from_str(&json_str).expect("Invalid JSON");
    assert_eq!(parsed["displayTimeUnit"], "ms");

    let page = "http://example.com/";
    let dns = spans_of(&parsed, page, EventType::DnsLookup.ordinal());
    assert_eq!(dns.len(), 1);
    assert_eq!(dns[0]["ts"], 0.0);
    assert_eq!(dns[0]["dur"], 2_001.0);
    assert_eq!(dns[0]["cat"], "network");

    let connected = spans_of(&parsed, page, EventType::TcpConnected.ordinal());
    assert_eq!(connected[0]["dur"], 27_001.0);

    let cache = spans_of(&parsed, "http://example.com/logo.png", EventType::CacheHit.ordinal());
    assert_eq!(cache.len(), 1);
    assert_eq!(cache[0]["dur"], 20_000.0);

    let script = "http://example.com/app.js";
    let data = spans_of(&parsed, script, EventType::DataAvailable.ordinal());
    assert_eq!(data[0]["ts"], 200_000.0);

    let compile = spans_of(&parsed, script, EventType::ScriptCompile.ordinal());
    assert_eq!(compile[0]["cat"], "script");
    let intensity = compile[0]["args"]["intensity"].as_f64().expect("intensity is a number");
    assert!((intensity - 0.4).abs() < 1e-9);

    let browser = spans_of(&parsed, "Browser JavaScript", EventType::ScriptExecute.ordinal());
    assert_eq!(browser.len(), 1);

    let lanes = parsed["traceEvents"]
        .as_array()
        .expect("traceEvents is an array")
        .iter()
        .filter(|e| e["ph"] == "M")
        .count();
    assert_eq!(lanes, EventType::ALL.len());
}

#[test]
fn test_export_to_file() {
    let exporter = replay_fixture();
    let file = tempfile::NamedTempFile::new().expect("Failed to create temp file");
    exporter.borrow().export(file.as_file()).expect("Failed to export trace");

    let content = std::fs::read_to_string(file.path()).expect("Failed to read trace back");
    let parsed: serde_json::Value = serde_json::from_str(&content).expect("Invalid JSON");
    assert!(parsed["traceEvents"].as_array().is_some_and(|events| !events.is_empty()));
    assert_eq!(exporter.borrow().horizon_usec(), 300_000);
}

#[test]
fn test_out_of_order_recording_is_rejected() {
    let mut file = tempfile::NamedTempFile::new().expect("Failed to create temp file");
    write!(
        file,
        r#"{{ "start_time_usec": 0, "entries": [
            {{ "at_usec": 50, "kind": "stop" }},
            {{ "at_usec": 10, "kind": "stop" }}
        ] }}"#
    )
    .expect("Failed to write recording");

    let result = Recording::from_file(file.path());
    assert!(matches!(result, Err(ReplayError::EntryOutOfOrder { at_usec: 10, previous_usec: 50 })));
}
