// Time conversions intentionally lose precision for display purposes
#![allow(clippy::cast_precision_loss)]

use std::collections::HashSet;
use std::io::Write;

use crate::domain::TimelineEvent;
use crate::model::TimelineListener;

/// Counters printed at the end of a headless run
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DisplayStats {
    pub batches: u64,
    pub events: u64,
    pub timelines: u64,
}

/// Prints every committed batch, one line per event
pub struct HeadlessDisplay<W: Write> {
    out: W,
    seen: HashSet<(String, u32, u64)>,
    pub stats: DisplayStats,
}

impl HeadlessDisplay<std::io::Stdout> {
    #[must_use]
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write> HeadlessDisplay<W> {
    pub fn new(out: W) -> Self {
        Self { out, seen: HashSet::new(), stats: DisplayStats::default() }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn print_event(&mut self, event: &TimelineEvent) -> std::io::Result<()> {
        // Republished provisional spans are marked as updates
        let first = self.seen.insert((
            event.key.clone(),
            event.event_type.ordinal(),
            event.start_time_usec,
        ));
        let tag = if first { "NEW" } else { "UPD" };
        writeln!(
            self.out,
            "  [{tag}] {:>9.1}ms +{:>8.1}ms  {:<15} {:.2}  {}",
            event.start_time_usec as f64 / 1_000.0,
            event.duration_usec as f64 / 1_000.0,
            event.event_type.label(),
            event.intensity,
            event.key
        )
    }
}

/// Display end-of-run statistics
pub fn display_statistics(stats: &DisplayStats) {
    eprintln!(
        "stats: batches={} events={} timelines={}",
        stats.batches, stats.events, stats.timelines
    );
}

impl<W: Write> TimelineListener for HeadlessDisplay<W> {
    fn on_timeline_created(&mut self, key: &str) {
        self.stats.timelines += 1;
        let _ = writeln!(self.out, "[TIMELINE] {key}");
    }

    fn on_events_added(&mut self, events: &[TimelineEvent], horizon_usec: u64) {
        self.stats.batches += 1;
        self.stats.events += events.len() as u64;
        let _ = writeln!(
            self.out,
            "[BATCH] horizon={:.1}ms events={}",
            horizon_usec as f64 / 1_000.0,
            events.len()
        );
        for event in events {
            let _ = self.print_event(event);
        }
    }
}
