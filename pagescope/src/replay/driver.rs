//! # Replay Driver
//!
//! Feeds a [`Recording`] through a [`TimelineManager`] on a [`ManualClock`].
//!
//! Each [`ReplayDriver::step`] advances the clock by one refresh delay,
//! applies every entry recorded up to that time, then runs one scheduler
//! tick. After the session stops, ticks continue until every source is
//! idle, bounded by a drain limit.
//!
//! The driver plays the host: a notification the engine rejects is logged
//! and skipped, while a failed tick ends the replay.

use log::{debug, info, warn};
use pagescope_common::ProfilerEventKind;
use std::cell::Cell;
use std::collections::{HashSet, VecDeque};
use std::rc::Rc;

use super::host::{PipelineTaps, ReplayProfiler, ReplayRequest};
use super::recording::{EntryKind, RecordedEntry, Recording};
use crate::clock::{ManualClock, SessionClock};
use crate::config::TimelineConfig;
use crate::domain::{contain, ReplayError, SessionState, TimelineError};
use crate::manager::TimelineManager;
use crate::model::TimelineListener;
use crate::observers::NetworkSignal;
use crate::profiling::{ActivityProfiler, ProfilerState};

/// Ticks allowed after stop before the driver gives up on draining
pub const DEFAULT_DRAIN_LIMIT: u64 = 1_000;

/// Result of one [`ReplayDriver::step`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// A tick ran at this session time
    Ticked { at_usec: u64 },
    Finished,
}

pub struct ReplayDriver {
    clock: ManualClock,
    manager: TimelineManager,
    recording: Recording,
    entries: VecDeque<RecordedEntry>,
    stop_at_usec: u64,
    now_usec: u64,
    pipelines: PipelineTaps,
    known_urls: HashSet<String>,
    profiler_state: Rc<Cell<ProfilerState>>,
    stopped: bool,
    drain_ticks: u64,
    drain_limit: u64,
    finished: bool,
}

impl ReplayDriver {
    pub fn new(recording: Recording, config: TimelineConfig) -> Result<Self, ReplayError> {
        recording.validate()?;
        let clock = ManualClock::new(recording.start_time_usec);
        let manager = TimelineManager::new(Rc::new(clock.clone()), config);
        let initial_state =
            recording.profiler.as_ref().map_or(ProfilerState::Idle, |p| p.state);
        Ok(Self {
            clock,
            manager,
            entries: recording.entries.iter().cloned().collect(),
            stop_at_usec: recording.stop_at_usec(),
            recording,
            now_usec: 0,
            pipelines: PipelineTaps::new(),
            known_urls: HashSet::new(),
            profiler_state: Rc::new(Cell::new(initial_state)),
            stopped: false,
            drain_ticks: 0,
            drain_limit: DEFAULT_DRAIN_LIMIT,
            finished: false,
        })
    }

    #[must_use]
    pub fn with_drain_limit(mut self, drain_limit: u64) -> Self {
        self.drain_limit = drain_limit;
        self
    }

    /// Start the session with `view` as the model's first listener
    pub fn start(&mut self, view: Box<dyn TimelineListener>) -> Result<(), ReplayError> {
        let profiler = self.recording.profiler.as_ref().map(|recorded| {
            let clock = SessionClock::new(Rc::new(self.clock.clone()), self.recording.start_time_usec);
            let profiler = ReplayProfiler::new(recorded.events.clone(), self.profiler_state.clone(), clock);
            Box::new(profiler) as Box<dyn ActivityProfiler>
        });
        self.manager.start(self.recording.start_time_usec, profiler, view)?;
        info!(
            "replaying {} entries, stopping at {}us",
            self.entries.len(),
            self.stop_at_usec
        );
        Ok(())
    }

    #[must_use]
    pub fn manager(&self) -> &TimelineManager {
        &self.manager
    }

    pub fn manager_mut(&mut self) -> &mut TimelineManager {
        &mut self.manager
    }

    /// Current session time
    #[must_use]
    pub fn now_usec(&self) -> u64 {
        self.now_usec
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Advance one refresh delay and tick
    pub fn step(&mut self) -> Result<StepOutcome, ReplayError> {
        if self.finished {
            return Ok(StepOutcome::Finished);
        }
        if self.manager.state() == SessionState::NotStarted {
            return Err(ReplayError::Timeline(TimelineError::NotStarted));
        }

        let delay_usec = u64::try_from(self.manager.refresh_delay().as_micros()).unwrap_or(u64::MAX);
        let tick_at = self.now_usec.saturating_add(delay_usec);

        while let Some(entry) = self.entries.front() {
            if entry.at_usec > tick_at {
                break;
            }
            if !self.stopped && entry.at_usec > self.stop_at_usec {
                self.stop_session(self.stop_at_usec)?;
            }
            if let Some(entry) = self.entries.pop_front() {
                self.apply(entry)?;
            }
        }
        if !self.stopped && tick_at >= self.stop_at_usec {
            self.stop_session(self.stop_at_usec)?;
        }

        self.set_time(tick_at);
        if !self.manager.is_armed() {
            return Ok(self.finish());
        }
        self.manager.on_tick()?;

        if self.stopped {
            self.drain_ticks += 1;
            if self.drain_ticks >= self.drain_limit && self.manager.is_armed() {
                warn!("sources still busy after {} drain ticks, giving up", self.drain_ticks);
                return Ok(self.finish());
            }
        }
        Ok(StepOutcome::Ticked { at_usec: tick_at })
    }

    /// Step until finished. Returns the number of ticks run.
    pub fn run(&mut self) -> Result<u64, ReplayError> {
        let mut ticks = 0;
        while let StepOutcome::Ticked { .. } = self.step()? {
            ticks += 1;
        }
        Ok(ticks)
    }

    fn finish(&mut self) -> StepOutcome {
        self.finished = true;
        debug!("replay finished at {}us after {} ticks", self.now_usec, self.manager.tick_count());
        StepOutcome::Finished
    }

    fn set_time(&mut self, at_usec: u64) {
        self.now_usec = self.now_usec.max(at_usec);
        self.clock.set(self.recording.start_time_usec + self.now_usec);
    }

    fn stop_session(&mut self, at_usec: u64) -> Result<(), ReplayError> {
        self.set_time(at_usec);
        self.manager.stop()?;
        self.stopped = true;
        if self.profiler_state.get() == ProfilerState::Profiling {
            self.profiler_state.set(ProfilerState::Finished);
        }
        // Nothing is delivered after the host stops recording
        self.pipelines.close_all();
        Ok(())
    }

    fn apply(&mut self, entry: RecordedEntry) -> Result<(), ReplayError> {
        self.set_time(entry.at_usec);
        let timestamp_usec = self.recording.start_time_usec + entry.at_usec;
        match entry.kind {
            EntryKind::Network { url, activity } => {
                let signal = NetworkSignal::new(url, activity, timestamp_usec);
                contain("network activity", self.manager.observe_network(signal));
            }
            EntryKind::RawNetwork { url, activity_type, subtype } => {
                if let Some(signal) =
                    NetworkSignal::from_raw(url, activity_type, subtype, timestamp_usec)
                {
                    contain("network activity", self.manager.observe_network(signal));
                }
            }
            EntryKind::RequestWillSend { url, from_cache, aborted, tap } => {
                self.known_urls.insert(url.clone());
                let request = ReplayRequest::new(url, from_cache, aborted, tap, self.pipelines.clone());
                contain("request notification", self.manager.observe_request(Box::new(request)));
            }
            EntryKind::DataDelivered { url } => {
                self.require_known(&url)?;
                if !self.pipelines.deliver_data(&url) {
                    debug!("data for {url} arrived before a tap was attached");
                }
            }
            EntryKind::PipelineClosed { url } => {
                self.require_known(&url)?;
                self.pipelines.close(&url);
            }
            EntryKind::Stop => {
                if !self.stopped {
                    self.stop_session(entry.at_usec)?;
                }
            }
        }
        Ok(())
    }

    fn require_known(&self, url: &str) -> Result<(), ReplayError> {
        if self.known_urls.contains(url) {
            Ok(())
        } else {
            Err(ReplayError::UnknownPipeline(url.to_string()))
        }
    }
}

/// Count of recorded profiler events per kind, for the run summary
#[must_use]
pub fn profiler_event_counts(recording: &Recording) -> (usize, usize) {
    recording.profiler.as_ref().map_or((0, 0), |p| {
        let compile = p.events.iter().filter(|e| e.kind == ProfilerEventKind::Compile).count();
        (compile, p.events.len() - compile)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::EventType;
    use crate::model::tests::Recorder;
    use crate::replay::recording::TapBehavior;
    use pagescope_common::{NetworkActivity, SocketStatus};
    use std::cell::RefCell;

    fn entry(at_usec: u64, kind: EntryKind) -> RecordedEntry {
        RecordedEntry { at_usec, kind }
    }

    fn recording(entries: Vec<RecordedEntry>) -> Recording {
        Recording { start_time_usec: 1_000_000, duration_usec: None, profiler: None, entries }
    }

    #[test]
    fn test_step_requires_start() {
        let mut driver = ReplayDriver::new(recording(vec![]), TimelineConfig::default()).unwrap();
        assert!(matches!(driver.step(), Err(ReplayError::Timeline(_))));
    }

    #[test]
    fn test_data_available_through_tap() {
        let url = "http://a/app.js".to_string();
        let config = TimelineConfig { data_available_instantaneous: false, ..TimelineConfig::default() };
        let mut driver = ReplayDriver::new(
            recording(vec![
                entry(
                    1_000,
                    EntryKind::RequestWillSend {
                        url: url.clone(),
                        from_cache: false,
                        aborted: false,
                        tap: TapBehavior::Attachable,
                    },
                ),
                entry(200_000, EntryKind::DataDelivered { url: url.clone() }),
                entry(250_000, EntryKind::PipelineClosed { url: url.clone() }),
                entry(400_000, EntryKind::Stop),
            ]),
            config,
        )
        .unwrap();
        let recorder = Rc::new(RefCell::new(Recorder::default()));
        driver.start(Box::new(recorder.clone())).unwrap();
        driver.run().unwrap();

        let recorder = recorder.borrow();
        let last = recorder
            .batches
            .iter()
            .flat_map(|(events, _)| events.iter())
            .filter(|e| e.event_type == EventType::DataAvailable)
            .last()
            .cloned()
            .unwrap();
        assert_eq!(last.start_time_usec, 200_000);
        assert_eq!(last.duration_usec, 50_001);
        assert!(driver.is_finished());
        assert_eq!(driver.manager().state(), SessionState::Finished);
    }

    fn data_available_when_stopped_between_ticks(instantaneous: bool) -> Vec<(u64, u64)> {
        let url = "http://a/app.js".to_string();
        let config = TimelineConfig { data_available_instantaneous: instantaneous, ..TimelineConfig::default() };
        let mut driver = ReplayDriver::new(
            recording(vec![
                entry(
                    1_000,
                    EntryKind::RequestWillSend {
                        url: url.clone(),
                        from_cache: false,
                        aborted: false,
                        tap: TapBehavior::Attachable,
                    },
                ),
                entry(200_000, EntryKind::DataDelivered { url: url.clone() }),
                entry(220_000, EntryKind::PipelineClosed { url: url.clone() }),
                entry(250_000, EntryKind::Stop),
            ]),
            config,
        )
        .unwrap();
        let recorder = Rc::new(RefCell::new(Recorder::default()));
        driver.start(Box::new(recorder.clone())).unwrap();
        driver.run().unwrap();

        let recorder = recorder.borrow();
        recorder
            .batches
            .iter()
            .flat_map(|(events, _)| events.iter())
            .filter(|e| e.event_type == EventType::DataAvailable)
            .map(|e| (e.start_time_usec, e.duration_usec))
            .collect()
    }

    #[test]
    fn test_data_delivered_after_last_tick_survives_stop() {
        assert_eq!(data_available_when_stopped_between_ticks(false), vec![(200_000, 20_001)]);
        assert_eq!(data_available_when_stopped_between_ticks(true), vec![(200_000, 20_000)]);
    }

    #[test]
    fn test_unknown_pipeline_is_an_error() {
        let mut driver = ReplayDriver::new(
            recording(vec![entry(0, EntryKind::DataDelivered { url: "http://x/".to_string() })]),
            TimelineConfig::default(),
        )
        .unwrap();
        driver.start(Box::new(Recorder::default())).unwrap();
        assert!(matches!(driver.step(), Err(ReplayError::UnknownPipeline(_))));
    }

    #[test]
    fn test_rejected_notification_does_not_end_replay() {
        let url = "http://a/".to_string();
        let resolving = |at| {
            entry(
                at,
                EntryKind::Network {
                    url: url.clone(),
                    activity: NetworkActivity::Socket(SocketStatus::Resolving),
                },
            )
        };
        let mut driver = ReplayDriver::new(
            recording(vec![resolving(0), resolving(100), entry(300_000, EntryKind::Stop)]),
            TimelineConfig::default(),
        )
        .unwrap();
        driver.start(Box::new(Recorder::default())).unwrap();
        assert!(driver.run().unwrap() > 0);
        assert_eq!(driver.manager().state(), SessionState::Finished);
    }

    #[test]
    fn test_network_session_drains_after_stop() {
        let url = "http://a/".to_string();
        let network = |at, status| {
            entry(at, EntryKind::Network { url: url.clone(), activity: NetworkActivity::Socket(status) })
        };
        let mut driver = ReplayDriver::new(
            recording(vec![network(0, SocketStatus::Resolving), network(500, SocketStatus::Connecting)]),
            TimelineConfig::default(),
        )
        .unwrap();
        driver.start(Box::new(Recorder::default())).unwrap();

        // Stops after the last entry, flushes on the first tick
        assert_eq!(driver.step().unwrap(), StepOutcome::Ticked { at_usec: 150_000 });
        assert_eq!(driver.step().unwrap(), StepOutcome::Finished);
        assert_eq!(driver.manager().tick_count(), 1);
    }
}
