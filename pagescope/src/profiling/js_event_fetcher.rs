//! # JavaScript Event Fetcher
//!
//! Pull-based source for script compile/execute activity. Unlike the
//! observers it is not told about activity; it polls the host's activity
//! profiler from a cursor on each tick.
//!
//! ## Polling
//!
//! ```text
//! tick ──▶ request_timeline_events(cursor) ──▶ profiler
//!                                                  │ (later)
//! tick ◀── drain deliveries ◀── ProfilerReply::deliver(events)
//! ```
//!
//! At most one poll is outstanding. Replies carry the fetcher generation
//! they were issued under and are dropped if the fetcher was restarted or
//! disposed in between.
//!
//! ## Deduplication
//!
//! A delivery may report the same `(type, start, identifier)` several
//! times (e.g. after identifier canonicalisation). Those collapse into one
//! event whose intensity is the clamped sum of the contributions.

use crossbeam_channel::{unbounded, Receiver, Sender};
use log::{debug, trace};
use pagescope_common::ProfilerEventKind;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::identifiers::canonical_identifier;
use crate::domain::{EventType, Generation, Resolution, TimelineError, TimelineEvent};
use crate::model::TimelineModel;
use crate::scheduler::TickSource;

/// Estimated cost of one compile operation, microseconds
pub const COMPILE_COST_PER_OP_USEC: f64 = 200.0;

/// Host profiler state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfilerState {
    Idle,
    Profiling,
    Finished,
}

impl ProfilerState {
    /// Whether polling the profiler can yield events
    #[must_use]
    pub fn is_pollable(self) -> bool {
        matches!(self, ProfilerState::Profiling | ProfilerState::Finished)
    }
}

/// One raw profiler event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfilerEvent {
    pub kind: ProfilerEventKind,
    pub start_time_usec: u64,
    pub duration_usec: u64,
    pub identifier: String,
    /// Operation count for compile events, activity density for execute
    /// events
    pub intensity: f64,
}

/// Poll parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProfilerQuery {
    /// Events at or after this session time
    pub from_usec: u64,
    pub resolution: Resolution,
}

/// Host-side script profiler
pub trait ActivityProfiler {
    fn state(&self) -> ProfilerState;

    /// Issue a poll. The reply may be delivered immediately or later.
    fn request_timeline_events(&mut self, query: ProfilerQuery, reply: ProfilerReply);
}

struct Delivery {
    generation: Generation,
    events: Vec<ProfilerEvent>,
}

/// Completion handle for one poll
pub struct ProfilerReply {
    generation: Generation,
    tx: Sender<Delivery>,
}

impl ProfilerReply {
    /// Hand the polled events back to the fetcher
    pub fn deliver(self, events: Vec<ProfilerEvent>) {
        let delivery = Delivery { generation: self.generation, events };
        // Receiver gone means the fetcher was dropped
        let _ = self.tx.send(delivery);
    }
}

/// Intensity contribution of one raw event
#[must_use]
pub fn normalized_intensity(event: &ProfilerEvent) -> f64 {
    match event.kind {
        ProfilerEventKind::Compile => {
            let busy_usec = event.intensity * COMPILE_COST_PER_OP_USEC;
            if event.duration_usec == 0 {
                return if busy_usec > 0.0 { 1.0 } else { 0.0 };
            }
            #[allow(clippy::cast_precision_loss)]
            let duration = event.duration_usec as f64;
            (busy_usec / duration).min(1.0)
        }
        ProfilerEventKind::Execute => event.intensity,
    }
}

fn event_type_for(kind: ProfilerEventKind) -> EventType {
    match kind {
        ProfilerEventKind::Compile => EventType::ScriptCompile,
        ProfilerEventKind::Execute => EventType::ScriptExecute,
    }
}

/// Collapses one delivery into timeline events
#[derive(Default)]
struct EventDispatcher {
    index: HashMap<(EventType, u64, String), usize>,
    events: Vec<TimelineEvent>,
}

impl EventDispatcher {
    fn populate(&mut self, raw: &[ProfilerEvent]) {
        for event in raw {
            let event_type = event_type_for(event.kind);
            let identifier = canonical_identifier(&event.identifier).to_string();
            let contribution = normalized_intensity(event);

            let key = (event_type, event.start_time_usec, identifier);
            let slot = match self.index.get(&key) {
                Some(&slot) => slot,
                None => {
                    self.events.push(TimelineEvent::new(
                        key.2.clone(),
                        event.start_time_usec,
                        event.duration_usec,
                        event_type,
                        0.0,
                    ));
                    self.index.insert(key, self.events.len() - 1);
                    self.events.len() - 1
                }
            };
            let entry = &mut self.events[slot];
            entry.intensity = (entry.intensity + contribution).min(1.0);
        }
    }

    fn has_events(&self) -> bool {
        !self.events.is_empty()
    }

    fn max_end_time_usec(&self) -> u64 {
        self.events.iter().map(TimelineEvent::end_time_usec).max().unwrap_or(0)
    }

    fn dispatch(self, model: &mut TimelineModel) -> Result<(), TimelineError> {
        let end = self.max_end_time_usec();
        model.start_adding_events();
        for event in self.events {
            model.add_event(event)?;
        }
        model.done_adding_events(end)
    }
}

/// Polls the activity profiler for script events
pub struct JsEventFetcher {
    profiler: Option<Box<dyn ActivityProfiler>>,
    resolution: Resolution,
    generation: Generation,
    cursor_usec: u64,
    running: bool,
    finished: bool,
    poll_pending: bool,
    disposed: bool,
    tx: Sender<Delivery>,
    rx: Receiver<Delivery>,
}

impl JsEventFetcher {
    pub const NAME: &'static str = "JsEventFetcher";

    /// `profiler` is `None` when the host has no profiler backend; the
    /// fetcher then never has work.
    #[must_use]
    pub fn new(profiler: Option<Box<dyn ActivityProfiler>>, resolution: Resolution) -> Self {
        if profiler.is_none() {
            debug!("no activity profiler available, script events disabled");
        }
        let (tx, rx) = unbounded();
        Self {
            profiler,
            resolution,
            generation: Generation::default(),
            cursor_usec: 0,
            running: false,
            finished: false,
            poll_pending: false,
            disposed: false,
            tx,
            rx,
        }
    }

    pub fn start(&mut self) -> Result<(), TimelineError> {
        self.ensure_not_disposed()?;
        self.generation = self.generation.next();
        self.cursor_usec = 0;
        self.running = true;
        self.finished = false;
        self.poll_pending = false;
        Ok(())
    }

    /// Stop issuing polls once the profiler has been drained. Data already
    /// in flight is still consumed.
    pub fn stop(&mut self) -> Result<(), TimelineError> {
        self.ensure_not_disposed()?;
        self.running = false;
        Ok(())
    }

    pub fn dispose(&mut self) {
        self.running = false;
        self.finished = true;
        self.poll_pending = false;
        self.disposed = true;
        self.generation = self.generation.next();
        self.profiler = None;
        while self.rx.try_recv().is_ok() {}
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    #[must_use]
    pub fn is_poll_pending(&self) -> bool {
        self.poll_pending
    }

    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Session time the next poll starts from
    #[must_use]
    pub fn cursor_usec(&self) -> u64 {
        self.cursor_usec
    }

    pub fn on_timeout_callback(&mut self, model: &mut TimelineModel) -> Result<bool, TimelineError> {
        if self.disposed {
            return Ok(false);
        }
        self.drain_deliveries(model)?;

        let Some(profiler) = self.profiler.as_mut() else {
            return Ok(false);
        };
        if !profiler.state().is_pollable() {
            return Ok(false);
        }
        if self.poll_pending {
            return Ok(true);
        }
        if self.finished {
            return Ok(false);
        }

        self.poll_pending = true;
        let query = ProfilerQuery { from_usec: self.cursor_usec, resolution: self.resolution };
        trace!("polling profiler from {}us", query.from_usec);
        let reply = ProfilerReply { generation: self.generation, tx: self.tx.clone() };
        profiler.request_timeline_events(query, reply);
        Ok(true)
    }

    fn drain_deliveries(&mut self, model: &mut TimelineModel) -> Result<(), TimelineError> {
        while let Ok(delivery) = self.rx.try_recv() {
            if delivery.generation != self.generation {
                trace!("dropping stale profiler delivery from {}", delivery.generation);
                continue;
            }

            let mut dispatcher = EventDispatcher::default();
            dispatcher.populate(&delivery.events);
            let has_events = dispatcher.has_events();
            if has_events {
                self.cursor_usec = self.cursor_usec.max(dispatcher.max_end_time_usec());
                dispatcher.dispatch(model)?;
            }

            self.finished = !self.running && !has_events;
            self.poll_pending = false;
        }
        Ok(())
    }

    fn ensure_not_disposed(&self) -> Result<(), TimelineError> {
        if self.disposed {
            Err(TimelineError::Disposed(Self::NAME))
        } else {
            Ok(())
        }
    }
}

impl TickSource for JsEventFetcher {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn on_timeout_callback(&mut self, model: &mut TimelineModel) -> Result<bool, TimelineError> {
        JsEventFetcher::on_timeout_callback(self, model)
    }
}
