//! # Timeline Model
//!
//! Broadcast aggregator between the event sources and the view. Sources
//! bracket their output with [`TimelineModel::start_adding_events`] /
//! [`TimelineModel::done_adding_events`]; listeners see each committed batch
//! exactly once, together with the new horizon.
//!
//! ## Batching
//!
//! Brackets nest. Only the outermost `done_adding_events` commits, which is
//! how the manager turns one scheduler tick across several sources into a
//! single atomic batch.
//!
//! ## Horizon
//!
//! The committed horizon is the largest of the previous horizon, the end
//! time passed to the outermost `done_adding_events` and the end of every
//! event in the batch. Listeners therefore never observe it decreasing,
//! even when a lagging source reports an older end time.

use crossbeam_channel::Sender;
use log::debug;
use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

use crate::domain::{TimelineError, TimelineEvent};

/// Consumer of committed timeline batches (usually the view)
pub trait TimelineListener {
    /// A key appeared for the first time in this model
    fn on_timeline_created(&mut self, _key: &str) {}

    /// A batch was committed
    ///
    /// Provisional spans are republished every tick with the same
    /// `(key, type, start)`; a later event for that triple supersedes the
    /// earlier one.
    fn on_events_added(&mut self, events: &[TimelineEvent], horizon_usec: u64);
}

impl<T: TimelineListener + ?Sized> TimelineListener for Rc<RefCell<T>> {
    fn on_timeline_created(&mut self, key: &str) {
        self.borrow_mut().on_timeline_created(key);
    }

    fn on_events_added(&mut self, events: &[TimelineEvent], horizon_usec: u64) {
        self.borrow_mut().on_events_added(events, horizon_usec);
    }
}

/// Handle returned by [`TimelineModel::add_listener`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Append-only broadcast aggregator
#[derive(Default)]
pub struct TimelineModel {
    listeners: Vec<(ListenerId, Box<dyn TimelineListener>)>,
    next_listener_id: u64,
    /// Nesting depth of open brackets
    depth: usize,
    pending: Vec<TimelineEvent>,
    pending_end_time_usec: u64,
    horizon_usec: u64,
    known_keys: HashSet<String>,
    new_keys: Vec<String>,
}

impl TimelineModel {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_listener(&mut self, listener: Box<dyn TimelineListener>) -> ListenerId {
        let id = ListenerId(self.next_listener_id);
        self.next_listener_id += 1;
        self.listeners.push((id, listener));
        id
    }

    pub fn remove_listener(&mut self, id: ListenerId) -> Option<Box<dyn TimelineListener>> {
        let index = self.listeners.iter().position(|(candidate, _)| *candidate == id)?;
        Some(self.listeners.remove(index).1)
    }

    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Last committed horizon, microseconds
    #[must_use]
    pub fn horizon_usec(&self) -> u64 {
        self.horizon_usec
    }

    #[must_use]
    pub fn is_adding_events(&self) -> bool {
        self.depth > 0
    }

    /// Begin a batch. Must be paired with [`TimelineModel::done_adding_events`].
    pub fn start_adding_events(&mut self) {
        self.depth += 1;
        if self.depth == 1 {
            self.pending_end_time_usec = 0;
        }
    }

    /// Buffer one finalized event in the open batch
    pub fn add_event(&mut self, event: TimelineEvent) -> Result<(), TimelineError> {
        if self.depth == 0 {
            return Err(TimelineError::NotAddingEvents);
        }
        self.pending_end_time_usec = self.pending_end_time_usec.max(event.end_time_usec());
        if !self.known_keys.contains(&event.key) {
            self.known_keys.insert(event.key.clone());
            self.new_keys.push(event.key.clone());
        }
        self.pending.push(event);
        Ok(())
    }

    /// Close a bracket; the outermost one commits the batch
    pub fn done_adding_events(&mut self, end_time_usec: u64) -> Result<(), TimelineError> {
        if self.depth == 0 {
            return Err(TimelineError::BracketUnderflow);
        }
        self.depth -= 1;
        self.pending_end_time_usec = self.pending_end_time_usec.max(end_time_usec);
        if self.depth > 0 {
            return Ok(());
        }

        if self.pending_end_time_usec < self.horizon_usec {
            debug!(
                "batch end {}us behind horizon {}us, keeping horizon",
                self.pending_end_time_usec, self.horizon_usec
            );
        }
        let horizon = self.horizon_usec.max(self.pending_end_time_usec);
        let events = std::mem::take(&mut self.pending);
        let new_keys = std::mem::take(&mut self.new_keys);
        let advanced = horizon > self.horizon_usec;
        self.horizon_usec = horizon;
        self.pending_end_time_usec = 0;

        for (_, listener) in &mut self.listeners {
            for key in &new_keys {
                listener.on_timeline_created(key);
            }
            if !events.is_empty() || advanced {
                listener.on_events_added(&events, horizon);
            }
        }
        Ok(())
    }

    /// Drop listeners and buffered state
    pub fn dispose(&mut self) {
        self.listeners.clear();
        self.pending.clear();
        self.new_keys.clear();
        self.known_keys.clear();
        self.depth = 0;
    }
}

/// One committed batch, as delivered through [`ChannelListener`]
#[derive(Debug, Clone)]
pub struct TimelineBatch {
    pub events: Vec<TimelineEvent>,
    pub horizon_usec: u64,
}

/// Forwards committed batches to another thread
///
/// Sends are non-blocking; a batch is dropped if the consumer falls behind.
pub struct ChannelListener {
    tx: Sender<TimelineBatch>,
    pub dropped: usize,
}

impl ChannelListener {
    #[must_use]
    pub fn new(tx: Sender<TimelineBatch>) -> Self {
        Self { tx, dropped: 0 }
    }
}

impl TimelineListener for ChannelListener {
    fn on_events_added(&mut self, events: &[TimelineEvent], horizon_usec: u64) {
        let batch = TimelineBatch { events: events.to_vec(), horizon_usec };
        if self.tx.try_send(batch).is_err() {
            self.dropped += 1;
        }
    }
}
