//! Host primitives backed by a recording

use log::debug;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use super::recording::TapBehavior;
use crate::clock::SessionClock;
use crate::domain::TapError;
use crate::observers::{DataTap, HttpRequest};
use crate::profiling::{ActivityProfiler, ProfilerEvent, ProfilerQuery, ProfilerReply, ProfilerState};

/// Profiler that hands out recorded events once they have ended
pub struct ReplayProfiler {
    events: Vec<ProfilerEvent>,
    state: Rc<Cell<ProfilerState>>,
    clock: SessionClock,
}

impl ReplayProfiler {
    /// `state` is shared with the driver, which flips it when the session
    /// stops
    pub fn new(
        mut events: Vec<ProfilerEvent>,
        state: Rc<Cell<ProfilerState>>,
        clock: SessionClock,
    ) -> Self {
        events.sort_by_key(|e| e.start_time_usec);
        Self { events, state, clock }
    }
}

impl ActivityProfiler for ReplayProfiler {
    fn state(&self) -> ProfilerState {
        self.state.get()
    }

    fn request_timeline_events(&mut self, query: ProfilerQuery, reply: ProfilerReply) {
        let now = self.clock.elapsed_usec();
        let events: Vec<ProfilerEvent> = self
            .events
            .iter()
            .filter(|e| e.start_time_usec >= query.from_usec)
            .filter(|e| e.start_time_usec + e.duration_usec <= now)
            .cloned()
            .collect();
        reply.deliver(events);
    }
}

/// Taps spliced into recorded response pipelines, by URL
#[derive(Default, Clone)]
pub struct PipelineTaps {
    taps: Rc<RefCell<HashMap<String, DataTap>>>,
}

impl PipelineTaps {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn attach(&self, url: &str, tap: DataTap) {
        self.taps.borrow_mut().insert(url.to_string(), tap);
    }

    #[must_use]
    pub fn is_tapped(&self, url: &str) -> bool {
        self.taps.borrow().contains_key(url)
    }

    /// Returns `false` if no tap is attached for `url`
    pub fn deliver_data(&self, url: &str) -> bool {
        match self.taps.borrow_mut().get_mut(url) {
            Some(tap) => {
                tap.on_data_available();
                true
            }
            None => false,
        }
    }

    /// Tear the pipeline down; dropping the tap reports the teardown
    pub fn close(&self, url: &str) -> bool {
        let tap = self.taps.borrow_mut().remove(url);
        tap.is_some()
    }

    /// Close every pipeline still open
    pub fn close_all(&self) {
        let taps: Vec<DataTap> = self.taps.borrow_mut().drain().map(|(_, tap)| tap).collect();
        drop(taps);
    }
}

/// One recorded "request about to be sent" notification
pub struct ReplayRequest {
    url: String,
    from_cache: bool,
    aborted: bool,
    tap: TapBehavior,
    pipelines: PipelineTaps,
}

impl ReplayRequest {
    pub fn new(
        url: impl Into<String>,
        from_cache: bool,
        aborted: bool,
        tap: TapBehavior,
        pipelines: PipelineTaps,
    ) -> Self {
        Self { url: url.into(), from_cache, aborted, tap, pipelines }
    }
}

impl HttpRequest for ReplayRequest {
    fn url(&self) -> &str {
        &self.url
    }

    fn succeeded(&self) -> bool {
        !self.aborted
    }

    fn is_from_cache(&self) -> bool {
        self.from_cache
    }

    fn splice_tap(&mut self, tap: DataTap) -> Result<(), TapError> {
        match self.tap {
            TapBehavior::Attachable => {
                debug!("tap attached to {}", self.url);
                self.pipelines.attach(&self.url, tap);
                Ok(())
            }
            TapBehavior::AlreadyWired => Err(TapError::AlreadyWired),
            TapBehavior::Unsupported => Err(TapError::Unsupported),
        }
    }
}
