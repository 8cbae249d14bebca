//! # Tick Scheduler
//!
//! One periodic timer drives every pollable source. On each tick the
//! scheduler asks every source to publish; it re-arms only if at least one
//! source still has work.
//!
//! The scheduler does not own a timer. Whoever drives it (the replay
//! driver, or the realtime loop in `main`) checks [`Scheduler::is_armed`]
//! and waits [`Scheduler::delay`] between ticks, which keeps it testable
//! against a fake clock.

use log::{debug, trace};
use std::time::Duration;

use crate::domain::TimelineError;
use crate::model::TimelineModel;

/// A source that publishes on every scheduler tick
pub trait TickSource {
    /// Name used in logs
    fn name(&self) -> &'static str;

    /// Publish current state. Returns `true` while the source has more
    /// work and wants another tick.
    fn on_timeout_callback(&mut self, model: &mut TimelineModel) -> Result<bool, TimelineError>;
}

/// "Ask each source; re-arm if any says yes"
#[derive(Debug)]
pub struct Scheduler {
    delay: Duration,
    armed: bool,
    ticks: u64,
}

impl Scheduler {
    #[must_use]
    pub fn new(delay: Duration) -> Self {
        Self { delay, armed: false, ticks: 0 }
    }

    /// Schedule the next tick
    pub fn arm(&mut self) {
        self.armed = true;
    }

    pub fn disarm(&mut self) {
        self.armed = false;
    }

    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.armed
    }

    #[must_use]
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Ticks run so far
    #[must_use]
    pub fn tick_count(&self) -> u64 {
        self.ticks
    }

    /// Run one tick across `sources` as a single model batch
    ///
    /// Every source is called even if an earlier one fails; the first
    /// error is returned and the scheduler stays disarmed.
    pub fn run_tick(
        &mut self,
        sources: &mut [&mut dyn TickSource],
        model: &mut TimelineModel,
    ) -> Result<bool, TimelineError> {
        self.armed = false;
        self.ticks += 1;

        let mut more_work = false;
        let mut first_error = None;

        model.start_adding_events();
        for source in sources.iter_mut() {
            match source.on_timeout_callback(model) {
                Ok(wants_more) => {
                    trace!("tick {}: {} -> {wants_more}", self.ticks, source.name());
                    more_work |= wants_more;
                }
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }
        let committed = model.done_adding_events(0);

        if let Some(e) = first_error {
            return Err(e);
        }
        committed?;

        if more_work {
            self.armed = true;
        } else {
            debug!("all sources idle after {} ticks, scheduler stopped", self.ticks);
        }
        Ok(more_work)
    }
}
