//! # Timeline Manager
//!
//! Composition root for one inspection session. Owns the model, the three
//! event sources and the tick scheduler.
//!
//! ## Session lifecycle
//!
//! ```text
//! NotStarted ──start()──▶ Started ──stop()──▶ Finished
//!      ▲                                        │
//!      └──────────────────reset()───────────────┘
//! ```
//!
//! `stop()` only unregisters the sources. The scheduler keeps ticking until
//! every source reports it is idle, so late profiler data and the final
//! flush of open spans still reach the view. `reset()` disposes everything.

use log::{debug, info};
use std::rc::Rc;
use std::time::Duration;

use crate::clock::{Clock, SessionClock};
use crate::config::TimelineConfig;
use crate::domain::{Resolution, SessionState, TimelineError};
use crate::model::{ListenerId, TimelineListener, TimelineModel};
use crate::observers::{HttpRequest, NetworkObserver, NetworkSignal, RequestObserver};
use crate::profiling::{ActivityProfiler, JsEventFetcher};
use crate::scheduler::{Scheduler, TickSource};

/// Everything owned by a started session
struct Session {
    model: TimelineModel,
    view: ListenerId,
    fetcher: JsEventFetcher,
    network: NetworkObserver,
    request: RequestObserver,
    resolution: Resolution,
}

impl Session {
    fn dispose(mut self) {
        self.fetcher.dispose();
        self.network.dispose();
        self.request.dispose();
        self.model.remove_listener(self.view);
        self.model.dispose();
    }
}

pub struct TimelineManager {
    clock: Rc<dyn Clock>,
    config: TimelineConfig,
    state: SessionState,
    scheduler: Scheduler,
    session: Option<Session>,
}

impl TimelineManager {
    #[must_use]
    pub fn new(clock: Rc<dyn Clock>, config: TimelineConfig) -> Self {
        let scheduler = Scheduler::new(config.refresh_delay());
        Self { clock, config, state: SessionState::NotStarted, scheduler, session: None }
    }

    /// Begin a session anchored at `start_time_usec` (absolute host time)
    ///
    /// Any previous session is reset first. `profiler` is `None` when the
    /// host has no script profiler.
    pub fn start(
        &mut self,
        start_time_usec: u64,
        profiler: Option<Box<dyn ActivityProfiler>>,
        view: Box<dyn TimelineListener>,
    ) -> Result<(), TimelineError> {
        self.reset()?;

        let config = self.config.clone().clamped();
        let resolution = config.resolution();
        let clock = SessionClock::new(self.clock.clone(), start_time_usec);

        let mut model = TimelineModel::new();
        let view = model.add_listener(view);
        let mut session = Session {
            model,
            view,
            fetcher: JsEventFetcher::new(profiler, resolution),
            network: NetworkObserver::create(clock.clone(), resolution),
            request: RequestObserver::create(clock, resolution, config.data_available_instantaneous),
            resolution,
        };

        session.fetcher.start()?;
        session.network.register()?;
        session.request.register()?;

        self.scheduler = Scheduler::new(config.refresh_delay());
        self.scheduler.arm();
        self.session = Some(session);
        self.state = SessionState::Started;
        info!(
            "session started at {start_time_usec}us (resolution {resolution}, refresh {:?})",
            self.scheduler.delay()
        );
        Ok(())
    }

    /// Stop collecting. Sources are unregistered, not disposed.
    pub fn stop(&mut self) -> Result<(), TimelineError> {
        let Some(session) = self.session.as_mut() else {
            return Ok(());
        };
        session.fetcher.stop()?;
        session.network.unregister();
        session.request.unregister();
        self.state = SessionState::Finished;
        info!("session stopped");
        Ok(())
    }

    /// Stop and dispose everything
    pub fn reset(&mut self) -> Result<(), TimelineError> {
        self.stop()?;
        self.scheduler.disarm();
        if let Some(session) = self.session.take() {
            session.dispose();
            info!("session reset");
        }
        self.state = SessionState::NotStarted;
        Ok(())
    }

    /// One scheduler tick across all sources
    ///
    /// Returns whether another tick is scheduled.
    pub fn on_tick(&mut self) -> Result<bool, TimelineError> {
        let Some(session) = self.session.as_mut() else {
            return Err(TimelineError::NotStarted);
        };
        let Session { model, fetcher, network, request, .. } = session;
        let mut sources: [&mut dyn TickSource; 3] = [fetcher, network, request];
        let more = self.scheduler.run_tick(&mut sources, model)?;
        if !more {
            debug!("no source has work, waiting for new signals");
        }
        Ok(more)
    }

    /// Socket/transaction activity notification from the host
    pub fn observe_network(&mut self, signal: NetworkSignal) -> Result<(), TimelineError> {
        match self.session.as_mut() {
            Some(session) => session.network.observe(signal),
            None => Ok(()),
        }
    }

    /// "Request about to be sent" notification from the host
    pub fn observe_request(&mut self, request: Box<dyn HttpRequest>) -> Result<(), TimelineError> {
        match self.session.as_mut() {
            Some(session) => session.request.observe(request),
            None => Ok(()),
        }
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.scheduler.is_armed()
    }

    /// Delay before the next tick
    #[must_use]
    pub fn refresh_delay(&self) -> Duration {
        self.scheduler.delay()
    }

    #[must_use]
    pub fn tick_count(&self) -> u64 {
        self.scheduler.tick_count()
    }

    #[must_use]
    pub fn config(&self) -> &TimelineConfig {
        &self.config
    }

    /// Resolution of the running session
    #[must_use]
    pub fn resolution(&self) -> Option<Resolution> {
        self.session.as_ref().map(|s| s.resolution)
    }

    #[must_use]
    pub fn model(&self) -> Option<&TimelineModel> {
        self.session.as_ref().map(|s| &s.model)
    }

    /// Mutable model access, e.g. to attach more listeners
    pub fn model_mut(&mut self) -> Option<&mut TimelineModel> {
        self.session.as_mut().map(|s| &mut s.model)
    }

    #[must_use]
    pub fn network_observer(&self) -> Option<&NetworkObserver> {
        self.session.as_ref().map(|s| &s.network)
    }

    #[must_use]
    pub fn request_observer(&self) -> Option<&RequestObserver> {
        self.session.as_ref().map(|s| &s.request)
    }

    #[must_use]
    pub fn fetcher(&self) -> Option<&JsEventFetcher> {
        self.session.as_ref().map(|s| &s.fetcher)
    }
}

impl Drop for TimelineManager {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            session.dispose();
        }
    }
}
