//! # Observer Engine
//!
//! Shared machinery behind every push-based event source: the in-flight
//! span table, quantisation against the session [`Resolution`], and the
//! register/unregister/dispose lifecycle.
//!
//! Concrete sources do not subclass anything. They plug a [`SignalMapper`]
//! into [`Observer`], and the mapper turns raw host notifications into
//! open/close operations on the engine.
//!
//! ## Lifecycle
//!
//! ```text
//! Unregistered ──register()──▶ Registered ──unregister()──▶ Unregistered
//!       │                                                        │
//!       └───────────────────────dispose()───────────────────────▶ Disposed
//! ```
//!
//! Every transition bumps the [`Generation`]; deferred host callbacks carry
//! the generation they were created under and are dropped on mismatch.

use log::{debug, trace};

use crate::clock::SessionClock;
use crate::domain::{EventType, Generation, Resolution, TimelineError, TimelineEvent};
use crate::model::TimelineModel;
use crate::scheduler::TickSource;

/// End state of an in-flight span
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpanEnd {
    Open,
    /// Fills exactly one resolution bucket; never gets an end time
    Instantaneous,
    /// Inclusive end time
    Closed(u64),
}

/// A span known to have started, not yet published for the last time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InFlightSpan {
    key: String,
    event_type: EventType,
    start_time_usec: u64,
    end: SpanEnd,
}

impl InFlightSpan {
    fn new(key: String, start_time_usec: u64, event_type: EventType) -> Self {
        Self { key, event_type, start_time_usec, end: SpanEnd::Open }
    }

    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    #[must_use]
    pub fn event_type(&self) -> EventType {
        self.event_type
    }

    #[must_use]
    pub fn start_time_usec(&self) -> u64 {
        self.start_time_usec
    }

    #[must_use]
    pub fn end(&self) -> SpanEnd {
        self.end
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.end != SpanEnd::Open
    }

    #[must_use]
    pub fn is_instantaneous(&self) -> bool {
        self.end == SpanEnd::Instantaneous
    }

    /// Exclusive end, once known
    #[must_use]
    pub fn end_time_usec(&self) -> Option<u64> {
        match self.end {
            SpanEnd::Closed(end) => Some(end + 1),
            SpanEnd::Instantaneous => Some(self.start_time_usec),
            SpanEnd::Open => None,
        }
    }

    pub fn mark_instantaneous(&mut self) -> Result<(), TimelineError> {
        self.ensure_open()?;
        self.end = SpanEnd::Instantaneous;
        Ok(())
    }

    /// Record the true (inclusive) end time
    pub fn complete(&mut self, end_time_usec: u64) -> Result<(), TimelineError> {
        self.ensure_open()?;
        if end_time_usec < self.start_time_usec {
            return Err(TimelineError::EndBeforeStart {
                key: self.key.clone(),
                start_time_usec: self.start_time_usec,
                end_time_usec,
            });
        }
        self.end = SpanEnd::Closed(end_time_usec);
        Ok(())
    }

    fn ensure_open(&self) -> Result<(), TimelineError> {
        match self.end {
            SpanEnd::Open => Ok(()),
            SpanEnd::Instantaneous => Err(TimelineError::AlreadyComplete {
                key: self.key.clone(),
                end_time_usec: self.start_time_usec,
            }),
            SpanEnd::Closed(end_time_usec) => {
                Err(TimelineError::AlreadyComplete { key: self.key.clone(), end_time_usec })
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObserverState {
    Unregistered,
    Registered,
    Disposed,
}

/// In-flight table plus publish/quantisation logic
pub struct ObserverEngine {
    name: &'static str,
    clock: SessionClock,
    resolution: Resolution,
    state: ObserverState,
    generation: Generation,
    /// Provisional publish boundary; frozen on unregister
    end_time_usec: u64,
    spans: Vec<InFlightSpan>,
}

impl ObserverEngine {
    #[must_use]
    pub fn new(name: &'static str, clock: SessionClock, resolution: Resolution) -> Self {
        Self {
            name,
            clock,
            resolution,
            state: ObserverState::Unregistered,
            generation: Generation::default(),
            end_time_usec: 0,
            spans: Vec::new(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    #[must_use]
    pub fn state(&self) -> ObserverState {
        self.state
    }

    #[must_use]
    pub fn is_registered(&self) -> bool {
        self.state == ObserverState::Registered
    }

    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.state == ObserverState::Disposed
    }

    #[must_use]
    pub fn generation(&self) -> Generation {
        self.generation
    }

    #[must_use]
    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    #[must_use]
    pub fn clock(&self) -> &SessionClock {
        &self.clock
    }

    /// Microseconds since the session anchor
    #[must_use]
    pub fn elapsed_usec(&self) -> u64 {
        self.clock.elapsed_usec()
    }

    #[must_use]
    pub fn end_time_usec(&self) -> u64 {
        self.end_time_usec
    }

    #[must_use]
    pub fn spans(&self) -> &[InFlightSpan] {
        &self.spans
    }

    /// Start accepting signals. Returns `false` if already registered.
    pub fn register(&mut self) -> Result<bool, TimelineError> {
        match self.state {
            ObserverState::Disposed => Err(TimelineError::Disposed(self.name)),
            ObserverState::Registered => Ok(false),
            ObserverState::Unregistered => {
                self.state = ObserverState::Registered;
                self.generation = self.generation.next();
                self.end_time_usec = 0;
                self.spans.clear();
                Ok(true)
            }
        }
    }

    /// Stop accepting signals and freeze the publish boundary
    pub fn unregister(&mut self) {
        if !self.is_registered() {
            return;
        }
        self.state = ObserverState::Unregistered;
        self.generation = self.generation.next();
        self.end_time_usec = self.publish_boundary();
        debug!("{} unregistered, end time frozen at {}us", self.name, self.end_time_usec);
    }

    pub fn dispose(&mut self) {
        self.unregister();
        self.state = ObserverState::Disposed;
        self.generation = self.generation.next();
        self.spans.clear();
    }

    /// Open a new span for `(key, event_type)`
    pub fn add_event(
        &mut self,
        key: &str,
        timestamp_usec: u64,
        event_type: EventType,
    ) -> Result<&mut InFlightSpan, TimelineError> {
        if self.is_disposed() {
            return Err(TimelineError::Disposed(self.name));
        }
        if self.incomplete_event(key, event_type)?.is_some() {
            return Err(TimelineError::DuplicateSpan { key: key.to_string(), event_type });
        }
        self.spans.push(InFlightSpan::new(key.to_string(), timestamp_usec, event_type));
        let last = self.spans.len() - 1;
        Ok(&mut self.spans[last])
    }

    /// Record a span that fills exactly one bucket
    pub fn add_instantaneous_event(
        &mut self,
        key: &str,
        timestamp_usec: u64,
        event_type: EventType,
    ) -> Result<(), TimelineError> {
        self.add_event(key, timestamp_usec, event_type)?.mark_instantaneous()
    }

    /// The open span for `(key, event_type)`, if any
    pub fn incomplete_event(
        &mut self,
        key: &str,
        event_type: EventType,
    ) -> Result<Option<&mut InFlightSpan>, TimelineError> {
        let mut matches = self
            .spans
            .iter()
            .enumerate()
            .filter(|(_, s)| !s.is_complete() && s.key == key && s.event_type == event_type)
            .map(|(index, _)| index);
        let Some(first) = matches.next() else {
            return Ok(None);
        };
        let extra = matches.count();
        if extra > 0 {
            return Err(TimelineError::AmbiguousSpan {
                key: key.to_string(),
                event_type,
                count: extra + 1,
            });
        }
        Ok(Some(&mut self.spans[first]))
    }

    /// Close the open span for `(key, event_type)` if there is one
    pub fn complete_event(
        &mut self,
        key: &str,
        event_type: EventType,
        end_time_usec: u64,
    ) -> Result<bool, TimelineError> {
        match self.incomplete_event(key, event_type)? {
            Some(span) => {
                span.complete(end_time_usec)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Close the open span for `(key, event_type)`, which must exist
    pub fn require_complete_event(
        &mut self,
        key: &str,
        event_type: EventType,
        end_time_usec: u64,
    ) -> Result<(), TimelineError> {
        if self.complete_event(key, event_type, end_time_usec)? {
            Ok(())
        } else {
            Err(TimelineError::NoSuchSpan { key: key.to_string(), event_type })
        }
    }

    /// Per-tick publish step
    ///
    /// Publishes every span that starts at or before the boundary, clamped
    /// to it. Complete spans leave the table once published. After
    /// unregistration no further signal can close an open span, so the
    /// table is flushed for good.
    pub fn on_timeout_callback(&mut self, model: &mut TimelineModel) -> Result<bool, TimelineError> {
        if self.is_disposed() {
            return Ok(false);
        }
        let registered = self.is_registered();
        if registered {
            self.end_time_usec = self.publish_boundary();
        }
        if self.spans.is_empty() {
            return Ok(registered);
        }

        let boundary = self.end_time_usec;
        let mut events = Vec::with_capacity(self.spans.len());
        for span in &self.spans {
            if let Some(event) = self.to_timeline_event(span, boundary)? {
                events.push(event);
            }
        }

        if registered {
            self.spans.retain(|s| s.start_time_usec > boundary || !s.is_complete());
        } else {
            let unpublished = self.spans.iter().filter(|s| s.start_time_usec > boundary).count();
            if unpublished > 0 {
                trace!("{}: dropping {unpublished} spans past frozen end", self.name);
            }
            self.spans.clear();
        }

        model.start_adding_events();
        for event in events {
            model.add_event(event)?;
        }
        model.done_adding_events(boundary)?;

        Ok(registered || !self.spans.is_empty())
    }

    /// Rounded-up elapsed time, raised to cover the true end of every
    /// completed span so none is cut short on its last publish
    fn publish_boundary(&self) -> u64 {
        let completed_end = self
            .spans
            .iter()
            .filter(|s| !s.is_instantaneous())
            .filter_map(InFlightSpan::end_time_usec)
            .max()
            .unwrap_or(0);
        let now = self.elapsed_usec();
        self.resolution.round_up(now.max(completed_end))
    }

    fn to_timeline_event(
        &self,
        span: &InFlightSpan,
        boundary: u64,
    ) -> Result<Option<TimelineEvent>, TimelineError> {
        if span.start_time_usec > boundary {
            return Ok(None);
        }

        let (start, duration) = if span.is_instantaneous() {
            (self.resolution.round_down(span.start_time_usec), self.resolution.as_usec())
        } else {
            let end = span.end_time_usec().map_or(boundary, |end| end.min(boundary));
            if span.start_time_usec > end {
                return Err(TimelineError::StartAfterEnd {
                    key: span.key.clone(),
                    start_time_usec: span.start_time_usec,
                    end_time_usec: end,
                });
            }
            (span.start_time_usec, end - span.start_time_usec)
        };

        Ok(Some(TimelineEvent::new(span.key.clone(), start, duration, span.event_type, 1.0)))
    }
}

/// Source-specific mapping from raw host notifications to span operations
pub trait SignalMapper {
    type Signal;

    /// Source name used in logs and errors
    const NAME: &'static str;

    /// Called after a fresh registration
    fn on_register(&mut self, _engine: &ObserverEngine) {}

    fn map_signal(
        &mut self,
        engine: &mut ObserverEngine,
        signal: Self::Signal,
    ) -> Result<(), TimelineError>;

    /// Apply deferred host callbacks. Runs on every tick before publishing
    /// and once more on unregister, while the callbacks' generation is
    /// still current.
    ///
    /// Each callback stands in for a host entry point, so a failure affects
    /// that callback alone.
    fn before_publish(&mut self, _engine: &mut ObserverEngine) {}
}

/// A push-based event source: shared engine plus a signal mapper
pub struct Observer<M: SignalMapper> {
    engine: ObserverEngine,
    mapper: M,
}

impl<M: SignalMapper> Observer<M> {
    pub fn new(mapper: M, clock: SessionClock, resolution: Resolution) -> Self {
        Self { engine: ObserverEngine::new(M::NAME, clock, resolution), mapper }
    }

    pub fn register(&mut self) -> Result<(), TimelineError> {
        if self.engine.register()? {
            self.mapper.on_register(&self.engine);
        }
        Ok(())
    }

    /// Work queued while registered is applied before the boundary freezes
    pub fn unregister(&mut self) {
        if self.engine.is_registered() {
            self.mapper.before_publish(&mut self.engine);
        }
        self.engine.unregister();
    }

    pub fn dispose(&mut self) {
        self.engine.dispose();
    }

    /// Host notification entry point. Ignored unless registered.
    pub fn observe(&mut self, signal: M::Signal) -> Result<(), TimelineError> {
        if !self.engine.is_registered() {
            trace!("{}: ignoring signal while {:?}", M::NAME, self.engine.state());
            return Ok(());
        }
        self.mapper.map_signal(&mut self.engine, signal)
    }

    #[must_use]
    pub fn engine(&self) -> &ObserverEngine {
        &self.engine
    }

    #[must_use]
    pub fn mapper(&self) -> &M {
        &self.mapper
    }

    #[cfg(test)]
    pub(crate) fn parts_mut(&mut self) -> (&mut ObserverEngine, &mut M) {
        (&mut self.engine, &mut self.mapper)
    }

    pub fn on_timeout_callback(&mut self, model: &mut TimelineModel) -> Result<bool, TimelineError> {
        if self.engine.is_registered() {
            self.mapper.before_publish(&mut self.engine);
        }
        self.engine.on_timeout_callback(model)
    }
}

impl<M: SignalMapper> TickSource for Observer<M> {
    fn name(&self) -> &'static str {
        M::NAME
    }

    fn on_timeout_callback(&mut self, model: &mut TimelineModel) -> Result<bool, TimelineError> {
        Observer::on_timeout_callback(self, model)
    }
}
