//! # Request Observer
//!
//! Watches the HTTP request lifecycle for cache hits and response data
//! delivery.
//!
//! ## Deferred Instrumentation
//!
//! The "request about to be sent" notification fires before the host has
//! finished wiring the request, so anything done inside it would be
//! overwritten. The observer only records the request and its timestamp;
//! instrumentation happens on the next scheduler tick:
//!
//! 1. Aborted requests are skipped.
//! 2. Cache-resident responses get an instantaneous `CACHE_HIT`.
//! 3. Everything else gets a [`DataTap`] spliced into its response pipeline.
//!    If the pipeline was already fully wired the request simply stays
//!    uninstrumented.
//!
//! ## Data Taps
//!
//! A tap reports the first data delivery and the pipeline teardown
//! (explicit [`DataTap::on_stop`] or drop). Reports travel over a channel
//! and are applied on the next tick, or on unregister if that comes first,
//! stamped with the time they happened. A report the engine rejects is
//! logged and dropped on its own.

use crossbeam_channel::{unbounded, Receiver, Sender};
use log::{debug, trace};

use super::engine::{Observer, ObserverEngine, SignalMapper};
use super::strip_fragment;
use crate::clock::SessionClock;
use crate::domain::{contain, EventType, Generation, Resolution, TapError, TimelineError};

/// Host-side view of one HTTP request
pub trait HttpRequest {
    fn url(&self) -> &str;

    /// `false` once the request was aborted
    fn succeeded(&self) -> bool;

    /// Whether the response is being served from the cache
    fn is_from_cache(&self) -> bool;

    /// Insert a pass-through tap in front of the response consumer
    fn splice_tap(&mut self, tap: DataTap) -> Result<(), TapError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TapPhase {
    FirstData,
    Teardown,
}

#[derive(Debug, Clone)]
struct TapSignal {
    url: String,
    generation: Generation,
    phase: TapPhase,
    timestamp_usec: u64,
}

/// Pass-through tap spliced into a response pipeline
pub struct DataTap {
    url: String,
    generation: Generation,
    clock: SessionClock,
    tx: Sender<TapSignal>,
    seen_data: bool,
    stopped: bool,
}

impl DataTap {
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// The pipeline delivered a chunk of response data
    pub fn on_data_available(&mut self) {
        if self.stopped || self.seen_data {
            return;
        }
        self.seen_data = true;
        self.send(TapPhase::FirstData);
    }

    /// The pipeline was torn down
    pub fn on_stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        if self.seen_data {
            self.send(TapPhase::Teardown);
        }
    }

    fn send(&self, phase: TapPhase) {
        let signal = TapSignal {
            url: self.url.clone(),
            generation: self.generation,
            phase,
            timestamp_usec: self.clock.elapsed_usec(),
        };
        // Receiver gone means the observer was dropped
        let _ = self.tx.send(signal);
    }
}

impl Drop for DataTap {
    fn drop(&mut self) {
        self.on_stop();
    }
}

struct PendingRequest {
    request: Box<dyn HttpRequest>,
    init_time_usec: u64,
    generation: Generation,
}

/// Cache-hit and data-availability mapping
pub struct RequestSignals {
    data_available_instantaneous: bool,
    pending: Vec<PendingRequest>,
    tap_tx: Sender<TapSignal>,
    tap_rx: Receiver<TapSignal>,
}

pub type RequestObserver = Observer<RequestSignals>;

impl RequestSignals {
    #[must_use]
    pub fn new(data_available_instantaneous: bool) -> Self {
        let (tap_tx, tap_rx) = unbounded();
        Self { data_available_instantaneous, pending: Vec::new(), tap_tx, tap_rx }
    }

    #[must_use]
    pub fn data_available_instantaneous(&self) -> bool {
        self.data_available_instantaneous
    }

    /// Requests waiting for the next tick
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    fn instrument(
        &self,
        engine: &mut ObserverEngine,
        pending: PendingRequest,
    ) -> Result<(), TimelineError> {
        let PendingRequest { mut request, init_time_usec, .. } = pending;
        if !request.succeeded() {
            debug!("request for {} aborted before instrumentation", request.url());
            return Ok(());
        }

        let url = strip_fragment(request.url()).to_string();
        if request.is_from_cache() {
            return engine.add_instantaneous_event(&url, init_time_usec, EventType::CacheHit);
        }

        let tap = DataTap {
            url: url.clone(),
            generation: engine.generation(),
            clock: engine.clock().clone(),
            tx: self.tap_tx.clone(),
            seen_data: false,
            stopped: false,
        };
        if let Err(e) = request.splice_tap(tap) {
            debug!("{url} left uninstrumented: {e}");
        }
        Ok(())
    }

    fn apply_tap_signal(
        &self,
        engine: &mut ObserverEngine,
        signal: TapSignal,
    ) -> Result<(), TimelineError> {
        match signal.phase {
            TapPhase::FirstData => {
                let span = engine.add_event(&signal.url, signal.timestamp_usec, EventType::DataAvailable)?;
                if self.data_available_instantaneous {
                    span.mark_instantaneous()?;
                }
                Ok(())
            }
            // Instantaneous data-available spans never get an end time
            TapPhase::Teardown if self.data_available_instantaneous => Ok(()),
            TapPhase::Teardown => engine.require_complete_event(
                &signal.url,
                EventType::DataAvailable,
                signal.timestamp_usec,
            ),
        }
    }
}

impl SignalMapper for RequestSignals {
    type Signal = Box<dyn HttpRequest>;

    const NAME: &'static str = "RequestObserver";

    fn on_register(&mut self, _engine: &ObserverEngine) {
        self.pending.clear();
        while self.tap_rx.try_recv().is_ok() {}
    }

    fn map_signal(
        &mut self,
        engine: &mut ObserverEngine,
        request: Box<dyn HttpRequest>,
    ) -> Result<(), TimelineError> {
        // The cache lookup happens right after this notification, so its
        // timestamp is the cache-hit time.
        self.pending.push(PendingRequest {
            request,
            init_time_usec: engine.elapsed_usec(),
            generation: engine.generation(),
        });
        Ok(())
    }

    fn before_publish(&mut self, engine: &mut ObserverEngine) {
        for pending in std::mem::take(&mut self.pending) {
            if pending.generation != engine.generation() {
                trace!("dropping stale request from {}", pending.generation);
                continue;
            }
            contain("request instrumentation", self.instrument(engine, pending));
        }

        while let Ok(signal) = self.tap_rx.try_recv() {
            if signal.generation != engine.generation() {
                trace!("dropping stale tap signal for {} from {}", signal.url, signal.generation);
                continue;
            }
            contain("data tap", self.apply_tap_signal(engine, signal));
        }
    }
}

impl RequestObserver {
    #[must_use]
    pub fn create(
        clock: SessionClock,
        resolution: Resolution,
        data_available_instantaneous: bool,
    ) -> Self {
        Observer::new(RequestSignals::new(data_available_instantaneous), clock, resolution)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::model::tests::Recorder;
    use crate::model::TimelineModel;
    use crate::observers::engine::SpanEnd;
    use std::cell::RefCell;
    use std::rc::Rc;

    const START: u64 = 2_000_000;

    #[derive(Clone, Copy)]
    enum Wiring {
        Open,
        AlreadyWired,
    }

    /// Request double that hands its tap to the test
    struct FakeRequest {
        url: String,
        from_cache: bool,
        aborted: bool,
        wiring: Wiring,
        tap_slot: Rc<RefCell<Option<DataTap>>>,
    }

    impl HttpRequest for FakeRequest {
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
            match self.wiring {
                Wiring::Open => {
                    *self.tap_slot.borrow_mut() = Some(tap);
                    Ok(())
                }
                Wiring::AlreadyWired => Err(TapError::AlreadyWired),
            }
        }
    }

    struct Fixture {
        observer: RequestObserver,
        clock: ManualClock,
        model: TimelineModel,
        tap: Rc<RefCell<Option<DataTap>>>,
    }

    impl Fixture {
        fn new(instantaneous: bool) -> Self {
            let clock = ManualClock::new(START);
            let session = SessionClock::new(Rc::new(clock.clone()), START);
            let mut observer =
                RequestObserver::create(session, Resolution::from_usec(1_000), instantaneous);
            observer.register().unwrap();
            Self {
                observer,
                clock,
                model: TimelineModel::new(),
                tap: Rc::new(RefCell::new(None)),
            }
        }

        fn send(&mut self, url: &str, from_cache: bool, aborted: bool, wiring: Wiring) {
            let request = FakeRequest {
                url: url.to_string(),
                from_cache,
                aborted,
                wiring,
                tap_slot: self.tap.clone(),
            };
            self.observer.observe(Box::new(request)).unwrap();
        }

        fn tick(&mut self) -> bool {
            self.observer.on_timeout_callback(&mut self.model).unwrap()
        }

        fn span_summary(&self) -> Vec<(EventType, u64, SpanEnd)> {
            self.observer
                .engine()
                .spans()
                .iter()
                .map(|s| (s.event_type(), s.start_time_usec(), s.end()))
                .collect()
        }
    }

    #[test]
    fn test_instrumentation_waits_for_tick() {
        let mut fx = Fixture::new(true);
        fx.send("http://a/x.css", true, false, Wiring::Open);
        assert_eq!(fx.observer.mapper().pending_count(), 1);
        assert!(fx.observer.engine().spans().is_empty());
        fx.tick();
        assert_eq!(fx.observer.mapper().pending_count(), 0);
    }

    #[test]
    fn test_cache_hit_uses_notification_time() {
        let mut fx = Fixture::new(true);
        fx.clock.advance(1_200);
        fx.send("http://a/x.css#top", true, false, Wiring::Open);
        fx.clock.advance(5_000);
        // Cache hit is published and consumed on the same tick
        fx.observer.before_publish_for_test();
        assert_eq!(fx.span_summary(), vec![(EventType::CacheHit, 1_200, SpanEnd::Instantaneous)]);
        assert_eq!(fx.observer.engine().spans()[0].key(), "http://a/x.css");
        assert!(fx.tap.borrow().is_none());
    }

    #[test]
    fn test_data_available_span_with_end() {
        let mut fx = Fixture::new(false);
        fx.send("http://a/app.js", false, false, Wiring::Open);
        fx.tick();

        fx.clock.advance(3_000);
        fx.tap.borrow_mut().as_mut().unwrap().on_data_available();
        fx.clock.advance(500);
        fx.tap.borrow_mut().as_mut().unwrap().on_data_available();
        fx.clock.advance(1_500);
        // Pipeline teardown drops the tap
        fx.tap.borrow_mut().take();

        fx.observer.before_publish_for_test();
        assert_eq!(
            fx.span_summary(),
            vec![(EventType::DataAvailable, 3_000, SpanEnd::Closed(5_000))]
        );
    }

    #[test]
    fn test_instantaneous_data_available_never_ends() {
        let mut fx = Fixture::new(true);
        fx.send("http://a/app.js", false, false, Wiring::Open);
        fx.tick();
        fx.clock.advance(3_000);
        {
            let mut slot = fx.tap.borrow_mut();
            let tap = slot.as_mut().unwrap();
            tap.on_data_available();
            tap.on_stop();
        }
        fx.observer.before_publish_for_test();
        assert_eq!(
            fx.span_summary(),
            vec![(EventType::DataAvailable, 3_000, SpanEnd::Instantaneous)]
        );
    }

    #[test]
    fn test_already_wired_pipeline_is_skipped() {
        let mut fx = Fixture::new(false);
        fx.send("http://a/late.js", false, false, Wiring::AlreadyWired);
        assert!(fx.tick());
        assert!(fx.observer.engine().spans().is_empty());
        assert!(fx.tap.borrow().is_none());
    }

    #[test]
    fn test_aborted_request_is_skipped() {
        let mut fx = Fixture::new(false);
        fx.send("http://a/gone.js", true, true, Wiring::Open);
        fx.tick();
        assert!(fx.observer.engine().spans().is_empty());
    }

    #[test]
    fn test_stale_tap_after_unregister_is_ignored() {
        let mut fx = Fixture::new(false);
        fx.send("http://a/app.js", false, false, Wiring::Open);
        fx.tick();
        fx.observer.unregister();
        fx.tap.borrow_mut().as_mut().unwrap().on_data_available();
        fx.observer.register().unwrap();
        fx.tick();
        assert!(fx.observer.engine().spans().is_empty());
    }

    #[test]
    fn test_data_reported_before_unregister_is_kept() {
        let mut fx = Fixture::new(false);
        let recorder = Rc::new(RefCell::new(Recorder::default()));
        fx.model.add_listener(Box::new(recorder.clone()));
        fx.send("http://a/app.js", false, false, Wiring::Open);
        fx.tick();

        fx.clock.advance(3_000);
        fx.tap.borrow_mut().as_mut().unwrap().on_data_available();
        fx.clock.advance(2_000);
        fx.tap.borrow_mut().take();
        fx.clock.advance(1_000);
        fx.observer.unregister();

        assert_eq!(
            fx.span_summary(),
            vec![(EventType::DataAvailable, 3_000, SpanEnd::Closed(5_000))]
        );
        assert!(!fx.tick());
        let recorder = recorder.borrow();
        let (events, _) = recorder.batches.last().unwrap();
        let published = &events[0];
        assert_eq!(published.start_time_usec, 3_000);
        assert_eq!(published.duration_usec, 2_001);
    }

    #[test]
    fn test_cache_hit_pending_at_unregister_is_kept() {
        let mut fx = Fixture::new(true);
        fx.clock.advance(700);
        fx.send("http://a/x.css", true, false, Wiring::Open);
        fx.observer.unregister();

        assert_eq!(fx.observer.mapper().pending_count(), 0);
        assert_eq!(fx.span_summary(), vec![(EventType::CacheHit, 700, SpanEnd::Instantaneous)]);
    }

    #[test]
    fn test_rejected_tap_report_leaves_tick_intact() {
        let mut fx = Fixture::new(false);
        fx.send("http://a/app.js", false, false, Wiring::Open);
        fx.tick();
        let mut first = fx.tap.borrow_mut().take().unwrap();
        fx.send("http://a/app.js", false, false, Wiring::Open);
        fx.tick();
        let mut second = fx.tap.borrow_mut().take().unwrap();

        fx.clock.advance(1_000);
        first.on_data_available();
        fx.clock.advance(1_000);
        // Same URL, same type, still open: the engine refuses this one
        second.on_data_available();
        assert!(fx.tick());

        assert_eq!(
            fx.span_summary(),
            vec![(EventType::DataAvailable, 1_000, SpanEnd::Open)]
        );
        assert!(fx.observer.engine().is_registered());
    }
    #[test]
    fn test_tap_outliving_observer_is_harmless() {
        let mut fx = Fixture::new(false);
        fx.send("http://a/app.js", false, false, Wiring::Open);
        fx.tick();
        let tap = fx.tap.borrow_mut().take();
        drop(fx);
        let mut tap = tap.unwrap();
        tap.on_data_available();
        tap.on_stop();
    }

    impl RequestObserver {
        /// Run the deferred work without publishing
        fn before_publish_for_test(&mut self) {
            let (engine, mapper) = self.parts_mut();
            mapper.before_publish(engine);
        }
    }
}
