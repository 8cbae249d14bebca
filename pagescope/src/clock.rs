//! Time sources
//!
//! Every component reads time through [`Clock`] so the whole engine can run
//! against [`ManualClock`] in tests and in replay.

use std::cell::Cell;
use std::rc::Rc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Source of absolute time, in microseconds
pub trait Clock {
    fn now_usec(&self) -> u64;
}

/// Wall clock, microseconds since the Unix epoch
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    #[allow(clippy::cast_possible_truncation)]
    fn now_usec(&self) -> u64 {
        SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_micros() as u64).unwrap_or(0)
    }
}

/// Settable clock. Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Rc<Cell<u64>>,
}

impl ManualClock {
    #[must_use]
    pub fn new(now_usec: u64) -> Self {
        Self { now: Rc::new(Cell::new(now_usec)) }
    }

    pub fn set(&self, now_usec: u64) {
        self.now.set(now_usec);
    }

    pub fn advance(&self, delta_usec: u64) {
        self.now.set(self.now.get() + delta_usec);
    }
}

impl Clock for ManualClock {
    fn now_usec(&self) -> u64 {
        self.now.get()
    }
}

/// Session-relative view of a clock
#[derive(Clone)]
pub struct SessionClock {
    clock: Rc<dyn Clock>,
    start_time_usec: u64,
}

impl SessionClock {
    pub fn new(clock: Rc<dyn Clock>, start_time_usec: u64) -> Self {
        Self { clock, start_time_usec }
    }

    /// Session anchor, absolute microseconds
    #[must_use]
    pub fn start_time_usec(&self) -> u64 {
        self.start_time_usec
    }

    /// Microseconds elapsed since the session anchor
    #[must_use]
    pub fn elapsed_usec(&self) -> u64 {
        self.clock.now_usec().saturating_sub(self.start_time_usec)
    }

    /// Rebase an absolute host timestamp onto the session anchor
    #[must_use]
    pub fn relative(&self, absolute_usec: u64) -> u64 {
        absolute_usec.saturating_sub(self.start_time_usec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_clones_share_time() {
        let clock = ManualClock::new(100);
        let other = clock.clone();
        clock.advance(50);
        assert_eq!(other.now_usec(), 150);
    }

    #[test]
    fn test_session_clock_is_relative() {
        let clock = ManualClock::new(1_000_000);
        let session = SessionClock::new(Rc::new(clock.clone()), 1_000_000);
        clock.advance(2_500);
        assert_eq!(session.elapsed_usec(), 2_500);
        assert_eq!(session.relative(1_000_700), 700);
        assert_eq!(session.relative(10), 0);
    }
}
