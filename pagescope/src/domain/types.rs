//! Domain types providing compile-time safety and self-documentation
//!
//! Timestamps inside the engine are plain `u64` microseconds relative to the
//! session anchor. The newtypes here cover the values that carry rules of
//! their own: the quantisation [`Resolution`], the registration
//! [`Generation`] and the closed [`EventType`] enumeration.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of activity a timeline event describes
///
/// Network phases come first, in the order a request moves through them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    DnsLookup,
    TcpConnecting,
    TcpConnected,
    RequestSent,
    SocketData,
    CacheHit,
    DataAvailable,
    ScriptCompile,
    ScriptExecute,
}

impl EventType {
    /// Every event type, in ordinal order
    pub const ALL: [EventType; 9] = [
        EventType::DnsLookup,
        EventType::TcpConnecting,
        EventType::TcpConnected,
        EventType::RequestSent,
        EventType::SocketData,
        EventType::CacheHit,
        EventType::DataAvailable,
        EventType::ScriptCompile,
        EventType::ScriptExecute,
    ];

    /// 1-based ordinal, stable across releases
    #[must_use]
    pub fn ordinal(self) -> u32 {
        match self {
            EventType::DnsLookup => 1,
            EventType::TcpConnecting => 2,
            EventType::TcpConnected => 3,
            EventType::RequestSent => 4,
            EventType::SocketData => 5,
            EventType::CacheHit => 6,
            EventType::DataAvailable => 7,
            EventType::ScriptCompile => 8,
            EventType::ScriptExecute => 9,
        }
    }

    /// Inverse of [`EventType::ordinal`]
    #[must_use]
    pub fn from_ordinal(ordinal: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.ordinal() == ordinal)
    }

    /// Whether the event describes the life of a request (as opposed to
    /// script activity)
    #[must_use]
    pub fn is_request_event_type(self) -> bool {
        !matches!(self, EventType::ScriptCompile | EventType::ScriptExecute)
    }

    /// Short human-readable label
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            EventType::DnsLookup => "DNS lookup",
            EventType::TcpConnecting => "TCP connecting",
            EventType::TcpConnected => "TCP connected",
            EventType::RequestSent => "Request sent",
            EventType::SocketData => "Socket data",
            EventType::CacheHit => "Cache hit",
            EventType::DataAvailable => "Data available",
            EventType::ScriptCompile => "Script compile",
            EventType::ScriptExecute => "Script execute",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One published timeline event. Immutable once handed to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineEvent {
    pub key: String,
    pub start_time_usec: u64,
    pub duration_usec: u64,
    pub event_type: EventType,
    /// Activity density within the span, in `[0, 1]`
    pub intensity: f64,
}

impl TimelineEvent {
    #[must_use]
    pub fn new(
        key: impl Into<String>,
        start_time_usec: u64,
        duration_usec: u64,
        event_type: EventType,
        intensity: f64,
    ) -> Self {
        Self { key: key.into(), start_time_usec, duration_usec, event_type, intensity }
    }

    /// Exclusive end of the span
    #[must_use]
    pub fn end_time_usec(&self) -> u64 {
        self.start_time_usec + self.duration_usec
    }
}

/// Session-wide time bucket width, in microseconds
///
/// Always non-zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Resolution(u64);

impl Resolution {
    /// Create a resolution (panics if zero)
    #[must_use]
    pub fn from_usec(usec: u64) -> Self {
        assert!(usec > 0, "Resolution must be non-zero");
        Self(usec)
    }

    #[must_use]
    pub fn as_usec(self) -> u64 {
        self.0
    }

    /// Largest bucket boundary `<= value`
    #[must_use]
    pub fn round_down(self, value: u64) -> u64 {
        value - (value % self.0)
    }

    /// Smallest bucket boundary `>= value`
    #[must_use]
    pub fn round_up(self, value: u64) -> u64 {
        match value % self.0 {
            0 => value,
            rem => value + (self.0 - rem),
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}us", self.0)
    }
}

/// Registration generation of an event source
///
/// Captured by deferred callbacks when they are created and compared on
/// delivery; a mismatch means the source re-registered, unregistered or was
/// disposed in the meantime and the callback is stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Generation(pub u64);

impl Generation {
    #[must_use]
    pub fn next(self) -> Self {
        Generation(self.0 + 1)
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gen#{}", self.0)
    }
}

/// Lifecycle of an inspection session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    NotStarted,
    Started,
    Finished,
}
