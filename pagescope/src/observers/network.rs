//! # Network Observer
//!
//! Turns socket-transport and HTTP-transaction notifications into network
//! phase spans, keyed per URL:
//!
//! | Notification        | Effect                                                   |
//! |---------------------|----------------------------------------------------------|
//! | resolving           | open `DNS_LOOKUP`                                        |
//! | connecting          | open `TCP_CONNECTING`                                    |
//! | connected           | close `TCP_CONNECTING`, open `TCP_CONNECTED`             |
//! | sending             | open `TCP_CONNECTED` if missing (pooled connection), instantaneous `REQUEST_SENT` |
//! | receiving           | instantaneous `SOCKET_DATA`                              |
//! | transaction close   | close `TCP_CONNECTED`                                    |
//!
//! Every socket phase first closes still-open earlier phases for the same
//! URL, except the connection phases which have their own closing rules.

use log::{trace, warn};
use pagescope_common::{NetworkActivity, SocketStatus, TransactionStatus};

use super::engine::{Observer, ObserverEngine, SignalMapper};
use super::strip_fragment;
use crate::clock::SessionClock;
use crate::domain::{EventType, Resolution, TimelineError};

/// Network phases in the order a request moves through them
const NETWORK_PHASES: [EventType; 5] = [
    EventType::DnsLookup,
    EventType::TcpConnecting,
    EventType::TcpConnected,
    EventType::RequestSent,
    EventType::SocketData,
];

/// One network activity notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkSignal {
    pub url: String,
    pub activity: NetworkActivity,
    /// Absolute host timestamp, microseconds
    pub timestamp_usec: u64,
}

impl NetworkSignal {
    #[must_use]
    pub fn new(url: impl Into<String>, activity: NetworkActivity, timestamp_usec: u64) -> Self {
        Self { url: url.into(), activity, timestamp_usec }
    }

    /// Decode a raw host notification. Unknown codes yield `None`.
    #[must_use]
    pub fn from_raw(
        url: impl Into<String>,
        activity_type: u32,
        subtype: u32,
        timestamp_usec: u64,
    ) -> Option<Self> {
        let Some(activity) = NetworkActivity::from_raw(activity_type, subtype) else {
            warn!("unknown network activity 0x{activity_type:x}/0x{subtype:x}");
            return None;
        };
        Some(Self::new(url, activity, timestamp_usec))
    }
}

/// Network phase mapping
#[derive(Debug, Default)]
pub struct NetworkSignals;

pub type NetworkObserver = Observer<NetworkSignals>;

impl SignalMapper for NetworkSignals {
    type Signal = NetworkSignal;

    const NAME: &'static str = "NetworkObserver";

    fn map_signal(
        &mut self,
        engine: &mut ObserverEngine,
        signal: NetworkSignal,
    ) -> Result<(), TimelineError> {
        let timestamp_usec = engine.clock().relative(signal.timestamp_usec);
        let url = strip_fragment(&signal.url);
        match signal.activity {
            NetworkActivity::Socket(status) => on_socket_event(engine, url, status, timestamp_usec),
            NetworkActivity::Transaction(TransactionStatus::Close) => {
                close_earlier_phases(engine, url, EventType::SocketData, timestamp_usec)?;
                engine.complete_event(url, EventType::TcpConnected, timestamp_usec)?;
                Ok(())
            }
            NetworkActivity::Transaction(status) => {
                trace!("ignoring transaction status {status:?} for {url}");
                Ok(())
            }
        }
    }
}

impl NetworkObserver {
    #[must_use]
    pub fn create(clock: SessionClock, resolution: Resolution) -> Self {
        Observer::new(NetworkSignals, clock, resolution)
    }
}

fn phase_for_status(status: SocketStatus) -> Option<EventType> {
    match status {
        SocketStatus::Resolving => Some(EventType::DnsLookup),
        SocketStatus::Connecting => Some(EventType::TcpConnecting),
        SocketStatus::Connected => Some(EventType::TcpConnected),
        SocketStatus::Sending => Some(EventType::RequestSent),
        SocketStatus::Receiving => Some(EventType::SocketData),
        SocketStatus::Waiting => None,
    }
}

fn on_socket_event(
    engine: &mut ObserverEngine,
    url: &str,
    status: SocketStatus,
    timestamp_usec: u64,
) -> Result<(), TimelineError> {
    let Some(phase) = phase_for_status(status) else {
        return Ok(());
    };

    close_earlier_phases(engine, url, phase, timestamp_usec)?;

    match phase {
        EventType::TcpConnected => {
            engine.complete_event(url, EventType::TcpConnecting, timestamp_usec)?;
        }
        // A pooled connection skips straight to sending; its connection
        // phase starts here.
        EventType::RequestSent => {
            if engine.incomplete_event(url, EventType::TcpConnected)?.is_none() {
                engine.add_event(url, timestamp_usec, EventType::TcpConnected)?;
            }
        }
        _ => {}
    }

    if matches!(phase, EventType::RequestSent | EventType::SocketData) {
        engine.add_instantaneous_event(url, timestamp_usec, phase)
    } else {
        engine.add_event(url, timestamp_usec, phase).map(|_| ())
    }
}

/// Close open spans for phases before `phase`, leaving the connection
/// phases alone
fn close_earlier_phases(
    engine: &mut ObserverEngine,
    url: &str,
    phase: EventType,
    timestamp_usec: u64,
) -> Result<(), TimelineError> {
    for earlier in NETWORK_PHASES.iter().copied().filter(|t| *t < phase) {
        if matches!(earlier, EventType::TcpConnecting | EventType::TcpConnected) {
            continue;
        }
        engine.complete_event(url, earlier, timestamp_usec)?;
    }
    Ok(())
}
