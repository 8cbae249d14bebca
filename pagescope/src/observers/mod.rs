//! Push-based event sources
//!
//! - `engine`: in-flight span table, quantisation and lifecycle shared by
//!   every observer
//! - `network`: socket and transaction phases
//! - `request`: cache hits and response data delivery

pub mod engine;
pub mod network;
pub mod request;

pub use engine::{InFlightSpan, Observer, ObserverEngine, ObserverState, SignalMapper, SpanEnd};
pub use network::{NetworkObserver, NetworkSignal, NetworkSignals};
pub use request::{DataTap, HttpRequest, RequestObserver, RequestSignals};

/// Span key for a request URL: everything before the `#fragment`
#[must_use]
pub fn strip_fragment(url: &str) -> &str {
    url.split_once('#').map_or(url, |(base, _)| base)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_fragment() {
        assert_eq!(strip_fragment("http://a/b#c"), "http://a/b");
        assert_eq!(strip_fragment("http://a/b"), "http://a/b");
        assert_eq!(strip_fragment("#only"), "");
    }
}
