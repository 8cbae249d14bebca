//! # Shared Host Vocabulary (Host Notifications ↔ Engine)
//!
//! Defines the raw codes the host delivers with its activity notifications
//! and the decoded enums the correlation engine works with. The constants
//! mirror the host's socket-transport and HTTP-activity observer APIs, so a
//! glue layer can forward notifications verbatim and let [`NetworkActivity::from_raw`]
//! do the decoding.
//!
//! ## Key Types
//!
//! - [`SocketStatus`] - Low-level socket phase reported by the socket transport
//! - [`TransactionStatus`] - HTTP transaction sub-status
//! - [`NetworkActivity`] - Decoded `(activity type, sub-status)` pair
//! - [`ProfilerEventKind`] - Kind of span reported by the script profiler

#![no_std]

// ============================================================================
// Activity Type Constants
// ============================================================================

/// Notification originates from the socket transport layer
pub const ACTIVITY_TYPE_SOCKET_TRANSPORT: u32 = 0x0001;

/// Notification originates from the HTTP transaction layer
pub const ACTIVITY_TYPE_HTTP_TRANSACTION: u32 = 0x0002;

// ============================================================================
// Socket Status Codes
// ============================================================================

/// Host name resolution started
pub const STATUS_RESOLVING: u32 = 0x804b_0003;

/// TCP connection established
pub const STATUS_CONNECTED_TO: u32 = 0x804b_0004;

/// Request bytes are being written to the socket
pub const STATUS_SENDING_TO: u32 = 0x804b_0005;

/// Response bytes are being read from the socket
pub const STATUS_RECEIVING_FROM: u32 = 0x804b_0006;

/// TCP connection attempt started
pub const STATUS_CONNECTING_TO: u32 = 0x804b_0007;

/// Waiting for the server after the request was sent (not mapped to a span)
pub const STATUS_WAITING_FOR: u32 = 0x804b_000a;

// ============================================================================
// HTTP Transaction Sub-Status Codes
// ============================================================================

pub const ACTIVITY_SUBTYPE_REQUEST_HEADER: u32 = 0x5001;
pub const ACTIVITY_SUBTYPE_REQUEST_BODY_SENT: u32 = 0x5002;
pub const ACTIVITY_SUBTYPE_RESPONSE_START: u32 = 0x5003;
pub const ACTIVITY_SUBTYPE_RESPONSE_HEADER: u32 = 0x5004;
pub const ACTIVITY_SUBTYPE_RESPONSE_COMPLETE: u32 = 0x5005;

/// The transaction is finished and its connection released
pub const ACTIVITY_SUBTYPE_TRANSACTION_CLOSE: u32 = 0x5006;

// ============================================================================
// Decoded Types
// ============================================================================

/// Socket phase reported by the socket transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum SocketStatus {
    Resolving,
    Connecting,
    Connected,
    Sending,
    Waiting,
    Receiving,
}

impl SocketStatus {
    /// Decode a raw socket status code
    #[must_use]
    pub fn from_raw(code: u32) -> Option<Self> {
        match code {
            STATUS_RESOLVING => Some(Self::Resolving),
            STATUS_CONNECTING_TO => Some(Self::Connecting),
            STATUS_CONNECTED_TO => Some(Self::Connected),
            STATUS_SENDING_TO => Some(Self::Sending),
            STATUS_WAITING_FOR => Some(Self::Waiting),
            STATUS_RECEIVING_FROM => Some(Self::Receiving),
            _ => None,
        }
    }
}

/// HTTP transaction sub-status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum TransactionStatus {
    RequestHeader,
    RequestBodySent,
    ResponseStart,
    ResponseHeader,
    ResponseComplete,
    Close,
}

impl TransactionStatus {
    /// Decode a raw transaction sub-status code
    #[must_use]
    pub fn from_raw(code: u32) -> Option<Self> {
        match code {
            ACTIVITY_SUBTYPE_REQUEST_HEADER => Some(Self::RequestHeader),
            ACTIVITY_SUBTYPE_REQUEST_BODY_SENT => Some(Self::RequestBodySent),
            ACTIVITY_SUBTYPE_RESPONSE_START => Some(Self::ResponseStart),
            ACTIVITY_SUBTYPE_RESPONSE_HEADER => Some(Self::ResponseHeader),
            ACTIVITY_SUBTYPE_RESPONSE_COMPLETE => Some(Self::ResponseComplete),
            ACTIVITY_SUBTYPE_TRANSACTION_CLOSE => Some(Self::Close),
            _ => None,
        }
    }
}

/// One decoded network activity notification
///
/// The host reports an activity type and a sub-status; the meaning of the
/// sub-status depends on the activity type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum NetworkActivity {
    Socket(SocketStatus),
    Transaction(TransactionStatus),
}

impl NetworkActivity {
    /// Decode a raw `(activity type, sub-status)` pair
    ///
    /// Returns `None` for activity types or sub-statuses the engine does
    /// not know about.
    #[must_use]
    pub fn from_raw(activity_type: u32, subtype: u32) -> Option<Self> {
        match activity_type {
            ACTIVITY_TYPE_SOCKET_TRANSPORT => SocketStatus::from_raw(subtype).map(Self::Socket),
            ACTIVITY_TYPE_HTTP_TRANSACTION => {
                TransactionStatus::from_raw(subtype).map(Self::Transaction)
            }
            _ => None,
        }
    }
}

/// Kind of span reported by the script profiler
///
/// Compile spans carry a raw count of initialised functions as their
/// intensity; execute spans carry an intensity already normalised by the
/// profiler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ProfilerEventKind {
    Compile,
    Execute,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_socket_activity() {
        assert_eq!(
            NetworkActivity::from_raw(ACTIVITY_TYPE_SOCKET_TRANSPORT, STATUS_CONNECTING_TO),
            Some(NetworkActivity::Socket(SocketStatus::Connecting))
        );
        assert_eq!(
            NetworkActivity::from_raw(ACTIVITY_TYPE_HTTP_TRANSACTION, ACTIVITY_SUBTYPE_TRANSACTION_CLOSE),
            Some(NetworkActivity::Transaction(TransactionStatus::Close))
        );
    }

    #[test]
    fn test_unknown_codes_decode_to_none() {
        assert_eq!(NetworkActivity::from_raw(0x99, STATUS_RESOLVING), None);
        assert_eq!(NetworkActivity::from_raw(ACTIVITY_TYPE_SOCKET_TRANSPORT, 0x1234), None);
    }
}
