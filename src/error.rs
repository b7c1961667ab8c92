//! Error handling for the outbound message path.

use stray_proto::ProtocolError;
use thiserror::Error;

/// Errors surfaced by the connection manager's outbound operations.
///
/// Rate-limit denial is flow control, not failure: chat sends are deferred
/// and retried by the caller, while connection-affecting calls (connect,
/// join) propagate it so their callers can pace themselves.
#[derive(Debug, Error)]
pub enum SendError {
    /// No session is open.
    #[error("not connected")]
    NotConnected,

    /// The send gate denied the reservation.
    #[error("rate limit reached")]
    RateLimited,

    /// The line violated the framing rules (too long, embedded CR/LF).
    /// Never retried; the message is malformed, not mistimed.
    #[error("protocol violation: {0}")]
    Protocol(#[from] ProtocolError),

    /// The writer task is gone; the disconnect notification is in flight.
    #[error("transport closed")]
    TransportClosed,
}

impl SendError {
    /// A static label for log fields.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::NotConnected => "not_connected",
            Self::RateLimited => "rate_limited",
            Self::Protocol(_) => "protocol_violation",
            Self::TransportClosed => "transport_closed",
        }
    }
}
