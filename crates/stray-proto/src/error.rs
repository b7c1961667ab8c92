//! Protocol error types.

use std::io;
use thiserror::Error;

/// Result type for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors raised by the framing layer and outbound validation.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// An underlying I/O error.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// A frame exceeded the negotiated line limit.
    #[error("frame of {actual} bytes exceeds the {limit}-byte limit")]
    FrameTooLong {
        /// Size of the offending frame, terminator included.
        actual: usize,
        /// The limit in force.
        limit: usize,
    },

    /// An outbound line contained an embedded CR or LF.
    ///
    /// Lines are terminated by the codec; a caller-supplied line break would
    /// smuggle a second command into the stream, so it is rejected before
    /// anything is written.
    #[error("CR/LF not allowed inside an outbound line")]
    EmbeddedCrLf,

    /// An inbound frame was not valid UTF-8.
    #[error("invalid utf-8 in inbound frame at byte {byte_pos}")]
    InvalidUtf8 {
        /// Offset of the first invalid byte.
        byte_pos: usize,
    },

    /// An inbound frame did not parse as a message.
    #[error("invalid message: {0}")]
    InvalidMessage(#[from] MessageParseError),
}

/// Errors raised while parsing a single message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MessageParseError {
    /// The frame was empty after stripping the terminator.
    #[error("empty message")]
    Empty,

    /// The frame had a prefix or tags but no command token.
    #[error("message has no command")]
    MissingCommand,
}
