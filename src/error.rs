//! Error types for the probe harness.
//!
//! The first five variants form the harness taxonomy reported by scenario and
//! listener runs. The remaining variants are raised by the wire transport and
//! surface to callers wrapped in [`Error::Connection`] or [`Error::Send`], or
//! directly from the low-level codec.

use std::time::Duration;

use serde::{Serialize, Serializer};
use thiserror::Error;

/// Result type alias for probe operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while probing a server.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// The transport could not be established or was lost.
    #[error("Connection error: {0}")]
    Connection(String),

    /// A write failed on an open-but-broken or already closed transport.
    #[error("Send error: {0}")]
    Send(String),

    /// Received bytes are not a valid envelope or payload.
    #[error("Decode error: {0}")]
    Decode(String),

    /// An envelope could not be serialized.
    #[error("Encode error: {0}")]
    Encode(String),

    /// No expected message arrived within the budget.
    #[error("Timed out after {waited:?} waiting for {expected}")]
    Timeout {
        /// What the caller was waiting for.
        expected: String,
        /// Total time spent waiting.
        waited: Duration,
    },

    /// A message arrived and decoded but the predicate did not hold.
    #[error("Assertion failed: expected {expected}, observed {observed}")]
    Assertion {
        /// Human-readable expected condition.
        expected: String,
        /// Human-readable observed value.
        observed: String,
    },

    /// The endpoint URI is not a supported `ws://` URI.
    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// The server's upgrade response was rejected.
    #[error("Invalid handshake: {0}")]
    InvalidHandshake(String),

    /// Handshake response exceeds configured maximum.
    #[error("Handshake too large: {size} bytes (max: {max})")]
    HandshakeTooLarge {
        /// Bytes received so far.
        size: usize,
        /// Maximum allowed size.
        max: usize,
    },

    /// Invalid frame structure or header.
    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    /// Protocol violation detected.
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    /// Invalid UTF-8 in text frame.
    #[error("Invalid UTF-8 in text frame")]
    InvalidUtf8,

    /// Frame size exceeds configured maximum.
    #[error("Frame too large: {size} bytes (max: {max})")]
    FrameTooLarge {
        /// Actual frame size.
        size: usize,
        /// Maximum allowed size.
        max: usize,
    },

    /// Message size exceeds configured maximum.
    #[error("Message too large: {size} bytes (max: {max})")]
    MessageTooLarge {
        /// Actual message size.
        size: usize,
        /// Maximum allowed size.
        max: usize,
    },

    /// Reserved opcode used.
    #[error("Reserved opcode: {0:#x}")]
    ReservedOpcode(u8),

    /// Masked frame received from the server.
    #[error("Server frame must not be masked")]
    MaskedServerFrame,

    /// Reserved bits set without a negotiated extension.
    #[error("Reserved bits set without negotiated extension")]
    ReservedBitsSet,

    /// Control frame fragmented or oversized.
    #[error("Invalid control frame: {0}")]
    InvalidControlFrame(String),

    /// Incomplete frame data.
    #[error("Incomplete frame: need {needed} more bytes")]
    IncompleteFrame {
        /// Number of additional bytes needed.
        needed: usize,
    },

    /// The peer closed the stream.
    #[error("Connection closed: {0:?}")]
    ConnectionClosed(Option<u16>),

    /// I/O error occurred.
    #[error("I/O error: {0}")]
    Io(String),
}

impl Error {
    /// Returns `true` for errors that mean the transport can no longer be used.
    ///
    /// These abort the current scenario or listener run. Decode, timeout and
    /// assertion failures are step-level and leave the session usable.
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        !matches!(
            self,
            Error::Decode(_)
                | Error::Encode(_)
                | Error::Timeout { .. }
                | Error::Assertion { .. }
        )
    }

    /// Build an assertion failure from displayable values.
    pub fn assertion(expected: impl Into<String>, observed: impl Into<String>) -> Self {
        Error::Assertion {
            expected: expected.into(),
            observed: observed.into(),
        }
    }
}

/// Errors serialize as their display text.
impl Serialize for Error {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Decode(err.to_string())
    }
}
