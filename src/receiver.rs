//! Bounded receives with a four-way outcome.
//!
//! The receiver never retries. Callers decide whether a [`Outcome::TimedOut`]
//! means "try again" (polling, listening) or "done" (draining).

use std::fmt;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::{Instant, timeout_at};
use tracing::debug;

use crate::envelope::{Envelope, decode};
use crate::error::{Error, Result};
use crate::message::{CloseFrame, Message};
use crate::session::Session;

/// Result of one bounded receive.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// A data frame arrived and decoded as an envelope.
    Message(Envelope),
    /// Nothing arrived before the deadline.
    TimedOut,
    /// The server closed the connection or the stream ended.
    Closed(Option<CloseFrame>),
    /// A data frame arrived but is not a valid envelope.
    Malformed(String),
}

impl Outcome {
    /// The envelope, if one arrived.
    #[must_use]
    pub fn into_envelope(self) -> Option<Envelope> {
        match self {
            Outcome::Message(envelope) => Some(envelope),
            _ => None,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Message(envelope) => write!(f, "message {}", envelope),
            Outcome::TimedOut => write!(f, "timed out"),
            Outcome::Closed(Some(frame)) => write!(f, "closed: {}", frame),
            Outcome::Closed(None) => write!(f, "closed"),
            Outcome::Malformed(detail) => write!(f, "malformed: {}", detail),
        }
    }
}

/// Wait at most `max_wait` for the next data message.
///
/// The deadline is fixed when the call starts; pings and pongs handled
/// inside the session do not extend it.
///
/// # Errors
///
/// Transport failures (I/O, protocol violations, size limits) are returned
/// as [`Error::Connection`].
pub async fn receive_within<T>(session: &mut Session<T>, max_wait: Duration) -> Result<Outcome>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    receive_before(session, Instant::now() + max_wait).await
}

/// Wait until `deadline` for the next data message.
///
/// # Errors
///
/// See [`receive_within`].
pub async fn receive_before<T>(session: &mut Session<T>, deadline: Instant) -> Result<Outcome>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    let received = match timeout_at(deadline, session.recv()).await {
        Ok(received) => received,
        Err(_) => return Ok(Outcome::TimedOut),
    };

    let outcome = match received {
        Ok(Some(Message::Text(text))) => classify(text.as_bytes()),
        Ok(Some(Message::Binary(bytes))) => classify(&bytes),
        Ok(Some(Message::Close(frame))) => Outcome::Closed(frame),
        Ok(None) => Outcome::Closed(None),
        Err(Error::InvalidUtf8) => Outcome::Malformed(Error::InvalidUtf8.to_string()),
        Err(e) => return Err(Error::Connection(e.to_string())),
    };
    debug!(%outcome, "receive");
    Ok(outcome)
}

fn classify(bytes: &[u8]) -> Outcome {
    match decode(bytes) {
        Ok(envelope) => Outcome::Message(envelope),
        Err(Error::Decode(detail)) => Outcome::Malformed(detail),
        Err(e) => Outcome::Malformed(e.to_string()),
    }
}
