//! Session lifecycle states.

/// Lifecycle of a probe session.
///
/// A session only exists once the opening handshake has succeeded, so it
/// starts `Open`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SessionState {
    /// Handshake complete; envelopes can be sent and received.
    #[default]
    Open,
    /// Our close frame is out, waiting for the peer's.
    Closing,
    /// Closed by either side, or failed.
    Closed,
}

impl SessionState {
    /// Check if sending data is allowed in this state.
    #[must_use]
    #[inline]
    pub const fn can_send(&self) -> bool {
        matches!(self, SessionState::Open)
    }

    /// Check if receiving data is allowed in this state.
    #[must_use]
    #[inline]
    pub const fn can_receive(&self) -> bool {
        matches!(self, SessionState::Open | SessionState::Closing)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Open => write!(f, "open"),
            SessionState::Closing => write!(f, "closing"),
            SessionState::Closed => write!(f, "closed"),
        }
    }
}
