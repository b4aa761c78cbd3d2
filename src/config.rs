//! Configuration, limits and timing budgets for probe runs.

use std::time::Duration;

/// Endpoint used when neither the caller nor the environment names one.
pub const DEFAULT_ENDPOINT: &str = "ws://localhost:5000/ws";

/// Environment variable that overrides the target endpoint.
pub const ENDPOINT_ENV: &str = "WSPROBE_URL";

/// Resource limits for incoming data.
///
/// Snapshots are full-state dumps, so the defaults leave plenty of headroom
/// while still bounding memory if a server misbehaves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Limits {
    /// Maximum size of a single frame in bytes.
    ///
    /// Default: 16 MB
    pub max_frame_size: usize,

    /// Maximum size of a reassembled message in bytes.
    ///
    /// Default: 64 MB
    pub max_message_size: usize,

    /// Maximum size of the server's handshake response in bytes.
    ///
    /// Default: 8 KB
    pub max_handshake_size: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_frame_size: 16 * 1024 * 1024,
            max_message_size: 64 * 1024 * 1024,
            max_handshake_size: 8192,
        }
    }
}

impl Limits {
    /// Validate that frame size is within limits.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FrameTooLarge`](crate::Error::FrameTooLarge) if `size` exceeds the configured maximum.
    pub const fn check_frame_size(&self, size: usize) -> Result<(), crate::Error> {
        if size > self.max_frame_size {
            Err(crate::Error::FrameTooLarge {
                size,
                max: self.max_frame_size,
            })
        } else {
            Ok(())
        }
    }

    /// Validate that message size is within limits.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MessageTooLarge`](crate::Error::MessageTooLarge) if `size` exceeds the configured maximum.
    pub const fn check_message_size(&self, size: usize) -> Result<(), crate::Error> {
        if size > self.max_message_size {
            Err(crate::Error::MessageTooLarge {
                size,
                max: self.max_message_size,
            })
        } else {
            Ok(())
        }
    }

    /// Validate that handshake size is within limits.
    ///
    /// # Errors
    ///
    /// Returns [`Error::HandshakeTooLarge`](crate::Error::HandshakeTooLarge) if `size` exceeds the configured maximum.
    pub const fn check_handshake_size(&self, size: usize) -> Result<(), crate::Error> {
        if size > self.max_handshake_size {
            Err(crate::Error::HandshakeTooLarge {
                size,
                max: self.max_handshake_size,
            })
        } else {
            Ok(())
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timeouts {
    /// Maximum time to open TCP and complete the upgrade handshake.
    ///
    /// Default: 10 seconds
    pub connect: Duration,

    /// Per-attempt receive wait.
    ///
    /// Default: 1 second
    pub receive: Duration,

    /// Maximum time to wait for the peer's close frame when closing.
    ///
    /// Default: 1 second
    pub close: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(10),
            receive: Duration::from_secs(1),
            close: Duration::from_secs(1),
        }
    }
}

impl Timeouts {
    /// Create new timeouts with custom values.
    #[must_use]
    pub const fn new(connect: Duration, receive: Duration, close: Duration) -> Self {
        Self {
            connect,
            receive,
            close,
        }
    }
}

/// How a snapshot expectation polls the server.
///
/// The overall step budget is `attempts` per-attempt waits plus the
/// backoff sleeps between attempts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotPolicy {
    /// Number of `getSnapshot` requests before giving up.
    ///
    /// Default: 5
    pub attempts: u32,

    /// Pause before the first retry; doubles on every further retry.
    ///
    /// Default: 100 ms
    pub backoff: Duration,

    /// Upper bound for a single backoff pause.
    ///
    /// Default: 1 second
    pub max_backoff: Duration,
}

impl Default for SnapshotPolicy {
    fn default() -> Self {
        Self {
            attempts: 5,
            backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(1),
        }
    }
}

impl SnapshotPolicy {
    /// A policy that sends exactly one request and never retries.
    #[must_use]
    pub const fn single_shot() -> Self {
        Self {
            attempts: 1,
            backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        }
    }

    /// Backoff to sleep before attempt `attempt` (zero-based).
    #[must_use]
    pub fn backoff_before(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let factor = 1u32 << (attempt - 1).min(16);
        self.backoff.saturating_mul(factor).min(self.max_backoff)
    }
}

/// Probe run configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Target WebSocket URI.
    ///
    /// Default: [`DEFAULT_ENDPOINT`]
    pub endpoint: String,

    /// Resource limits.
    pub limits: Limits,

    /// Timeout configuration.
    pub timeouts: Timeouts,

    /// Polling policy for snapshot expectations.
    pub snapshot: SnapshotPolicy,

    /// Settling pause used by the built-in scenarios after each creation.
    ///
    /// Default: 500 ms
    pub settle: Duration,

    /// Read buffer size (in bytes).
    ///
    /// Default: 8 KB (8192)
    pub read_buffer_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            limits: Limits::default(),
            timeouts: Timeouts::default(),
            snapshot: SnapshotPolicy::default(),
            settle: Duration::from_millis(500),
            read_buffer_size: 8192,
        }
    }
}

impl Config {
    /// Create a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Default configuration with the endpoint taken from `WSPROBE_URL` if set.
    #[must_use]
    pub fn from_env() -> Self {
        Self::default().with_endpoint_override(std::env::var(ENDPOINT_ENV).ok())
    }

    /// Set the target endpoint.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Replace the endpoint if `endpoint` is a non-empty value.
    #[must_use]
    pub fn with_endpoint_override(self, endpoint: Option<String>) -> Self {
        match endpoint {
            Some(e) if !e.trim().is_empty() => self.with_endpoint(e.trim()),
            _ => self,
        }
    }

    /// Set custom limits.
    #[must_use]
    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// Set timeout configuration.
    #[must_use]
    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Set the per-attempt receive wait.
    #[must_use]
    pub fn with_receive_timeout(mut self, wait: Duration) -> Self {
        self.timeouts.receive = wait;
        self
    }

    /// Set the snapshot polling policy.
    #[must_use]
    pub fn with_snapshot_policy(mut self, policy: SnapshotPolicy) -> Self {
        self.snapshot = policy;
        self
    }

    /// Set the settling pause.
    #[must_use]
    pub fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    /// Set read buffer size.
    #[must_use]
    pub fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size;
        self
    }
}
